//! Department entity
//!
//! Table: hr_department

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "hr_department")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Department name as entered
    #[sea_orm(column_type = "String(Some(64))")]
    pub name: String,

    /// Case-folded name; the unique key behind case-insensitive uniqueness
    #[sea_orm(column_type = "String(Some(128))", unique)]
    #[serde(skip)]
    pub name_key: String,

    /// Parent department id (None for a root department)
    #[sea_orm(nullable, indexed)]
    pub parent_id: Option<i64>,

    /// Materialized ancestor path, e.g. `/1/4/9/`
    #[sea_orm(column_type = "String(Some(255))", indexed)]
    pub dep_path: String,

    /// Cached "has children" flag
    pub is_parent: bool,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// The self-reference through parent_id is resolved by the hierarchy, not by relations

impl ActiveModelBehavior for ActiveModel {}

/// Department row as seen by the rest of the crate
pub type Department = Model;

/// Case-folded form of a department name.
///
/// Folding happens in Rust for every backend, so SQL `LOWER` (which only
/// folds ASCII on sqlite) never decides uniqueness.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Department tree node (for API responses)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentNode {
    #[serde(flatten)]
    pub department: Department,
    pub employee_count: u64,
    #[serde(default)]
    pub children: Vec<DepartmentNode>,
}

impl DepartmentNode {
    /// Ids of this node and every descendant, depth first
    pub fn ids(&self) -> Vec<i64> {
        let mut ids = vec![self.department.id];
        for child in &self.children {
            ids.extend(child.ids());
        }
        ids
    }
}

impl From<Model> for DepartmentNode {
    fn from(model: Model) -> Self {
        Self {
            department: model,
            employee_count: 0,
            children: Vec::new(),
        }
    }
}
