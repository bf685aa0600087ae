//! Department hierarchy
//!
//! Keeps the department forest consistent on top of a `DepartmentStore`.
//! `parent_id` is authoritative; `dep_path` and `is_parent` are caches that
//! every mutation rewrites inside the same store transaction.

use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::entity::department::{Department, DepartmentNode};
use crate::error::{AppError, AppResult, OptionExt};
use crate::store::{DepartmentStore, NewDepartment, StoreTransaction, TransactionalStore};

pub mod path;
pub mod tree;

/// Longest accepted department name, in characters
pub const MAX_NAME_LEN: usize = 64;

pub struct DepartmentHierarchy<S> {
    store: S,
}

impl<S: TransactionalStore> DepartmentHierarchy<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every department, in store order
    pub async fn get_all(&self) -> AppResult<Vec<Department>> {
        Ok(self.store.find_all().await?)
    }

    pub async fn get_by_id(&self, id: i64) -> AppResult<Department> {
        find_department(&self.store, id).await
    }

    /// Exact, case-sensitive lookup
    pub async fn get_by_name(&self, name: &str) -> AppResult<Department> {
        self.store
            .find_by_name(name)
            .await?
            .ok_or_not_found(format!("department '{}' not found", name))
    }

    /// Full forest with employee counts
    pub async fn get_tree(&self) -> AppResult<Vec<DepartmentNode>> {
        let rows = self.store.find_all().await?;
        let counts = self.employee_counts(&rows).await?;
        Ok(tree::build_forest(rows, &counts))
    }

    /// Immediate children of an existing department
    pub async fn get_children(&self, parent_id: i64) -> AppResult<Vec<Department>> {
        find_department(&self.store, parent_id).await?;
        Ok(self.store.find_by_parent_id(parent_id).await?)
    }

    /// A department and all of its descendants
    pub async fn get_subtree(&self, id: i64) -> AppResult<DepartmentNode> {
        let dept = find_department(&self.store, id).await?;
        let mut rows = if path::is_well_formed(&dept.dep_path) {
            self.store.find_by_path_prefix(&dept.dep_path).await?
        } else {
            warn!("Department {} has malformed path '{}'", dept.id, dept.dep_path);
            Vec::new()
        };
        if !rows.iter().any(|r| r.id == id) {
            rows.push(dept);
        }
        let counts = self.employee_counts(&rows).await?;
        tree::build_subtree(id, rows, &counts)
            .ok_or_not_found(format!("department {} not found", id))
    }

    /// Ancestors of a department, root first, excluding the department itself
    pub async fn get_ancestors(&self, id: i64) -> AppResult<Vec<Department>> {
        let dept = find_department(&self.store, id).await?;
        let mut chain = match dept.parent_id {
            Some(parent_id) => {
                let parent = find_department(&self.store, parent_id).await?;
                ancestor_chain(&self.store, parent).await?
            }
            None => Vec::new(),
        };
        chain.reverse();
        Ok(chain)
    }

    pub async fn create(&self, name: &str, parent_id: Option<i64>) -> AppResult<Department> {
        let name = validate_name(name)?;
        let tx = self.store.begin().await?;

        ensure_name_available(&tx, &name, None).await?;

        let parent = match parent_id {
            Some(pid) => Some(
                tx.find_by_id(pid)
                    .await?
                    .ok_or_not_found(format!("parent department {} not found", pid))?,
            ),
            None => None,
        };

        let mut dept = tx
            .insert(NewDepartment {
                name,
                parent_id,
                dep_path: String::new(),
                is_parent: false,
            })
            .await?;
        dept.dep_path = path::path_for(parent.as_ref().map(|p| p.dep_path.as_str()), dept.id);
        tx.update(&dept).await?;

        if let Some(pid) = parent_id {
            refresh_is_parent(&tx, pid).await?;
        }
        tx.commit().await?;

        info!("Department created: {} ({}) at {}", dept.name, dept.id, dept.dep_path);
        Ok(dept)
    }

    /// Rename a department and move it when `new_parent_id` differs from its parent
    pub async fn update(
        &self,
        id: i64,
        new_name: &str,
        new_parent_id: Option<i64>,
    ) -> AppResult<Department> {
        let new_name = validate_name(new_name)?;
        let tx = self.store.begin().await?;

        let mut dept = find_department(&tx, id).await?;
        if dept.name != new_name {
            ensure_name_available(&tx, &new_name, Some(id)).await?;
            dept.name = new_name;
        }

        let dept = if dept.parent_id != new_parent_id {
            relocate(&tx, dept, new_parent_id).await?
        } else {
            tx.update(&dept).await?;
            dept
        };
        tx.commit().await?;

        info!("Department updated: {} ({}) at {}", dept.name, dept.id, dept.dep_path);
        Ok(dept)
    }

    /// Re-parent a department; `None` makes it a root
    pub async fn move_to(&self, id: i64, new_parent_id: Option<i64>) -> AppResult<Department> {
        let tx = self.store.begin().await?;

        let dept = find_department(&tx, id).await?;
        if new_parent_id == Some(id) {
            return Err(AppError::InvalidOperation(
                "cannot move department to itself".to_string(),
            ));
        }
        if dept.parent_id == new_parent_id {
            return Ok(dept);
        }

        let dept = relocate(&tx, dept, new_parent_id).await?;
        tx.commit().await?;

        info!("Department moved: {} ({}) to {}", dept.name, dept.id, dept.dep_path);
        Ok(dept)
    }

    /// Delete a childless department that no employee references
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let tx = self.store.begin().await?;

        let dept = find_department(&tx, id).await?;
        if tx.exists_by_parent_id(id).await? {
            return Err(AppError::Conflict(
                "cannot delete department with children".to_string(),
            ));
        }
        if tx.count_employees_by_department_id(id).await? > 0 {
            return Err(AppError::Conflict(
                "cannot delete department with employees".to_string(),
            ));
        }

        tx.delete(id).await?;
        if let Some(parent_id) = dept.parent_id {
            refresh_is_parent(&tx, parent_id).await?;
        }
        tx.commit().await?;

        info!("Department deleted: {} ({})", dept.name, dept.id);
        Ok(())
    }

    /// Recompute every path and `is_parent` flag from `parent_id` links.
    ///
    /// Returns the number of rows that changed.
    pub async fn rebuild_paths(&self) -> AppResult<usize> {
        let tx = self.store.begin().await?;

        let rows = tx.find_all().await?;
        let layout = tree::expected_layout(&rows).map_err(|ids| {
            AppError::InvalidOperation(format!(
                "departments {:?} are not reachable from a root department",
                ids
            ))
        })?;

        let mut changed = 0;
        for mut row in rows {
            let Some(expected) = layout.get(&row.id) else {
                continue;
            };
            if row.dep_path != expected.dep_path || row.is_parent != expected.is_parent {
                row.dep_path = expected.dep_path.clone();
                row.is_parent = expected.is_parent;
                tx.update(&row).await?;
                changed += 1;
            }
        }
        tx.commit().await?;

        if changed > 0 {
            warn!("Rebuilt department paths, {} rows corrected", changed);
        }
        Ok(changed)
    }

    async fn employee_counts(&self, rows: &[Department]) -> AppResult<HashMap<i64, u64>> {
        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            let count = self.store.count_employees_by_department_id(row.id).await?;
            counts.insert(row.id, count);
        }
        Ok(counts)
    }
}

fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(
            "department name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "department name must not exceed {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

async fn find_department<T: DepartmentStore + ?Sized>(store: &T, id: i64) -> AppResult<Department> {
    store
        .find_by_id(id)
        .await?
        .ok_or_not_found(format!("department {} not found", id))
}

/// Names are unique ignoring case
async fn ensure_name_available<T: DepartmentStore>(
    store: &T,
    name: &str,
    except: Option<i64>,
) -> AppResult<()> {
    match store.find_by_name_ignore_case(name).await? {
        Some(existing) if Some(existing.id) != except => Err(AppError::AlreadyExists(format!(
            "department '{}' already exists",
            existing.name
        ))),
        _ => Ok(()),
    }
}

/// `start` followed by its ancestors, walking `parent_id` upwards
async fn ancestor_chain<T: DepartmentStore>(
    store: &T,
    start: Department,
) -> AppResult<Vec<Department>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(start);
    while let Some(dept) = current {
        if !seen.insert(dept.id) {
            warn!("Parent links of department {} form a cycle", dept.id);
            break;
        }
        current = match dept.parent_id {
            Some(parent_id) => store.find_by_id(parent_id).await?,
            None => None,
        };
        chain.push(dept);
    }
    Ok(chain)
}

/// Move `dept` under `new_parent_id`, rewriting the paths of its subtree
async fn relocate<T: DepartmentStore>(
    store: &T,
    mut dept: Department,
    new_parent_id: Option<i64>,
) -> AppResult<Department> {
    let parent = match new_parent_id {
        Some(pid) if pid == dept.id => {
            return Err(AppError::InvalidOperation(
                "cannot move department to itself".to_string(),
            ));
        }
        Some(pid) => {
            let parent = store
                .find_by_id(pid)
                .await?
                .ok_or_not_found(format!("parent department {} not found", pid))?;
            let ancestors = ancestor_chain(store, parent.clone()).await?;
            if ancestors.iter().any(|a| a.id == dept.id) {
                return Err(AppError::InvalidOperation(
                    "cannot move department to its own child".to_string(),
                ));
            }
            Some(parent)
        }
        None => None,
    };

    let old_parent_id = dept.parent_id;
    let old_path = dept.dep_path.clone();
    if !path::is_well_formed(&old_path) {
        return Err(AppError::InvalidOperation(format!(
            "department {} has a malformed path, rebuild paths first",
            dept.id
        )));
    }
    let new_path = path::path_for(parent.as_ref().map(|p| p.dep_path.as_str()), dept.id);

    for mut descendant in store.find_by_path_prefix(&old_path).await? {
        if descendant.id == dept.id {
            continue;
        }
        if let Some(rebased) = path::rebase(&descendant.dep_path, &old_path, &new_path) {
            descendant.dep_path = rebased;
            store.update(&descendant).await?;
        }
    }

    dept.parent_id = new_parent_id;
    dept.dep_path = new_path;
    store.update(&dept).await?;

    if let Some(old) = old_parent_id {
        refresh_is_parent(store, old).await?;
    }
    if let Some(new) = new_parent_id {
        refresh_is_parent(store, new).await?;
    }
    Ok(dept)
}

/// Recompute the cached child flag of `id` from current rows
async fn refresh_is_parent<T: DepartmentStore>(store: &T, id: i64) -> AppResult<()> {
    let Some(mut dept) = store.find_by_id(id).await? else {
        return Ok(());
    };
    let has_children = store.exists_by_parent_id(id).await?;
    if dept.is_parent != has_children {
        dept.is_parent = has_children;
        store.update(&dept).await?;
    }
    Ok(())
}
