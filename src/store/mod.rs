//! Department persistence
//!
//! `DepartmentStore` is the plain method set the hierarchy needs from a
//! backend. Mutations go through a `StoreTransaction` obtained from
//! `TransactionalStore::begin`; dropping a transaction without committing
//! discards its writes.

use async_trait::async_trait;
use thiserror::Error;

use crate::entity::department::Department;

pub mod memory;
pub mod sql;

pub use self::memory::MemoryStore;
pub use self::sql::SeaOrmStore;

/// Errors raised by a storage backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("department {0} does not exist in store")]
    Missing(i64),

    /// A unique key (the case-folded name) is already taken
    #[error("duplicate department name: {0}")]
    Duplicate(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row to insert; the store assigns the id and creation time
#[derive(Debug, Clone)]
pub struct NewDepartment {
    pub name: String,
    pub parent_id: Option<i64>,
    pub dep_path: String,
    pub is_parent: bool,
}

#[async_trait]
pub trait DepartmentStore: Send + Sync {
    /// Insert a row and return it with its assigned id
    async fn insert(&self, dept: NewDepartment) -> StoreResult<Department>;

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Department>>;

    /// Exact, case-sensitive name match
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Department>>;

    async fn find_by_name_ignore_case(&self, name: &str) -> StoreResult<Option<Department>>;

    /// Every row, in store order
    async fn find_all(&self) -> StoreResult<Vec<Department>>;

    async fn find_by_parent_id(&self, parent_id: i64) -> StoreResult<Vec<Department>>;

    async fn find_root_departments(&self) -> StoreResult<Vec<Department>>;

    /// Rows whose `dep_path` starts with `prefix`
    async fn find_by_path_prefix(&self, prefix: &str) -> StoreResult<Vec<Department>>;

    async fn exists_by_parent_id(&self, id: i64) -> StoreResult<bool>;

    /// Overwrite name, parent, path and flag of an existing row
    async fn update(&self, dept: &Department) -> StoreResult<()>;

    async fn delete(&self, id: i64) -> StoreResult<()>;

    async fn count_employees_by_department_id(&self, id: i64) -> StoreResult<u64>;
}

/// A unit of work over a store
#[async_trait]
pub trait StoreTransaction: DepartmentStore + Sized {
    async fn commit(self) -> StoreResult<()>;
}

#[async_trait]
pub trait TransactionalStore: DepartmentStore {
    type Tx: StoreTransaction + 'static;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}
