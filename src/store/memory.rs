//! In-memory department store
//!
//! Rows live in a `Vec` so store order is insertion order. A transaction holds
//! the state lock for its whole lifetime and writes to a private copy, which
//! replaces the shared state on commit.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{
    DepartmentStore, NewDepartment, StoreError, StoreResult, StoreTransaction, TransactionalStore,
};
use crate::entity::department::{name_key, Department};

#[derive(Debug, Clone)]
struct MemoryState {
    next_id: i64,
    departments: Vec<Department>,
    /// department id -> number of employees
    employees: HashMap<i64, u64>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            next_id: 1,
            departments: Vec::new(),
            employees: HashMap::new(),
        }
    }
}

impl MemoryState {
    /// Mirrors the unique index on `name_key` in the SQL schema
    fn ensure_key_free(&self, key: &str, except: Option<i64>, name: &str) -> StoreResult<()> {
        let taken = self
            .departments
            .iter()
            .any(|d| d.name_key == key && Some(d.id) != except);
        if taken {
            return Err(StoreError::Duplicate(name.to_string()));
        }
        Ok(())
    }

    fn insert(&mut self, dept: NewDepartment) -> StoreResult<Department> {
        let key = name_key(&dept.name);
        self.ensure_key_free(&key, None, &dept.name)?;
        let model = Department {
            id: self.next_id,
            name_key: key,
            name: dept.name,
            parent_id: dept.parent_id,
            dep_path: dept.dep_path,
            is_parent: dept.is_parent,
            created_at: Utc::now(),
        };
        self.next_id += 1;
        self.departments.push(model.clone());
        Ok(model)
    }

    fn find_by_id(&self, id: i64) -> Option<Department> {
        self.departments.iter().find(|d| d.id == id).cloned()
    }

    fn find_by_name(&self, name: &str) -> Option<Department> {
        self.departments.iter().find(|d| d.name == name).cloned()
    }

    fn find_by_name_ignore_case(&self, name: &str) -> Option<Department> {
        let key = name_key(name);
        self.departments
            .iter()
            .find(|d| d.name_key == key)
            .cloned()
    }

    fn filter(&self, pred: impl Fn(&Department) -> bool) -> Vec<Department> {
        self.departments.iter().filter(|d| pred(d)).cloned().collect()
    }

    fn update(&mut self, dept: &Department) -> StoreResult<()> {
        let key = name_key(&dept.name);
        self.ensure_key_free(&key, Some(dept.id), &dept.name)?;
        let slot = self
            .departments
            .iter_mut()
            .find(|d| d.id == dept.id)
            .ok_or(StoreError::Missing(dept.id))?;
        slot.name = dept.name.clone();
        slot.name_key = key;
        slot.parent_id = dept.parent_id;
        slot.dep_path = dept.dep_path.clone();
        slot.is_parent = dept.is_parent;
        Ok(())
    }

    fn delete(&mut self, id: i64) -> StoreResult<()> {
        let pos = self
            .departments
            .iter()
            .position(|d| d.id == id)
            .ok_or(StoreError::Missing(id))?;
        self.departments.remove(pos);
        Ok(())
    }

    fn count_employees(&self, id: i64) -> u64 {
        self.employees.get(&id).copied().unwrap_or(0)
    }
}

/// Process-local store for tests and the `memory` backend
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<AsyncMutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record how many employees reference a department
    pub async fn set_employee_count(&self, department_id: i64, count: u64) {
        let mut state = self.state.lock().await;
        if count == 0 {
            state.employees.remove(&department_id);
        } else {
            state.employees.insert(department_id, count);
        }
    }

    /// Overwrite a row without any validation (fixture helper)
    pub async fn put(&self, dept: Department) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(dept.id + 1);
        let dept = Department {
            name_key: name_key(&dept.name),
            ..dept
        };
        match state.departments.iter_mut().find(|d| d.id == dept.id) {
            Some(slot) => *slot = dept,
            None => state.departments.push(dept),
        }
    }
}

#[async_trait]
impl DepartmentStore for MemoryStore {
    async fn insert(&self, dept: NewDepartment) -> StoreResult<Department> {
        self.state.lock().await.insert(dept)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Department>> {
        Ok(self.state.lock().await.find_by_id(id))
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Department>> {
        Ok(self.state.lock().await.find_by_name(name))
    }

    async fn find_by_name_ignore_case(&self, name: &str) -> StoreResult<Option<Department>> {
        Ok(self.state.lock().await.find_by_name_ignore_case(name))
    }

    async fn find_all(&self) -> StoreResult<Vec<Department>> {
        Ok(self.state.lock().await.departments.clone())
    }

    async fn find_by_parent_id(&self, parent_id: i64) -> StoreResult<Vec<Department>> {
        Ok(self
            .state
            .lock()
            .await
            .filter(|d| d.parent_id == Some(parent_id)))
    }

    async fn find_root_departments(&self) -> StoreResult<Vec<Department>> {
        Ok(self.state.lock().await.filter(|d| d.parent_id.is_none()))
    }

    async fn find_by_path_prefix(&self, prefix: &str) -> StoreResult<Vec<Department>> {
        Ok(self
            .state
            .lock()
            .await
            .filter(|d| d.dep_path.starts_with(prefix)))
    }

    async fn exists_by_parent_id(&self, id: i64) -> StoreResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .departments
            .iter()
            .any(|d| d.parent_id == Some(id)))
    }

    async fn update(&self, dept: &Department) -> StoreResult<()> {
        self.state.lock().await.update(dept)
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.state.lock().await.delete(id)
    }

    async fn count_employees_by_department_id(&self, id: i64) -> StoreResult<u64> {
        Ok(self.state.lock().await.count_employees(id))
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> StoreResult<MemoryTransaction> {
        let committed = self.state.clone().lock_owned().await;
        let work = Mutex::new((*committed).clone());
        Ok(MemoryTransaction { committed, work })
    }
}

/// Open transaction on a `MemoryStore`
pub struct MemoryTransaction {
    committed: OwnedMutexGuard<MemoryState>,
    work: Mutex<MemoryState>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn commit(self) -> StoreResult<()> {
        let MemoryTransaction { mut committed, work } = self;
        *committed = work.into_inner();
        Ok(())
    }
}

#[async_trait]
impl DepartmentStore for MemoryTransaction {
    async fn insert(&self, dept: NewDepartment) -> StoreResult<Department> {
        self.work.lock().insert(dept)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Department>> {
        Ok(self.work.lock().find_by_id(id))
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Department>> {
        Ok(self.work.lock().find_by_name(name))
    }

    async fn find_by_name_ignore_case(&self, name: &str) -> StoreResult<Option<Department>> {
        Ok(self.work.lock().find_by_name_ignore_case(name))
    }

    async fn find_all(&self) -> StoreResult<Vec<Department>> {
        Ok(self.work.lock().departments.clone())
    }

    async fn find_by_parent_id(&self, parent_id: i64) -> StoreResult<Vec<Department>> {
        Ok(self.work.lock().filter(|d| d.parent_id == Some(parent_id)))
    }

    async fn find_root_departments(&self) -> StoreResult<Vec<Department>> {
        Ok(self.work.lock().filter(|d| d.parent_id.is_none()))
    }

    async fn find_by_path_prefix(&self, prefix: &str) -> StoreResult<Vec<Department>> {
        Ok(self.work.lock().filter(|d| d.dep_path.starts_with(prefix)))
    }

    async fn exists_by_parent_id(&self, id: i64) -> StoreResult<bool> {
        Ok(self
            .work
            .lock()
            .departments
            .iter()
            .any(|d| d.parent_id == Some(id)))
    }

    async fn update(&self, dept: &Department) -> StoreResult<()> {
        self.work.lock().update(dept)
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.work.lock().delete(id)
    }

    async fn count_employees_by_department_id(&self, id: i64) -> StoreResult<u64> {
        Ok(self.work.lock().count_employees(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_dept(name: &str, parent_id: Option<i64>) -> NewDepartment {
        NewDepartment {
            name: name.to_string(),
            parent_id,
            dep_path: String::new(),
            is_parent: false,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let a = store.insert(new_dept("IT", None)).await.unwrap();
        let b = store.insert(new_dept("Dev", Some(a.id))).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.find_by_parent_id(1).await.unwrap().len(), 1);
        assert!(store.exists_by_parent_id(1).await.unwrap());
        assert_eq!(store.find_root_departments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_name_lookups() {
        let store = MemoryStore::new();
        store.insert(new_dept("Sales", None)).await.unwrap();
        assert!(store.find_by_name("sales").await.unwrap().is_none());
        assert!(store.find_by_name("Sales").await.unwrap().is_some());
        assert!(store.find_by_name_ignore_case("SALES").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_folded_name_is_unique() {
        let store = MemoryStore::new();
        store.insert(new_dept("Émile", None)).await.unwrap();
        assert!(store.find_by_name_ignore_case("ÉMILE").await.unwrap().is_some());
        assert!(matches!(
            store.insert(new_dept("émile", None)).await,
            Err(StoreError::Duplicate(_))
        ));

        let mut other = store.insert(new_dept("Press", None)).await.unwrap();
        other.name = "ÉMILE".to_string();
        assert!(matches!(
            store.update(&other).await,
            Err(StoreError::Duplicate(_))
        ));

        // Recasing a department's own name is not a collision
        other.name = "PRESS".to_string();
        store.update(&other).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let store = MemoryStore::new();
        let mut dept = store.insert(new_dept("IT", None)).await.unwrap();
        store.delete(dept.id).await.unwrap();
        dept.name = "Ops".to_string();
        assert!(matches!(
            store.update(&dept).await,
            Err(StoreError::Missing(1))
        ));
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let store = MemoryStore::new();

        let tx = store.begin().await.unwrap();
        tx.insert(new_dept("Kept", None)).await.unwrap();
        tx.commit().await.unwrap();

        let tx = store.begin().await.unwrap();
        tx.insert(new_dept("Dropped", None)).await.unwrap();
        assert_eq!(tx.find_all().await.unwrap().len(), 2);
        drop(tx);

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Kept");
    }

    #[test]
    fn test_employee_counts() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            store.set_employee_count(4, 3).await;
            assert_eq!(store.count_employees_by_department_id(4).await.unwrap(), 3);
            store.set_employee_count(4, 0).await;
            assert_eq!(store.count_employees_by_department_id(4).await.unwrap(), 0);
        });
    }
}
