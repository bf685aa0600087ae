//! SeaORM-backed department store
//!
//! `SeaOrmStore<DatabaseConnection>` is the pooled store; beginning a
//! transaction yields `SeaOrmStore<DatabaseTransaction>`, which runs the same
//! queries inside the transaction.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbBackend, DbErr, EntityTrait, IsolationLevel, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};

use super::{
    DepartmentStore, NewDepartment, StoreError, StoreResult, StoreTransaction, TransactionalStore,
};
use crate::entity::department::{self, name_key, Department};
use crate::entity::employee;

#[derive(Clone)]
pub struct SeaOrmStore<C = DatabaseConnection> {
    conn: C,
}

/// Store bound to an open database transaction
pub type SeaOrmTransaction = SeaOrmStore<DatabaseTransaction>;

/// Isolation for hierarchy transactions.
///
/// Concurrent moves must not both pass the cycle check against each other's
/// uncommitted state, so server databases run serializable. Sqlite allows a
/// single writer at a time and does not accept an isolation level.
fn isolation_for(backend: DbBackend) -> Option<IsolationLevel> {
    match backend {
        DbBackend::Sqlite => None,
        DbBackend::Postgres | DbBackend::MySql => Some(IsolationLevel::Serializable),
    }
}

/// Unique violations on write mean the folded name is taken
fn write_error(err: DbErr, name: &str) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Duplicate(name.to_string()),
        _ => err.into(),
    }
}

impl SeaOrmStore<DatabaseConnection> {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { conn: db }
    }

    /// Underlying connection pool
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}

#[async_trait]
impl<C> DepartmentStore for SeaOrmStore<C>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    async fn insert(&self, dept: NewDepartment) -> StoreResult<Department> {
        let name = dept.name.clone();
        let model = department::ActiveModel {
            name_key: Set(name_key(&dept.name)),
            name: Set(dept.name),
            parent_id: Set(dept.parent_id),
            dep_path: Set(dept.dep_path),
            is_parent: Set(dept.is_parent),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        model
            .insert(&self.conn)
            .await
            .map_err(|e| write_error(e, &name))
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Department>> {
        Ok(department::Entity::find_by_id(id).one(&self.conn).await?)
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Department>> {
        Ok(department::Entity::find()
            .filter(department::Column::Name.eq(name))
            .one(&self.conn)
            .await?)
    }

    async fn find_by_name_ignore_case(&self, name: &str) -> StoreResult<Option<Department>> {
        Ok(department::Entity::find()
            .filter(department::Column::NameKey.eq(name_key(name)))
            .one(&self.conn)
            .await?)
    }

    async fn find_all(&self) -> StoreResult<Vec<Department>> {
        Ok(department::Entity::find()
            .order_by_asc(department::Column::Id)
            .all(&self.conn)
            .await?)
    }

    async fn find_by_parent_id(&self, parent_id: i64) -> StoreResult<Vec<Department>> {
        Ok(department::Entity::find()
            .filter(department::Column::ParentId.eq(parent_id))
            .order_by_asc(department::Column::Id)
            .all(&self.conn)
            .await?)
    }

    async fn find_root_departments(&self) -> StoreResult<Vec<Department>> {
        Ok(department::Entity::find()
            .filter(department::Column::ParentId.is_null())
            .order_by_asc(department::Column::Id)
            .all(&self.conn)
            .await?)
    }

    async fn find_by_path_prefix(&self, prefix: &str) -> StoreResult<Vec<Department>> {
        Ok(department::Entity::find()
            .filter(department::Column::DepPath.starts_with(prefix))
            .order_by_asc(department::Column::Id)
            .all(&self.conn)
            .await?)
    }

    async fn exists_by_parent_id(&self, id: i64) -> StoreResult<bool> {
        let children = department::Entity::find()
            .filter(department::Column::ParentId.eq(id))
            .count(&self.conn)
            .await?;
        Ok(children > 0)
    }

    async fn update(&self, dept: &Department) -> StoreResult<()> {
        let model = department::ActiveModel {
            id: ActiveValue::Unchanged(dept.id),
            name: Set(dept.name.clone()),
            name_key: Set(name_key(&dept.name)),
            parent_id: Set(dept.parent_id),
            dep_path: Set(dept.dep_path.clone()),
            is_parent: Set(dept.is_parent),
            ..Default::default()
        };
        match model.update(&self.conn).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) | Err(DbErr::RecordNotFound(_)) => {
                Err(StoreError::Missing(dept.id))
            }
            Err(e) => Err(write_error(e, &dept.name)),
        }
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let result = department::Entity::delete_by_id(id).exec(&self.conn).await?;
        if result.rows_affected == 0 {
            return Err(StoreError::Missing(id));
        }
        Ok(())
    }

    async fn count_employees_by_department_id(&self, id: i64) -> StoreResult<u64> {
        Ok(employee::Entity::find()
            .filter(employee::Column::DepartmentId.eq(id))
            .count(&self.conn)
            .await?)
    }
}

#[async_trait]
impl TransactionalStore for SeaOrmStore<DatabaseConnection> {
    type Tx = SeaOrmTransaction;

    async fn begin(&self) -> StoreResult<SeaOrmTransaction> {
        let isolation = isolation_for(self.conn.get_database_backend());
        let txn = self.conn.begin_with_config(isolation, None).await?;
        Ok(SeaOrmStore { conn: txn })
    }
}

#[async_trait]
impl StoreTransaction for SeaOrmTransaction {
    async fn commit(self) -> StoreResult<()> {
        self.conn.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, DbType};
    use crate::db;
    use crate::error::AppError;
    use crate::hierarchy::DepartmentHierarchy;

    async fn sqlite_store() -> SeaOrmStore {
        let config = DatabaseConfig {
            db_type: DbType::Sqlite,
            name: ":memory:".to_string(),
            ..Default::default()
        };
        let conn = db::init_database(&config).await.unwrap();
        SeaOrmStore::new(conn)
    }

    fn new_dept(name: &str, parent_id: Option<i64>, dep_path: &str) -> NewDepartment {
        NewDepartment {
            name: name.to_string(),
            parent_id,
            dep_path: dep_path.to_string(),
            is_parent: false,
        }
    }

    #[tokio::test]
    async fn test_insert_and_queries() {
        let store = sqlite_store().await;
        let it = store.insert(new_dept("IT", None, "")).await.unwrap();
        let dev = store
            .insert(new_dept("Dev", Some(it.id), "/1/2/"))
            .await
            .unwrap();

        assert_eq!(store.find_by_id(dev.id).await.unwrap().unwrap().name, "Dev");
        assert!(store.find_by_name("dev").await.unwrap().is_none());
        assert_eq!(
            store.find_by_name_ignore_case("dEV").await.unwrap().unwrap().id,
            dev.id
        );
        assert_eq!(store.find_root_departments().await.unwrap().len(), 1);
        assert_eq!(store.find_by_parent_id(it.id).await.unwrap().len(), 1);
        assert!(store.exists_by_parent_id(it.id).await.unwrap());
        assert!(!store.exists_by_parent_id(dev.id).await.unwrap());
        assert_eq!(store.find_by_path_prefix("/1/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = sqlite_store().await;
        let mut it = store.insert(new_dept("IT", None, "")).await.unwrap();
        it.dep_path = format!("/{}/", it.id);
        it.name = "Tech".to_string();
        store.update(&it).await.unwrap();

        let stored = store.find_by_id(it.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Tech");
        assert_eq!(stored.dep_path, format!("/{}/", it.id));

        store.delete(it.id).await.unwrap();
        assert!(matches!(
            store.delete(it.id).await,
            Err(StoreError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn test_count_employees() {
        let store = sqlite_store().await;
        let it = store.insert(new_dept("IT", None, "")).await.unwrap();

        let emp = employee::ActiveModel {
            name: Set("alice".to_string()),
            department_id: Set(Some(it.id)),
            ..Default::default()
        };
        emp.insert(store.connection()).await.unwrap();

        assert_eq!(store.count_employees_by_department_id(it.id).await.unwrap(), 1);
        assert_eq!(store.count_employees_by_department_id(it.id + 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let store = sqlite_store().await;

        let tx = store.begin().await.unwrap();
        tx.insert(new_dept("Gone", None, "")).await.unwrap();
        drop(tx);
        assert!(store.find_all().await.unwrap().is_empty());

        let tx = store.begin().await.unwrap();
        tx.insert(new_dept("Kept", None, "")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.find_all().await.unwrap().len(), 1);
    }

    #[test]
    fn test_isolation_per_backend() {
        assert_eq!(isolation_for(DbBackend::Sqlite), None);
        assert_eq!(
            isolation_for(DbBackend::Postgres),
            Some(IsolationLevel::Serializable)
        );
        assert_eq!(
            isolation_for(DbBackend::MySql),
            Some(IsolationLevel::Serializable)
        );
    }

    #[tokio::test]
    async fn test_non_ascii_names_fold() {
        let store = sqlite_store().await;
        let emile = store.insert(new_dept("Émile", None, "")).await.unwrap();

        assert_eq!(
            store.find_by_name_ignore_case("ÉMILE").await.unwrap().unwrap().id,
            emile.id
        );
        assert_eq!(
            store.find_by_name_ignore_case("émile").await.unwrap().unwrap().id,
            emile.id
        );
        assert!(store.find_by_name("émile").await.unwrap().is_none());

        let err = store.insert(new_dept("émile", None, "")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref name) if name == "émile"));
        assert_eq!(store.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rename_onto_folded_name_is_duplicate() {
        let store = sqlite_store().await;
        store.insert(new_dept("Édition", None, "")).await.unwrap();
        let mut other = store.insert(new_dept("Press", None, "")).await.unwrap();

        other.name = "ÉDITION".to_string();
        assert!(matches!(
            store.update(&other).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_hierarchy_rejects_non_ascii_duplicates() {
        let hierarchy = DepartmentHierarchy::new(sqlite_store().await);

        hierarchy.create("Émile", None).await.unwrap();
        assert!(matches!(
            hierarchy.create("Émile", None).await,
            Err(AppError::AlreadyExists(_))
        ));

        hierarchy.create("Édition", None).await.unwrap();
        assert!(matches!(
            hierarchy.create("édition", None).await,
            Err(AppError::AlreadyExists(_))
        ));
        assert_eq!(hierarchy.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hierarchy_walkthrough() {
        let hierarchy = DepartmentHierarchy::new(sqlite_store().await);

        let it = hierarchy.create("IT", None).await.unwrap();
        assert_eq!(it.id, 1);
        assert_eq!(it.dep_path, "/1/");

        let dev = hierarchy.create("Dev", Some(it.id)).await.unwrap();
        assert_eq!(dev.id, 2);
        assert_eq!(dev.dep_path, "/1/2/");
        assert!(hierarchy.get_by_id(it.id).await.unwrap().is_parent);

        let dev = hierarchy.move_to(dev.id, None).await.unwrap();
        assert_eq!(dev.dep_path, "/2/");
        assert_eq!(dev.parent_id, None);
        assert!(!hierarchy.get_by_id(it.id).await.unwrap().is_parent);

        hierarchy.delete(it.id).await.unwrap();
        assert!(matches!(
            hierarchy.get_by_id(it.id).await,
            Err(AppError::NotFound(_))
        ));

        let web = hierarchy.create("Web", Some(dev.id)).await.unwrap();
        assert_eq!(web.dep_path, "/2/3/");
        assert!(hierarchy.get_by_id(dev.id).await.unwrap().is_parent);

        assert!(matches!(
            hierarchy.delete(dev.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_hierarchy_move_rewrites_descendants() {
        let hierarchy = DepartmentHierarchy::new(sqlite_store().await);
        let a = hierarchy.create("A", None).await.unwrap();
        let b = hierarchy.create("B", Some(a.id)).await.unwrap();
        let c = hierarchy.create("C", Some(b.id)).await.unwrap();
        let x = hierarchy.create("X", None).await.unwrap();

        let b = hierarchy.move_to(b.id, Some(x.id)).await.unwrap();
        assert_eq!(b.dep_path, format!("/{}/{}/", x.id, b.id));

        let c = hierarchy.get_by_id(c.id).await.unwrap();
        assert_eq!(c.dep_path, format!("/{}/{}/{}/", x.id, b.id, c.id));
        assert!(!hierarchy.get_by_id(a.id).await.unwrap().is_parent);
        assert!(hierarchy.get_by_id(x.id).await.unwrap().is_parent);

        let ancestors: Vec<i64> = hierarchy
            .get_ancestors(c.id)
            .await
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ancestors, vec![x.id, b.id]);
    }

    #[tokio::test]
    async fn test_hierarchy_failed_move_rolls_back() {
        let hierarchy = DepartmentHierarchy::new(sqlite_store().await);
        let a = hierarchy.create("A", None).await.unwrap();
        let b = hierarchy.create("B", Some(a.id)).await.unwrap();
        let c = hierarchy.create("C", Some(b.id)).await.unwrap();

        assert!(matches!(
            hierarchy.move_to(a.id, Some(c.id)).await,
            Err(AppError::InvalidOperation(_))
        ));

        let a = hierarchy.get_by_id(a.id).await.unwrap();
        assert_eq!(a.parent_id, None);
        assert_eq!(a.dep_path, format!("/{}/", a.id));
        let c = hierarchy.get_by_id(c.id).await.unwrap();
        assert_eq!(c.dep_path, format!("/{}/{}/{}/", a.id, b.id, c.id));
        assert!(!c.is_parent);
    }

    #[tokio::test]
    async fn test_hierarchy_failed_update_rolls_back() {
        let hierarchy = DepartmentHierarchy::new(sqlite_store().await);
        let a = hierarchy.create("A", None).await.unwrap();
        let b = hierarchy.create("B", Some(a.id)).await.unwrap();

        // Rename plus a move under its own child
        assert!(matches!(
            hierarchy.update(a.id, "Renamed", Some(b.id)).await,
            Err(AppError::InvalidOperation(_))
        ));

        let a = hierarchy.get_by_id(a.id).await.unwrap();
        assert_eq!(a.name, "A");
        assert_eq!(a.parent_id, None);
        assert!(matches!(
            hierarchy.get_by_name("Renamed").await,
            Err(AppError::NotFound(_))
        ));

        // The failed rename did not reserve the name
        let renamed = hierarchy.update(b.id, "Renamed", Some(a.id)).await.unwrap();
        assert_eq!(renamed.name, "Renamed");
    }

    #[tokio::test]
    async fn test_hierarchy_delete_with_employees() {
        let store = sqlite_store().await;
        let conn = store.connection().clone();
        let hierarchy = DepartmentHierarchy::new(store);
        let ops = hierarchy.create("Ops", None).await.unwrap();

        let emp = employee::ActiveModel {
            name: Set("bob".to_string()),
            department_id: Set(Some(ops.id)),
            ..Default::default()
        };
        emp.insert(&conn).await.unwrap();

        assert!(matches!(
            hierarchy.delete(ops.id).await,
            Err(AppError::Conflict(_))
        ));
        assert!(hierarchy.get_by_id(ops.id).await.is_ok());
    }
}
