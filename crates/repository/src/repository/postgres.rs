//! Postgres-backed repository implementation.
//!
//! Reads run directly against the connection pool and need no transaction.
//! Mutations go through an explicitly acquired [`PgUnitOfWork`]; there is no
//! way to call one without it, and a unit of work that is dropped without
//! [`PgUnitOfWork::commit`] rolls back.
//!
//! ## Error Mapping
//!
//! sqlx errors are mapped to [`RepositoryError`] as follows:
//!
//! | sqlx error | SQLSTATE | RepositoryError | Scenario |
//! |------------|----------|-----------------|----------|
//! | Database (unique violation) | `23505` | `DuplicateKey` | `persist` on an existing key |
//! | Database (other) | any other | `Storage` | Constraint/data errors |
//! | RowNotFound | n/a | `NotFound` | Single-row statement found nothing |
//! | PoolClosed / other | n/a | `Storage` | Connection failures etc. |

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{Executor, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use groundwork_core::Entity;

use super::query::{NamedQueries, ParamValue, QueryArgs};
use super::r#trait::{QueryExecutor, Repository, RepositoryError, RepositoryResult};

/// Column mapping for an entity stored in one table.
///
/// Supplies the table name, the key column, and [`ParamValue`] projections
/// of the key and data fields; row decoding goes through [`sqlx::FromRow`].
/// The repository derives every statement it needs from these five items.
pub trait SqlEntity: Entity + for<'r> sqlx::FromRow<'r, PgRow> + Unpin + Send + Sync {
    /// Table name.
    fn table() -> &'static str;

    /// Key column name.
    fn key_column() -> &'static str;

    /// Non-key column names, in the order produced by
    /// [`data_values`](SqlEntity::data_values).
    fn data_columns() -> &'static [&'static str];

    /// Key as a bindable value.
    fn key_param(key: &Self::Key) -> ParamValue;

    /// Non-key fields as bindable values, aligned with
    /// [`data_columns`](SqlEntity::data_columns).
    fn data_values(&self) -> Vec<ParamValue>;
}

/// Postgres-backed repository.
///
/// Cheap to clone; holds a connection pool and the named-query registry.
/// This type is the read surface (the operations that work with or without
/// a transaction); mutations require [`PgRepository::begin`].
#[derive(Debug)]
pub struct PgRepository<T> {
    pool: Arc<PgPool>,
    queries: Arc<NamedQueries>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for PgRepository<T> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            queries: Arc::clone(&self.queries),
            _entity: PhantomData,
        }
    }
}

impl<T> PgRepository<T>
where
    T: SqlEntity,
{
    pub fn new(pool: PgPool) -> Self {
        Self::with_queries(pool, Arc::new(NamedQueries::new()))
    }

    pub fn with_queries(pool: PgPool, queries: Arc<NamedQueries>) -> Self {
        Self {
            pool: Arc::new(pool),
            queries,
            _entity: PhantomData,
        }
    }

    pub fn named_queries(&self) -> &NamedQueries {
        &self.queries
    }

    /// Begin a unit of work for mutations.
    #[instrument(skip(self), fields(table = T::table()), err)]
    pub async fn begin(&self) -> RepositoryResult<PgUnitOfWork<T>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PgUnitOfWork {
            tx,
            _entity: PhantomData,
        })
    }

    /// Find the instance identified by `key`. Absence is not an error.
    #[instrument(skip(self, key), fields(table = T::table(), key = ?key), err)]
    pub async fn find(&self, key: &T::Key) -> RepositoryResult<Option<T>> {
        let sql = select_by_key_sql::<T>();
        fetch_optional_as(&*self.pool, "find", &sql, vec![T::key_param(key)]).await
    }

    /// All stored instances. Iteration order is unspecified.
    #[instrument(skip(self), fields(table = T::table()), err)]
    pub async fn find_all(&self) -> RepositoryResult<Vec<T>> {
        let sql = select_sql::<T>();
        fetch_all_as(&*self.pool, "find_all", &sql, Vec::new()).await
    }

    /// Membership test, by key. An unkeyed entity is never contained.
    pub async fn contains(&self, entity: &T) -> RepositoryResult<bool> {
        match entity.key() {
            Some(key) => self.contains_key(key).await,
            None => Ok(false),
        }
    }

    pub async fn contains_key(&self, key: &T::Key) -> RepositoryResult<bool> {
        exists::<T, _>(&*self.pool, "contains", T::key_param(key)).await
    }
}

#[async_trait]
impl<T> QueryExecutor<T> for PgRepository<T>
where
    T: SqlEntity + 'static,
    T::Key: Send + Sync,
{
    #[instrument(skip(self, sql, args), fields(table = T::table()), err)]
    async fn find_by_query(&self, sql: &str, args: QueryArgs) -> RepositoryResult<Vec<T>> {
        let (sql, values) = args.lower(sql)?;
        fetch_all_as(&*self.pool, "find_by_query", &sql, values).await
    }

    #[instrument(skip(self, args), fields(table = T::table(), query = name), err)]
    async fn find_by_named_query(&self, name: &str, args: QueryArgs) -> RepositoryResult<Vec<T>> {
        let sql = self.queries.resolve(name)?;
        let (sql, values) = args.lower(sql)?;
        fetch_all_as(&*self.pool, "find_by_named_query", &sql, values).await
    }

    #[instrument(skip(self, args), fields(table = T::table(), query = name), err)]
    async fn find_instance_by_named_query(
        &self,
        name: &str,
        args: QueryArgs,
    ) -> RepositoryResult<Option<T>> {
        let sql = self.queries.resolve(name)?;
        let (sql, values) = args.lower(sql)?;
        // Zero rows is an absent result, never an error. With multiple rows
        // the first one wins.
        fetch_optional_as(&*self.pool, "find_instance_by_named_query", &sql, values).await
    }

    #[instrument(skip(self, value), fields(table = T::table(), column = %column), err)]
    async fn find_by_attribute(
        &self,
        column: &str,
        value: ParamValue,
    ) -> RepositoryResult<Vec<T>> {
        let sql = select_by_column_sql::<T>(column)?;
        fetch_all_as(&*self.pool, "find_by_attribute", &sql, vec![value]).await
    }
}

/// A unit of work: one transaction's worth of repository operations.
///
/// Acquired from [`PgRepository::begin`]. Reads made through it observe its
/// own uncommitted writes. Dropping the value without [`commit`] rolls the
/// transaction back on every exit path.
///
/// [`commit`]: PgUnitOfWork::commit
#[derive(Debug)]
pub struct PgUnitOfWork<T> {
    tx: Transaction<'static, Postgres>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> PgUnitOfWork<T>
where
    T: SqlEntity,
{
    /// Commit the unit of work.
    #[instrument(skip(self), fields(table = T::table()), err)]
    pub async fn commit(self) -> RepositoryResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    /// Roll the unit of work back explicitly. Dropping has the same effect;
    /// this form surfaces rollback failures.
    #[instrument(skip(self), fields(table = T::table()), err)]
    pub async fn rollback(self) -> RepositoryResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl<T> Repository<T> for PgUnitOfWork<T>
where
    T: SqlEntity + 'static,
    T::Key: Send + Sync,
{
    async fn find(&mut self, key: &T::Key) -> RepositoryResult<Option<T>> {
        let sql = select_by_key_sql::<T>();
        fetch_optional_as(&mut *self.tx, "find", &sql, vec![T::key_param(key)]).await
    }

    async fn find_all(&mut self) -> RepositoryResult<Vec<T>> {
        let sql = select_sql::<T>();
        fetch_all_as(&mut *self.tx, "find_all", &sql, Vec::new()).await
    }

    async fn contains(&mut self, entity: &T) -> RepositoryResult<bool> {
        match entity.key() {
            Some(key) => exists::<T, _>(&mut *self.tx, "contains", T::key_param(key)).await,
            None => Ok(false),
        }
    }

    #[instrument(skip(self, entity), fields(table = T::table()), err)]
    async fn persist(&mut self, entity: T) -> RepositoryResult<T> {
        let described_key = entity.key().map(|key| format!("{key:?}"));
        let (sql, values) = match entity.key() {
            Some(key) => {
                let mut values = vec![T::key_param(key)];
                values.extend(entity.data_values());
                (insert_sql::<T>(true), values)
            }
            // Key column omitted: the database default assigns the key and
            // RETURNING reads it back.
            None => (insert_sql::<T>(false), entity.data_values()),
        };

        let mut query = sqlx::query_as::<Postgres, T>(&sql);
        for value in values {
            query = bind_value_as(query, value);
        }
        query.fetch_one(&mut *self.tx).await.map_err(|e| {
            match (described_key, is_unique_violation(&e)) {
                (Some(key), true) => RepositoryError::DuplicateKey(key),
                _ => map_sqlx_error("persist", e),
            }
        })
    }

    #[instrument(skip(self, entity), fields(table = T::table()), err)]
    async fn merge(&mut self, entity: T) -> RepositoryResult<T> {
        let Some(key) = entity.key().cloned() else {
            // Nothing to conflict on; an insert with a generated key.
            return self.persist(entity).await;
        };

        let mut values = vec![T::key_param(&key)];
        values.extend(entity.data_values());
        let sql = upsert_sql::<T>();
        fetch_one_as(&mut *self.tx, "merge", &sql, values).await
    }

    #[instrument(skip(self, entity), fields(table = T::table()), err)]
    async fn store(&mut self, entity: T) -> RepositoryResult<T> {
        // Live storage lookup immediately before the persist-vs-merge
        // branch, inside the same transaction.
        let present = match entity.key().cloned() {
            Some(key) => self.find(&key).await?.is_some(),
            None => false,
        };

        if present {
            self.merge(entity).await
        } else {
            self.persist(entity).await
        }
    }

    #[instrument(skip(self, entity), fields(table = T::table()), err)]
    async fn remove(&mut self, entity: &T) -> RepositoryResult<()> {
        let key = entity.key().ok_or(RepositoryError::MissingKey("remove"))?;
        delete_by_key::<T>(&mut self.tx, T::key_param(key)).await
    }

    #[instrument(skip(self, key), fields(table = T::table(), key = ?key), err)]
    async fn remove_by_key(&mut self, key: &T::Key) -> RepositoryResult<()> {
        delete_by_key::<T>(&mut self.tx, T::key_param(key)).await
    }

    async fn refresh(&mut self, entity: T) -> RepositoryResult<T> {
        let key = entity
            .key()
            .cloned()
            .ok_or(RepositoryError::MissingKey("refresh"))?;
        self.find(&key).await?.ok_or(RepositoryError::NotFound)
    }

    /// No-op: statements execute immediately; there is no pending state
    /// between the connection and the database.
    async fn flush(&mut self) -> RepositoryResult<()> {
        Ok(())
    }

    /// No-op: there is no managed object graph to detach.
    async fn clear(&mut self) -> RepositoryResult<()> {
        Ok(())
    }
}

// Statement builders. Pure string assembly from the SqlEntity mapping;
// everything dynamic is bound as a parameter, never spliced.

fn column_list<T: SqlEntity>() -> String {
    let mut columns = vec![T::key_column()];
    columns.extend_from_slice(T::data_columns());
    columns.join(", ")
}

fn select_sql<T: SqlEntity>() -> String {
    format!("SELECT {} FROM {}", column_list::<T>(), T::table())
}

fn select_by_key_sql<T: SqlEntity>() -> String {
    format!("{} WHERE {} = $1", select_sql::<T>(), T::key_column())
}

/// `column` is spliced into the statement, so it must be a plain
/// identifier; anything else is a binding error.
fn select_by_column_sql<T: SqlEntity>(column: &str) -> Result<String, RepositoryError> {
    let plain = !column.is_empty()
        && !column.starts_with(|c: char| c.is_ascii_digit())
        && column
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !plain {
        return Err(RepositoryError::Binding(format!(
            "'{column}' is not a plain column name"
        )));
    }
    Ok(format!("{} WHERE {} = $1", select_sql::<T>(), column))
}

fn insert_sql<T: SqlEntity>(with_key: bool) -> String {
    let mut columns: Vec<&str> = Vec::new();
    if with_key {
        columns.push(T::key_column());
    }
    columns.extend_from_slice(T::data_columns());
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        T::table(),
        columns.join(", "),
        placeholders.join(", "),
        column_list::<T>()
    )
}

fn upsert_sql<T: SqlEntity>() -> String {
    let mut columns: Vec<&str> = vec![T::key_column()];
    columns.extend_from_slice(T::data_columns());
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();

    let assignments: Vec<String> = T::data_columns()
        .iter()
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .collect();
    let update = if assignments.is_empty() {
        // The conflict arm must update something for RETURNING to yield
        // the row.
        format!("{0} = EXCLUDED.{0}", T::key_column())
    } else {
        assignments.join(", ")
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {} RETURNING {}",
        T::table(),
        columns.join(", "),
        placeholders.join(", "),
        T::key_column(),
        update,
        column_list::<T>()
    )
}

fn delete_by_key_sql<T: SqlEntity>() -> String {
    format!("DELETE FROM {} WHERE {} = $1", T::table(), T::key_column())
}

fn exists_sql<T: SqlEntity>() -> String {
    format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
        T::table(),
        T::key_column()
    )
}

// Execution helpers, generic over pool and transaction executors.

async fn fetch_all_as<'e, T, E>(
    executor: E,
    operation: &'static str,
    sql: &str,
    values: Vec<ParamValue>,
) -> RepositoryResult<Vec<T>>
where
    T: SqlEntity,
    E: Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query_as::<Postgres, T>(sql);
    for value in values {
        query = bind_value_as(query, value);
    }
    query
        .fetch_all(executor)
        .await
        .map_err(|e| map_sqlx_error(operation, e))
}

async fn fetch_optional_as<'e, T, E>(
    executor: E,
    operation: &'static str,
    sql: &str,
    values: Vec<ParamValue>,
) -> RepositoryResult<Option<T>>
where
    T: SqlEntity,
    E: Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query_as::<Postgres, T>(sql);
    for value in values {
        query = bind_value_as(query, value);
    }
    query
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(operation, e))
}

async fn fetch_one_as<'e, T, E>(
    executor: E,
    operation: &'static str,
    sql: &str,
    values: Vec<ParamValue>,
) -> RepositoryResult<T>
where
    T: SqlEntity,
    E: Executor<'e, Database = Postgres>,
{
    let mut query = sqlx::query_as::<Postgres, T>(sql);
    for value in values {
        query = bind_value_as(query, value);
    }
    query
        .fetch_one(executor)
        .await
        .map_err(|e| map_sqlx_error(operation, e))
}

async fn exists<'e, T, E>(
    executor: E,
    operation: &'static str,
    key: ParamValue,
) -> RepositoryResult<bool>
where
    T: SqlEntity,
    E: Executor<'e, Database = Postgres>,
{
    let sql = exists_sql::<T>();
    let row = bind_value(sqlx::query(&sql), key)
        .fetch_one(executor)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
    row.try_get(0)
        .map_err(|e| map_sqlx_error(operation, e))
}

async fn delete_by_key<T: SqlEntity>(
    tx: &mut Transaction<'static, Postgres>,
    key: ParamValue,
) -> RepositoryResult<()> {
    let sql = delete_by_key_sql::<T>();
    let result = bind_value(sqlx::query(&sql), key)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("remove", e))?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: ParamValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        ParamValue::Null => query.bind(Option::<String>::None),
        ParamValue::Bool(v) => query.bind(v),
        ParamValue::Int(v) => query.bind(v),
        ParamValue::Float(v) => query.bind(v),
        ParamValue::Text(v) => query.bind(v),
        ParamValue::Uuid(v) => query.bind(v),
        ParamValue::Timestamp(v) => query.bind(v),
        ParamValue::Json(v) => query.bind(v),
    }
}

fn bind_value_as<'q, T>(
    query: QueryAs<'q, Postgres, T, PgArguments>,
    value: ParamValue,
) -> QueryAs<'q, Postgres, T, PgArguments> {
    match value {
        ParamValue::Null => query.bind(Option::<String>::None),
        ParamValue::Bool(v) => query.bind(v),
        ParamValue::Int(v) => query.bind(v),
        ParamValue::Float(v) => query.bind(v),
        ParamValue::Text(v) => query.bind(v),
        ParamValue::Uuid(v) => query.bind(v),
        ParamValue::Timestamp(v) => query.bind(v),
        ParamValue::Json(v) => query.bind(v),
    }
}

/// Map sqlx errors to [`RepositoryError`].
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = format!("database error: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => RepositoryError::DuplicateKey(message),
                _ => RepositoryError::storage(operation, message),
            }
        }
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::PoolClosed => RepositoryError::storage(operation, "connection pool closed"),
        other => RepositoryError::storage(operation, other.to_string()),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
