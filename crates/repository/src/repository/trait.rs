use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use groundwork_core::Entity;

use super::query::{ParamValue, QueryArgs};

/// Result type used across the repository layer.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository operation error.
///
/// These are storage-boundary failures. Absence on a lookup is **not** an
/// error — `find` and the single-result query variants return `Ok(None)`
/// for zero matches. No operation retries; recovery is the caller's
/// responsibility.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The targeted entity does not exist in the backing store. Raised by
    /// `remove`/`refresh` on the SQL backend; the in-memory backend treats
    /// removal of an absent entity as a no-op.
    #[error("entity not found")]
    NotFound,

    /// `persist` targeted a key that is already present.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// A mutating operation needed a key and the entity has none, on a
    /// backend that cannot generate keys.
    #[error("entity has no key in {0}")]
    MissingKey(&'static str),

    /// Malformed query binding: unknown named query, a placeholder with no
    /// matching argument, or an argument matching no placeholder.
    #[error("query binding failed: {0}")]
    Binding(String),

    /// Backing store failure (connection, decode, poisoned lock).
    #[error("storage error in {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
}

impl RepositoryError {
    pub(crate) fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }
}

/// Common methods for storing and retrieving domain objects.
///
/// The surface is that of a single-writer unit of work: every operation
/// takes `&mut self`, so exclusive access is part of the contract rather
/// than a runtime check. Backends with a concurrency-safe substrate (the
/// in-memory map) additionally expose an inherent `&self` API.
///
/// At most one stored value exists per key. The repository does not own
/// entity lifecycle beyond storage: no cascading, no transaction ownership.
#[async_trait]
pub trait Repository<T>: Send
where
    T: Entity + Send + Sync,
    T::Key: Send + Sync,
{
    /// Find the instance identified by `key`. Absence is not an error.
    async fn find(&mut self, key: &T::Key) -> RepositoryResult<Option<T>>;

    /// All stored instances. Insertion order for the in-memory backend;
    /// unspecified for SQL backends.
    async fn find_all(&mut self) -> RepositoryResult<Vec<T>>;

    /// Membership test. By value for the in-memory backend, by key for SQL.
    async fn contains(&mut self, entity: &T) -> RepositoryResult<bool>;

    /// Insert `entity`, returning the stored instance. The SQL backend
    /// rejects an already-present key with [`RepositoryError::DuplicateKey`];
    /// the in-memory backend overwrites by key unconditionally.
    async fn persist(&mut self, entity: T) -> RepositoryResult<T>;

    /// Insert-or-update by key, returning the stored instance. On SQL
    /// backends the returned value is the row as read back and may differ
    /// from the argument; in-memory it is the argument itself.
    async fn merge(&mut self, entity: T) -> RepositoryResult<T>;

    /// Persist or merge transparently, depending on storage state: a `None`
    /// key or a key absent from storage persists, a present key merges.
    ///
    /// The existence check is a live storage lookup made immediately before
    /// the branch — never a cached flag. Across the check and the write the
    /// operation is not atomic; concurrent callers on one key race with
    /// last-write-wins.
    async fn store(&mut self, entity: T) -> RepositoryResult<T>;

    /// Remove `entity` from the storage, by its key.
    async fn remove(&mut self, entity: &T) -> RepositoryResult<()>;

    /// Remove the instance identified by `key`.
    async fn remove_by_key(&mut self, key: &T::Key) -> RepositoryResult<()>;

    /// Re-read the stored state of `entity`, discarding local changes.
    /// No-op for the in-memory backend (the map holds the stored state).
    async fn refresh(&mut self, entity: T) -> RepositoryResult<T>;

    /// Synchronize pending changes to the underlying storage. No-op for
    /// backends without a managed object graph — both shipped backends
    /// write through immediately.
    async fn flush(&mut self) -> RepositoryResult<()>;

    /// Detach all managed state. No-op for backends without a managed
    /// object graph.
    async fn clear(&mut self) -> RepositoryResult<()>;
}

/// Query execution surface of a SQL-backed repository.
///
/// Read-only; works with or without an active unit of work, like any other
/// read. Queries must select the full column list of `T`.
#[async_trait]
pub trait QueryExecutor<T>: Send + Sync
where
    T: Entity + Send + Sync,
{
    /// Execute literal query text with the given arguments.
    async fn find_by_query(&self, sql: &str, args: QueryArgs) -> RepositoryResult<Vec<T>>;

    /// Execute the query registered under `name`. An unknown name is a
    /// [`RepositoryError::Binding`] error.
    async fn find_by_named_query(&self, name: &str, args: QueryArgs) -> RepositoryResult<Vec<T>>;

    /// Single-result variant of [`find_by_named_query`]. Zero matches yield
    /// `Ok(None)`, never an error; with multiple matches the backend decides
    /// which row wins.
    ///
    /// [`find_by_named_query`]: QueryExecutor::find_by_named_query
    async fn find_instance_by_named_query(
        &self,
        name: &str,
        args: QueryArgs,
    ) -> RepositoryResult<Option<T>>;

    /// Equality filter on a single column.
    async fn find_by_attribute(&self, column: &str, value: ParamValue)
    -> RepositoryResult<Vec<T>>;
}

#[async_trait]
impl<T, S> QueryExecutor<T> for Arc<S>
where
    T: Entity + Send + Sync,
    S: QueryExecutor<T> + ?Sized,
{
    async fn find_by_query(&self, sql: &str, args: QueryArgs) -> RepositoryResult<Vec<T>> {
        (**self).find_by_query(sql, args).await
    }

    async fn find_by_named_query(&self, name: &str, args: QueryArgs) -> RepositoryResult<Vec<T>> {
        (**self).find_by_named_query(name, args).await
    }

    async fn find_instance_by_named_query(
        &self,
        name: &str,
        args: QueryArgs,
    ) -> RepositoryResult<Option<T>> {
        (**self).find_instance_by_named_query(name, args).await
    }

    async fn find_by_attribute(
        &self,
        column: &str,
        value: ParamValue,
    ) -> RepositoryResult<Vec<T>> {
        (**self).find_by_attribute(column, value).await
    }
}
