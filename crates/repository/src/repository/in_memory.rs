use std::sync::RwLock;

use async_trait::async_trait;
use indexmap::IndexMap;

use groundwork_core::Entity;

use super::r#trait::{Repository, RepositoryError, RepositoryResult};

/// In-memory repository backed by a concurrent, insertion-ordered map.
///
/// Intended for tests/dev. The inherent API takes `&self` and is safe for
/// concurrent use: individual operations are atomic under the lock.
/// [`store`] is check-then-act across two lock acquisitions — concurrent
/// callers on one key race with last-write-wins; the map entry survives
/// either way.
///
/// There is no transaction concept here: mutating calls never fail on
/// transactional grounds, and `flush`/`clear`/`refresh` are no-ops.
///
/// [`store`]: InMemoryRepository::store
#[derive(Debug)]
pub struct InMemoryRepository<T: Entity> {
    entities: RwLock<IndexMap<T::Key, T>>,
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(IndexMap::new()),
        }
    }
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InMemoryRepository<T>
where
    T: Entity + Clone + PartialEq,
{
    pub fn find(&self, key: &T::Key) -> RepositoryResult<Option<T>> {
        let map = self
            .entities
            .read()
            .map_err(|_| RepositoryError::storage("find", "lock poisoned"))?;
        Ok(map.get(key).cloned())
    }

    /// All stored instances, in insertion order.
    pub fn find_all(&self) -> RepositoryResult<Vec<T>> {
        let map = self
            .entities
            .read()
            .map_err(|_| RepositoryError::storage("find_all", "lock poisoned"))?;
        Ok(map.values().cloned().collect())
    }

    /// Membership test, by value.
    pub fn contains(&self, entity: &T) -> RepositoryResult<bool> {
        let map = self
            .entities
            .read()
            .map_err(|_| RepositoryError::storage("contains", "lock poisoned"))?;
        Ok(map.values().any(|stored| stored == entity))
    }

    pub fn contains_key(&self, key: &T::Key) -> RepositoryResult<bool> {
        let map = self
            .entities
            .read()
            .map_err(|_| RepositoryError::storage("contains", "lock poisoned"))?;
        Ok(map.contains_key(key))
    }

    /// Insert `entity` under its key, overwriting any previous value.
    ///
    /// The map cannot generate keys, so an unkeyed entity is an error.
    pub fn persist(&self, entity: T) -> RepositoryResult<T> {
        self.put("persist", entity)
    }

    /// Insert-or-update by key. Same operation as [`persist`] on this
    /// backend; the distinction only matters for SQL.
    ///
    /// [`persist`]: InMemoryRepository::persist
    pub fn merge(&self, entity: T) -> RepositoryResult<T> {
        self.put("merge", entity)
    }

    /// Persist or merge depending on storage state.
    ///
    /// The existence check is a live map lookup made immediately before the
    /// branch, under its own lock acquisition.
    pub fn store(&self, entity: T) -> RepositoryResult<T> {
        let present = match entity.key() {
            Some(key) => self.contains_key(key)?,
            None => false,
        };

        if present {
            self.merge(entity)
        } else {
            self.persist(entity)
        }
    }

    /// Remove `entity` by its key. Absent entities (and unkeyed ones) are a
    /// silent no-op.
    pub fn remove(&self, entity: &T) -> RepositoryResult<()> {
        match entity.key() {
            Some(key) => self.remove_by_key(key),
            None => Ok(()),
        }
    }

    /// Remove by key. Absent keys are a silent no-op.
    pub fn remove_by_key(&self, key: &T::Key) -> RepositoryResult<()> {
        let mut map = self
            .entities
            .write()
            .map_err(|_| RepositoryError::storage("remove", "lock poisoned"))?;
        // shift_remove keeps the remaining insertion order intact.
        map.shift_remove(key);
        Ok(())
    }

    /// No-op: the map already holds the stored state.
    pub fn refresh(&self, entity: T) -> RepositoryResult<T> {
        Ok(entity)
    }

    /// No-op: writes go through immediately.
    pub fn flush(&self) -> RepositoryResult<()> {
        Ok(())
    }

    /// No-op: there is no managed object graph to detach.
    pub fn clear(&self) -> RepositoryResult<()> {
        Ok(())
    }

    pub fn len(&self) -> RepositoryResult<usize> {
        let map = self
            .entities
            .read()
            .map_err(|_| RepositoryError::storage("len", "lock poisoned"))?;
        Ok(map.len())
    }

    pub fn is_empty(&self) -> RepositoryResult<bool> {
        Ok(self.len()? == 0)
    }

    fn put(&self, operation: &'static str, entity: T) -> RepositoryResult<T> {
        let key = entity
            .key()
            .cloned()
            .ok_or(RepositoryError::MissingKey(operation))?;
        let mut map = self
            .entities
            .write()
            .map_err(|_| RepositoryError::storage(operation, "lock poisoned"))?;
        map.insert(key, entity.clone());
        Ok(entity)
    }
}

#[async_trait]
impl<T> Repository<T> for InMemoryRepository<T>
where
    T: Entity + Clone + PartialEq + Send + Sync + 'static,
    T::Key: Send + Sync,
{
    async fn find(&mut self, key: &T::Key) -> RepositoryResult<Option<T>> {
        InMemoryRepository::find(self, key)
    }

    async fn find_all(&mut self) -> RepositoryResult<Vec<T>> {
        InMemoryRepository::find_all(self)
    }

    async fn contains(&mut self, entity: &T) -> RepositoryResult<bool> {
        InMemoryRepository::contains(self, entity)
    }

    async fn persist(&mut self, entity: T) -> RepositoryResult<T> {
        InMemoryRepository::persist(self, entity)
    }

    async fn merge(&mut self, entity: T) -> RepositoryResult<T> {
        InMemoryRepository::merge(self, entity)
    }

    async fn store(&mut self, entity: T) -> RepositoryResult<T> {
        InMemoryRepository::store(self, entity)
    }

    async fn remove(&mut self, entity: &T) -> RepositoryResult<()> {
        InMemoryRepository::remove(self, entity)
    }

    async fn remove_by_key(&mut self, key: &T::Key) -> RepositoryResult<()> {
        InMemoryRepository::remove_by_key(self, key)
    }

    async fn refresh(&mut self, entity: T) -> RepositoryResult<T> {
        InMemoryRepository::refresh(self, entity)
    }

    async fn flush(&mut self) -> RepositoryResult<()> {
        InMemoryRepository::flush(self)
    }

    async fn clear(&mut self) -> RepositoryResult<()> {
        InMemoryRepository::clear(self)
    }
}
