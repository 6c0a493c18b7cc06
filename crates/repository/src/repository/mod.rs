//! Repository boundary.
//!
//! This module defines the storage-facing abstraction for persisting and
//! retrieving entities without making any backend assumptions, plus the two
//! shipped backends (in-memory map, Postgres).

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryRepository;
pub use postgres::{PgRepository, PgUnitOfWork, SqlEntity};
pub use query::{NamedQueries, ParamValue, QueryArgs};
pub use r#trait::{QueryExecutor, Repository, RepositoryError, RepositoryResult};
