//! The [`Store`] facade the server holds.
//!
//! Wraps the connection pool; all actual queries live in the stateless
//! repositories, which take the pooled connection this facade hands out.
//! Cloning a `Store` clones the pool handle, not the pool.

use crate::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::errors::Result;
use crate::migrations;

/// Handle to the database: a pooled `SQLite` connection factory.
#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    /// Open a file-backed store and run pending migrations.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        let store = Self { pool };
        let conn = store.conn()?;
        let _ = migrations::run_migrations(&conn)?;
        drop(conn);
        Ok(store)
    }

    /// Open an in-memory store and run migrations (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        let store = Self { pool };
        let conn = store.conn()?;
        let _ = migrations::run_migrations(&conn)?;
        drop(conn);
        Ok(store)
    }

    /// Check out a connection from the pool.
    pub fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// The applied schema version.
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn()?;
        migrations::current_version(&conn)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("pool_size", &self.pool.max_size())
            .finish()
    }
}
