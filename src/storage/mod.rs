pub mod repository;

use std::path::{Path, PathBuf};

use rusqlite::{Connection, Transaction};
use rusqlite_migration::{Migrations, M};

use crate::error::{Error, Result};

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;\
                       PRAGMA foreign_keys=ON;\
                       PRAGMA busy_timeout=5000;";

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial.sql"))])
}

fn prepare_writer(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(PRAGMAS)?;
    migrations().to_latest(conn)?;
    Ok(())
}

/// The ledger's SQLite store: one writer connection that every manifest
/// write goes through, and one reader for list and gap queries. WAL lets
/// the reader proceed while a transaction is open on the writer.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl Database {
    /// `~/.syncledger/syncledger.db`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?;
        Ok(home.join(".syncledger").join("syncledger.db"))
    }

    /// Open the ledger at [`default_path`](Self::default_path), creating its directory.
    pub async fn open() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::Config(format!("cannot create {}: {e}", dir.display())))?;
        }
        Self::open_at(path).await
    }

    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("opening ledger at {}", path.display());

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        writer
            .call(|conn| Ok::<_, rusqlite::Error>(prepare_writer(conn)))
            .await??;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        reader
            .call(|conn| conn.execute_batch(PRAGMAS))
            .await?;

        Ok(Self { writer, reader })
    }

    /// A private in-memory ledger. Reader and writer share the one
    /// connection, since each in-memory connection is its own database.
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        writer
            .call(|conn| Ok::<_, rusqlite::Error>(prepare_writer(conn)))
            .await??;
        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }

    /// Run `f` in one transaction on the writer. Commits only when `f`
    /// returns `Ok`; on error nothing it did is kept and the error is
    /// returned unchanged.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    {
        self.writer
            .call(move |conn| {
                let tx = conn.transaction()?;
                let outcome = f(&tx);
                if outcome.is_ok() {
                    tx.commit()?;
                }
                Ok::<_, rusqlite::Error>(outcome)
            })
            .await?
    }
}
