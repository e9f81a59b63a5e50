//! Migration backend protocol and its sqlx/Postgres implementation.
//!
//! The backend owns all version bookkeeping: a single-row
//! `schema_migrations (version, dirty)` table in the target database. The
//! engine above it only ever talks through [`MigrationBackend`], which keeps
//! the "no version yet" and "no pending changes" sentinels distinct from
//! genuine failures.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use thiserror::Error;

use super::source::{self, Migration, SourceError};

/// Version bookkeeping as persisted in the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationVersion {
    pub version: i64,
    pub dirty: bool,
}

/// Result of an `up`/`down` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Scripts ran; the database now sits at this version (`None` after
    /// rolling back the first migration).
    Migrated(Option<i64>),
    /// Nothing pending (or nothing applied) — an explicit no-op, not an
    /// error.
    NoChange,
}

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("dirty database version {0} — a previous migration failed partway; resolve it manually before migrating further")]
    Dirty(i64),
    #[error("migration {version} has no down script")]
    NoDownScript { version: i64 },
    #[error("reading migration script {path:?}: {source}")]
    ReadScript {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("migration {version} ({direction}) failed: {source}")]
    Apply {
        version: i64,
        direction: &'static str,
        source: sqlx::Error,
    },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// The migration-backend capability: forward, backward, version, release.
#[async_trait(?Send)]
pub trait MigrationBackend {
    /// Apply every pending migration.
    async fn up(&mut self) -> Result<Outcome, MigrateError>;

    /// Roll back up to `steps` applied migrations, newest first.
    async fn down(&mut self, steps: u32) -> Result<Outcome, MigrateError>;

    /// Current version, or `None` when no migration was ever applied.
    async fn version(&mut self) -> Result<Option<MigrationVersion>, MigrateError>;

    /// Release the source and target. Callers treat a failure here as a
    /// warning, never as the operation's failure.
    async fn close(self) -> Result<(), MigrateError>;
}

const CREATE_VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations \
     (version BIGINT NOT NULL PRIMARY KEY, dirty BOOLEAN NOT NULL)";

/// File-source backend over a live Postgres connection.
pub struct PgBackend {
    conn: PgConnection,
    migrations: Vec<Migration>,
}

impl PgBackend {
    /// Connect to the target and load the migration source. Creates the
    /// version table when missing.
    pub async fn open(url: &str, dir: &Path) -> Result<Self, MigrateError> {
        let migrations = source::load_dir(dir)?;
        let mut conn = PgConnection::connect(url).await?;
        sqlx::raw_sql(CREATE_VERSION_TABLE).execute(&mut conn).await?;
        Ok(Self { conn, migrations })
    }

    async fn read_version(&mut self) -> Result<Option<MigrationVersion>, sqlx::Error> {
        let row: Option<(i64, bool)> =
            sqlx::query_as("SELECT version, dirty FROM schema_migrations LIMIT 1")
                .fetch_optional(&mut self.conn)
                .await?;
        Ok(row.map(|(version, dirty)| MigrationVersion { version, dirty }))
    }

    /// Replace the single bookkeeping row wholesale; `None` clears it.
    async fn set_version(&mut self, version: Option<i64>, dirty: bool) -> Result<(), sqlx::Error> {
        let mut tx = self.conn.begin().await?;
        sqlx::query("DELETE FROM schema_migrations")
            .execute(&mut *tx)
            .await?;
        if let Some(version) = version {
            sqlx::query("INSERT INTO schema_migrations (version, dirty) VALUES ($1, $2)")
                .bind(version)
                .bind(dirty)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await
    }

    async fn run_script(
        &mut self,
        path: &Path,
        version: i64,
        direction: &'static str,
    ) -> Result<(), MigrateError> {
        let sql = std::fs::read_to_string(path).map_err(|source| MigrateError::ReadScript {
            path: path.to_path_buf(),
            source,
        })?;
        sqlx::raw_sql(&sql)
            .execute(&mut self.conn)
            .await
            .map_err(|source| MigrateError::Apply {
                version,
                direction,
                source,
            })?;
        Ok(())
    }

    /// Reject any operation against a half-applied state; dirty is never
    /// repaired automatically.
    fn guard_dirty(current: Option<MigrationVersion>) -> Result<Option<i64>, MigrateError> {
        match current {
            Some(v) if v.dirty => Err(MigrateError::Dirty(v.version)),
            Some(v) => Ok(Some(v.version)),
            None => Ok(None),
        }
    }
}

#[async_trait(?Send)]
impl MigrationBackend for PgBackend {
    async fn up(&mut self) -> Result<Outcome, MigrateError> {
        let current = Self::guard_dirty(self.read_version().await?)?;
        let plan = pending(&self.migrations, current).to_vec();
        if plan.is_empty() {
            return Ok(Outcome::NoChange);
        }

        let mut version = current;
        for migration in &plan {
            // Mark the target dirty before the script so a mid-script crash
            // is visible to the next invocation.
            self.set_version(Some(migration.version), true).await?;
            self.run_script(&migration.up, migration.version, "up")
                .await?;
            self.set_version(Some(migration.version), false).await?;
            version = Some(migration.version);
        }
        Ok(Outcome::Migrated(version))
    }

    async fn down(&mut self, steps: u32) -> Result<Outcome, MigrateError> {
        let current = Self::guard_dirty(self.read_version().await?)?;
        let plan: Vec<(Migration, Option<i64>)> = rollback_plan(&self.migrations, current, steps)
            .into_iter()
            .map(|(migration, previous)| (migration.clone(), previous))
            .collect();
        if plan.is_empty() {
            return Ok(Outcome::NoChange);
        }

        let mut version = current;
        for (migration, previous) in &plan {
            let down = migration.down.as_deref().ok_or(MigrateError::NoDownScript {
                version: migration.version,
            })?;
            self.set_version(Some(migration.version), true).await?;
            self.run_script(down, migration.version, "down").await?;
            self.set_version(*previous, false).await?;
            version = *previous;
        }
        Ok(Outcome::Migrated(version))
    }

    async fn version(&mut self) -> Result<Option<MigrationVersion>, MigrateError> {
        Ok(self.read_version().await?)
    }

    async fn close(self) -> Result<(), MigrateError> {
        Ok(self.conn.close().await?)
    }
}

/// Migrations strictly after `current`, in application order.
fn pending(migrations: &[Migration], current: Option<i64>) -> &[Migration] {
    let start = match current {
        None => 0,
        Some(version) => migrations.partition_point(|m| m.version <= version),
    };
    &migrations[start..]
}

/// Up to `steps` applied migrations, newest first, each paired with the
/// version the database returns to once it is rolled back.
fn rollback_plan(
    migrations: &[Migration],
    current: Option<i64>,
    steps: u32,
) -> Vec<(&Migration, Option<i64>)> {
    let Some(version) = current else {
        return Vec::new();
    };
    let applied: Vec<&Migration> = migrations
        .iter()
        .filter(|m| m.version <= version)
        .collect();

    let mut plan = Vec::new();
    let mut index = applied.len();
    for _ in 0..steps {
        if index == 0 {
            break;
        }
        index -= 1;
        let previous = index.checked_sub(1).map(|i| applied[i].version);
        plan.push((applied[index], previous));
    }
    plan
}
