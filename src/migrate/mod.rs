//! Migration operations for the pgup CLI.
//!
//! Submodules:
//! - `source`: versioned migration file discovery
//! - `backend`: the backend protocol and its sqlx/Postgres implementation
//! - `up` / `down` / `status`: per-direction handlers
//!
//! [`apply`] is the single entry point: it opens the backend against the
//! resolved instance, dispatches the requested direction, and always releases
//! the backend afterwards — close failures are downgraded to warnings, since
//! the migration itself already succeeded or failed on its own.

mod backend;
mod down;
mod source;
mod status;
mod up;

pub use backend::{MigrateError, MigrationBackend, MigrationVersion, Outcome, PgBackend};
pub use source::{Migration, SourceError, load_dir};

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::ConnectionDescriptor;
use crate::util::{step, warn};

/// Requested migration operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply all pending migrations.
    Up,
    /// Roll back this many applied migrations.
    Down { steps: u32 },
    /// Read-only version report.
    Status,
}

impl Direction {
    fn label(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down { .. } => "down",
            Direction::Status => "status",
        }
    }
}

/// Open the migration backend against the ready instance and run one
/// operation.
pub async fn apply(
    direction: Direction,
    desc: &ConnectionDescriptor,
    migrations_dir: &Path,
) -> Result<()> {
    step(&format!("Running migration {:?}...", direction.label()));
    let backend = PgBackend::open(&desc.database_url(), migrations_dir)
        .await
        .context("failed to initialise migrations")?;
    run(backend, direction).await
}

/// Dispatch one operation on any backend, then release it.
pub async fn run<B: MigrationBackend>(mut backend: B, direction: Direction) -> Result<()> {
    let result = match direction {
        Direction::Up => up::run(&mut backend).await,
        Direction::Down { steps } => down::run(&mut backend, steps).await,
        Direction::Status => status::run(&mut backend).await,
    };
    if let Err(err) = backend.close().await {
        warn(&format!("closing migration backend: {err}"));
    }
    result
}

fn fmt_version(version: Option<i64>) -> String {
    match version {
        Some(version) => version.to_string(),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted backend for exercising the engine without a database.
    struct FakeBackend {
        up_result: Option<Result<Outcome, MigrateError>>,
        down_result: Option<Result<Outcome, MigrateError>>,
        version_result: Option<Result<Option<MigrationVersion>, MigrateError>>,
        close_fails: bool,
        down_steps_seen: Arc<AtomicU32>,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                up_result: None,
                down_result: None,
                version_result: None,
                close_fails: false,
                down_steps_seen: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait(?Send)]
    impl MigrationBackend for FakeBackend {
        async fn up(&mut self) -> Result<Outcome, MigrateError> {
            self.up_result.take().expect("unexpected up call")
        }

        async fn down(&mut self, steps: u32) -> Result<Outcome, MigrateError> {
            self.down_steps_seen.store(steps, Ordering::Relaxed);
            self.down_result.take().expect("unexpected down call")
        }

        async fn version(&mut self) -> Result<Option<MigrationVersion>, MigrateError> {
            self.version_result.take().expect("unexpected version call")
        }

        async fn close(self) -> Result<(), MigrateError> {
            if self.close_fails {
                Err(MigrateError::Dirty(0))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn up_with_no_pending_changes_is_success() {
        let mut backend = FakeBackend::new();
        backend.up_result = Some(Ok(Outcome::NoChange));
        run(backend, Direction::Up).await.unwrap();
    }

    #[tokio::test]
    async fn up_reports_the_new_version() {
        let mut backend = FakeBackend::new();
        backend.up_result = Some(Ok(Outcome::Migrated(Some(3))));
        run(backend, Direction::Up).await.unwrap();
    }

    #[tokio::test]
    async fn up_surfaces_backend_failures() {
        let mut backend = FakeBackend::new();
        backend.up_result = Some(Err(MigrateError::Dirty(2)));
        let err = run(backend, Direction::Up).await.unwrap_err();
        assert!(err.to_string().contains("dirty database version 2"));
    }

    #[tokio::test]
    async fn down_passes_requested_steps_through() {
        let mut backend = FakeBackend::new();
        backend.down_result = Some(Ok(Outcome::Migrated(None)));
        let seen = backend.down_steps_seen.clone();
        run(backend, Direction::Down { steps: 3 }).await.unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn down_with_nothing_applied_is_success() {
        let mut backend = FakeBackend::new();
        backend.down_result = Some(Ok(Outcome::NoChange));
        run(backend, Direction::Down { steps: 1 }).await.unwrap();
    }

    #[tokio::test]
    async fn status_with_no_version_yet_is_success() {
        let mut backend = FakeBackend::new();
        backend.version_result = Some(Ok(None));
        run(backend, Direction::Status).await.unwrap();
    }

    #[tokio::test]
    async fn status_reports_version_and_dirty_flag() {
        let mut backend = FakeBackend::new();
        backend.version_result = Some(Ok(Some(MigrationVersion {
            version: 7,
            dirty: true,
        })));
        run(backend, Direction::Status).await.unwrap();
    }

    #[tokio::test]
    async fn status_read_failure_is_an_error() {
        let mut backend = FakeBackend::new();
        backend.version_result = Some(Err(MigrateError::Dirty(1)));
        assert!(run(backend, Direction::Status).await.is_err());
    }

    #[tokio::test]
    async fn close_failure_does_not_flip_a_successful_run() {
        let mut backend = FakeBackend::new();
        backend.up_result = Some(Ok(Outcome::NoChange));
        backend.close_fails = true;
        run(backend, Direction::Up).await.unwrap();
    }

    #[test]
    fn version_formatting_covers_the_none_sentinel() {
        assert_eq!(fmt_version(Some(12)), "12");
        assert_eq!(fmt_version(None), "none");
    }
}
