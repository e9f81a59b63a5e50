//! Read-only migration status handler.

use anyhow::{Result, anyhow};

use super::backend::{MigrationBackend, MigrationVersion};
use crate::util::{info, none};

pub(super) async fn run<B: MigrationBackend>(backend: &mut B) -> Result<()> {
    match backend.version().await {
        Ok(None) => {
            none("Migration version: none (no migrations applied yet)");
            Ok(())
        }
        Ok(Some(MigrationVersion { version, dirty })) => {
            info(&format!("Migration version: {version}  dirty: {dirty}"));
            Ok(())
        }
        Err(err) => Err(anyhow!("could not read migration version: {err}")),
    }
}
