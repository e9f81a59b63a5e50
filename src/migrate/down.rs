//! Rollback handler.

use anyhow::{Result, anyhow};

use super::backend::{MigrationBackend, Outcome};
use super::fmt_version;
use crate::util::ok;

pub(super) async fn run<B: MigrationBackend>(backend: &mut B, steps: u32) -> Result<()> {
    match backend.down(steps).await {
        Ok(Outcome::NoChange) => {
            ok("No changes — nothing to roll back.");
            Ok(())
        }
        Ok(Outcome::Migrated(version)) => {
            ok(&format!(
                "Migration \"down\" completed — now at version {}.",
                fmt_version(version)
            ));
            Ok(())
        }
        Err(err) => Err(anyhow!("migration \"down\" failed: {err}")),
    }
}
