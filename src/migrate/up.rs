//! Forward migration handler.

use anyhow::{Result, anyhow};

use super::backend::{MigrationBackend, Outcome};
use super::fmt_version;
use crate::util::ok;

pub(super) async fn run<B: MigrationBackend>(backend: &mut B) -> Result<()> {
    match backend.up().await {
        Ok(Outcome::NoChange) => {
            ok("No changes — database is already up to date.");
            Ok(())
        }
        Ok(Outcome::Migrated(version)) => {
            ok(&format!(
                "Migration \"up\" completed — now at version {}.",
                fmt_version(version)
            ));
            Ok(())
        }
        Err(err) => Err(anyhow!("migration \"up\" failed: {err}")),
    }
}
