//! Versioned migration file discovery.
//!
//! A migration source is a flat directory of SQL scripts named
//! `{version}_{name}.up.sql` and `{version}_{name}.down.sql`. Versions are
//! plain integers (leading zeros allowed) and define the application order;
//! files that do not match the pattern are ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("migrations directory {0:?} is not readable: {1}")]
    Unreadable(PathBuf, #[source] std::io::Error),
    #[error("duplicate migration version {version}: {first:?} and {second:?}")]
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },
    #[error("migration {version} has a down script but no up script")]
    MissingUp { version: i64 },
}

/// One versioned migration: the up script, and the down script when the
/// author provided one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up: PathBuf,
    pub down: Option<PathBuf>,
}

#[derive(Default)]
struct Entry {
    name: String,
    up: Option<PathBuf>,
    down: Option<PathBuf>,
}

/// Load and order every migration in the directory.
pub fn load_dir(dir: &Path) -> Result<Vec<Migration>, SourceError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|err| SourceError::Unreadable(dir.to_path_buf(), err))?;

    let mut by_version: BTreeMap<i64, Entry> = BTreeMap::new();
    for dir_entry in entries {
        let dir_entry = dir_entry.map_err(|err| SourceError::Unreadable(dir.to_path_buf(), err))?;
        let file_name = dir_entry.file_name();
        let Some((version, name, is_up)) = parse_filename(&file_name.to_string_lossy()) else {
            continue;
        };

        let entry = by_version.entry(version).or_default();
        let slot = if is_up { &mut entry.up } else { &mut entry.down };
        if let Some(existing) = slot {
            return Err(SourceError::DuplicateVersion {
                version,
                first: existing
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                second: file_name.to_string_lossy().into_owned(),
            });
        }
        entry.name = name;
        *slot = Some(dir_entry.path());
    }

    by_version
        .into_iter()
        .map(|(version, entry)| {
            let up = entry.up.ok_or(SourceError::MissingUp { version })?;
            Ok(Migration {
                version,
                name: entry.name,
                up,
                down: entry.down,
            })
        })
        .collect()
}

/// Split `{version}_{name}.{up|down}.sql` into its parts.
fn parse_filename(file: &str) -> Option<(i64, String, bool)> {
    let (stem, is_up) = if let Some(stem) = file.strip_suffix(".up.sql") {
        (stem, true)
    } else if let Some(stem) = file.strip_suffix(".down.sql") {
        (stem, false)
    } else {
        return None;
    };
    let (version, name) = stem.split_once('_')?;
    let version: i64 = version.parse().ok()?;
    Some((version, name.to_string(), is_up))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "SELECT 1;").unwrap();
    }

    #[test]
    fn parses_version_name_and_direction() {
        assert_eq!(
            parse_filename("0002_create_products.up.sql"),
            Some((2, "create_products".to_string(), true))
        );
        assert_eq!(
            parse_filename("0002_create_products.down.sql"),
            Some((2, "create_products".to_string(), false))
        );
        assert_eq!(parse_filename("README.md"), None);
        assert_eq!(parse_filename("notes.sql"), None);
        assert_eq!(parse_filename("abc_nope.up.sql"), None);
    }

    #[test]
    fn loads_ordered_pairs_and_skips_unrelated_files() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "0002_create_products.up.sql");
        touch(dir.path(), "0002_create_products.down.sql");
        touch(dir.path(), "0001_create_tasks.up.sql");
        touch(dir.path(), "0001_create_tasks.down.sql");
        touch(dir.path(), "README.md");

        let migrations = load_dir(dir.path()).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[0].name, "create_tasks");
        assert!(migrations[0].down.is_some());
        assert_eq!(migrations[1].version, 2);
    }

    #[test]
    fn down_script_is_optional() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "0001_seed.up.sql");
        let migrations = load_dir(dir.path()).unwrap();
        assert_eq!(migrations[0].down, None);
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "0001_first.up.sql");
        touch(dir.path(), "001_second.up.sql");
        let err = load_dir(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            SourceError::DuplicateVersion { version: 1, .. }
        ));
    }

    #[test]
    fn down_without_up_is_rejected() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "0001_orphan.down.sql");
        let err = load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, SourceError::MissingUp { version: 1 }));
    }

    #[test]
    fn missing_directory_is_unreadable() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            load_dir(&missing),
            Err(SourceError::Unreadable(..))
        ));
    }
}
