//! Schema export via `pg_dump`.
//!
//! Prefers a `pg_dump` installed on the host; when none is available the dump
//! runs inside the resolved container via `docker exec` and the output is
//! written out from the captured stdout.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::config::ConnectionDescriptor;
use crate::runtime::ContainerRuntime;
use crate::util::{ok, step};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOptions {
    /// Output file path for the SQL dump.
    pub output: PathBuf,
    /// Dump only the schema (no data).
    pub schema_only: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("schema.sql"),
            schema_only: true,
        }
    }
}

/// Export the schema of the already-ready instance.
pub fn run<R: ContainerRuntime>(
    runtime: &R,
    desc: &ConnectionDescriptor,
    opts: &DumpOptions,
) -> Result<()> {
    step("Checking for pg_dump...");
    let local = local_pg_dump_version();
    match &local {
        Some(version) => ok(&format!("Using local pg_dump — {version}")),
        None => ok(&format!(
            "Local pg_dump not found; using pg_dump from container {:?}",
            desc.container_name
        )),
    }

    step("Exporting database schema...");
    match local {
        Some(_) => dump_local(desc, opts)?,
        None => dump_via_exec(runtime, desc, opts)?,
    }

    ok(&format!("Schema written to {}", opts.output.display()));
    Ok(())
}

/// Version line of a host-installed `pg_dump`, if one is on the path.
fn local_pg_dump_version() -> Option<String> {
    let output = Command::new("pg_dump").arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Arguments shared by both strategies.
fn base_args(desc: &ConnectionDescriptor, schema_only: bool) -> Vec<String> {
    let mut args = vec![
        "-U".to_string(),
        desc.user.clone(),
        "-d".to_string(),
        desc.database.clone(),
        "--no-owner".to_string(),
        "--no-privileges".to_string(),
    ];
    if schema_only {
        args.push("--schema-only".to_string());
    }
    args
}

fn dump_local(desc: &ConnectionDescriptor, opts: &DumpOptions) -> Result<()> {
    // The host-side dump crosses the published port; inside the container
    // pg_dump talks to the default local socket instead.
    let mut args = vec![
        "-h".to_string(),
        desc.host.clone(),
        "-p".to_string(),
        desc.port.to_string(),
    ];
    args.extend(base_args(desc, opts.schema_only));
    args.push("-f".to_string());
    args.push(opts.output.display().to_string());

    let status = Command::new("pg_dump")
        .args(&args)
        .env("PGPASSWORD", &desc.password)
        .status()
        .context("pg_dump failed to launch")?;
    if !status.success() {
        bail!("pg_dump failed with {status}");
    }
    Ok(())
}

fn dump_via_exec<R: ContainerRuntime>(
    runtime: &R,
    desc: &ConnectionDescriptor,
    opts: &DumpOptions,
) -> Result<()> {
    let mut args = vec!["pg_dump".to_string(), "-h".to_string(), "localhost".to_string()];
    args.extend(base_args(desc, opts.schema_only));
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();

    let sql = runtime
        .exec_capture(
            &desc.container_name,
            &[("PGPASSWORD", &desc.password)],
            &argv,
        )
        .context("pg_dump via docker exec failed")?;
    write_dump(&opts.output, &sql)
}

fn write_dump(path: &Path, sql: &[u8]) -> Result<()> {
    std::fs::write(path, sql).with_context(|| format!("writing {}", path.display()))
}
