//! Container runtime access via the `docker` CLI.
//!
//! The reconciler and readiness gate only ever see the [`ContainerRuntime`]
//! trait, so they can be exercised against fakes; [`DockerCli`] is the one
//! real implementation, shelling out to `docker` with plain argument lists.

use std::fmt;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::config::ConnectionDescriptor;

/// Observed state of a named container.
///
/// Derived fresh on every probe; never cached beyond a single reconciliation
/// decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Created,
    Exited,
    Running,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Absent => "absent",
            ContainerState::Created => "created",
            ContainerState::Exited => "exited",
            ContainerState::Running => "running",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("docker is not running — start the docker daemon and try again")]
    Unreachable,
    #[error("failed to start container {name:?}: {reason}")]
    StartFailed { name: String, reason: String },
    #[error("failed to pull image {image:?}: {reason}")]
    PullFailed { image: String, reason: String },
    #[error("failed to create postgres container {name:?}: {reason}")]
    CreateFailed { name: String, reason: String },
    #[error("exec in container {name:?} failed: {reason}")]
    ExecFailed { name: String, reason: String },
}

/// The narrow slice of a container runtime the pipeline depends on.
pub trait ContainerRuntime {
    /// Verify the runtime itself is reachable.
    fn ping(&self) -> Result<(), RuntimeError>;

    /// State of the named container. Fails closed: any inability to query
    /// the runtime reads as [`ContainerState::Absent`].
    fn status_of(&self, name: &str) -> ContainerState;

    /// First container publishing the given host port, if any.
    ///
    /// Only meaningful while the target container is absent — an existing
    /// target already accounts for the port.
    fn occupant_of_port(&self, port: u16) -> Option<String>;

    /// Start an existing (created/exited) container.
    fn start(&self, name: &str) -> Result<(), RuntimeError>;

    /// Whether the image is already available locally.
    fn image_present(&self, image: &str) -> bool;

    /// Pull the image from its registry.
    fn pull(&self, image: &str) -> Result<(), RuntimeError>;

    /// Create and start a new detached container serving the descriptor's
    /// port, with its credentials baked in as the initial superuser and
    /// database.
    fn create_and_start(&self, desc: &ConnectionDescriptor) -> Result<(), RuntimeError>;

    /// Run a command inside the container, reporting only success/failure.
    fn exec_ok(&self, name: &str, cmd: &[&str]) -> bool;

    /// Run a command inside the container and capture its stdout.
    fn exec_capture(
        &self,
        name: &str,
        env: &[(&str, &str)],
        cmd: &[&str],
    ) -> Result<Vec<u8>, RuntimeError>;
}

/// `docker`-CLI-backed runtime.
pub struct DockerCli;

impl DockerCli {
    /// Run `docker` with the given args, returning trimmed stdout on success.
    fn capture(args: &[&str]) -> Option<String> {
        let output = Command::new("docker").args(args).output().ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run `docker` quietly, returning trimmed stderr as the failure reason.
    fn run_checked(args: &[&str]) -> Result<(), String> {
        match Command::new("docker").args(args).output() {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(String::from_utf8_lossy(&output.stderr).trim().to_string()),
            Err(err) => Err(err.to_string()),
        }
    }
}

/// Map a `docker inspect` status string onto [`ContainerState`].
///
/// Anything unrecognised (paused, restarting, dead) reads as absent, the same
/// fail-closed bucket as an unknown container.
fn parse_state(status: &str) -> ContainerState {
    match status {
        "running" => ContainerState::Running,
        "exited" => ContainerState::Exited,
        "created" => ContainerState::Created,
        _ => ContainerState::Absent,
    }
}

impl ContainerRuntime for DockerCli {
    fn ping(&self) -> Result<(), RuntimeError> {
        let reachable = Command::new("docker")
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false);
        if reachable {
            Ok(())
        } else {
            Err(RuntimeError::Unreachable)
        }
    }

    fn status_of(&self, name: &str) -> ContainerState {
        match Self::capture(&["inspect", "--format", "{{.State.Status}}", name]) {
            Some(status) => parse_state(&status),
            None => ContainerState::Absent,
        }
    }

    fn occupant_of_port(&self, port: u16) -> Option<String> {
        let filter = format!("publish={port}");
        let names = Self::capture(&["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"])?;
        // docker may list several; take the first.
        names
            .lines()
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    fn start(&self, name: &str) -> Result<(), RuntimeError> {
        Self::run_checked(&["start", name]).map_err(|reason| RuntimeError::StartFailed {
            name: name.to_string(),
            reason,
        })
    }

    fn image_present(&self, image: &str) -> bool {
        Self::run_checked(&["image", "inspect", image]).is_ok()
    }

    fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        // Inherit stdio so pull progress stays visible.
        let status = Command::new("docker")
            .args(["pull", image])
            .status()
            .map_err(|err| RuntimeError::PullFailed {
                image: image.to_string(),
                reason: err.to_string(),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::PullFailed {
                image: image.to_string(),
                reason: format!("docker pull exited with {status}"),
            })
        }
    }

    fn create_and_start(&self, desc: &ConnectionDescriptor) -> Result<(), RuntimeError> {
        let publish = format!("{}:5432", desc.port);
        let user = format!("POSTGRES_USER={}", desc.user);
        let password = format!("POSTGRES_PASSWORD={}", desc.password);
        let database = format!("POSTGRES_DB={}", desc.database);
        Self::run_checked(&[
            "run",
            "--name",
            &desc.container_name,
            "-e",
            &user,
            "-e",
            &password,
            "-e",
            &database,
            "-p",
            &publish,
            "-d",
            &desc.image,
        ])
        .map_err(|reason| RuntimeError::CreateFailed {
            name: desc.container_name.clone(),
            reason,
        })
    }

    fn exec_ok(&self, name: &str, cmd: &[&str]) -> bool {
        let mut args = vec!["exec", name];
        args.extend_from_slice(cmd);
        Command::new("docker")
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn exec_capture(
        &self,
        name: &str,
        env: &[(&str, &str)],
        cmd: &[&str],
    ) -> Result<Vec<u8>, RuntimeError> {
        let mut args: Vec<String> = vec!["exec".to_string()];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(name.to_string());
        args.extend(cmd.iter().map(|s| s.to_string()));

        let output = Command::new("docker").args(&args).output().map_err(|err| {
            RuntimeError::ExecFailed {
                name: name.to_string(),
                reason: err.to_string(),
            }
        })?;
        if !output.status.success() {
            return Err(RuntimeError::ExecFailed {
                name: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}
