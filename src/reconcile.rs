//! Drive the container runtime toward one running, reachable instance.
//!
//! [`ensure_running`] reconciles whatever pre-existing state the runtime
//! reports (missing, stopped, or a different container already holding the
//! port) into a running container, and [`wait_until_ready`] gates the rest of
//! the pipeline on the instance actually accepting connections.

use thiserror::Error;

use crate::config::{ConnectionDescriptor, RetryBudget};
use crate::runtime::{ContainerRuntime, ContainerState, RuntimeError};
use crate::util::{info, ok, step};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("postgres did not become ready in time — run: docker logs {container}")]
    NotReady { container: String },
}

/// Reach the invariant "target container exists and is running".
///
/// Returns the descriptor to use from here on: identical to the input, except
/// when the configured container is absent and another container already
/// publishes the configured port. In that case the occupant is trusted as the
/// database and `container_name` is rebound to it; the readiness gate will
/// fail loudly if that trust was misplaced. Calling this again with no
/// external state change is a no-op.
pub fn ensure_running<R: ContainerRuntime>(
    runtime: &R,
    desc: ConnectionDescriptor,
) -> Result<ConnectionDescriptor, ReconcileError> {
    step("Checking docker...");
    runtime.ping()?;
    ok("Docker is running.");

    step(&format!(
        "Checking postgres container {:?}...",
        desc.container_name
    ));
    match runtime.status_of(&desc.container_name) {
        ContainerState::Running => {
            ok("Container is already running.");
            Ok(desc)
        }
        state @ (ContainerState::Exited | ContainerState::Created) => {
            info(&format!("Container exists but is {state}. Starting..."));
            runtime.start(&desc.container_name)?;
            ok("Container started.");
            Ok(desc)
        }
        ContainerState::Absent => match runtime.occupant_of_port(desc.port) {
            Some(occupant) => rebind_to_occupant(runtime, desc, occupant),
            None => create_fresh(runtime, desc),
        },
    }
}

/// An existing listener on the configured port is assumed to be the database;
/// adopt it instead of failing on the collision.
fn rebind_to_occupant<R: ContainerRuntime>(
    runtime: &R,
    desc: ConnectionDescriptor,
    occupant: String,
) -> Result<ConnectionDescriptor, ReconcileError> {
    info(&format!(
        "Port {} is already used by container {:?}. Starting it if needed...",
        desc.port, occupant
    ));
    if runtime.status_of(&occupant) != ContainerState::Running {
        runtime.start(&occupant)?;
    }
    ok(&format!(
        "Reusing existing container {:?} on port {}.",
        occupant, desc.port
    ));
    Ok(ConnectionDescriptor {
        container_name: occupant,
        ..desc
    })
}

fn create_fresh<R: ContainerRuntime>(
    runtime: &R,
    desc: ConnectionDescriptor,
) -> Result<ConnectionDescriptor, ReconcileError> {
    // Pull only when the image is missing; a local image is never refreshed.
    if !runtime.image_present(&desc.image) {
        step(&format!("Pulling image {:?}...", desc.image));
        runtime.pull(&desc.image)?;
        ok("Image pulled.");
    }

    info("Creating and starting a new container...");
    runtime.create_and_start(&desc)?;
    ok("Container created and started.");
    Ok(desc)
}

/// Poll until the instance accepts connections for the configured user and
/// database, up to the fixed budget.
///
/// Fixed-delay polling, no backoff. The sleep is a tokio sleep so an
/// invocation-level timeout or interrupt can cancel mid-wait.
pub async fn wait_until_ready<R: ContainerRuntime>(
    runtime: &R,
    desc: &ConnectionDescriptor,
    budget: &RetryBudget,
) -> Result<(), ReconcileError> {
    step(&format!(
        "Waiting for postgres to be ready (max {}s)...",
        budget.total().as_secs()
    ));
    for attempt in 1..=budget.max_attempts {
        if runtime.exec_ok(
            &desc.container_name,
            &["pg_isready", "-U", &desc.user, "-d", &desc.database],
        ) {
            ok("Postgres is ready.");
            return Ok(());
        }
        info(&format!(
            "Attempt {attempt}/{} — not ready yet, waiting {}s...",
            budget.max_attempts,
            budget.delay.as_secs()
        ));
        if attempt < budget.max_attempts {
            tokio::time::sleep(budget.delay).await;
        }
    }
    Err(ReconcileError::NotReady {
        container: desc.container_name.clone(),
    })
}
