//! pgup — PostgreSQL lifecycle tooling.
//!
//! Guarantees a single running, reachable Postgres container (creating,
//! starting, or adopting one as needed), waits for it to accept connections,
//! then applies or inspects schema migrations against it, or exports its
//! schema.
//!
//! Pipeline: [`config`] resolves the target from the environment,
//! [`reconcile`] drives the container runtime to "one running instance" and
//! gates on readiness, [`migrate`] and [`dump`] run against the ready
//! instance.

pub mod config;
pub mod dump;
pub mod migrate;
pub mod reconcile;
pub mod runtime;
pub mod util;
