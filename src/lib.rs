//! osiris-lite: run container workloads on a remote host over SSH.
//!
//! - [`remote`]: host-alias resolution, authentication, direct and relayed
//!   transports, and buffered/streamed command execution.
//! - [`jobs`]: the workflow verbs (build and run, status, kill, logs) composed
//!   from shell commands issued through a [`remote::CommandRunner`].

#![deny(clippy::unwrap_used)]

pub mod jobs;
pub mod remote;
