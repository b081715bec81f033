//! lparctl-core: Core library for lparctl
//!
//! Manages a partitioned POWER server through its HMC/IVM console by running
//! shell commands over SSH and keeping a stable UUID for every partition.
//!
//! # Architecture
//!
//! ```text
//! caller command text → exec → Transport (ssh2, non-blocking) → console
//!                                   ↑
//!            UuidTable ── scp push/pull (remote mirror of the table)
//! ```
//!
//! # Modules
//!
//! - `nonblock`: would-block retry combinator around the readiness wait
//! - `transport`: transport and user-auth primitives
//! - `session`: libssh2-backed transport (connect, handshake, poll)
//! - `ssh_code`: libssh2 error codes
//! - `auth`: public key with password fallback
//! - `exec`: one command per channel, trimmed and integer variants
//! - `scp`: push/pull of small files
//! - `uuid_table`: the id↔uuid correspondence table and its record format
//! - `inventory`: live partition enumeration and system type detection
//! - `target`: `phyp://user@host/managed_system` parsing
//! - `connection`: explicit connection handle tying everything together
//! - `config`: lparctl.toml loading
//! - `logging`: tracing subscriber setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod exec;
pub mod inventory;
pub mod logging;
pub mod nonblock;
pub mod scp;
pub mod session;
pub mod ssh_code;
pub mod target;
pub mod transport;
pub mod uuid_table;

#[cfg(test)]
pub(crate) mod fake;

pub use error::{Error, Result};
