//! # hutch-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire hutch workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives that the cgroup drivers, the
//! rootfs builder, and the container registry all build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
