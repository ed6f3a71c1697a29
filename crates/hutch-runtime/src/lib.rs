//! Container lifecycle for the hutch runtime.
//!
//! [`process::run`] starts containers, [`init::run_init`] is the first
//! code run inside them, [`exec`] re-enters running ones, and
//! [`state::Registry`] with [`container`] keeps the per-container records.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod exec;
pub mod init;
pub mod logs;
pub mod process;
pub mod state;
