//! Extension Config Library
//!
//! A key-value configuration store merged over explicit defaults, backed by
//! pluggable storage, with handlers rebuilt on every storage change.

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod paths;
pub mod storage;
