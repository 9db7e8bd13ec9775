//! # Keysweep
//!
//! Command line front end for `keysweep-core`: config loading, tracing
//! setup, and the `run`/`status`/`staged`/`import`/`init`/`compact`
//! commands over a JSON snapshot or a redb database.

pub mod cli;
pub mod config;
pub mod logging;
