//! # Formats Module
//!
//! Serialized forms of an installer database.
//! File I/O lives in the app layer; everything here is pure.

mod snapshot;

pub use snapshot::*;
