//! drover - periodic capture-record harvester and retention daemon.
//!
//! A capture record is one primary `Prep_<name>.dat` file plus up to three
//! sibling artifacts spread over parallel directory branches. The daemon
//! discovers new records in a source tree, waits for their directories to
//! stop changing, copies each record's four files into a destination tree
//! (skipping work already done), and reclaims destination space by deleting
//! record directories older than the retention window.

pub mod config;
pub mod copier;
pub mod error;
pub mod paths;
pub mod retention;
pub mod runtime;
pub mod scanner;
pub mod stability;

pub use error::{DroverError, Result};
