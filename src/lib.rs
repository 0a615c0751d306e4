//! Graph-backed storage for a personal cloud: users own a tree of folders
//! and files, may share subtrees with each other, and authenticate through
//! expiring sessions.
//!
//! The crate is layered the way requests flow through it:
//!
//! * [`manager`] orchestrates multi-step operations over
//! * [`persistence`], backend-neutral controllers and transactions,
//!   implemented by
//! * [`graph`], a property graph kept in SQLite, whose records are derived
//!   from the domain [`model`] through [`mapping`].

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod manager;
pub mod mapping;
pub mod model;
pub mod path;
pub mod persistence;

pub use config::Config;
pub use error::{ErrorKind, PersistenceError, Result};
pub use manager::Managers;
pub use persistence::{PersistenceBackend, PluginRegistry, ShareScope};
