//! Sessions, persistence, and CLI for Tabula.
//!
//! This crate provides:
//! - [`Session`] - the working set plus evaluated state, driven by loads,
//!   versioned changes, and reverts
//! - [`SessionConfig`] - evaluation settings
//! - [`ChangeNotification`] - row ranges for grid refresh
//! - Snapshot persistence ([`serialize`]) and JSON project files ([`project`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod notify;
pub mod project;
pub mod serialize;
pub mod session;

pub use config::SessionConfig;
pub use notify::ChangeNotification;
pub use project::Project;
pub use serialize::{SessionState, from_bytes, load_from_file, save_to_file, to_bytes};
pub use session::{Delta, LoadMode, LoadReport, Session, Snapshot};
