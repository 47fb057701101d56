// src/exec/mod.rs

//! External command execution.
//!
//! - [`command`] holds the structured `CommandLine` builder.
//! - [`backend`] defines the `CommandBackend` trait and captured output.
//! - [`process`] is the production backend built on `tokio::process`.

pub mod backend;
pub mod command;
pub mod process;

pub use backend::{BackendFuture, CommandBackend, ProcessOutput};
pub use command::CommandLine;
pub use process::ProcessBackend;
