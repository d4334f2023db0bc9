//! Chat-driven 3D model editing.
//!
//! Chat text is translated into an [`translate::EditCommand`] and relayed as
//! line-delimited JSON-RPC to a scene tool, which applies it on a single
//! executor thread and exports the edited model.

pub mod cli;
pub mod config;
pub mod error;
pub mod ipc;
pub mod scene;
pub mod service;
pub mod session;
pub mod translate;

pub use error::{MeshchatError, Result};
