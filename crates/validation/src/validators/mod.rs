//! Declarative validators, one per observable property of the node.
//!
//! Each validator is a pure composition step: render caller parameters into
//! the platform's command template, execute through the scenario's channel,
//! apply a comparison policy. Validators keep no state between calls and
//! never retry; the only retry loops in this crate are the explicit
//! convergence polls.

pub mod files;
pub mod gpu;
pub mod kubelet;
pub mod network;
pub mod npd;
pub mod packages;
pub mod services;
pub mod windows;

pub use files::*;
pub use gpu::*;
pub use kubelet::*;
pub use network::*;
pub use npd::*;
pub use packages::*;
pub use services::*;
pub use windows::*;
