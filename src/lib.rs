//! fetchzip library
//!
//! Downloads a remote zip archive with progress reporting and cooperative
//! cancellation, then unpacks it. The `fetchzip` binary is a thin front end
//! over [`core::dispatcher::Dispatcher`].

pub mod commands;
pub mod core;
pub mod error;
pub mod logging;
pub mod utils;
