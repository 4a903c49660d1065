//! picview core - main window logic for an image viewer
//!
//! This crate holds the window state, the asynchronous job lifecycle and
//! UI reconciliation with zero toolkit dependencies. A front end supplies
//! a [`window::Toolkit`] and drives a [`window::WindowController`].

pub mod config;
pub mod images;
pub mod jobs;
pub mod logging;
pub mod signals;
pub mod window;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
