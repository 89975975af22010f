//! winprobe - end-to-end checks for multi-window desktop web applications
//!
//! Attaches to an application over the Chrome DevTools Protocol, resolves
//! its windows by URL and observes their state from scenario suites.

pub mod actions;
pub mod cdp;
pub mod cli;
pub mod commands;
pub mod common;
pub mod connection;
pub mod driver;
pub mod observe;
pub mod testing;
pub mod window;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use connection::{Connection, Context};
pub use driver::{Driver, Target};
pub use window::{Resolution, WindowTable};
