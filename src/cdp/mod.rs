//! Chrome DevTools Protocol (CDP) transport
//!
//! The minimal client side of CDP the harness needs: endpoint discovery,
//! target enumeration, flat-session attachment and `Runtime.evaluate`.

pub mod client;
pub mod codec;
pub mod discovery;
pub mod driver;
pub mod types;

pub use client::CdpClient;
pub use discovery::Endpoint;
pub use driver::CdpDriver;
pub use types::*;
