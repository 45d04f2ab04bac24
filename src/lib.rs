//! Drives a live Chrome tab on behalf of a remote form-filling backend.
//!
//! The backend pushes DOM commands over a websocket, a single dispatcher
//! executes them in order against the tab, and the caller that started the
//! run is told when the backend ends it.

pub mod bootstrap;
pub mod brain;
pub mod config;
pub mod diff;
pub mod dispatcher;
pub mod dom;
pub mod driver;
pub mod error;
pub mod executor;
pub mod face;
pub mod hands;
pub mod link;
pub mod protocol;
pub mod registry;
pub mod selector;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use error::{BridgeError, DecodeError};
pub use types::{CallerEvent, Command, StartRequest, TagDescriptor};
