//module tree
mod client;
mod client_event;
mod client_handler;
mod config;
mod pending_request_tracker;
mod reconnect;

//API exports
pub use client::*;
pub use client_event::*;
pub(crate) use client_handler::*;
pub use config::*;
pub(crate) use pending_request_tracker::*;
pub(crate) use reconnect::*;
