//documentation
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![allow(rustdoc::redundant_explicit_links)]
#![doc = include_str!("../README.md")]
#[allow(unused_imports)]
use crate as simplehub;

//module tree
mod credentials;
mod errors;
mod event_bus;
mod handlers;
mod protocol;

#[cfg(feature = "client")]
mod client;

#[cfg(feature = "server")]
mod server;

//API exports
pub use credentials::*;
pub use errors::*;
pub use event_bus::*;
pub use handlers::*;
pub use protocol::*;

#[cfg(feature = "client")]
pub use client::*;

#[cfg(feature = "server")]
pub use server::*;
