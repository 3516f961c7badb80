//module tree
mod config;
mod heartbeat;
mod router;
mod server;
mod server_event;
mod session;

//API exports
pub use config::*;
pub(crate) use heartbeat::*;
pub(crate) use router::*;
pub use server::*;
pub use server_event::*;
pub(crate) use session::*;
