//local shortcuts

//third-party shortcuts

//standard shortcuts

//-------------------------------------------------------------------------------------------------------------------

/// Emitted by a [`Server`](crate::Server) when client lifecycle changes occur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotification
{
    /// A client authenticated and its session was registered.
    ClientConnected(String),
    /// A registered client's session ended (clean close, transport loss, displacement, or credential
    /// revocation).
    ClientDisconnected(String),
    /// A registered client was evicted for missing heartbeats.
    ClientTimeout(String),
    /// The server encountered an error it could survive.
    Error(String),
    /// The server finished shutting down. No further notifications follow.
    Closed,
}
