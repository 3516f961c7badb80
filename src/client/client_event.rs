//local shortcuts

//third-party shortcuts

//standard shortcuts
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

/// Connection state of a [`Client`](crate::Client).
///
/// Transitions are serialized per client instance; every transition is reported via
/// [`ClientNotification::StateChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState
{
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

//-------------------------------------------------------------------------------------------------------------------

/// Emitted by a [`Client`](crate::Client) on lifecycle changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientNotification
{
    /// The client connected and authenticated. Also emitted after a successful reconnect.
    Connected,
    /// The transport closed; carries the close code and reason (code 1006 when the transport died without a
    /// close frame).
    Disconnected
    {
        code: u16,
        reason: String,
    },
    /// The client encountered an error it could survive.
    Error(String),
    /// The connection state changed.
    StateChange
    {
        new: ConnectionState,
        old: ConnectionState,
    },
    /// The server announced a shutdown; the client will close itself once the grace period elapses.
    ServerShutdown
    {
        reason: Option<String>,
        grace_period: Duration,
    },
}
