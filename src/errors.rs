//local shortcuts

//third-party shortcuts
use thiserror::Error;

//standard shortcuts
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

/// Boxed error type carried by handler and subscriber results.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

//-------------------------------------------------------------------------------------------------------------------

/// Error taxonomy shared by the hub server and client.
///
/// Every kind carries a human-readable message; [`Self::code`] gives a stable machine-readable discriminator.
#[derive(Debug, Error)]
pub enum HubError
{
    /// Missing or mismatched credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The transport is not open, or a peer became unavailable.
    #[error("connection error: {0}")]
    Connection(String),
    /// The deadline elapsed for a pending request.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The named server function is not registered.
    #[error("{0}")]
    HandlerNotFound(String),
    /// The peer-RPC target is not registered.
    #[error("{0}")]
    ClientNotFound(String),
    /// Malformed or unknown frame.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Underlying transport failure.
    #[error("network error: {0}")]
    Network(String),
    /// The remote handler rejected the request; carries the remote error message verbatim.
    #[error("remote error: {0}")]
    Remote(String),
}

impl HubError
{
    /// Stable code string for the error kind.
    pub fn code(&self) -> &'static str
    {
        match self
        {
            HubError::Authentication(_)  => "AUTHENTICATION_ERROR",
            HubError::Connection(_)      => "CONNECTION_ERROR",
            HubError::Timeout(_)         => "TIMEOUT_ERROR",
            HubError::HandlerNotFound(_) => "HANDLER_NOT_FOUND",
            HubError::ClientNotFound(_)  => "CLIENT_NOT_FOUND",
            HubError::Protocol(_)        => "PROTOCOL_ERROR",
            HubError::Network(_)         => "NETWORK_ERROR",
            HubError::Remote(_)          => "REMOTE_ERROR",
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------
