//local shortcuts
use crate::HubError;

//third-party shortcuts
use serde::{Deserialize, Serialize};
use serde_json::Value;

//standard shortcuts
use std::net::SocketAddr;

//-------------------------------------------------------------------------------------------------------------------

/// Close code: clean client disconnect, heartbeat eviction, or displacement by a new session.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code: hard close at the end of a server shutdown.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code: protocol violation detected by the server.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Close code: authentication required or invalid credentials.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Close code: server at capacity or shutting down.
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Maximum frame size accepted on either end of a connection (bytes).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

//-------------------------------------------------------------------------------------------------------------------

/// Router reply when a `request` names an unregistered server handler.
pub(crate) const ERR_HANDLER_NOT_FOUND: &str = "Handler not found";
/// Router reply when a `client_request` targets an unregistered client.
pub(crate) const ERR_TARGET_NOT_FOUND: &str = "Target client not found";
/// Router reply when a `client_request` targets a client whose transport is no longer open.
pub(crate) const ERR_TARGET_NOT_AVAILABLE: &str = "Target client not available";

//-------------------------------------------------------------------------------------------------------------------

/// A wire frame exchanged between the hub and its clients.
///
/// Frames are JSON objects tagged by a required `type` field. Payloads (`data`) are opaque JSON values; neither
/// side validates their shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame
{
    /// First frame on a connection (client to server).
    Auth
    {
        token: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Authentication accepted; `name` is the canonical name the session was registered under.
    AuthSuccess
    {
        name: String,
    },
    /// Server RPC invocation.
    #[serde(rename_all = "camelCase")]
    Request
    {
        id: String,
        function_name: String,
        data: Value,
    },
    /// Peer RPC invocation, routed through the server.
    ///
    /// The server stamps `from_client` with the caller's registered name when forwarding; any value supplied by
    /// the caller is overwritten.
    #[serde(rename_all = "camelCase")]
    ClientRequest
    {
        id: String,
        function_name: String,
        data: Value,
        target_client: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_client: Option<String>,
    },
    /// Reply to a `request` or `client_request`, correlated by `id`.
    #[serde(rename_all = "camelCase")]
    Response
    {
        id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        original_from_client: Option<String>,
    },
    /// Published event; fanned out by the server to every other connected client.
    #[serde(rename_all = "camelCase")]
    Event
    {
        event_name: String,
        data: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_client: Option<String>,
    },
    /// Liveness probe (server to client).
    Heartbeat,
    /// Liveness reply (client to server); the only frame that refreshes a session's heartbeat stamp.
    HeartbeatResponse,
    /// Shutdown announcement; clients should close within `grace_period` milliseconds.
    #[serde(rename_all = "camelCase")]
    Shutdown
    {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        grace_period: Option<u64>,
    },
}

impl Frame
{
    /// The frame's `type` tag, for logging.
    pub fn tag(&self) -> &'static str
    {
        match self
        {
            Frame::Auth{..}              => "auth",
            Frame::AuthSuccess{..}       => "auth_success",
            Frame::Request{..}           => "request",
            Frame::ClientRequest{..}     => "client_request",
            Frame::Response{..}          => "response",
            Frame::Event{..}             => "event",
            Frame::Heartbeat             => "heartbeat",
            Frame::HeartbeatResponse     => "heartbeat_response",
            Frame::Shutdown{..}          => "shutdown",
        }
    }

    /// Serializes the frame to its JSON wire form.
    pub fn encode(&self) -> Result<String, HubError>
    {
        serde_json::to_string(self).map_err(|err| HubError::Protocol(format!("failed encoding frame: {}", err)))
    }

    /// Parses a frame from its JSON wire form.
    ///
    /// Fails with [`HubError::Protocol`] when the `type` tag is unknown or a required field is missing.
    pub fn decode(text: &str) -> Result<Self, HubError>
    {
        serde_json::from_str(text).map_err(|err| HubError::Protocol(format!("malformed frame: {}", err)))
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Make a websocket url: {ws, wss}://[ip:port]/ws.
pub fn make_websocket_url(with_tls: bool, address: SocketAddr) -> Result<url::Url, ()>
{
    let mut url = url::Url::parse("https://example.net").map_err(|_| ())?;
    let scheme = match with_tls { true => "wss", false => "ws" };
    url.set_scheme(scheme)?;
    url.set_ip_host(address.ip())?;
    url.set_port(Some(address.port()))?;
    url.set_path("/ws");
    Ok(url)
}

//-------------------------------------------------------------------------------------------------------------------
