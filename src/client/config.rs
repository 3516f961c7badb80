//local shortcuts

//third-party shortcuts

//standard shortcuts
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

/// Config for the [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig
{
    /// Websocket url of the hub, e.g. `ws://127.0.0.1:8080/ws`.
    pub url: String,
    /// Authentication token checked against the server's credential store.
    pub token: String,
    /// Client name to claim. Optional: when absent the server assigns the canonical name associated with the
    /// token, and the client adopts it.
    pub name: Option<String>,
    /// Maximum number of reconnect attempts after a dirty disconnect. Defaults to 5.
    pub max_reconnect_attempts: u32,
    /// Period between proactive `heartbeat_response` frames while connected. Defaults to 1 second.
    pub heartbeat_interval: Duration,
    /// Deadline for each pending request. Defaults to 10 seconds.
    pub request_timeout: Duration,
    /// Base multiplier for exponential reconnect backoff. Defaults to 1.5.
    pub reconnect_backoff_multiplier: f64,
}

impl ClientConfig
{
    /// Makes a config with default tunables.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self
    {
        ClientConfig{
                url                          : url.into(),
                token                        : token.into(),
                name                         : None,
                max_reconnect_attempts       : 5u32,
                heartbeat_interval           : Duration::from_millis(1000),
                request_timeout              : Duration::from_millis(10_000),
                reconnect_backoff_multiplier : 1.5f64,
            }
    }
}
