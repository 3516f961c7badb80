//local shortcuts
use crate::MAX_FRAME_SIZE;

//third-party shortcuts

//standard shortcuts
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

/// Config for the [`Server`](crate::Server).
#[derive(Debug, Copy, Clone)]
pub struct ServerConfig
{
    /// Period between heartbeat probes sent to each session. Defaults to 1 second.
    pub heartbeat_interval: Duration,
    /// Maximum allowed gap since a session's last `heartbeat_response` before it is evicted. Must exceed
    /// [`Self::heartbeat_interval`]. Defaults to 3 seconds.
    pub heartbeat_timeout: Duration,
    /// Max number of concurrent connections (including connections still authenticating). Excess connections
    /// are closed with status 1013. Defaults to 1000.
    pub max_connections: u32,
    /// Drain window granted to clients between the `shutdown` broadcast and the hard close. Defaults to
    /// 5 seconds.
    pub graceful_shutdown_timeout: Duration,
    /// Max message size allowed from clients (bytes). Defaults to 1MiB.
    pub max_msg_size: u32,
}

impl Default for ServerConfig
{
    fn default() -> ServerConfig
    {
        ServerConfig{
                heartbeat_interval        : Duration::from_millis(1000),
                heartbeat_timeout         : Duration::from_millis(3000),
                max_connections           : 1000u32,
                graceful_shutdown_timeout : Duration::from_millis(5000),
                max_msg_size              : MAX_FRAME_SIZE as u32,
            }
    }
}
