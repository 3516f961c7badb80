//local shortcuts
use crate::*;

//third-party shortcuts

//standard shortcuts
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

//-------------------------------------------------------------------------------------------------------------------

/// Spawns the heartbeat supervisor: one periodic sweep over all registered sessions.
///
/// Each tick either probes a session with a `heartbeat` frame or, when the session's last `heartbeat_response`
/// is older than the timeout, evicts it with close code 1000. The supervisor is the only place evictions
/// happen; ordinary traffic never refreshes the stamp. Stops when the shutdown signal fires.
pub(crate) fn spawn_heartbeat_supervisor(
    router       : Arc<Router>,
    mut shutdown : watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()>
{
    tokio::spawn(async move
    {
        let mut ticker = tokio::time::interval(router.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop
        {
            tokio::select!
            {
                _ = ticker.tick() => (),
                _ = shutdown.changed() =>
                {
                    tracing::debug!("heartbeat supervisor stopping");
                    return;
                }
            }

            // heartbeats are disabled for the whole shutdown sequence, not just after listener teardown
            if router.is_shutting_down()
            {
                tracing::debug!("heartbeat supervisor stopping for shutdown");
                return;
            }

            let now = Instant::now();
            for session in router.sessions_snapshot().await
            {
                if now.duration_since(session.last_heartbeat()) > router.config.heartbeat_timeout
                {
                    tracing::info!(name = %session.name(), "evicting session after heartbeat timeout");
                    session.close(CLOSE_NORMAL, "Heartbeat timeout");
                    if router.deregister(&session).await
                    {
                        router.notify(ServerNotification::ClientTimeout(session.name().to_owned()));
                    }
                    continue;
                }

                if let Err(err) = session.send_frame(&Frame::Heartbeat)
                {
                    tracing::debug!(name = %session.name(), %err, "dropping heartbeat for closed session");
                }
            }
        }
    })
}

//-------------------------------------------------------------------------------------------------------------------
