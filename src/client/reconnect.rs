//local shortcuts
use crate::*;

//third-party shortcuts

//standard shortcuts
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

/// Backoff delay before reconnect attempt `attempt` (1-based): `min(1s * multiplier^(attempt-1), 30s)`.
pub(crate) fn backoff_delay(attempt: u32, multiplier: f64) -> Duration
{
    const BASE_MS: f64 = 1000.0;
    const CAP_MS: f64 = 30_000.0;

    if multiplier <= 1.0 { return Duration::from_millis(BASE_MS as u64); }

    let mut millis = BASE_MS;
    let mut step = 1u32;
    while step < attempt && millis < CAP_MS
    {
        millis *= multiplier;
        step += 1;
    }
    Duration::from_millis(millis.min(CAP_MS) as u64)
}

//-------------------------------------------------------------------------------------------------------------------

/// Reconnect loop entered after a dirty disconnect.
///
/// Each cycle: wait out the backoff delay, transition to `Connecting`, and retry the full
/// connect-and-authenticate handshake. A successful attempt resets the attempt counter and returns; a failed
/// attempt re-enters `Reconnecting` until the attempt cap is reached. An intentional close observed at any
/// point abandons the loop.
// returns a boxed future instead of `async fn` so its `Send`-ness is an explicit bound rather than an opaque
// type inferred from its body; `establish` spawns a task that (on a dirty disconnect) spawns this function,
// which itself awaits `establish`, and rustc cannot resolve that opaque-type cycle through `tokio::spawn`.
pub(crate) fn run_reconnect(inner: Arc<ClientInner>) -> Pin<Box<dyn Future<Output = ()> + Send>>
{
    Box::pin(async move {
        loop
        {
            if inner.closing.load(Ordering::Acquire)
            {
                inner.set_state(ConnectionState::Disconnected);
                return;
            }

            let attempt = inner.reconnect_attempts.fetch_add(1u32, Ordering::AcqRel) + 1;
            let delay = backoff_delay(attempt, inner.config.reconnect_backoff_multiplier);
            tracing::info!(attempt, ?delay, "reconnecting after backoff");
            tokio::time::sleep(delay).await;

            if inner.closing.load(Ordering::Acquire)
            {
                inner.set_state(ConnectionState::Disconnected);
                return;
            }

            inner.set_state(ConnectionState::Connecting);
            match establish(&inner).await
            {
                Ok(()) => return,
                Err(err) =>
                {
                    tracing::warn!(attempt, %err, "reconnect attempt failed");
                    inner.notify(ClientNotification::Error(format!("reconnect failed: {}", err)));

                    if inner.reconnect_attempts.load(Ordering::Acquire) >= inner.config.max_reconnect_attempts
                    {
                        tracing::warn!("reconnect attempt cap reached, giving up");
                        inner.set_state(ConnectionState::Disconnected);
                        return;
                    }
                    inner.set_state(ConnectionState::Reconnecting);
                }
            }
        }
    })
}

//-------------------------------------------------------------------------------------------------------------------
