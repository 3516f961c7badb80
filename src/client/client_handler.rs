//local shortcuts
use crate::*;

//third-party shortcuts
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

//standard shortcuts
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

//-------------------------------------------------------------------------------------------------------------------

pub(crate) type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// Drains the client's outbound queue into the websocket sink.
///
/// Single writer per transport. Stops after forwarding a close frame or when all queue senders have dropped.
async fn run_writer(mut sink: SplitSink<WsStream, Message>, mut queue: mpsc::UnboundedReceiver<Message>)
{
    while let Some(message) = queue.recv().await
    {
        let is_close = matches!(message, Message::Close(_));
        if sink.send(message).await.is_err()
        {
            tracing::debug!("client writer stopped: transport is gone");
            break;
        }
        if is_close { break; }
    }
}

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// Waits for the server's verdict on the `auth` frame just sent.
async fn await_auth_success(stream: &mut SplitStream<WsStream>) -> Result<String, HubError>
{
    loop
    {
        match stream.next().await
        {
            Some(Ok(Message::Text(text))) =>
            {
                match Frame::decode(text.as_str())?
                {
                    Frame::AuthSuccess{ name } => return Ok(name),
                    // the supervisor may probe, and peers may publish, before auth_success reaches the wire
                    Frame::Heartbeat | Frame::Event{..} =>
                    {
                        tracing::debug!("skipping frame received before auth_success");
                        continue;
                    }
                    frame =>
                    {
                        return Err(HubError::Authentication(
                                format!("expected auth_success, received {}", frame.tag())
                            ));
                    }
                }
            }
            Some(Ok(Message::Close(frame))) =>
            {
                let reason = frame.map(|frame| frame.reason.to_string()).unwrap_or_default();
                return Err(HubError::Authentication(format!("server rejected connection: {}", reason)));
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(HubError::Network(format!("handshake failed: {}", err))),
            None => return Err(HubError::Connection("connection closed during authentication".into())),
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// Dials the hub, authenticates, and brings up the connection tasks (writer, reader, heartbeat ticker).
///
/// Used for the initial connect and for every reconnect attempt. On success the client is `Connected` with a
/// fresh request id sequence and a reset reconnect-attempt counter.
pub(crate) async fn establish(inner: &Arc<ClientInner>) -> Result<(), HubError>
{
    if inner.closing.load(Ordering::Acquire)
    {
        return Err(HubError::Connection("client is closing".into()));
    }

    let (socket, _response) = tokio_tungstenite::connect_async(inner.config.url.as_str())
        .await
        .map_err(|err| HubError::Network(format!("failed connecting: {}", err)))?;
    let (mut sink, mut stream) = socket.split();

    // authenticate on the bare sink; the writer task only exists for authenticated connections
    let auth = Frame::Auth{ token: inner.config.token.clone(), name: inner.config.name.clone() };
    let text = auth.encode()?;
    sink.send(Message::Text(Utf8Bytes::from(text)))
        .await
        .map_err(|err| HubError::Network(format!("failed sending auth: {}", err)))?;

    let assigned = await_auth_success(&mut stream).await?;
    tracing::info!(name = %assigned, "authenticated");
    inner.set_name(assigned);

    // fresh connection: restart request id allocation
    {
        let Ok(mut pending) = inner.pending.lock()
        else { return Err(HubError::Connection("client internal error".into())); };
        pending.reset();
    }

    let (sender, receiver) = mpsc::unbounded_channel::<Message>();
    inner.install_writer(sender);
    let epoch = inner.epoch.fetch_add(1u64, Ordering::AcqRel) + 1;

    tokio::spawn(run_writer(sink, receiver));
    tokio::spawn(run_client(inner.clone(), stream, epoch));
    tokio::spawn(run_heartbeat(inner.clone(), epoch));

    inner.reconnect_attempts.store(0u32, Ordering::Release);
    inner.set_state(ConnectionState::Connected);
    inner.notify(ClientNotification::Connected);
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// Pumps inbound frames until the transport ends, then runs disconnect handling.
pub(crate) async fn run_client(inner: Arc<ClientInner>, mut stream: SplitStream<WsStream>, epoch: u64)
{
    // 1006: the transport died without a close frame
    let mut close_code: u16 = 1006;
    let mut close_reason = String::new();

    while let Some(result) = stream.next().await
    {
        match result
        {
            Ok(Message::Text(text)) =>
            {
                match Frame::decode(text.as_str())
                {
                    Ok(frame) => handle_frame(&inner, frame),
                    Err(err) => tracing::debug!(%err, "dropping malformed frame from server"),
                }
            }
            Ok(Message::Close(frame)) =>
            {
                if let Some(frame) = frame
                {
                    close_code = u16::from(frame.code);
                    close_reason = frame.reason.to_string();
                }
                break;
            }
            Ok(_) => (),
            Err(err) =>
            {
                tracing::debug!(%err, "client transport error");
                inner.notify(ClientNotification::Error(format!("transport error: {}", err)));
                break;
            }
        }
    }

    handle_disconnect(inner, epoch, close_code, close_reason).await;
}

//-------------------------------------------------------------------------------------------------------------------

fn handle_frame(inner: &Arc<ClientInner>, frame: Frame)
{
    match frame
    {
        Frame::Response{ id, success, data, error, .. } =>
        {
            resolve_response(inner, id, success, data, error);
        }
        Frame::ClientRequest{ id, function_name, data, from_client, .. } =>
        {
            dispatch_peer_request(inner, id, function_name, data, from_client);
        }
        Frame::Event{ event_name, data, from_client } =>
        {
            inner.events.emit(&event_name, data, from_client.as_deref());
        }
        Frame::Heartbeat =>
        {
            if let Err(err) = inner.send_frame(&Frame::HeartbeatResponse)
            {
                tracing::debug!(%err, "failed answering heartbeat");
            }
        }
        Frame::Shutdown{ reason, grace_period } =>
        {
            handle_shutdown(inner, reason, grace_period);
        }
        frame =>
        {
            tracing::debug!(tag = frame.tag(), "dropping unexpected frame from server");
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Maps a `success=false` response's error string onto the error taxonomy.
fn remote_error(message: String) -> HubError
{
    if message == ERR_HANDLER_NOT_FOUND
    {
        return HubError::HandlerNotFound(message);
    }
    if message == ERR_TARGET_NOT_FOUND || message == ERR_TARGET_NOT_AVAILABLE
    {
        return HubError::ClientNotFound(message);
    }
    HubError::Remote(message)
}

//-------------------------------------------------------------------------------------------------------------------

fn resolve_response(inner: &Arc<ClientInner>, id: String, success: bool, data: Option<Value>, error: Option<String>)
{
    let Ok(request_id) = id.parse::<u64>()
    else { tracing::debug!(%id, "dropping response with malformed id"); return; };

    let result = match success
    {
        true  => Ok(data.unwrap_or(Value::Null)),
        false => Err(remote_error(error.unwrap_or_else(|| "request failed".into()))),
    };

    let Ok(mut pending) = inner.pending.lock()
    else { tracing::error!("pending request lock is poisoned"); return; };
    if !pending.settle(request_id, result)
    {
        // already settled by deadline or connection loss; late replies are dropped
        tracing::debug!(request_id, "dropping response for unknown request");
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Runs the local handler for an inbound peer request in its own task and replies through the server.
///
/// `originalFromClient` echoes the inbound `fromClient` so the server can route the reply back to the caller.
fn dispatch_peer_request(
    inner         : &Arc<ClientInner>,
    id            : String,
    function_name : String,
    data          : Value,
    from_client   : Option<String>,
){
    let inner = inner.clone();
    tokio::spawn(async move
    {
        let caller = from_client.clone().unwrap_or_default();
        let result = match inner.handlers.get(&function_name)
        {
            None =>
            {
                tracing::debug!(%function_name, "peer request for unknown local handler");
                Err(ERR_HANDLER_NOT_FOUND.to_string())
            }
            Some(handler) => handler(data, caller).await.map_err(|err| err.to_string()),
        };

        let response = match result
        {
            Ok(value) => Frame::Response{
                    id,
                    success              : true,
                    data                 : Some(value),
                    error                : None,
                    original_from_client : from_client,
                },
            Err(error) => Frame::Response{
                    id,
                    success              : false,
                    data                 : None,
                    error                : Some(error),
                    original_from_client : from_client,
                },
        };

        if let Err(err) = inner.send_frame(&response)
        {
            tracing::debug!(%err, "failed sending peer response");
        }
    });
}

//-------------------------------------------------------------------------------------------------------------------

/// Schedules a clean local close once the announced grace period (capped at 5 seconds) elapses.
fn handle_shutdown(inner: &Arc<ClientInner>, reason: Option<String>, grace_period: Option<u64>)
{
    let grace = Duration::from_millis(grace_period.unwrap_or(5000).min(5000));
    tracing::info!(?reason, ?grace, "server announced shutdown");
    inner.notify(ClientNotification::ServerShutdown{ reason, grace_period: grace });

    let inner = inner.clone();
    tokio::spawn(async move
    {
        tokio::time::sleep(grace).await;
        inner.close_self("server shutdown").await;
    });
}

//-------------------------------------------------------------------------------------------------------------------

/// Proactively sends `heartbeat_response` frames while connected, keeping intermediaries' idle timers warm
/// even when the server's probes are delayed. Stops when the connection it belongs to is gone.
pub(crate) async fn run_heartbeat(inner: Arc<ClientInner>, epoch: u64)
{
    let mut ticker = tokio::time::interval(inner.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;  //the first tick completes immediately

    loop
    {
        ticker.tick().await;

        if inner.epoch.load(Ordering::Acquire) != epoch { return; }
        if inner.state_snapshot() != ConnectionState::Connected { return; }

        if let Err(err) = inner.send_frame(&Frame::HeartbeatResponse)
        {
            tracing::debug!(%err, "stopping heartbeat ticker");
            return;
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Cleanup after the transport ends: settle in-flight requests, report the disconnect, and decide between
/// staying down (clean close or attempt cap) and entering the reconnect loop.
async fn handle_disconnect(inner: Arc<ClientInner>, epoch: u64, close_code: u16, close_reason: String)
{
    // only the current connection's read task performs teardown
    if inner.epoch.load(Ordering::Acquire) != epoch { return; }

    let was_closing = inner.closing.load(Ordering::Acquire);
    inner.clear_writer();
    inner.reject_pending();

    tracing::info!(close_code, %close_reason, "client disconnected");
    inner.notify(ClientNotification::Disconnected{ code: close_code, reason: close_reason });

    // 1000 and 1001 are intentional closes and never trigger reconnection
    let clean = was_closing || close_code == CLOSE_NORMAL || close_code == CLOSE_GOING_AWAY;
    if clean
    {
        inner.set_state(ConnectionState::Disconnected);
        return;
    }

    if inner.reconnect_attempts.load(Ordering::Acquire) >= inner.config.max_reconnect_attempts
    {
        tracing::warn!("not reconnecting: attempt cap reached");
        inner.set_state(ConnectionState::Disconnected);
        return;
    }

    inner.set_state(ConnectionState::Reconnecting);
    tokio::spawn(run_reconnect(inner.clone()));
}

//-------------------------------------------------------------------------------------------------------------------
