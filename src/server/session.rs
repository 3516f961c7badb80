//local shortcuts
use crate::*;

//third-party shortcuts
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

//standard shortcuts
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// Drains the session's outbound queue into the websocket sink.
///
/// Single writer per transport: every frame targeting this session funnels through the queue. Stops after
/// forwarding a close frame or when all queue senders have dropped.
async fn run_writer(mut sink: SplitSink<WebSocket, Message>, mut queue: mpsc::UnboundedReceiver<Message>)
{
    while let Some(message) = queue.recv().await
    {
        let is_close = matches!(message, Message::Close(_));
        if sink.send(message).await.is_err()
        {
            tracing::debug!("session writer stopped: transport is gone");
            break;
        }
        if is_close { break; }
    }
}

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// Waits for the connection's first frame, which must be `auth`, and validates it against the credential store.
///
/// Returns the canonical client name on success. On failure returns the close reason to send with status 1008,
/// or `None` when the transport died on its own.
async fn await_auth(stream: &mut SplitStream<WebSocket>, router: &Router) -> Result<String, Option<String>>
{
    let message = loop
    {
        match stream.next().await
        {
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Err(None),
            Some(Ok(message)) => break message,
        }
    };

    let Message::Text(text) = message
    else
    {
        tracing::debug!("rejecting non-text frame before authentication");
        return Err(Some("Authentication required".into()));
    };

    let frame = match Frame::decode(text.as_str())
    {
        Ok(frame) => frame,
        Err(err) =>
        {
            tracing::debug!(%err, "rejecting malformed frame before authentication");
            return Err(Some("Authentication required".into()));
        }
    };

    let tag = frame.tag();
    let Frame::Auth{ token, name } = frame
    else
    {
        tracing::debug!(tag, "rejecting frame received before authentication");
        return Err(Some("Authentication required".into()));
    };

    router.authenticate(&token, name.as_deref()).map_err(|err|
    {
        tracing::info!(%err, "authentication failed");
        Some("Invalid credentials".into())
    })
}

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// One live, authenticated connection.
///
/// Holds only transport and liveness state: the assigned client name, the outbound write queue, and the
/// monotonic stamp of the last heartbeat reply. Registered in the router's session registry after
/// authentication; never before.
#[derive(Debug)]
pub(crate) struct Session
{
    /// client name assigned at authentication
    name: String,
    /// outbound frame queue, drained by this session's writer task
    sender: mpsc::UnboundedSender<Message>,
    /// monotonic stamp of the last `heartbeat_response`; only the heartbeat supervisor acts on it
    last_heartbeat: Mutex<Instant>,
}

impl Session
{
    pub(crate) fn new(name: String, sender: mpsc::UnboundedSender<Message>) -> Self
    {
        Session{ name, sender, last_heartbeat: Mutex::new(Instant::now()) }
    }

    pub(crate) fn name(&self) -> &str
    {
        &self.name
    }

    /// Queues a frame for this session's writer task.
    pub(crate) fn send_frame(&self, frame: &Frame) -> Result<(), HubError>
    {
        let text = frame.encode()?;
        self.sender
            .send(Message::Text(Utf8Bytes::from(text)))
            .map_err(|_| HubError::Connection(format!("session '{}' is closed", self.name)))
    }

    /// Queues a close frame. Best-effort: a session whose transport already died is left alone.
    pub(crate) fn close(&self, code: u16, reason: &str)
    {
        let frame = CloseFrame{ code, reason: Utf8Bytes::from(reason.to_owned()) };
        if self.sender.send(Message::Close(Some(frame))).is_err()
        {
            tracing::debug!(name = %self.name, "failed closing session; transport already gone");
        }
    }

    /// Tests whether the outbound queue still reaches a live writer task.
    pub(crate) fn is_open(&self) -> bool
    {
        !self.sender.is_closed()
    }

    pub(crate) fn refresh_heartbeat(&self)
    {
        let Ok(mut stamp) = self.last_heartbeat.lock()
        else { tracing::error!(name = %self.name, "heartbeat stamp lock is poisoned"); return; };
        *stamp = Instant::now();
    }

    pub(crate) fn last_heartbeat(&self) -> Instant
    {
        match self.last_heartbeat.lock()
        {
            Ok(stamp) => *stamp,
            Err(_)    => Instant::now(),
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Runs one websocket connection from accept to teardown.
///
/// Flow: spawn the writer, demand authentication, register with the router (displacing any prior session of
/// the same name), then pump inbound frames into the router until the transport ends.
pub(crate) async fn drive_session(socket: WebSocket, router: Arc<Router>)
{
    let (sink, mut stream) = socket.split();
    let (sender, receiver) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(run_writer(sink, receiver));

    match await_auth(&mut stream, &router).await
    {
        Ok(name) =>
        {
            let session = Arc::new(Session::new(name, sender.clone()));
            router.register(session.clone()).await;

            // the canonical name is authoritative for the client
            let frame = Frame::AuthSuccess{ name: session.name().to_owned() };
            if session.send_frame(&frame).is_ok()
            {
                tracing::info!(name = %session.name(), "session registered");
                router.notify(ServerNotification::ClientConnected(session.name().to_owned()));

                run_session(&mut stream, &session, &router).await;
            }

            // a session evicted by the supervisor, displaced, or removed with its user was already
            // deregistered; only report the disconnect when this task removed the registration itself
            if router.deregister(&session).await
            {
                tracing::info!(name = %session.name(), "session deregistered");
                router.notify(ServerNotification::ClientDisconnected(session.name().to_owned()));
            }
        }
        Err(Some(reason)) =>
        {
            tracing::info!(%reason, "closing unauthenticated connection");
            let frame = CloseFrame{ code: CLOSE_POLICY_VIOLATION, reason: Utf8Bytes::from(reason) };
            let _ = sender.send(Message::Close(Some(frame)));
        }
        Err(None) => ()
    }

    // dropping the last queue sender lets the writer task finish
    drop(sender);
    let _ = writer.await;
}

//-------------------------------------------------------------------------------------------------------------------

async fn run_session(stream: &mut SplitStream<WebSocket>, session: &Arc<Session>, router: &Arc<Router>)
{
    while let Some(result) = stream.next().await
    {
        match result
        {
            Ok(Message::Text(text)) =>
            {
                match Frame::decode(text.as_str())
                {
                    Ok(frame) => router.dispatch(session, frame).await,
                    Err(err) => tracing::debug!(name = %session.name(), %err, "dropping malformed frame"),
                }
            }
            Ok(Message::Binary(_)) =>
            {
                tracing::debug!(name = %session.name(), "received binary frame, closing session");
                session.close(CLOSE_PROTOCOL_ERROR, "Binary frames not supported");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => (),
            Ok(Message::Close(_)) => break,
            Err(err) =>
            {
                tracing::debug!(name = %session.name(), %err, "session transport error");
                break;
            }
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------
