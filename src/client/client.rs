//local shortcuts
use crate::*;

//third-party shortcuts
use serde_json::Value;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

//standard shortcuts
use core::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::sync::{mpsc, oneshot, Mutex};

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// State shared between the client API and its connection tasks.
pub(crate) struct ClientInner
{
    /// client config
    pub(crate) config: ClientConfig,
    /// connection state; transitions are serialized behind this lock
    state: StdMutex<ConnectionState>,
    /// canonical name assigned by the server at authentication
    assigned_name: StdRwLock<Option<String>>,
    /// in-flight request table
    pub(crate) pending: StdMutex<PendingRequestTracker>,
    /// local handlers consulted for inbound peer requests
    pub(crate) handlers: HandlerTable,
    /// subscribers for events fanned out by the server
    pub(crate) events: EventBus,
    /// lifecycle notifications to the client owner
    notifications: mpsc::UnboundedSender<ClientNotification>,
    /// outbound frame queue of the current connection; `None` while disconnected
    writer: StdMutex<Option<mpsc::UnboundedSender<Message>>>,
    /// reconnect attempts since the last successful connection
    pub(crate) reconnect_attempts: AtomicU32,
    /// set once the client decides to close; suppresses reconnection
    pub(crate) closing: AtomicBool,
    /// connection epoch; stale connection tasks check it before touching shared state
    pub(crate) epoch: AtomicU64,
}

impl ClientInner
{
    fn new(config: ClientConfig, notifications: mpsc::UnboundedSender<ClientNotification>) -> Self
    {
        ClientInner{
                config,
                state              : StdMutex::new(ConnectionState::Disconnected),
                assigned_name      : StdRwLock::new(None),
                pending            : StdMutex::new(PendingRequestTracker::default()),
                handlers           : HandlerTable::default(),
                events             : EventBus::new(),
                notifications,
                writer             : StdMutex::new(None),
                reconnect_attempts : AtomicU32::new(0u32),
                closing            : AtomicBool::new(false),
                epoch              : AtomicU64::new(0u64),
            }
    }

    /// Forwards a lifecycle notification to the client owner.
    pub(crate) fn notify(&self, notification: ClientNotification)
    {
        if self.notifications.send(notification).is_err()
        {
            tracing::debug!("dropping client notification; receiver was dropped");
        }
    }

    pub(crate) fn state_snapshot(&self) -> ConnectionState
    {
        match self.state.lock()
        {
            Ok(state) => *state,
            Err(_)    => ConnectionState::Disconnected,
        }
    }

    /// Transitions the connection state, reporting the change. Same-state transitions are silent no-ops.
    pub(crate) fn set_state(&self, new: ConnectionState)
    {
        let old = {
            let Ok(mut state) = self.state.lock()
            else { tracing::error!("client state lock is poisoned"); return; };
            let old = *state;
            if old == new { return; }
            *state = new;
            old
        };

        tracing::debug!(?old, ?new, "client state change");
        self.notify(ClientNotification::StateChange{ new, old });
    }

    pub(crate) fn name(&self) -> Option<String>
    {
        match self.assigned_name.read()
        {
            Ok(name) => name.clone(),
            Err(_)   => None,
        }
    }

    pub(crate) fn set_name(&self, name: String)
    {
        let Ok(mut assigned) = self.assigned_name.write()
        else { tracing::error!("client name lock is poisoned"); return; };
        *assigned = Some(name);
    }

    /// Queues a frame for the current connection's writer task.
    pub(crate) fn send_frame(&self, frame: &Frame) -> Result<(), HubError>
    {
        let text = frame.encode()?;

        let Ok(writer) = self.writer.lock()
        else { return Err(HubError::Connection("client internal error".into())); };
        let Some(sender) = writer.as_ref()
        else { return Err(HubError::Connection("client is not connected".into())); };

        sender
            .send(Message::Text(Utf8Bytes::from(text)))
            .map_err(|_| HubError::Connection("client is not connected".into()))
    }

    /// Installs the writer queue of a freshly established connection.
    pub(crate) fn install_writer(&self, sender: mpsc::UnboundedSender<Message>)
    {
        let Ok(mut writer) = self.writer.lock()
        else { tracing::error!("client writer lock is poisoned"); return; };
        *writer = Some(sender);
    }

    /// Removes the writer queue; subsequent sends fail with a connection error.
    pub(crate) fn clear_writer(&self) -> Option<mpsc::UnboundedSender<Message>>
    {
        match self.writer.lock()
        {
            Ok(mut writer) => writer.take(),
            Err(_)         => None,
        }
    }

    /// Rejects every in-flight request with a connection error.
    pub(crate) fn reject_pending(&self)
    {
        let Ok(mut pending) = self.pending.lock()
        else { tracing::error!("pending request lock is poisoned"); return; };
        pending.reject_all();
    }

    /// Sends a request-shaped frame and awaits its terminal outcome: the first of reply, deadline, or
    /// connection loss settles it.
    pub(crate) async fn roundtrip<F>(&self, build: F) -> Result<Value, HubError>
    where
        F: FnOnce(u64) -> Frame,
    {
        // register the resolver before sending so a fast reply cannot miss it
        let (request_id, receiver) = {
            let Ok(mut pending) = self.pending.lock()
            else { return Err(HubError::Connection("client internal error".into())); };
            let (sender, receiver) = oneshot::channel();
            let request_id = pending.insert_with_next_id(sender);
            (request_id, receiver)
        };

        if let Err(err) = self.send_frame(&build(request_id))
        {
            // the request never reached the wire; claim our own entry back
            if let Ok(mut pending) = self.pending.lock() { pending.remove(request_id); }
            return Err(err);
        }

        match tokio::time::timeout(self.config.request_timeout, receiver).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HubError::Connection("connection closed".into())),
            Err(_) =>
            {
                // the deadline won the race; claiming the entry turns a late reply into a no-op
                if let Ok(mut pending) = self.pending.lock() { pending.remove(request_id); }
                Err(HubError::Timeout(self.config.request_timeout))
            }
        }
    }

    /// Closes the connection intentionally: clean close frame, prompt settlement of in-flight requests, no
    /// reconnection.
    pub(crate) async fn close_self(&self, reason: &str)
    {
        if self.closing.swap(true, Ordering::AcqRel)
        {
            tracing::debug!("client is already closing");
            return;
        }

        tracing::info!(%reason, "client closing self");

        let sender = self.clear_writer();
        if sender.is_none() && self.state_snapshot() == ConnectionState::Disconnected
        {
            // the transport was already torn down; nothing left to close
            return;
        }

        self.set_state(ConnectionState::Disconnecting);
        if let Some(sender) = sender
        {
            let frame = CloseFrame{ code: CloseCode::Normal, reason: Utf8Bytes::from(reason.to_owned()) };
            let _ = sender.send(Message::Close(Some(frame)));
            // wait for the writer task to flush the close frame and finish
            sender.closed().await;
        }

        self.reject_pending();
        self.set_state(ConnectionState::Disconnected);
    }
}

impl Debug for ClientInner
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ClientInner").field("state", &self.state_snapshot()).finish_non_exhaustive()
    }
}

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// A client of a hub [`Server`](crate::Server).
///
/// Produce one with [`Client::connect`]. One websocket connection multiplexes server RPC
/// ([`Client::request`]), peer RPC ([`Client::request_client`] outbound, [`Client::add_handler`] inbound),
/// events ([`Client::send_event`] outbound, [`Client::events`] inbound), and heartbeats. After a dirty
/// disconnect the client reconnects with capped exponential backoff; [`Client::disconnect`] and server-side
/// clean closes suppress reconnection.
#[derive(Debug)]
pub struct Client
{
    inner: Arc<ClientInner>,
    notifications: Mutex<mpsc::UnboundedReceiver<ClientNotification>>,
}

impl Client
{
    /// Connects to a hub and authenticates.
    ///
    /// Resolves once `auth_success` was received; the canonical name carried by that frame is adopted as
    /// [`Client::name`]. Fails without retrying when the dial, the handshake, or authentication fails.
    pub async fn connect(config: ClientConfig) -> Result<Client, HubError>
    {
        let parsed = url::Url::parse(&config.url)
            .map_err(|err| HubError::Connection(format!("invalid url: {}", err)))?;
        if !matches!(parsed.scheme(), "ws" | "wss")
        {
            return Err(HubError::Connection(format!("unsupported url scheme '{}'", parsed.scheme())));
        }

        let (notification_sender, notification_receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(ClientInner::new(config, notification_sender));

        inner.set_state(ConnectionState::Connecting);
        if let Err(err) = establish(&inner).await
        {
            inner.set_state(ConnectionState::Disconnected);
            return Err(err);
        }

        Ok(Client{ inner, notifications: Mutex::new(notification_receiver) })
    }

    /// Invokes the named server handler and awaits its reply.
    ///
    /// Exactly one terminal outcome: the reply, [`HubError::Timeout`] when the deadline elapses (a late reply
    /// is dropped), or [`HubError::Connection`] when the transport closes first.
    pub async fn request(&self, function_name: impl Into<String>, data: Value) -> Result<Value, HubError>
    {
        let function_name = function_name.into();
        self.inner.roundtrip(|id| Frame::Request{ id: id.to_string(), function_name, data }).await
    }

    /// Invokes a named handler on another client, routed through the server.
    ///
    /// Settles like [`Client::request`]; an unknown or unavailable target settles with
    /// [`HubError::ClientNotFound`].
    pub async fn request_client(
        &self,
        target_client : impl Into<String>,
        function_name : impl Into<String>,
        data          : Value,
    ) -> Result<Value, HubError>
    {
        let target_client = target_client.into();
        let function_name = function_name.into();
        let from_client = self.inner.name();
        self.inner
            .roundtrip(|id| Frame::ClientRequest{
                    id: id.to_string(),
                    function_name,
                    data,
                    target_client,
                    from_client,
                })
            .await
    }

    /// Publishes an event. Fire-and-forget: no response is expected, and the event is dropped with a warning
    /// when the client is not connected.
    pub fn send_event(&self, event_name: impl Into<String>, data: Value)
    {
        let event_name = event_name.into();
        if self.inner.state_snapshot() != ConnectionState::Connected
        {
            tracing::warn!(%event_name, "dropping event: client is not connected");
            return;
        }

        let frame = Frame::Event{ event_name, data, from_client: None };
        if let Err(err) = self.inner.send_frame(&frame)
        {
            tracing::warn!(%err, "dropping event: client is not connected");
        }
    }

    /// Registers a local handler for inbound peer requests, replacing any existing handler of that name.
    ///
    /// The handler receives the request payload and the calling client's name. It runs in its own task, so it
    /// may itself issue requests through this client.
    pub fn add_handler<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        self.inner.handlers.insert(name, handler);
    }

    /// Removes the local handler registered under `name`.
    pub fn remove_handler(&self, name: &str) -> bool
    {
        self.inner.handlers.remove(name)
    }

    /// The client-side event bus: subscribers observe events fanned out by the server as
    /// `(payload, Some(publisher name))`.
    pub fn events(&self) -> &EventBus
    {
        &self.inner.events
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState
    {
        self.inner.state_snapshot()
    }

    /// Tests if the client is connected.
    pub fn is_connected(&self) -> bool
    {
        self.state() == ConnectionState::Connected
    }

    /// The canonical name assigned by the server at authentication.
    pub fn name(&self) -> Option<String>
    {
        self.inner.name()
    }

    /// Disconnects intentionally: clean close (code 1000), prompt settlement of in-flight requests with
    /// [`HubError::Connection`], and no reconnection.
    pub async fn disconnect(&self)
    {
        self.inner.close_self("client disconnect").await;
    }

    /// Gets the next lifecycle notification, waiting for one if necessary.
    pub async fn next_notification(&self) -> Option<ClientNotification>
    {
        self.notifications.lock().await.recv().await
    }

    /// Gets the next lifecycle notification if one is buffered.
    pub fn try_next_notification(&self) -> Option<ClientNotification>
    {
        self.notifications.try_lock().ok()?.try_recv().ok()
    }
}

//-------------------------------------------------------------------------------------------------------------------
