//local shortcuts
use crate::*;

//third-party shortcuts
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use serde_json::Value;

//standard shortcuts
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

async fn websocket_handler(
    axum::extract::State(router) : axum::extract::State<Arc<Router>>,
    upgrade                      : axum::extract::ws::WebSocketUpgrade,
) -> impl axum::response::IntoResponse
{
    let max_frame_size = router.config.max_msg_size as usize;
    upgrade
        .max_message_size(max_frame_size)
        .on_upgrade(move |socket| handle_connection(socket, router))
}

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

async fn reject_connection(mut socket: WebSocket, reason: &str)
{
    tracing::debug!(%reason, "rejecting connection");
    let frame = CloseFrame{ code: CLOSE_TRY_AGAIN_LATER, reason: Utf8Bytes::from(reason.to_owned()) };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

async fn handle_connection(socket: WebSocket, router: Arc<Router>)
{
    if router.is_shutting_down()
    {
        reject_connection(socket, "Server is shutting down").await;
        return;
    }

    if !router.try_acquire_connection()
    {
        reject_connection(socket, "Server at capacity").await;
        return;
    }

    drive_session(socket, router.clone()).await;
    router.release_connection();
}

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// A hub server: accepts authenticated clients, routes server RPC, peer RPC, and events between them, and
/// supervises liveness.
///
/// Produce one with [`Server::start`]. Dropping the server stops the listener and the heartbeat supervisor
/// without notifying connected clients; call [`Server::graceful_shutdown`] for an orderly teardown.
#[derive(Debug)]
pub struct Server
{
    /// central registry and dispatcher; sessions hold clones
    router: Arc<Router>,
    /// the server's address
    local_addr: SocketAddr,
    /// lifecycle notifications produced by the router and its sessions
    notifications: Mutex<mpsc::UnboundedReceiver<ServerNotification>>,
    /// fires once the drain window has ended; stops the heartbeat supervisor and the listener
    shutdown_signal: watch::Sender<bool>,
    /// claimed by the first `graceful_shutdown` caller
    shutdown_claimed: AtomicBool,
    /// completion signal shared by concurrent `graceful_shutdown` callers
    shutdown_done_tx: watch::Sender<bool>,
    shutdown_done: watch::Receiver<bool>,
}

impl Server
{
    /// Launches a server listening for websocket connections on `address` at path `/ws`.
    pub async fn start<A>(
        address     : A,
        credentials : CredentialStore,
        config      : ServerConfig,
    ) -> Result<Server, HubError>
    where
        A: tokio::net::ToSocketAddrs,
    {
        let (notification_sender, notification_receiver) = mpsc::unbounded_channel();
        let router = Arc::new(Router::new(config, credentials, notification_sender));

        let listener = tokio::net::TcpListener::bind(address)
            .await
            .map_err(|err| HubError::Network(format!("failed binding listener: {}", err)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| HubError::Network(format!("failed reading listener address: {}", err)))?;

        let (shutdown_signal, shutdown_listener) = watch::channel(false);

        // liveness sweep
        spawn_heartbeat_supervisor(router.clone(), shutdown_listener.clone());

        // websocket acceptor
        let app = axum::Router::new()
            .route("/ws", axum::routing::get(websocket_handler))
            .with_state(router.clone());
        let mut serve_shutdown = shutdown_listener;
        let serve_router = router.clone();
        tokio::spawn(async move
        {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { let _ = serve_shutdown.changed().await; });
            if let Err(err) = serve.await
            {
                tracing::error!(%err, "server stopped running with error");
                serve_router.notify(ServerNotification::Error(format!("listener failed: {}", err)));
            }
        });

        let (shutdown_done_tx, shutdown_done) = watch::channel(false);

        tracing::info!(%local_addr, "new server created");
        Ok(Server{
                router,
                local_addr,
                notifications: Mutex::new(notification_receiver),
                shutdown_signal,
                shutdown_claimed: AtomicBool::new(false),
                shutdown_done_tx,
                shutdown_done,
            })
    }

    /// Registers a server RPC handler under `name`, replacing any existing handler of that name.
    ///
    /// The handler receives the request payload and the caller's client name. Handler errors are returned to
    /// the caller as `success=false` responses.
    pub fn add_handler<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        self.router.handlers.insert(name, handler);
    }

    /// Removes the server RPC handler registered under `name`.
    pub fn remove_handler(&self, name: &str) -> bool
    {
        self.router.handlers.remove(name)
    }

    /// The server-side event bus: subscribers observe every client-published event as
    /// `(payload, Some(publisher name))`.
    pub fn events(&self) -> &EventBus
    {
        &self.router.events
    }

    /// Registers or replaces a credential record. Registering an identical record is a no-op.
    pub fn set_user(&self, name: &str, token: &str)
    {
        self.router.set_user(name, token);
    }

    /// Removes a credential record and evicts any live session of that name (close code 1008).
    pub async fn remove_user(&self, name: &str) -> bool
    {
        self.router.remove_user(name).await
    }

    /// Gets the next lifecycle notification, waiting for one if necessary.
    ///
    /// Returns `None` once the server is gone and all buffered notifications were consumed.
    pub async fn next_notification(&self) -> Option<ServerNotification>
    {
        self.notifications.lock().await.recv().await
    }

    /// Gets the next lifecycle notification if one is buffered.
    pub fn try_next_notification(&self) -> Option<ServerNotification>
    {
        self.notifications.try_lock().ok()?.try_recv().ok()
    }

    /// Gets the server's address.
    pub fn local_addr(&self) -> SocketAddr
    {
        self.local_addr
    }

    /// Gets the server's websocket url.
    pub fn url(&self) -> url::Url
    {
        make_websocket_url(false, self.local_addr).unwrap()
    }

    /// Number of live connections, including connections still authenticating.
    pub fn num_connections(&self) -> u32
    {
        self.router.num_connections()
    }

    /// Tests whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool
    {
        self.router.is_shutting_down()
    }

    /// Shuts the server down: announce, drain, then hard-close.
    ///
    /// Idempotent; concurrent callers share one pending completion. The sequence: reject new connections with
    /// 1013 and disable heartbeats, broadcast a `shutdown` frame carrying `reason` and the configured grace
    /// period, wait out the grace period, hard-close surviving transports with 1001, and tear down the
    /// listener. Returns once the sequence has completed.
    pub async fn graceful_shutdown(&self, reason: impl Into<String>)
    {
        if self.shutdown_claimed.swap(true, Ordering::AcqRel)
        {
            let mut done = self.shutdown_done.clone();
            if !*done.borrow() { let _ = done.changed().await; }
            return;
        }

        let reason = reason.into();
        tracing::info!(%reason, "server shutting down");

        // reject new connections with 1013 and disable heartbeats; the listener keeps accepting (and
        // rejecting) until the drain window ends
        self.router.begin_shutdown();

        // announce the drain window
        let grace = self.router.config.graceful_shutdown_timeout;
        let frame = Frame::Shutdown{
                reason       : Some(reason),
                grace_period : Some(grace.as_millis() as u64),
            };
        for session in self.router.sessions_snapshot().await
        {
            if let Err(err) = session.send_frame(&frame)
            {
                tracing::debug!(name = %session.name(), %err, "dropping shutdown frame for closed session");
            }
        }

        tokio::time::sleep(grace).await;

        // hard close whatever survived the drain window, then tear down the listener
        for session in self.router.drain_sessions().await
        {
            session.close(CLOSE_GOING_AWAY, "Server shutting down");
        }
        let _ = self.shutdown_signal.send(true);

        self.router.notify(ServerNotification::Closed);
        let _ = self.shutdown_done_tx.send(true);
    }
}

//-------------------------------------------------------------------------------------------------------------------
