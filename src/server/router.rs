//local shortcuts
use crate::*;

//third-party shortcuts
use serde_json::Value;

//standard shortcuts
use core::fmt::Debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::mpsc;
use tokio::sync::RwLock;

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

fn failure_response(id: String, error: &str) -> Frame
{
    Frame::Response{
            id,
            success              : false,
            data                 : None,
            error                : Some(error.into()),
            original_from_client : None,
        }
}

//-------------------------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------------------------

/// Central registry and frame dispatcher.
///
/// Owns the name -> session registry, the server handler table, the server event bus, and the credential
/// store. Sessions borrow the router to dispatch inbound frames; the router reaches sessions only through
/// their outbound queues.
pub(crate) struct Router
{
    /// server config
    pub(crate) config: ServerConfig,
    /// injectable name/secret store
    credentials: StdRwLock<CredentialStore>,
    /// registered sessions by client name
    registry: RwLock<HashMap<String, Arc<Session>>>,
    /// named server RPC handlers
    pub(crate) handlers: HandlerTable,
    /// server-side subscribers for client-published events
    pub(crate) events: EventBus,
    /// lifecycle notifications to the server owner
    notifications: mpsc::UnboundedSender<ServerNotification>,
    /// number of live connections, including connections still authenticating
    connection_count: AtomicU32,
    /// set once shutdown begins; new connections are rejected with 1013
    shutting_down: AtomicBool,
}

impl Router
{
    pub(crate) fn new(
        config        : ServerConfig,
        credentials   : CredentialStore,
        notifications : mpsc::UnboundedSender<ServerNotification>,
    ) -> Self
    {
        Router{
                config,
                credentials      : StdRwLock::new(credentials),
                registry         : RwLock::new(HashMap::default()),
                handlers         : HandlerTable::default(),
                events           : EventBus::new(),
                notifications,
                connection_count : AtomicU32::new(0u32),
                shutting_down    : AtomicBool::new(false),
            }
    }

    /// Forwards a lifecycle notification to the server owner.
    pub(crate) fn notify(&self, notification: ServerNotification)
    {
        if self.notifications.send(notification).is_err()
        {
            tracing::debug!("dropping server notification; receiver was dropped");
        }
    }

    /// Validates an `auth` frame against the credential store.
    ///
    /// Token-only authentication is permitted; when a name is also supplied it must match the name the store
    /// associates with the token. Returns the canonical name.
    pub(crate) fn authenticate(&self, token: &str, name: Option<&str>) -> Result<String, HubError>
    {
        let Ok(credentials) = self.credentials.read()
        else
        {
            tracing::error!("credential store lock is poisoned");
            return Err(HubError::Authentication("credential store unavailable".into()));
        };

        let Some(canonical) = credentials.name_for_token(token)
        else { return Err(HubError::Authentication("unknown token".into())); };

        if let Some(name) = name
        {
            if name != canonical
            {
                return Err(HubError::Authentication(format!("name '{}' does not match token", name)));
            }
        }

        Ok(canonical.to_owned())
    }

    /// Registers an authenticated session under its name, displacing any prior session of that name.
    pub(crate) async fn register(&self, session: Arc<Session>)
    {
        let name = session.name().to_owned();
        let displaced = { self.registry.write().await.insert(name.clone(), session) };

        if let Some(prior) = displaced
        {
            tracing::info!(%name, "displacing prior session");
            prior.close(CLOSE_NORMAL, "Displaced by new connection");
            self.notify(ServerNotification::ClientDisconnected(name));
        }
    }

    /// Removes the registration for `session` if it still holds its name.
    ///
    /// Returns `false` when the session was already deregistered (eviction, displacement, user removal) or
    /// the name now resolves to a newer session.
    pub(crate) async fn deregister(&self, session: &Arc<Session>) -> bool
    {
        let mut registry = self.registry.write().await;
        match registry.get(session.name())
        {
            Some(current) if Arc::ptr_eq(current, session) =>
            {
                registry.remove(session.name());
                true
            }
            _ => false,
        }
    }

    pub(crate) async fn find_session(&self, name: &str) -> Option<Arc<Session>>
    {
        self.registry.read().await.get(name).cloned()
    }

    /// Snapshot of all registered sessions.
    pub(crate) async fn sessions_snapshot(&self) -> Vec<Arc<Session>>
    {
        self.registry.read().await.values().cloned().collect()
    }

    /// Empties the registry and returns the sessions that were registered.
    pub(crate) async fn drain_sessions(&self) -> Vec<Arc<Session>>
    {
        self.registry.write().await.drain().map(|(_, session)| session).collect()
    }

    /// Registers or replaces a credential record.
    pub(crate) fn set_user(&self, name: &str, token: &str)
    {
        let Ok(mut credentials) = self.credentials.write()
        else { tracing::error!("credential store lock is poisoned"); return; };
        credentials.set_user(name, token);
    }

    /// Removes a credential record and evicts any live session of that name.
    pub(crate) async fn remove_user(&self, name: &str) -> bool
    {
        let removed = {
            let Ok(mut credentials) = self.credentials.write()
            else { tracing::error!("credential store lock is poisoned"); return false; };
            credentials.remove_user(name)
        };

        let session = { self.registry.write().await.remove(name) };
        if let Some(session) = session
        {
            tracing::info!(%name, "evicting session for removed user");
            session.close(CLOSE_POLICY_VIOLATION, "Credentials revoked");
            self.notify(ServerNotification::ClientDisconnected(name.to_owned()));
        }

        removed
    }

    pub(crate) fn try_acquire_connection(&self) -> bool
    {
        let max = self.config.max_connections;
        self.connection_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| (count < max).then(|| count + 1))
            .is_ok()
    }

    pub(crate) fn release_connection(&self)
    {
        self.connection_count.fetch_sub(1u32, Ordering::AcqRel);
    }

    pub(crate) fn num_connections(&self) -> u32
    {
        self.connection_count.load(Ordering::Acquire)
    }

    pub(crate) fn begin_shutdown(&self) -> bool
    {
        !self.shutting_down.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_shutting_down(&self) -> bool
    {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Dispatches one inbound frame from an authenticated session.
    pub(crate) async fn dispatch(&self, session: &Arc<Session>, frame: Frame)
    {
        match frame
        {
            Frame::Request{ id, function_name, data } =>
            {
                self.handle_request(session, id, function_name, data).await;
            }
            Frame::ClientRequest{ id, function_name, data, target_client, .. } =>
            {
                self.forward_client_request(session, id, function_name, data, target_client).await;
            }
            frame @ Frame::Response{..} =>
            {
                self.route_response(frame).await;
            }
            Frame::Event{ event_name, data, .. } =>
            {
                self.handle_event(session, event_name, data).await;
            }
            Frame::HeartbeatResponse =>
            {
                session.refresh_heartbeat();
            }
            frame =>
            {
                tracing::debug!(name = %session.name(), tag = frame.tag(), "dropping unexpected frame");
            }
        }
    }

    /// Invokes a server handler and replies with exactly one `response` frame.
    ///
    /// A missing handler or a handler error becomes a `success=false` reply; neither tears down the session.
    async fn handle_request(&self, session: &Arc<Session>, id: String, function_name: String, data: Value)
    {
        let Some(handler) = self.handlers.get(&function_name)
        else
        {
            tracing::debug!(name = %session.name(), %function_name, "request for unknown handler");
            if let Err(err) = session.send_frame(&failure_response(id, ERR_HANDLER_NOT_FOUND))
            {
                tracing::debug!(%err, "dropping response to closed session");
            }
            return;
        };

        let response = match handler(data, session.name().to_owned()).await
        {
            Ok(value) => Frame::Response{
                    id,
                    success              : true,
                    data                 : Some(value),
                    error                : None,
                    original_from_client : None,
                },
            Err(err) =>
            {
                tracing::debug!(name = %session.name(), %function_name, %err, "server handler failed");
                failure_response(id, &err.to_string())
            }
        };

        if let Err(err) = session.send_frame(&response)
        {
            tracing::debug!(%err, "dropping response to closed session");
        }
    }

    /// Forwards a peer RPC to the target session, stamping the caller's name into `fromClient`.
    async fn forward_client_request(
        &self,
        session       : &Arc<Session>,
        id            : String,
        function_name : String,
        data          : Value,
        target_client : String,
    ){
        let Some(target) = self.find_session(&target_client).await
        else
        {
            tracing::debug!(name = %session.name(), %target_client, "peer request for unknown client");
            if let Err(err) = session.send_frame(&failure_response(id, ERR_TARGET_NOT_FOUND))
            {
                tracing::debug!(%err, "dropping response to closed session");
            }
            return;
        };

        // any caller-supplied value is overwritten; the registered name is authoritative
        let forward = Frame::ClientRequest{
                id            : id.clone(),
                function_name,
                data,
                target_client,
                from_client   : Some(session.name().to_owned()),
            };

        if !target.is_open() || target.send_frame(&forward).is_err()
        {
            tracing::debug!(name = %session.name(), target = %target.name(), "peer request target unavailable");
            if let Err(err) = session.send_frame(&failure_response(id, ERR_TARGET_NOT_AVAILABLE))
            {
                tracing::debug!(%err, "dropping response to closed session");
            }
        }
    }

    /// Routes a peer-RPC reply back to the original caller named by `originalFromClient`.
    ///
    /// The frame is forwarded verbatim; the router does not inspect `success` or `data`.
    async fn route_response(&self, frame: Frame)
    {
        let Frame::Response{ original_from_client: Some(origin), .. } = &frame
        else
        {
            tracing::debug!("dropping response with no originalFromClient");
            return;
        };

        let Some(target) = self.find_session(origin).await
        else
        {
            tracing::debug!(%origin, "dropping response for unknown origin client");
            return;
        };

        if let Err(err) = target.send_frame(&frame)
        {
            tracing::debug!(%origin, %err, "dropping response for closed origin session");
        }
    }

    /// Delivers a client event to server-side subscribers and fans it out to every other registered session.
    async fn handle_event(&self, session: &Arc<Session>, event_name: String, data: Value)
    {
        let origin = session.name().to_owned();

        // server-side subscribers observe the payload as published
        self.events.emit(&event_name, data.clone(), Some(origin.as_str()));

        // object payloads also carry the origin inline
        let mut data = data;
        if let Value::Object(map) = &mut data
        {
            map.insert("fromClient".into(), Value::String(origin.clone()));
        }

        let frame = Frame::Event{ event_name, data, from_client: Some(origin.clone()) };
        for peer in self.sessions_snapshot().await
        {
            if peer.name() == origin { continue; }
            if let Err(err) = peer.send_frame(&frame)
            {
                tracing::debug!(peer = %peer.name(), %err, "dropping event for closed session");
            }
        }
    }
}

impl Debug for Router
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

//-------------------------------------------------------------------------------------------------------------------
