//local shortcuts
use crate::BoxError;

//third-party shortcuts
use serde_json::Value;

//standard shortcuts
use core::fmt::Debug;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

//-------------------------------------------------------------------------------------------------------------------

/// Future returned by a registered RPC handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, BoxError>> + Send>>;

/// A registered RPC handler: `(payload, caller name) -> future of payload or error`.
pub(crate) type HandlerFn = Arc<dyn Fn(Value, String) -> HandlerFuture + Send + Sync>;

//-------------------------------------------------------------------------------------------------------------------

/// Last-writer-wins table of named async RPC handlers.
///
/// Used for the server's handler table and each client's local handler table. Mutable at any time; mutations
/// are not atomic across multiple entries.
#[derive(Default)]
pub(crate) struct HandlerTable
{
    handlers: RwLock<HashMap<String, HandlerFn>>,
}

impl HandlerTable
{
    /// Registers `handler` under `name`, replacing any existing handler of that name.
    pub(crate) fn insert<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let wrapped: HandlerFn = Arc::new(move |data, caller| -> HandlerFuture { Box::pin(handler(data, caller)) });

        let Ok(mut handlers) = self.handlers.write()
        else { tracing::error!("handler table lock is poisoned"); return; };
        handlers.insert(name.into(), wrapped);
    }

    /// Removes the handler registered under `name`. Returns `false` if none was registered.
    pub(crate) fn remove(&self, name: &str) -> bool
    {
        let Ok(mut handlers) = self.handlers.write()
        else { tracing::error!("handler table lock is poisoned"); return false; };
        handlers.remove(name).is_some()
    }

    /// Fetches the handler registered under `name`.
    pub(crate) fn get(&self, name: &str) -> Option<HandlerFn>
    {
        let Ok(handlers) = self.handlers.read()
        else { tracing::error!("handler table lock is poisoned"); return None; };
        handlers.get(name).cloned()
    }
}

impl Debug for HandlerTable
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("HandlerTable").finish_non_exhaustive()
    }
}

//-------------------------------------------------------------------------------------------------------------------
