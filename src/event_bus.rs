//local shortcuts
use crate::BoxError;

//third-party shortcuts
use serde_json::{json, Value};

//standard shortcuts
use core::fmt::Debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

//-------------------------------------------------------------------------------------------------------------------

/// Internal meta-event fired when a subscriber returns an error.
///
/// The payload is `{ "event": <original event name>, "error": <error message> }`.
pub const HANDLER_ERROR_EVENT: &str = "handlerError";

/// Default soft cap on subscribers per event name (see [`EventBus::set_max_listeners`]).
pub const DEFAULT_MAX_LISTENERS: usize = 10;

//-------------------------------------------------------------------------------------------------------------------

/// Identifier of a subscription, returned by [`EventBus::on`]/[`EventBus::once`] and consumed by
/// [`EventBus::off`].
pub type SubscriptionId = u64;

type SubscriberFn = Arc<dyn Fn(Value, Option<String>) -> Result<(), BoxError> + Send + Sync>;

#[derive(Clone)]
struct Subscriber
{
    id: SubscriptionId,
    callback: SubscriberFn,
}

#[derive(Default)]
struct SubscriberTables
{
    /// persistent subscribers, in insertion order
    persistent: HashMap<String, Vec<Subscriber>>,
    /// one-shot subscribers, in insertion order; an entry is removed before its callback runs
    one_shot: HashMap<String, Vec<Subscriber>>,
}

//-------------------------------------------------------------------------------------------------------------------

/// Subscriber registry for named events with opaque JSON payloads.
///
/// Used on both ends of the hub: the server's bus observes client-published events, the client's bus observes
/// events fanned out by the server. Dispatch order is persistent subscribers (insertion order) then one-shot
/// subscribers. A subscriber returning `Err` is logged and reported via [`HANDLER_ERROR_EVENT`]; it never
/// prevents the remaining subscribers from running.
pub struct EventBus
{
    tables: Mutex<SubscriberTables>,
    next_id: AtomicU64,
    max_listeners: AtomicUsize,
}

impl EventBus
{
    /// Makes an empty bus.
    pub fn new() -> Self
    {
        EventBus{
                tables        : Mutex::new(SubscriberTables::default()),
                next_id       : AtomicU64::new(1u64),
                max_listeners : AtomicUsize::new(DEFAULT_MAX_LISTENERS),
            }
    }

    /// Registers a persistent subscriber for `event_name`.
    pub fn on<F>(&self, event_name: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(Value, Option<String>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribe(event_name.into(), Arc::new(callback), false)
    }

    /// Registers a one-shot subscriber for `event_name`.
    ///
    /// The subscription is removed before its callback runs, so it fires at most once even if the callback
    /// re-emits the event.
    pub fn once<F>(&self, event_name: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(Value, Option<String>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribe(event_name.into(), Arc::new(callback), true)
    }

    /// Removes one subscription (by id) or every subscription for `event_name` (when `id` is `None`).
    ///
    /// Returns `true` if anything was removed.
    pub fn off(&self, event_name: &str, id: Option<SubscriptionId>) -> bool
    {
        let Ok(mut tables) = self.tables.lock()
        else { tracing::error!("event bus mutex is poisoned"); return false; };
        let tables = &mut *tables;

        match id
        {
            Some(id) =>
            {
                let mut removed = false;
                for table in [&mut tables.persistent, &mut tables.one_shot]
                {
                    if let Some(subs) = table.get_mut(event_name)
                    {
                        let before = subs.len();
                        subs.retain(|sub| sub.id != id);
                        removed |= subs.len() != before;
                        if subs.is_empty() { table.remove(event_name); }
                    }
                }
                removed
            }
            None =>
            {
                let removed_persistent = tables.persistent.remove(event_name).is_some();
                let removed_one_shot   = tables.one_shot.remove(event_name).is_some();
                removed_persistent || removed_one_shot
            }
        }
    }

    /// Removes every subscription for `event_name`, or every subscription on the bus when `event_name` is `None`.
    pub fn remove_all_listeners(&self, event_name: Option<&str>)
    {
        let Ok(mut tables) = self.tables.lock()
        else { tracing::error!("event bus mutex is poisoned"); return; };

        match event_name
        {
            Some(name) =>
            {
                tables.persistent.remove(name);
                tables.one_shot.remove(name);
            }
            None =>
            {
                tables.persistent.clear();
                tables.one_shot.clear();
            }
        }
    }

    /// Tests whether `event_name` has any subscribers.
    pub fn has_listeners(&self, event_name: &str) -> bool
    {
        self.listener_count(event_name) > 0
    }

    /// Number of subscribers (persistent + one-shot) for `event_name`.
    pub fn listener_count(&self, event_name: &str) -> usize
    {
        let Ok(tables) = self.tables.lock()
        else { tracing::error!("event bus mutex is poisoned"); return 0; };

        tables.persistent.get(event_name).map_or(0, Vec::len)
            + tables.one_shot.get(event_name).map_or(0, Vec::len)
    }

    /// Names of all events with at least one subscriber.
    pub fn event_names(&self) -> Vec<String>
    {
        let Ok(tables) = self.tables.lock()
        else { tracing::error!("event bus mutex is poisoned"); return Vec::new(); };

        let mut names: Vec<String> = tables.persistent.keys().cloned().collect();
        for name in tables.one_shot.keys()
        {
            if !names.iter().any(|n| n == name) { names.push(name.clone()); }
        }
        names
    }

    /// Adjusts the soft cap on subscribers per event name.
    ///
    /// Exceeding the cap logs a warning but does not block registration.
    pub fn set_max_listeners(&self, max: usize)
    {
        self.max_listeners.store(max, Ordering::Relaxed);
    }

    /// Dispatches `event_name` to its subscribers.
    ///
    /// One-shot entries are cleared from the table before any callback runs. Subscriber errors are logged and
    /// re-reported as [`HANDLER_ERROR_EVENT`]; errors from `handlerError` subscribers themselves are only logged.
    pub fn emit(&self, event_name: &str, data: Value, from_client: Option<&str>)
    {
        let (persistent, one_shot) = {
            let Ok(mut tables) = self.tables.lock()
            else { tracing::error!("event bus mutex is poisoned"); return; };

            let persistent = tables.persistent.get(event_name).cloned().unwrap_or_default();
            let one_shot   = tables.one_shot.remove(event_name).unwrap_or_default();
            (persistent, one_shot)
        };

        for subscriber in persistent.iter().chain(one_shot.iter())
        {
            let Err(err) = (subscriber.callback)(data.clone(), from_client.map(String::from)) else { continue; };
            tracing::warn!(event_name, %err, "event subscriber failed");

            if event_name != HANDLER_ERROR_EVENT
            {
                self.emit(
                        HANDLER_ERROR_EVENT,
                        json!({ "event": event_name, "error": err.to_string() }),
                        from_client,
                    );
            }
        }
    }

    fn subscribe(&self, event_name: String, callback: SubscriberFn, one_shot: bool) -> SubscriptionId
    {
        let id = self.next_id.fetch_add(1u64, Ordering::Relaxed);

        let Ok(mut tables) = self.tables.lock()
        else { tracing::error!("event bus mutex is poisoned"); return id; };

        let max = self.max_listeners.load(Ordering::Relaxed);
        let count = tables.persistent.get(&event_name).map_or(0, Vec::len)
            + tables.one_shot.get(&event_name).map_or(0, Vec::len);
        if count >= max
        {
            tracing::warn!(event_name, count, max, "subscriber count exceeds max listeners");
        }

        let table = match one_shot { true => &mut tables.one_shot, false => &mut tables.persistent };
        table.entry(event_name).or_default().push(Subscriber{ id, callback });
        id
    }
}

impl Default for EventBus
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl Debug for EventBus
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

//-------------------------------------------------------------------------------------------------------------------
