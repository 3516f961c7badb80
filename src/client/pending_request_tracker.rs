//local shortcuts
use crate::HubError;

//third-party shortcuts
use serde_json::Value;

//standard shortcuts
use std::collections::HashMap;
use tokio::sync::oneshot;

//-------------------------------------------------------------------------------------------------------------------

/// Resolves one pending request with its terminal outcome.
pub(crate) type PendingResolver = oneshot::Sender<Result<Value, HubError>>;

//-------------------------------------------------------------------------------------------------------------------

/// Tracks pending requests so each settles exactly once.
///
/// Ids increase monotonically within a connection and restart when a new connection is established. Removal
/// from the map is the atomic claim: the first of {reply, deadline, transport close} removes the entry and
/// owns settlement; later claimants become no-ops.
#[derive(Debug, Default)]
pub(crate) struct PendingRequestTracker
{
    /// counter for requests
    request_counter: u64,
    /// pending requests
    pending: HashMap<u64, PendingResolver>,
}

impl PendingRequestTracker
{
    /// Reserves the next request id and registers its resolver.
    pub(crate) fn insert_with_next_id(&mut self, resolver: PendingResolver) -> u64
    {
        self.request_counter += 1;
        let id = self.request_counter;
        self.pending.insert(id, resolver);
        id
    }

    /// Claims the entry for `id`; the claimant owns settling the request.
    pub(crate) fn remove(&mut self, id: u64) -> Option<PendingResolver>
    {
        self.pending.remove(&id)
    }

    /// Claims and resolves the entry for `id`. Returns `false` when the entry was already claimed.
    pub(crate) fn settle(&mut self, id: u64, result: Result<Value, HubError>) -> bool
    {
        let Some(resolver) = self.pending.remove(&id) else { return false; };
        let _ = resolver.send(result);
        true
    }

    /// Rejects every outstanding request with a connection error.
    pub(crate) fn reject_all(&mut self)
    {
        for (_, resolver) in self.pending.drain()
        {
            let _ = resolver.send(Err(HubError::Connection("connection closed".into())));
        }
    }

    /// Restarts id allocation for a fresh connection, rejecting anything still outstanding.
    pub(crate) fn reset(&mut self)
    {
        self.reject_all();
        self.request_counter = 0;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize
    {
        self.pending.len()
    }
}

//-------------------------------------------------------------------------------------------------------------------
