use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use powsrv_frame::Frame;

use crate::error::ClientError;

pub(crate) type Reply = Result<Frame, ClientError>;

/// Request ids usable on one connection; 0 is never handed out.
pub(crate) const MAX_IN_FLIGHT: usize = u8::MAX as usize;

/// Requests waiting for their reply, keyed by request id.
///
/// Id allocation and registration happen under the same lock, so a fresh id
/// is never one that is still pending.
pub(crate) struct PendingTable {
    next_id: u8,
    entries: HashMap<u8, SyncSender<Reply>>,
    closed: Option<String>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
            closed: None,
        }
    }

    /// Allocate the next free id and register a one-shot handle for it.
    pub(crate) fn register(&mut self) -> Result<(u8, Receiver<Reply>), ClientError> {
        if let Some(reason) = &self.closed {
            return Err(ClientError::Disconnected(reason.clone()));
        }
        if self.entries.len() >= MAX_IN_FLIGHT {
            return Err(ClientError::Busy);
        }

        loop {
            let id = self.next_id;
            self.next_id = if id == u8::MAX { 1 } else { id + 1 };
            if !self.entries.contains_key(&id) {
                let (tx, rx) = sync_channel(1);
                self.entries.insert(id, tx);
                return Ok((id, rx));
            }
        }
    }

    /// Drop the entry for `id`, if any.
    pub(crate) fn remove(&mut self, id: u8) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Hand `reply` to the caller waiting on `id`.
    ///
    /// Returns false when nobody is waiting (late reply after a timeout).
    pub(crate) fn complete(&mut self, id: u8, reply: Reply) -> bool {
        match self.entries.remove(&id) {
            Some(tx) => {
                // The receiver may already be gone if the caller gave up.
                let _ = tx.try_send(reply);
                true
            }
            None => false,
        }
    }

    /// Fail every pending call and refuse new ones.
    pub(crate) fn close(&mut self, reason: &str) {
        if self.closed.is_none() {
            self.closed = Some(reason.to_string());
        }
        for (_, tx) in self.entries.drain() {
            let _ = tx.try_send(Err(ClientError::Disconnected(reason.to_string())));
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
