//! Completion signals from layers back to the scheduler.
//!
//! Every dispatched change gets a [`Completion`]. Layers call
//! [`Completion::complete`] when the work finishes (or is abandoned); dropping
//! the handle does the same, so a lost handle never leaks a concurrency slot.

use std::fmt;

use crossbeam_channel::Sender;

use crate::change::ChangeKey;

/// Ticket for one dispatch. A completion only clears the active slot it was
/// issued for, so a stale completion from replaced work is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchId(u64);

impl DispatchId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct CompletionMessage {
    pub(crate) id: DispatchId,
    pub(crate) key: ChangeKey,
}

/// One-shot completion handle handed to a layer with each change.
///
/// Movable across threads. The signal is sent at most once: on
/// [`complete`](Self::complete) or on drop, whichever comes first.
pub struct Completion {
    id: DispatchId,
    signal: Option<(Sender<CompletionMessage>, CompletionMessage)>,
}

impl Completion {
    pub(crate) fn tracked(
        sender: Sender<CompletionMessage>,
        id: DispatchId,
        key: ChangeKey,
    ) -> Self {
        Self {
            id,
            signal: Some((sender, CompletionMessage { id, key })),
        }
    }

    /// A handle whose completion nobody waits for (Removes).
    pub(crate) fn untracked(id: DispatchId) -> Self {
        Self { id, signal: None }
    }

    pub fn dispatch_id(&self) -> DispatchId {
        self.id
    }

    /// Report the change as finished.
    pub fn complete(mut self) {
        self.send();
    }

    fn send(&mut self) {
        if let Some((sender, message)) = self.signal.take() {
            // The scheduler may already be gone; nothing to release then.
            let _ = sender.send(message);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.send();
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("id", &self.id)
            .field("pending", &self.signal.is_some())
            .finish()
    }
}
