// crates/sqlite-worker/src/request.rs
// ============================================================================
// Module: Worker Requests
// Description: Units of work queued to an owner thread.
// Purpose: Pair each request with a private, one-shot reply slot.
// Dependencies: crossbeam-channel
// ============================================================================

//! ## Overview
//! A [`Request`] carries its arguments and, when the submitter waits for an
//! answer, a [`ReplySender`]. The matching [`ReplyReceiver`] stays with the
//! submitter. Both halves are consumed on use, so a result is written once
//! by the owner and read once by the thread that created the request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;

use crate::error::WorkerError;
use crate::rows::ExecuteOutput;
use crate::rows::RowFactory;
use crate::rows::TextFactory;
use crate::rows::Value;

// ============================================================================
// SECTION: Reply Slot
// ============================================================================

/// Owner-side half of a reply slot.
pub(crate) struct ReplySender<T> {
    /// Capacity-one channel into the submitter.
    sender: Sender<Result<T, WorkerError>>,
}

impl<T> ReplySender<T> {
    /// Delivers the outcome. A submitter that stopped waiting is ignored.
    pub(crate) fn send(self, outcome: Result<T, WorkerError>) {
        let _ = self.sender.send(outcome);
    }
}

/// Submitter-side half of a reply slot.
pub(crate) struct ReplyReceiver<T> {
    /// Capacity-one channel from the owner.
    receiver: Receiver<Result<T, WorkerError>>,
}

impl<T> ReplyReceiver<T> {
    /// Blocks until the owner answers.
    ///
    /// A dropped sender means the request was discarded without running,
    /// which only happens when the owner thread has gone away.
    pub(crate) fn wait(self) -> Result<T, WorkerError> {
        self.receiver.recv().map_err(|_| {
            WorkerError::Unavailable("owner thread dropped the request unanswered".to_string())
        })?
    }
}

/// Creates a connected reply slot.
pub(crate) fn reply_slot<T>() -> (ReplySender<T>, ReplyReceiver<T>) {
    let (sender, receiver) = crossbeam_channel::bounded(1);
    (
        ReplySender {
            sender,
        },
        ReplyReceiver {
            receiver,
        },
    )
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Work queued to an owner thread, served strictly in FIFO order.
pub(crate) enum Request {
    /// Run one statement with positional parameters.
    Execute {
        /// SQL text.
        query: String,
        /// Values bound to `?` placeholders in order.
        values: Vec<Value>,
        /// Result slot.
        reply: ReplySender<ExecuteOutput>,
    },
    /// Run an unparameterized multi-statement script.
    ExecuteScript {
        /// SQL script.
        script: String,
        /// Result slot.
        reply: ReplySender<ExecuteOutput>,
    },
    /// Change the row shape of later results.
    SetRowFactory {
        /// New row factory.
        factory: RowFactory,
    },
    /// Change text decoding of later results.
    SetTextFactory {
        /// New text factory.
        factory: TextFactory,
    },
    /// Commit the pending transaction; nobody waits for it.
    Commit,
    /// Read the connection's cumulative change counter.
    TotalChanges {
        /// Result slot.
        reply: ReplySender<u64>,
    },
    /// Drain the queue, close the connection, and stop the owner thread.
    Shutdown,
}

impl Request {
    /// Returns a stable label for logging.
    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Execute {
                ..
            } => "execute",
            Self::ExecuteScript {
                ..
            } => "execute_script",
            Self::SetRowFactory {
                ..
            } => "set_row_factory",
            Self::SetTextFactory {
                ..
            } => "set_text_factory",
            Self::Commit => "commit",
            Self::TotalChanges {
                ..
            } => "total_changes",
            Self::Shutdown => "shutdown",
        }
    }
}
