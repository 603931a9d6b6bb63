//! FIFO command queue with a single in-flight slot
//!
//! Commands wait in `queued` until the device is idle, then move into the
//! in-flight slot together with their response deadline. At most one command
//! is ever in flight because the scanner answers commands one at a time.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::classifier::Response;
use crate::error::ScannerError;
use crate::frame::Frame;

/// Result delivered to the caller of a queued command
pub type CommandResult = Result<Response, ScannerError>;

/// A command waiting for dispatch or for its response
#[derive(Debug)]
pub struct PendingCommand {
    frame: Frame,
    reply: oneshot::Sender<CommandResult>,
}

impl PendingCommand {
    /// Create a command and the future its result will be delivered to
    pub fn new(frame: Frame) -> (Self, PendingResponse) {
        let (reply, rx) = oneshot::channel();
        (Self { frame, reply }, PendingResponse { rx })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Deliver the terminal result. A caller that already dropped its
    /// `PendingResponse` is not an error.
    pub fn complete(self, result: CommandResult) {
        let _ = self.reply.send(result);
    }
}

/// Future resolving to the response (or failure) of one queued command.
///
/// Resolves to [`ScannerError::Cancelled`] if the command is dropped without
/// a result, e.g. by `cancel()` or because the device actor stopped.
#[derive(Debug)]
#[must_use = "a queued command's result is only observable through its PendingResponse"]
pub struct PendingResponse {
    rx: oneshot::Receiver<CommandResult>,
}

impl Future for PendingResponse {
    type Output = CommandResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(ScannerError::Cancelled)))
    }
}

/// What occupies the device while it is busy
#[derive(Debug)]
pub enum InFlight {
    /// Dispatched command awaiting its response
    Active {
        command: PendingCommand,
        deadline: Instant,
    },
    /// Command dropped by `cancel()` after it was written. Its response is
    /// still expected and must not be matched to anything else.
    Orphaned { deadline: Instant },
}

impl InFlight {
    pub fn deadline(&self) -> Instant {
        match self {
            InFlight::Active { deadline, .. } | InFlight::Orphaned { deadline } => *deadline,
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    queued: VecDeque<PendingCommand>,
    in_flight: Option<InFlight>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail
    pub fn push(&mut self, command: PendingCommand) {
        self.queued.push_back(command);
    }

    /// True while a command (or an orphaned slot) awaits a response
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    /// Head of the queue, only when the device is idle
    pub fn next_for_dispatch(&mut self) -> Option<PendingCommand> {
        if self.is_busy() {
            return None;
        }
        self.queued.pop_front()
    }

    /// Mark `command` as written to the device
    pub fn set_in_flight(&mut self, command: PendingCommand, deadline: Instant) {
        debug_assert!(self.in_flight.is_none());
        self.in_flight = Some(InFlight::Active { command, deadline });
    }

    /// Release the in-flight slot, marking the device idle
    pub fn take_in_flight(&mut self) -> Option<InFlight> {
        self.in_flight.take()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().map(InFlight::deadline)
    }

    /// Drop every queued command and orphan the in-flight one.
    ///
    /// Dropped commands resolve to `Cancelled` through their closed reply
    /// channel. Returns the number of commands dropped.
    pub fn cancel(&mut self) -> usize {
        let mut dropped = self.queued.len();
        self.queued.clear();
        if let Some(InFlight::Active { deadline, .. }) = self.in_flight {
            self.in_flight = Some(InFlight::Orphaned { deadline });
            dropped += 1;
        }
        dropped
    }

    /// Drain everything, in-flight first, for terminal failure
    pub fn drain(&mut self) -> Vec<PendingCommand> {
        let mut out = Vec::with_capacity(self.queued.len() + 1);
        if let Some(InFlight::Active { command, .. }) = self.in_flight.take() {
            out.push(command);
        }
        out.extend(self.queued.drain(..));
        out
    }
}
