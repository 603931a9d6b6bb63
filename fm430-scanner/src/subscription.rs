//! Data subscription for unsolicited scan results

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::classifier::ScanData;
use crate::error::ScannerError;

/// Item delivered to a subscriber: a barcode, or why a data frame was unusable
pub type ScanResult = Result<ScanData, ScannerError>;

/// Whether a subscription survives its first delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionMode {
    /// Cleared after one delivery
    OneShot,
    /// Stays registered until replaced, unregistered or cancelled
    Continuous,
}

impl std::fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionMode::OneShot => f.write_str("one-shot"),
            SubscriptionMode::Continuous => f.write_str("continuous"),
        }
    }
}

/// Sending half held by the protocol engine
#[derive(Debug)]
pub struct DataSubscription {
    tx: mpsc::UnboundedSender<ScanResult>,
    mode: SubscriptionMode,
}

impl DataSubscription {
    pub fn new(mode: SubscriptionMode) -> (Self, ScanReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, mode }, ScanReceiver { rx })
    }

    pub fn mode(&self) -> SubscriptionMode {
        self.mode
    }

    /// Hand one item to the subscriber. Returns false if the receiver is gone.
    pub fn deliver(&self, item: ScanResult) -> bool {
        self.tx.send(item).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half handed to the caller.
///
/// Yields `None` once the subscription is cleared (one-shot delivery done,
/// replaced, unregistered, cancelled or device closed).
#[derive(Debug)]
pub struct ScanReceiver {
    rx: mpsc::UnboundedReceiver<ScanResult>,
}

impl ScanReceiver {
    pub async fn recv(&mut self) -> Option<ScanResult> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ScanResult> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ScanReceiver {
    type Item = ScanResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
