//! Protocol engine: queue discipline, report routing and timeouts
//!
//! `ProtocolEngine` is plain synchronous state. It never spawns or waits;
//! whoever owns it (the device actor in [`crate::device`]) feeds it facade
//! requests, transport events and deadline expiries one at a time, which is
//! what keeps the FIFO and busy/idle invariants intact.
//!
//! ```text
//!   enqueue ─► [queued ...] ─dispatch─► in-flight ─response─► caller
//!                                          │
//!   report ─► is_data_frame? ─ yes ─► subscription (queue untouched)
//!                            no ──► in-flight slot
//! ```

use std::sync::Arc;
use std::time::Duration;

use fm430_transport::{Transport, TransportError};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::classifier::{decode_data_frame, decode_response_frame, is_data_frame};
use crate::error::ScannerError;
use crate::frame::Frame;
use crate::queue::{CommandQueue, InFlight, PendingCommand};
use crate::subscription::{DataSubscription, SubscriptionMode};

/// Snapshot of the engine state for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    /// Commands waiting behind the in-flight one
    pub queued: usize,
    /// A command is awaiting its response
    pub in_flight: bool,
    /// The awaited response belongs to a cancelled command
    pub orphaned: bool,
    /// Registered data subscription, if any
    pub subscription: Option<SubscriptionMode>,
}

pub struct ProtocolEngine {
    transport: Arc<dyn Transport>,
    queue: CommandQueue,
    subscription: Option<DataSubscription>,
    response_timeout: Duration,
    closed: bool,
}

impl ProtocolEngine {
    pub fn new(transport: Arc<dyn Transport>, response_timeout: Duration) -> Self {
        Self {
            transport,
            queue: CommandQueue::new(),
            subscription: None,
            response_timeout,
            closed: false,
        }
    }

    /// Append a command and dispatch it right away if the device is idle
    pub fn enqueue(&mut self, command: PendingCommand, now: Instant) {
        if self.closed {
            command.complete(Err(TransportError::Disconnected.into()));
            return;
        }
        self.queue.push(command);
        self.dispatch_next(now);
    }

    /// Write a frame outside the queue (no response expected)
    pub fn write_raw(&self, frame: &Frame) -> Result<(), ScannerError> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }
        debug!("Writing unqueued frame: {}", frame);
        self.transport.write_frame(frame.as_bytes())?;
        Ok(())
    }

    /// Route one inbound report
    pub fn on_report(&mut self, raw: &[u8], now: Instant) {
        if is_data_frame(raw) {
            self.on_data_frame(raw);
            return;
        }

        match self.queue.take_in_flight() {
            Some(InFlight::Active { command, .. }) => {
                let result = decode_response_frame(raw).map_err(ScannerError::from);
                if let Err(ref e) = result {
                    warn!("Undecodable response for {}: {}", command.frame(), e);
                }
                command.complete(result);
            }
            Some(InFlight::Orphaned { .. }) => {
                warn!("Discarding response to cancelled command");
            }
            None => {
                warn!(
                    "Response with no command in flight, discarding ({} bytes)",
                    raw.len()
                );
            }
        }

        self.dispatch_next(now);
    }

    /// Fail the in-flight command after a read error on the transport
    pub fn on_transport_error(&mut self, error: TransportError, now: Instant) {
        warn!("Transport error: {}", error);
        match self.queue.take_in_flight() {
            Some(InFlight::Active { command, .. }) => command.complete(Err(error.into())),
            Some(InFlight::Orphaned { .. }) | None => {}
        }
        self.dispatch_next(now);
    }

    /// The transport's event stream ended: nothing will ever answer again
    pub fn on_transport_closed(&mut self) {
        if self.closed {
            return;
        }
        warn!("Transport closed");
        self.closed = true;
        for command in self.queue.drain() {
            command.complete(Err(TransportError::Disconnected.into()));
        }
        if let Some(sub) = self.subscription.take() {
            sub.deliver(Err(TransportError::Disconnected.into()));
        }
    }

    /// Expire the in-flight command if its deadline has passed
    pub fn on_timeout(&mut self, now: Instant) {
        match self.queue.deadline() {
            Some(deadline) if deadline <= now => {}
            _ => return,
        }

        match self.queue.take_in_flight() {
            Some(InFlight::Active { command, .. }) => {
                warn!(
                    "No response within {:?} for {}",
                    self.response_timeout,
                    command.frame()
                );
                command.complete(Err(ScannerError::Timeout(self.response_timeout)));
            }
            Some(InFlight::Orphaned { .. }) => {
                debug!("Cancelled command never answered, releasing device");
            }
            None => {}
        }
        self.dispatch_next(now);
    }

    /// When the in-flight command times out, if one is in flight
    pub fn deadline(&self) -> Option<Instant> {
        self.queue.deadline()
    }

    /// Drop queued commands and the subscription without delivering results
    pub fn cancel(&mut self) {
        let dropped = self.queue.cancel();
        let had_subscription = self.subscription.take().is_some();
        debug!(
            "Cancelled {} command(s){}",
            dropped,
            if had_subscription {
                " and the data subscription"
            } else {
                ""
            }
        );
    }

    /// Install a data subscription, replacing any previous one
    pub fn register(&mut self, subscription: DataSubscription) {
        if self.closed {
            subscription.deliver(Err(TransportError::Disconnected.into()));
            return;
        }
        if self.subscription.replace(subscription).is_some() {
            debug!("Replaced existing data subscription");
        }
    }

    pub fn unregister(&mut self) {
        self.subscription = None;
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            queued: self.queue.queued_len(),
            in_flight: self.queue.is_busy(),
            orphaned: matches!(self.queue.in_flight(), Some(InFlight::Orphaned { .. })),
            subscription: self.subscription.as_ref().map(DataSubscription::mode),
        }
    }

    fn on_data_frame(&mut self, raw: &[u8]) {
        let Some(sub) = self.subscription.as_ref() else {
            debug!("Scan data with no subscriber ({} bytes)", raw.len());
            return;
        };

        let item = decode_data_frame(raw).map_err(ScannerError::from);
        let delivered = sub.deliver(item);
        if !delivered {
            debug!("Subscriber went away, clearing subscription");
            self.subscription = None;
        } else if sub.mode() == SubscriptionMode::OneShot {
            self.subscription = None;
        }
    }

    /// Dispatch queued commands until one is in flight or the queue is empty
    fn dispatch_next(&mut self, now: Instant) {
        while let Some(command) = self.queue.next_for_dispatch() {
            debug!("Dispatching {}", command.frame());
            match self.transport.write_frame(command.frame().as_bytes()) {
                Ok(()) => {
                    self.queue.set_in_flight(command, now + self.response_timeout);
                }
                Err(e) => {
                    warn!("Write failed for {}: {}", command.frame(), e);
                    command.complete(Err(e.into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use parking_lot::Mutex;
    use tokio::sync::broadcast;

    use super::*;
    use crate::frame::{build_command_frame, StorageType, TagPath};
    use crate::queue::PendingResponse;
    use fm430_transport::{TransportDeviceInfo, TransportEvent};

    const TIMEOUT: Duration = Duration::from_secs(3);

    /// Records writes; optionally fails them
    struct RecordingTransport {
        info: TransportDeviceInfo,
        writes: Mutex<Vec<Vec<u8>>>,
        fail_writes: Mutex<bool>,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                info: TransportDeviceInfo {
                    vid: 0x1EAB,
                    pid: 0x8003,
                    device_path: "test".into(),
                    serial: None,
                    product_name: None,
                    manufacturer: None,
                },
                writes: Mutex::new(Vec::new()),
                fail_writes: Mutex::new(false),
            })
        }

        fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn write_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
            if *self.fail_writes.lock() {
                return Err(TransportError::HidError("write failed".into()));
            }
            self.writes.lock().push(frame.to_vec());
            Ok(())
        }

        fn subscribe(&self) -> Option<broadcast::Receiver<TransportEvent>> {
            None
        }

        fn device_info(&self) -> &TransportDeviceInfo {
            &self.info
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn engine() -> (ProtocolEngine, Arc<RecordingTransport>) {
        let transport = RecordingTransport::new();
        (ProtocolEngine::new(transport.clone(), TIMEOUT), transport)
    }

    fn command_frame(code: &str) -> Frame {
        let path = TagPath::single(code.parse().unwrap());
        build_command_frame(StorageType::Volatile, &path, None)
    }

    fn submit(engine: &mut ProtocolEngine, code: &str, now: Instant) -> PendingResponse {
        let (cmd, rx) = PendingCommand::new(command_frame(code));
        engine.enqueue(cmd, now);
        rx
    }

    fn response(body: &[u8]) -> Vec<u8> {
        let mut f = vec![0x02, 0x01, 0x30, 0x30, 0x30, 0x30, b'#'];
        f.extend_from_slice(body);
        f.extend_from_slice(&[0x3B, 0x03]);
        f.resize(64, 0);
        f
    }

    #[test]
    fn test_idle_enqueue_dispatches_once() {
        let (mut engine, transport) = engine();
        let _rx = submit(&mut engine, "SCNMOD", Instant::now());
        assert_eq!(transport.writes(), vec![command_frame("SCNMOD").into_vec()]);
        assert!(engine.status().in_flight);
        assert!(engine.deadline().is_some());
    }

    #[test]
    fn test_responses_resolve_in_fifo_order() {
        let (mut engine, transport) = engine();
        let now = Instant::now();
        let mut r1 = submit(&mut engine, "AAAAAA", now);
        let mut r2 = submit(&mut engine, "BBBBBB", now);
        let mut r3 = submit(&mut engine, "CCCCCC", now);

        // Only the head is written while the device is busy
        assert_eq!(transport.writes().len(), 1);
        assert_eq!(engine.status().queued, 2);

        engine.on_report(&response(b"AAAAAA\x06"), now);
        assert_eq!(transport.writes().len(), 2);
        let first = (&mut r1).now_or_never().unwrap().unwrap();
        assert_eq!(first.payload(), b"AAAAAA\x06");
        assert!((&mut r2).now_or_never().is_none());
        assert!((&mut r3).now_or_never().is_none());

        engine.on_report(&response(b"BBBBBB\x06"), now);
        assert_eq!(
            (&mut r2).now_or_never().unwrap().unwrap().payload(),
            b"BBBBBB\x06"
        );
        assert!((&mut r3).now_or_never().is_none());

        engine.on_report(&response(b"CCCCCC\x06"), now);
        assert_eq!(
            (&mut r3).now_or_never().unwrap().unwrap().payload(),
            b"CCCCCC\x06"
        );

        let written: Vec<Vec<u8>> = ["AAAAAA", "BBBBBB", "CCCCCC"]
            .iter()
            .map(|c| command_frame(c).into_vec())
            .collect();
        assert_eq!(transport.writes(), written);
        assert!(!engine.status().in_flight);
    }

    #[test]
    fn test_cancel_then_enqueue_dispatches_once() {
        let (mut engine, transport) = engine();
        let now = Instant::now();
        // First goes in flight, second waits
        let old_a = submit(&mut engine, "AAAAAA", now);
        let old_b = submit(&mut engine, "BBBBBB", now);

        engine.cancel();
        let mut fresh = submit(&mut engine, "CCCCCC", now);

        assert_eq!(old_a.now_or_never(), Some(Err(ScannerError::Cancelled)));
        assert_eq!(old_b.now_or_never(), Some(Err(ScannerError::Cancelled)));

        // Fresh command waits for the orphaned response
        assert_eq!(transport.writes().len(), 1);
        assert!(engine.status().orphaned);

        engine.on_report(&response(b"AAAAAA\x06"), now);
        assert!((&mut fresh).now_or_never().is_none());
        assert_eq!(
            transport.writes().last().unwrap(),
            &command_frame("CCCCCC").into_vec()
        );
        assert_eq!(
            transport
                .writes()
                .iter()
                .filter(|w| **w == command_frame("CCCCCC").into_vec())
                .count(),
            1
        );

        engine.on_report(&response(b"CCCCCC\x06"), now);
        assert!(fresh.now_or_never().unwrap().is_ok());
    }

    #[test]
    fn test_cancel_when_idle_then_enqueue() {
        let (mut engine, transport) = engine();
        let now = Instant::now();
        engine.cancel();
        let _rx = submit(&mut engine, "SCNENA", now);
        assert_eq!(transport.writes().len(), 1);
        assert!(!engine.status().orphaned);
    }

    #[test]
    fn test_data_frame_never_reaches_command() {
        let (mut engine, _transport) = engine();
        let now = Instant::now();
        let (sub, mut scans) = DataSubscription::new(SubscriptionMode::Continuous);
        engine.register(sub);
        let mut rx = submit(&mut engine, "SCNMOD", now);

        engine.on_report(b"4006381333931\r", now);

        assert!((&mut rx).now_or_never().is_none());
        assert!(engine.status().in_flight);
        assert_eq!(scans.try_recv().unwrap().unwrap().text(), "4006381333931");

        engine.on_report(&response(b"SCNMOD0\x06"), now);
        assert!(rx.now_or_never().unwrap().is_ok());
        assert_eq!(scans.try_recv(), None);
    }

    #[test]
    fn test_response_never_reaches_subscription() {
        let (mut engine, _transport) = engine();
        let (sub, mut scans) = DataSubscription::new(SubscriptionMode::Continuous);
        engine.register(sub);

        engine.on_report(&response(b"SCNMOD0\x06"), Instant::now());
        assert_eq!(scans.try_recv(), None);
        assert_eq!(
            engine.status().subscription,
            Some(SubscriptionMode::Continuous)
        );
    }

    #[test]
    fn test_continuous_subscription_receives_all() {
        let (mut engine, _transport) = engine();
        let (sub, mut scans) = DataSubscription::new(SubscriptionMode::Continuous);
        engine.register(sub);

        let now = Instant::now();
        for code in ["111", "222", "333"] {
            engine.on_report(code.as_bytes(), now);
        }

        for code in ["111", "222", "333"] {
            assert_eq!(scans.try_recv().unwrap().unwrap().text(), code);
        }
        assert_eq!(
            engine.status().subscription,
            Some(SubscriptionMode::Continuous)
        );
    }

    #[test]
    fn test_one_shot_subscription_clears() {
        let (mut engine, _transport) = engine();
        let (sub, mut scans) = DataSubscription::new(SubscriptionMode::OneShot);
        engine.register(sub);

        let now = Instant::now();
        engine.on_report(b"ABC", now);
        engine.on_report(b"DEF", now);

        assert_eq!(scans.try_recv().unwrap().unwrap().text(), "ABC");
        // Sender dropped after the first delivery
        assert_eq!(scans.try_recv(), None);
        assert_eq!(engine.status().subscription, None);
    }

    #[test]
    fn test_padding_only_data_frame_is_empty_response() {
        let (mut engine, _transport) = engine();
        let (sub, mut scans) = DataSubscription::new(SubscriptionMode::Continuous);
        engine.register(sub);

        engine.on_report(&[0u8; 64], Instant::now());
        assert_eq!(scans.try_recv(), Some(Err(ScannerError::EmptyResponse)));
    }

    #[test]
    fn test_register_replaces_subscription() {
        let (mut engine, _transport) = engine();
        let (first, mut first_rx) = DataSubscription::new(SubscriptionMode::Continuous);
        let (second, mut second_rx) = DataSubscription::new(SubscriptionMode::OneShot);
        engine.register(first);
        engine.register(second);

        engine.on_report(b"XYZ", Instant::now());
        assert_eq!(first_rx.try_recv(), None);
        assert!(second_rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_malformed_response_fails_command() {
        let (mut engine, _transport) = engine();
        let now = Instant::now();
        let rx = submit(&mut engine, "SCNMOD", now);

        // Response header, bad storage byte
        let mut bad = response(b"SCNMOD0\x06");
        bad[6] = b'!';
        engine.on_report(&bad, now);

        assert!(matches!(
            rx.now_or_never(),
            Some(Err(ScannerError::Protocol(_)))
        ));
        assert!(!engine.status().in_flight);
    }

    #[test]
    fn test_response_without_command_is_discarded() {
        let (mut engine, transport) = engine();
        engine.on_report(&response(b"SCNMOD0\x06"), Instant::now());
        assert!(transport.writes().is_empty());
        assert!(!engine.status().in_flight);
    }

    #[test]
    fn test_timeout_fails_and_moves_queue() {
        let (mut engine, transport) = engine();
        let start = Instant::now();
        let first = submit(&mut engine, "AAAAAA", start);
        let _second = submit(&mut engine, "BBBBBB", start);

        // Not yet due
        engine.on_timeout(start + Duration::from_secs(1));
        assert_eq!(transport.writes().len(), 1);

        let later = start + TIMEOUT;
        engine.on_timeout(later);
        assert_eq!(first.now_or_never(), Some(Err(ScannerError::Timeout(TIMEOUT))));
        assert_eq!(transport.writes().len(), 2);
        assert_eq!(engine.deadline(), Some(later + TIMEOUT));
    }

    #[test]
    fn test_write_failure_fails_command_and_continues() {
        let (mut engine, transport) = engine();
        let now = Instant::now();
        *transport.fail_writes.lock() = true;
        let failed = submit(&mut engine, "AAAAAA", now);
        assert!(matches!(
            failed.now_or_never(),
            Some(Err(ScannerError::Transport(TransportError::HidError(_))))
        ));
        assert!(!engine.status().in_flight);

        *transport.fail_writes.lock() = false;
        let _ok = submit(&mut engine, "BBBBBB", now);
        assert_eq!(transport.writes().len(), 1);
    }

    #[test]
    fn test_transport_error_fails_in_flight_only() {
        let (mut engine, transport) = engine();
        let now = Instant::now();
        let first = submit(&mut engine, "AAAAAA", now);
        let mut second = submit(&mut engine, "BBBBBB", now);

        engine.on_transport_error(TransportError::HidError("read".into()), now);
        assert!(matches!(
            first.now_or_never(),
            Some(Err(ScannerError::Transport(_)))
        ));
        assert!((&mut second).now_or_never().is_none());
        assert_eq!(transport.writes().len(), 2);
    }

    #[test]
    fn test_transport_closed_fails_everything() {
        let (mut engine, _transport) = engine();
        let now = Instant::now();
        let (sub, mut scans) = DataSubscription::new(SubscriptionMode::Continuous);
        engine.register(sub);
        let first = submit(&mut engine, "AAAAAA", now);
        let second = submit(&mut engine, "BBBBBB", now);

        engine.on_transport_closed();

        let disconnected = Err(ScannerError::Transport(TransportError::Disconnected));
        assert_eq!(first.now_or_never(), Some(disconnected.clone()));
        assert_eq!(second.now_or_never(), Some(disconnected.clone()));
        assert_eq!(
            scans.try_recv(),
            Some(Err(ScannerError::Transport(TransportError::Disconnected)))
        );
        assert_eq!(scans.try_recv(), None);

        let late = submit(&mut engine, "CCCCCC", now);
        assert_eq!(late.now_or_never(), Some(disconnected));
    }

    #[test]
    fn test_orphan_timeout_releases_device() {
        let (mut engine, transport) = engine();
        let start = Instant::now();
        let _old = submit(&mut engine, "AAAAAA", start);
        engine.cancel();
        let _fresh = submit(&mut engine, "BBBBBB", start);

        engine.on_timeout(start + TIMEOUT);
        assert_eq!(transport.writes().len(), 2);
        assert!(!engine.status().orphaned);
        assert!(engine.status().in_flight);
    }
}
