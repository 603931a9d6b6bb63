//! Input report reader shared by HID backends
//!
//! A dedicated thread blocks on the input endpoint and pushes every report
//! (or read failure) into a broadcast channel. The scanner layer subscribes to
//! that channel; it never touches the `HidDevice` for reading itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hidapi::HidDevice;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::protocol::{parse_input_report, timing};
use crate::types::{InboundReport, ReportFormat, TransportEvent};

/// Broadcast channel capacity for inbound reports
const REPORT_CHANNEL_CAPACITY: usize = 256;

/// Blocking input endpoint polled by the reader thread
pub trait ReportSource: Send + 'static {
    /// Read one input report, returning 0 when `timeout_ms` elapses first
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;
}

impl ReportSource for HidDevice {
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        HidDevice::read_timeout(self, buf, timeout_ms).map_err(TransportError::from)
    }
}

/// Configuration for the report reader loop
#[derive(Clone)]
pub struct ReaderConfig {
    /// Read timeout in milliseconds (for checking shutdown flag when idle)
    pub read_timeout_ms: i32,
    /// Sleep duration on error before retrying
    pub error_sleep_ms: u64,
    /// Consecutive read errors after which the device is considered gone
    pub max_consecutive_errors: u32,
    /// Name prefix for debug logging and the thread name
    pub name: &'static str,
    /// Report framing to strip
    pub format: ReportFormat,
}

impl ReaderConfig {
    /// Configuration for the HID-POS interface
    pub fn hid_pos(format: ReportFormat) -> Self {
        Self {
            read_timeout_ms: timing::READ_TIMEOUT_MS,
            error_sleep_ms: timing::ERROR_SLEEP_MS,
            max_consecutive_errors: timing::MAX_CONSECUTIVE_READ_ERRORS,
            name: "hidpos",
            format,
        }
    }
}

/// Owns the reader thread and a receiver on the channel it feeds.
///
/// The thread holds the only sender, so the channel closes when the thread
/// exits (shutdown or device gone). Dropping the subsystem signals the thread
/// to exit.
pub struct ReportSubsystem {
    rx: broadcast::Receiver<TransportEvent>,
    shutdown: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl ReportSubsystem {
    /// Spawn a reader thread on `source`
    pub fn spawn<S: ReportSource>(source: S, config: ReaderConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        let shutdown_clone = shutdown.clone();
        let running_clone = running.clone();

        std::thread::Builder::new()
            .name(format!("{}-report-reader", config.name))
            .spawn(move || {
                run_report_reader_loop(source, &tx, shutdown_clone, config);
                running_clone.store(false, Ordering::SeqCst);
                drop(tx);
            })
            .expect("Failed to spawn report reader thread");

        Self {
            rx,
            shutdown,
            running,
        }
    }

    /// Subscribe to inbound reports from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.rx.resubscribe()
    }

    /// Whether the reader thread is still polling the device
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for ReportSubsystem {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Reader loop: runs until the shutdown flag is set or the device is gone.
///
/// Every non-empty read becomes one `TransportEvent::Report`. Read errors are
/// broadcast as `TransportEvent::Error`. A few errors in a row are retried
/// (USB re-enumeration, suspend/resume); after `max_consecutive_errors` the
/// loop gives up; the caller then drops `tx`, closing the channel for every
/// subscriber.
pub fn run_report_reader_loop<S: ReportSource>(
    source: S,
    tx: &broadcast::Sender<TransportEvent>,
    shutdown: Arc<AtomicBool>,
    config: ReaderConfig,
) {
    debug!("{} report reader thread started", config.name);
    let mut buf = vec![0u8; config.format.report_size + 1];
    let start_time = Instant::now();
    let mut consecutive_errors = 0u32;

    while !shutdown.load(Ordering::Relaxed) {
        match source.read_timeout(&mut buf, config.read_timeout_ms) {
            Ok(len) if len > 0 => {
                consecutive_errors = 0;
                let timestamp = start_time.elapsed().as_secs_f64();
                debug!(
                    "{} reader got {} bytes at {:.3}s: {:02X?}",
                    config.name,
                    len,
                    timestamp,
                    &buf[..len.min(16)]
                );
                let frame = parse_input_report(&buf[..len], &config.format);
                // No receivers is fine: nobody is listening yet
                let _ = tx.send(TransportEvent::Report(InboundReport::new(timestamp, frame)));
            }
            Ok(_) => consecutive_errors = 0,
            Err(e) => {
                consecutive_errors += 1;
                warn!("{} report reader error: {}", config.name, e);
                let _ = tx.send(TransportEvent::Error(e));
                if consecutive_errors >= config.max_consecutive_errors {
                    warn!(
                        "{} device gone after {} read errors, closing report channel",
                        config.name, consecutive_errors
                    );
                    break;
                }
                std::thread::sleep(Duration::from_millis(config.error_sleep_ms));
            }
        }
    }

    debug!("{} report reader thread exiting", config.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Plays back scripted reads once `gate` opens, then fails forever
    struct ScriptedSource {
        gate: Arc<AtomicBool>,
        script: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
    }

    impl ReportSource for ScriptedSource {
        fn read_timeout(&self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize, TransportError> {
            if !self.gate.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
                return Ok(0);
            }
            let next = self
                .script
                .lock()
                .pop_front()
                .unwrap_or(Err(TransportError::HidError("No such device".into())));
            next.map(|data| {
                buf[..data.len()].copy_from_slice(&data);
                data.len()
            })
        }
    }

    fn test_config() -> ReaderConfig {
        ReaderConfig {
            read_timeout_ms: 1,
            error_sleep_ms: 0,
            max_consecutive_errors: 3,
            name: "test",
            format: ReportFormat::default(),
        }
    }

    fn spawn_scripted(
        script: Vec<Result<Vec<u8>, TransportError>>,
    ) -> (ReportSubsystem, Arc<AtomicBool>) {
        let gate = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource {
            gate: gate.clone(),
            script: Mutex::new(script.into()),
        };
        (ReportSubsystem::spawn(source, test_config()), gate)
    }

    async fn next(
        rx: &mut broadcast::Receiver<TransportEvent>,
    ) -> Result<TransportEvent, broadcast::error::RecvError> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("reader produced nothing within 5s")
    }

    #[tokio::test]
    async fn test_channel_closes_after_repeated_errors() {
        let (reports, gate) = spawn_scripted(vec![Ok(b"1234".to_vec())]);
        let mut rx = reports.subscribe();
        gate.store(true, Ordering::SeqCst);

        match next(&mut rx).await {
            Ok(TransportEvent::Report(report)) => assert_eq!(&report.data[..4], b"1234"),
            other => panic!("expected report, got {:?}", other),
        }
        for _ in 0..3 {
            assert!(matches!(next(&mut rx).await, Ok(TransportEvent::Error(_))));
        }
        assert!(matches!(
            next(&mut rx).await,
            Err(broadcast::error::RecvError::Closed)
        ));

        // Subscribers arriving after the device is gone see a closed channel
        let mut late = reports.subscribe();
        assert!(matches!(
            next(&mut late).await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(!reports.is_running());
    }

    #[tokio::test]
    async fn test_successful_read_resets_error_count() {
        let err = || Err(TransportError::HidError("timeout".into()));
        let (reports, gate) =
            spawn_scripted(vec![err(), err(), Ok(b"AB".to_vec()), err(), err()]);
        let mut rx = reports.subscribe();
        gate.store(true, Ordering::SeqCst);

        let mut errors = 0;
        let mut saw_report = false;
        loop {
            match next(&mut rx).await {
                Ok(TransportEvent::Report(_)) => saw_report = true,
                Ok(TransportEvent::Error(_)) => errors += 1,
                Err(broadcast::error::RecvError::Closed) => break,
                Err(e) => panic!("unexpected {:?}", e),
            }
        }
        assert!(saw_report);
        // Two before the report; after it, two scripted plus one more to hit the limit
        assert_eq!(errors, 5);
    }
}
