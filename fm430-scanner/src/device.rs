//! Scanner device facade
//!
//! `ScannerDevice` is a cheap handle; the protocol state lives in one tokio
//! task (the actor) that owns the [`ProtocolEngine`]. Facade calls are
//! messages to that task, transport events arrive on the broadcast channel,
//! and the in-flight deadline is a timer, all serialized by one `select!`.

use std::sync::Arc;
use std::time::Duration;

use fm430_transport::{
    HidDiscovery, ReportFormat, Transport, TransportDeviceInfo, TransportEvent, VENDOR_ID,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::classifier::{Response, ResponseStatus};
use crate::engine::{ProtocolEngine, QueueStatus};
use crate::error::{ScannerError, ValidationError};
use crate::frame::{
    build_trigger_frame, Command, Frame, PayloadEntry, StorageType, Subtag, Tag, TagPathEntry,
};
use crate::options::{build_write_command, OptionSpec};
use crate::protocol::scan;
use crate::queue::{PendingCommand, PendingResponse};
use crate::subscription::{DataSubscription, ScanReceiver, SubscriptionMode};

/// Default time to wait for a command response
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Settings for opening and driving a scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    pub vendor_id: u16,
    /// Restrict to one product ID; any known PID otherwise
    pub product_id: Option<u16>,
    /// Storage scope used by callers that don't pick one
    pub storage: StorageType,
    pub response_timeout: Duration,
    pub report_format: ReportFormat,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_ID,
            product_id: None,
            storage: StorageType::Volatile,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            report_format: ReportFormat::default(),
        }
    }
}

/// Messages from the facade to the actor
enum Request {
    Enqueue(PendingCommand),
    WriteRaw {
        frame: Frame,
        reply: oneshot::Sender<Result<(), ScannerError>>,
    },
    Cancel,
    Register(DataSubscription),
    Unregister,
    Status(oneshot::Sender<QueueStatus>),
}

/// Handle to an opened scanner
pub struct ScannerDevice {
    requests: mpsc::UnboundedSender<Request>,
    transport: Arc<dyn Transport>,
    config: ScannerConfig,
    actor: JoinHandle<()>,
}

impl ScannerDevice {
    /// Open the first matching scanner and start its actor
    pub async fn init(config: ScannerConfig) -> Result<Self, ScannerError> {
        Self::open(HidDiscovery::new(), config).await
    }

    /// Like [`init`](Self::init) with a caller-prepared discovery
    /// (e.g. one wrapping transports with the monitoring printer)
    pub async fn open(
        mut discovery: HidDiscovery,
        config: ScannerConfig,
    ) -> Result<Self, ScannerError> {
        if let Some(pid) = config.product_id {
            discovery.add_device(config.vendor_id, pid);
        }
        let transport = discovery
            .with_format(config.report_format)
            .open_first(config.vendor_id, config.product_id)
            .await?;
        Ok(Self::with_transport(transport, config))
    }

    /// Drive an already opened transport. Must be called within a tokio runtime.
    pub fn with_transport(transport: Arc<dyn Transport>, config: ScannerConfig) -> Self {
        let (requests, request_rx) = mpsc::unbounded_channel();
        let events = transport.subscribe();
        if events.is_none() {
            warn!("Transport has no input endpoint; responses will time out");
        }
        let engine = ProtocolEngine::new(Arc::clone(&transport), config.response_timeout);
        let actor = tokio::spawn(run_actor(engine, request_rx, events));

        Self {
            requests,
            transport,
            config,
            actor,
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn device_info(&self) -> &TransportDeviceInfo {
        self.transport.device_info()
    }

    /// Queue a raw command frame. Returns immediately; the response arrives
    /// through the returned future.
    ///
    /// A frame that does not fit one output report resolves to
    /// [`ValidationError::FrameTooLong`] without being queued.
    pub fn enqueue(&self, frame: Frame) -> PendingResponse {
        let max = self.config.report_format.max_frame_len();
        let len = frame.len();
        let (command, response) = PendingCommand::new(frame);
        if len > max {
            command.complete(Err(ValidationError::FrameTooLong { len, max }.into()));
            return response;
        }
        // If the actor is gone the command is dropped and resolves to Cancelled
        let _ = self.requests.send(Request::Enqueue(command));
        response
    }

    /// Queue a validated command
    pub fn send_command(&self, command: &Command) -> PendingResponse {
        self.enqueue(command.frame())
    }

    /// Write one setting and wait for the scanner to acknowledge it
    pub async fn set_option(
        &self,
        spec: &OptionSpec,
        value: Option<&str>,
        storage: StorageType,
    ) -> Result<Response, ScannerError> {
        let command = spec.write_command(value, storage)?;
        check_acknowledged(self.send_command(&command).await?)
    }

    /// Write several settings in one grouped frame
    pub async fn set_options(
        &self,
        settings: &[(&OptionSpec, Option<&str>)],
        storage: StorageType,
    ) -> Result<Response, ScannerError> {
        let command = build_write_command(settings, storage)?;
        check_acknowledged(self.send_command(&command).await?)
    }

    /// Read back the current value of a setting
    pub async fn query_option(&self, spec: &OptionSpec) -> Result<Response, ScannerError> {
        check_acknowledged(self.send_command(&spec.query_command()).await?)
    }

    /// Start or stop scanning through the general command path (`SCNTRG`)
    pub async fn trigger(&self, start: bool) -> Result<Response, ScannerError> {
        let payload = if start {
            scan::TRIGGER_START
        } else {
            scan::TRIGGER_STOP
        };
        let command = Command::write(
            StorageType::Volatile,
            TagPathEntry::new(Tag::new(scan::TAG), Subtag::new(scan::TRIGGER_SUBTAG)),
            PayloadEntry::Byte(payload),
        );
        check_acknowledged(self.send_command(&command).await?)
    }

    /// Start or stop scanning with the three-byte trigger frame.
    ///
    /// Bypasses the queue: the frame elicits no response, so it is written as
    /// soon as the actor sees it.
    pub async fn send_trigger_frame(&self, start: bool) -> Result<(), ScannerError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::WriteRaw {
                frame: build_trigger_frame(start),
                reply,
            })
            .map_err(|_| ScannerError::Cancelled)?;
        rx.await.map_err(|_| ScannerError::Cancelled)?
    }

    /// Drop queued commands and the data subscription.
    ///
    /// A command already written keeps the device busy until its response or
    /// timeout; that response is discarded.
    pub fn cancel(&self) {
        let _ = self.requests.send(Request::Cancel);
    }

    /// Subscribe to scan results, replacing any existing subscription
    pub fn register_result_receiver(&self, mode: SubscriptionMode) -> ScanReceiver {
        let (subscription, receiver) = DataSubscription::new(mode);
        let _ = self.requests.send(Request::Register(subscription));
        receiver
    }

    pub fn unregister_result_receiver(&self) {
        let _ = self.requests.send(Request::Unregister);
    }

    pub async fn queue_status(&self) -> Result<QueueStatus, ScannerError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Status(reply))
            .map_err(|_| ScannerError::Cancelled)?;
        rx.await.map_err(|_| ScannerError::Cancelled)
    }

    /// Stop the actor and close the transport
    pub fn close(self) -> Result<(), ScannerError> {
        self.actor.abort();
        self.transport.close()?;
        Ok(())
    }
}

impl Drop for ScannerDevice {
    fn drop(&mut self) {
        self.actor.abort();
    }
}

/// Turn a non-ACK entry into [`ScannerError::Rejected`]
fn check_acknowledged(response: Response) -> Result<Response, ScannerError> {
    let entries = response.entries()?;
    if let Some(rejected) = entries.iter().find(|e| e.status != ResponseStatus::Ack) {
        return Err(ScannerError::Rejected {
            code: rejected.entry.to_string(),
            status: rejected.status,
        });
    }
    Ok(response)
}

async fn run_actor(
    mut engine: ProtocolEngine,
    mut requests: mpsc::UnboundedReceiver<Request>,
    mut events: Option<broadcast::Receiver<TransportEvent>>,
) {
    loop {
        let deadline = engine.deadline();
        tokio::select! {
            request = requests.recv() => match request {
                Some(request) => handle_request(&mut engine, request),
                None => {
                    debug!("Scanner handle dropped, stopping actor");
                    break;
                }
            },
            event = next_event(&mut events) => match event {
                Ok(TransportEvent::Report(report)) => {
                    debug!("Report ({:.3}s): {} bytes", report.timestamp, report.data.len());
                    engine.on_report(&report.data, Instant::now());
                }
                Ok(TransportEvent::Error(e)) => engine.on_transport_error(e, Instant::now()),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} reports (receiver lagged)", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    engine.on_transport_closed();
                    events = None;
                }
            },
            _ = expiry(deadline) => engine.on_timeout(Instant::now()),
        }
    }
}

fn handle_request(engine: &mut ProtocolEngine, request: Request) {
    match request {
        Request::Enqueue(command) => engine.enqueue(command, Instant::now()),
        Request::WriteRaw { frame, reply } => {
            let _ = reply.send(engine.write_raw(&frame));
        }
        Request::Cancel => engine.cancel(),
        Request::Register(subscription) => engine.register(subscription),
        Request::Unregister => engine.unregister(),
        Request::Status(reply) => {
            let _ = reply.send(engine.status());
        }
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<TransportEvent>>,
) -> Result<TransportEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
