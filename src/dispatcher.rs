use crate::classify::classify;
use crate::commands::translate;
use crate::error::{ErrorCause, Result, RokuError};
use crate::pairing::PairingHandler;
use crate::protocol::EcpRequest;
use crate::registry::DeviceRegistry;
use crate::subscription::{EngineEvent, EventSender};
use crate::transport::{Transport, TransportError};
use crate::types::DeviceRecord;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, timeout, Instant};

/// A queued command waiting for its turn
#[derive(Debug)]
pub struct CommandJob {
    pub command: String,
    pub enqueued_at: Instant,
    reply: oneshot::Sender<Result<()>>,
}

impl CommandJob {
    fn finish(self, result: Result<()>) {
        // The caller may have dropped its ticket
        let _ = self.reply.send(result);
    }
}

/// Handle to the outcome of one enqueued command
///
/// Dropping the ticket does not cancel the command.
#[derive(Debug)]
pub struct CommandTicket {
    command: String,
    rx: oneshot::Receiver<Result<()>>,
}

impl CommandTicket {
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait until the command has been sent or has failed
    pub async fn outcome(self) -> Result<()> {
        self.rx.await.unwrap_or(Err(RokuError::Cancelled))
    }
}

/// Serialized, rate-limited command queue for the current device
///
/// Jobs are sent strictly in enqueue order by a single drain task that is
/// spawned on demand and exits when the queue is empty. At most one drain
/// task exists at any time, so there is never more than one send in flight.
#[derive(Clone)]
pub struct CommandDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    pairing: Arc<dyn PairingHandler>,
    events: EventSender,
    interval: Duration,
    send_timeout: Duration,
    queue: Mutex<VecDeque<CommandJob>>,
    draining: AtomicBool,
    /// End of the last successful send
    last_send: Mutex<Option<Instant>>,
}

impl CommandDispatcher {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<DeviceRegistry>,
        pairing: Arc<dyn PairingHandler>,
        events: EventSender,
        interval: Duration,
        send_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                registry,
                pairing,
                events,
                interval,
                send_timeout,
                queue: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                last_send: Mutex::new(None),
            }),
        }
    }

    /// Append a command to the queue and return immediately.
    ///
    /// Outside a Tokio runtime the ticket fails with `NoRuntime`.
    pub fn enqueue(&self, command: impl Into<String>) -> CommandTicket {
        let command = command.into();
        let (reply, rx) = oneshot::channel();

        self.inner.lock_queue().push_back(CommandJob {
            command: command.clone(),
            enqueued_at: Instant::now(),
            reply,
        });
        tracing::debug!("Queued command {}", command);

        Inner::start_draining(&self.inner);
        CommandTicket { command, rx }
    }

    /// Enqueue and wait for the outcome
    pub async fn send(&self, command: impl Into<String>) -> Result<()> {
        self.enqueue(command).outcome().await
    }

    /// Fail every queued job that has not started yet with `Cancelled`.
    ///
    /// A send already in flight is not interrupted. Returns the number of
    /// jobs dropped.
    pub fn cancel_pending(&self) -> usize {
        self.inner.fail_pending(|| RokuError::Cancelled)
    }

    /// Jobs waiting behind the one in flight
    pub fn pending(&self) -> usize {
        self.inner.lock_queue().len()
    }
}

impl Inner {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<CommandJob>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_draining(inner: &Arc<Inner>) {
        if inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            match Handle::try_current() {
                Ok(runtime) => {
                    let inner = Arc::clone(inner);
                    runtime.spawn(async move { inner.drain().await });
                }
                Err(e) => {
                    tracing::error!("Cannot send commands without a Tokio runtime: {}", e);
                    inner.draining.store(false, Ordering::Release);
                    inner.fail_pending(|| RokuError::NoRuntime);
                }
            }
        }
    }

    async fn drain(self: Arc<Self>) {
        loop {
            loop {
                let job = self.lock_queue().pop_front();
                match job {
                    Some(job) => self.run(job).await,
                    None => break,
                }
            }

            self.draining.store(false, Ordering::Release);

            // An enqueue that raced with the store above saw `draining` still
            // set and did not spawn; pick its job up here unless a new drain
            // task already has.
            let has_more = !self.lock_queue().is_empty();
            if !has_more
                || self
                    .draining
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                return;
            }
        }
    }

    async fn run(&self, job: CommandJob) {
        let result = self.execute(&job.command).await;

        match &result {
            Ok(()) => {
                tracing::info!(
                    "Sent {} ({:?} after enqueue)",
                    job.command,
                    job.enqueued_at.elapsed()
                );
                self.events.emit(EngineEvent::CommandSent {
                    command: job.command.clone(),
                });
            }
            Err(e) => {
                tracing::warn!("Command {} failed: {}", job.command, e);
                self.events.emit(EngineEvent::CommandFailed {
                    command: job.command.clone(),
                    cause: e.cause(),
                });
            }
        }

        job.finish(result);
    }

    async fn execute(&self, command: &str) -> Result<()> {
        let token = translate(command)?;

        // The record may be replaced or cleared during the wait
        self.wait_for_interval().await;
        let device = self.registry.current().ok_or(RokuError::NoDevice)?;

        tracing::debug!("Sending {} as {} to {}", command, token, device.address);
        let request = EcpRequest::command(device.address, &token, self.send_timeout);
        let outcome = timeout(self.send_timeout, self.transport.execute(request))
            .await
            .unwrap_or(Err(TransportError::Timeout));

        match classify(device.address, outcome) {
            Ok(_) => {
                *self.last_send.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
                Ok(())
            }
            Err(RokuError::AuthorizationRequired { .. }) => {
                Err(self.authorization_denied(&device, command).await)
            }
            Err(e) if e.cause() == ErrorCause::Unreachable => {
                self.device_lost(&device);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn wait_for_interval(&self) {
        let last = *self.last_send.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = last {
            sleep_until(last + self.interval).await;
        }
    }

    /// One pairing attempt at most; the command is never re-sent
    async fn authorization_denied(&self, device: &DeviceRecord, command: &str) -> RokuError {
        let pairing_requested = if device.capabilities.requires_pairing {
            match self.pairing.request_pairing(device).await {
                Ok(()) => {
                    self.events.emit(EngineEvent::PairingRequested(device.address));
                    true
                }
                Err(e) => {
                    tracing::warn!("Pairing request to {} failed: {}", device.address, e);
                    false
                }
            }
        } else {
            false
        };

        RokuError::AuthorizationRequired {
            address: device.address,
            command: Some(command.to_string()),
            pairing_requested,
        }
    }

    fn device_lost(&self, device: &DeviceRecord) {
        if !self.registry.invalidate(device.address) {
            return;
        }
        let address = device.address;
        let dropped = self.fail_pending(|| RokuError::Unreachable {
            address,
            reason: "device became unreachable before this command was sent".to_string(),
        });
        if dropped > 0 {
            tracing::info!("Dropped {} queued command(s) for {}", dropped, address);
        }
    }

    fn fail_pending(&self, error: impl Fn() -> RokuError) -> usize {
        let jobs: Vec<CommandJob> = self.lock_queue().drain(..).collect();
        let count = jobs.len();
        for job in jobs {
            let e = error();
            self.events.emit(EngineEvent::CommandFailed {
                command: job.command.clone(),
                cause: e.cause(),
            });
            job.finish(Err(e));
        }
        count
    }
}
