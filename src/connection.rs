use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScaleConfig;
use crate::decoding::decode;
use crate::dispatcher::CommandDispatcher;
use crate::error::{Result, TransportError};
use crate::state::DeviceState;
use crate::transport::{DisconnectHook, Endpoint, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct LinkStatus {
    state: ConnectionState,
    last_disconnect: Option<Instant>,
    /// Bumped on every connect and explicit disconnect, so callbacks from an
    /// older link cannot touch the current one.
    generation: u64,
}

/// State reachable from transport callbacks and the command consumer.
struct Shared {
    status: Mutex<LinkStatus>,
    device: Arc<DeviceState>,
    dispatcher: Mutex<Option<Arc<CommandDispatcher>>>,
}

impl Shared {
    /// Returns the generation that was lost, or `None` for a stale callback.
    fn link_lost(&self, generation: Option<u64>, notify: bool) -> Option<u64> {
        let lost = {
            let mut status = self.status.lock();
            if generation.is_some_and(|g| g != status.generation) {
                debug!("ignoring disconnect from a previous link");
                return None;
            }
            status.state = ConnectionState::Disconnected;
            status.last_disconnect = Some(Instant::now());
            status.generation
        };
        info!("scale disconnected");

        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.cancel();
        }
        if notify {
            self.device.notify();
        }
        Some(lost)
    }

    fn write_failed(&self, generation: u64) {
        {
            let mut status = self.status.lock();
            if status.generation != generation {
                return;
            }
            status.state = ConnectionState::Disconnected;
        }
        // the consumer has already stopped itself
        self.dispatcher.lock().take();
    }
}

struct ActiveLink<L> {
    link: Arc<L>,
    telemetry: JoinHandle<()>,
    generation: u64,
}

type LinkSlot<L> = tokio::sync::Mutex<Option<ActiveLink<L>>>;

/// Owns the link lifecycle of one scale.
pub struct ConnectionManager<T: Transport> {
    transport: Arc<T>,
    address: String,
    config: ScaleConfig,
    shared: Arc<Shared>,
    active: Arc<LinkSlot<T::Link>>,
    keep_alive: Mutex<Option<CancellationToken>>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>, address: impl Into<String>, config: ScaleConfig) -> Self {
        Self {
            transport,
            address: address.into(),
            config,
            shared: Arc::new(Shared {
                status: Mutex::new(LinkStatus {
                    state: ConnectionState::Disconnected,
                    last_disconnect: None,
                    generation: 0,
                }),
                device: Arc::new(DeviceState::new()),
                dispatcher: Mutex::new(None),
            }),
            active: Arc::new(tokio::sync::Mutex::new(None)),
            keep_alive: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<DeviceState> {
        &self.shared.device
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn last_disconnect(&self) -> Option<Instant> {
        self.shared.status.lock().last_disconnect
    }

    /// Dispatcher of the live session, if any.
    pub fn dispatcher(&self) -> Option<Arc<CommandDispatcher>> {
        self.shared.dispatcher.lock().clone()
    }

    /// Bring the link up.
    ///
    /// Returns immediately when already connected, or when the last link loss
    /// was less than `reconnect_cooldown` ago; in the latter case the manager
    /// stays disconnected.
    pub async fn connect(&self) -> Result<()> {
        self.connect_unless(None).await
    }

    /// Retry [`connect`](Self::connect) every `interval` while the link is down.
    ///
    /// Runs until [`disconnect`](Self::disconnect) is called or the manager is
    /// dropped. Attempts inside the reconnect cooldown are skipped by
    /// `connect` itself. A second call replaces the running loop.
    pub fn spawn_keep_alive(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let stop = CancellationToken::new();
        let previous = self.keep_alive.lock().replace(stop.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = sleep(interval) => {}
                }
                let Some(current) = manager.upgrade() else {
                    break;
                };
                if current.is_connected() {
                    continue;
                }
                if let Err(error) = current.connect_unless(Some(&stop)).await {
                    debug!(%error, "reconnect attempt failed");
                }
            }
            debug!("keep-alive stopped");
        })
    }

    async fn connect_unless(&self, stop: Option<&CancellationToken>) -> Result<()> {
        let mut active = self.active.lock().await;
        if stop.is_some_and(|stop| stop.is_cancelled()) {
            return Ok(());
        }

        let generation = {
            let mut status = self.shared.status.lock();
            if status.state == ConnectionState::Connected {
                return Ok(());
            }
            if let Some(at) = status.last_disconnect {
                let since = at.elapsed();
                if since < self.config.reconnect_cooldown {
                    debug!(
                        ?since,
                        "scale was disconnected recently, waiting before reconnecting"
                    );
                    return Ok(());
                }
            }
            status.state = ConnectionState::Connecting;
            status.generation += 1;
            status.generation
        };

        if let Some(stale) = active.take() {
            self.teardown(stale).await;
        }

        info!(address = %self.address, "connecting to scale");
        let link = match self.establish(generation).await {
            Ok(link) => link,
            Err(error) => {
                debug!(%error, "error during connecting to scale");
                self.set_state(generation, ConnectionState::Disconnected);
                return Err(error.into());
            }
        };

        let dispatcher = Arc::new(CommandDispatcher::spawn(
            Arc::clone(&self.transport),
            Arc::clone(&link.link),
            &self.config,
            self.failure_hook(generation),
        ));

        let lost_during_setup = {
            let mut status = self.shared.status.lock();
            if status.generation == generation && status.state == ConnectionState::Connecting {
                status.state = ConnectionState::Connected;
                *self.shared.dispatcher.lock() = Some(Arc::clone(&dispatcher));
                false
            } else {
                true
            }
        };
        if lost_during_setup {
            dispatcher.cancel();
            self.teardown(link).await;
            return Err(TransportError::Link("link lost while connecting".into()).into());
        }

        *active = Some(link);
        info!(address = %self.address, "connected to scale");
        Ok(())
    }

    /// Bring the link down on request.
    ///
    /// Stops the keep-alive loop, discards queued commands, lets a write
    /// already in flight finish, then tears the link down. Teardown errors
    /// are logged only.
    pub async fn disconnect(&self) {
        let keep_alive = self.keep_alive.lock().take();
        if let Some(keep_alive) = keep_alive {
            keep_alive.cancel();
        }

        let mut active = self.active.lock().await;
        debug!("disconnecting from scale");
        {
            let mut status = self.shared.status.lock();
            status.state = ConnectionState::Disconnected;
            status.generation += 1;
        }

        let dispatcher = self.shared.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.shutdown().await;
        }
        if let Some(link) = active.take() {
            self.teardown(link).await;
        }
    }

    /// The link went away without being asked to.
    ///
    /// Records the time for the reconnect cooldown, drops the command queue
    /// at once and, when `notify` is set, fires the device state hook. The
    /// lost link is released in the background.
    pub fn handle_link_lost(&self, notify: bool) {
        if let Some(generation) = self.shared.link_lost(None, notify) {
            release_lost_link(
                Arc::downgrade(&self.active),
                Arc::downgrade(&self.transport),
                self.config.connect_timeout,
                generation,
            );
        }
    }

    async fn establish(&self, generation: u64) -> Result<ActiveLink<T::Link>, TransportError> {
        let connected = with_timeout(
            self.config.connect_timeout,
            self.transport.connect(&self.address, self.disconnect_hook(generation)),
        )
        .await;
        let link = match connected {
            Ok(link) => Arc::new(link),
            Err(error @ TransportError::Timeout(_)) => {
                // the attempt may have got as far as a live connection
                let cancelled = with_timeout(
                    self.config.connect_timeout,
                    self.transport.cancel_connect(&self.address),
                )
                .await;
                if let Err(cancel_error) = cancelled {
                    warn!(%cancel_error, "error abandoning connection attempt");
                }
                return Err(error);
            }
            Err(error) => return Err(error),
        };

        let (sink, notifications) = mpsc::channel(self.config.notification_buffer);
        let subscribed = with_timeout(
            self.config.connect_timeout,
            self.transport.subscribe(link.as_ref(), Endpoint::Weight, sink),
        )
        .await;
        if let Err(error) = subscribed {
            debug!(%error, "error subscribing to notifications");
            release(self.transport.as_ref(), link.as_ref(), self.config.connect_timeout).await;
            return Err(error);
        }

        let telemetry = tokio::spawn(route_notifications(
            notifications,
            Arc::clone(&self.shared.device),
        ));
        sleep(self.config.settle_delay).await;

        Ok(ActiveLink {
            link,
            telemetry,
            generation,
        })
    }

    async fn teardown(&self, active: ActiveLink<T::Link>) {
        teardown(self.transport.as_ref(), active, self.config.connect_timeout).await;
    }

    fn set_state(&self, generation: u64, state: ConnectionState) {
        let mut status = self.shared.status.lock();
        if status.generation == generation {
            status.state = state;
        }
    }

    fn disconnect_hook(&self, generation: u64) -> DisconnectHook {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let active = Arc::downgrade(&self.active);
        let transport = Arc::downgrade(&self.transport);
        let limit = self.config.connect_timeout;
        Arc::new(move || {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            if let Some(lost) = shared.link_lost(Some(generation), true) {
                release_lost_link(active.clone(), transport.clone(), limit, lost);
            }
        })
    }

    fn failure_hook(&self, generation: u64) -> Box<dyn Fn(&TransportError) + Send + Sync> {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Box::new(move |_: &TransportError| {
            if let Some(shared) = shared.upgrade() {
                shared.write_failed(generation);
            }
        })
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        if let Some(keep_alive) = self.keep_alive.get_mut().take() {
            keep_alive.cancel();
        }
        if let Some(dispatcher) = self.shared.dispatcher.lock().take() {
            dispatcher.cancel();
        }
        if let Ok(mut active) = self.active.try_lock() {
            if let Some(active) = active.take() {
                active.telemetry.abort();
            }
        }
    }
}

/// Tear down the link of `generation` if it is still the one in `slot`.
///
/// The slot lock is held across the transport call so a reconnect cannot
/// race the release of the old link.
fn release_lost_link<T: Transport>(
    slot: Weak<LinkSlot<T::Link>>,
    transport: Weak<T>,
    limit: Duration,
    generation: u64,
) {
    let Ok(runtime) = Handle::try_current() else {
        debug!("no runtime to release the lost link on");
        return;
    };
    runtime.spawn(async move {
        let (Some(slot), Some(transport)) = (slot.upgrade(), transport.upgrade()) else {
            return;
        };
        let mut active = slot.lock().await;
        if active.as_ref().is_some_and(|a| a.generation == generation) {
            if let Some(lost) = active.take() {
                teardown(transport.as_ref(), lost, limit).await;
            }
        }
    });
}

async fn teardown<T: Transport>(transport: &T, active: ActiveLink<T::Link>, limit: Duration) {
    active.telemetry.abort();
    release(transport, active.link.as_ref(), limit).await;
}

async fn release<T: Transport>(transport: &T, link: &T::Link, limit: Duration) {
    match with_timeout(limit, transport.disconnect(link)).await {
        Ok(()) => debug!("disconnected from scale"),
        Err(error) => warn!(%error, "error disconnecting from scale"),
    }
}

async fn with_timeout<F, R>(limit: Duration, operation: F) -> Result<R, TransportError>
where
    F: Future<Output = Result<R, TransportError>>,
{
    timeout(limit, operation)
        .await
        .unwrap_or(Err(TransportError::Timeout(limit)))
}

async fn route_notifications(mut notifications: mpsc::Receiver<Vec<u8>>, device: Arc<DeviceState>) {
    while let Some(buffer) = notifications.recv().await {
        match decode(&buffer) {
            Ok(Some(frame)) => {
                frame.log();
                device.apply(&frame);
            }
            Ok(None) => debug!("ignoring non-telemetry notification: {buffer:02X?}"),
            Err(error) => error.log(&buffer),
        }
    }
}
