use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ScaleConfig;
use crate::encoding::CommandFrame;
use crate::error::{ScaleError, TransportError};
use crate::transport::{Endpoint, Transport};

pub type FailureHook = Box<dyn Fn(&TransportError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedCommand {
    pub endpoint: Endpoint,
    pub frame: CommandFrame,
}

type Queue = Arc<Mutex<VecDeque<QueuedCommand>>>;

/// Serialized writer for one connection session.
///
/// One background task drains the queue in FIFO order, writing one frame at
/// a time and pausing `command_spacing` after each write. Once stopped,
/// either by [`cancel`](Self::cancel), [`shutdown`](Self::shutdown) or a
/// failed write, the dispatcher rejects new commands and everything still
/// queued is dropped unsent.
pub struct CommandDispatcher {
    queue: Queue,
    wakeup: Arc<Notify>,
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CommandDispatcher {
    pub fn spawn<T: Transport>(
        transport: Arc<T>,
        link: Arc<T::Link>,
        config: &ScaleConfig,
        on_failure: FailureHook,
    ) -> Self {
        let queue: Queue = Arc::new(Mutex::new(VecDeque::new()));
        let wakeup = Arc::new(Notify::new());
        let stop = CancellationToken::new();

        let consumer = Consumer {
            transport,
            link,
            queue: Arc::clone(&queue),
            wakeup: Arc::clone(&wakeup),
            stop: stop.clone(),
            write_timeout: config.write_timeout,
            spacing: config.command_spacing,
            on_failure,
        };
        let task = tokio::spawn(consumer.run());

        Self {
            queue,
            wakeup,
            stop,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn enqueue(&self, endpoint: Endpoint, frame: CommandFrame) -> Result<(), ScaleError> {
        {
            // checked under the queue lock so a concurrent cancel clears this entry too
            let mut queue = self.queue.lock();
            if self.stop.is_cancelled() {
                return Err(ScaleError::NotConnected);
            }
            queue.push_back(QueuedCommand { endpoint, frame });
        }
        self.wakeup.notify_one();
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_running(&self) -> bool {
        !self.stop.is_cancelled()
            && self
                .task
                .lock()
                .as_ref()
                .is_some_and(|task| !task.is_finished())
    }

    /// Drop everything queued and kill the consumer without waiting for an
    /// in-flight write.
    pub fn cancel(&self) {
        let dropped = self.halt();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        if dropped > 0 {
            debug!(dropped, "command queue cancelled");
        }
    }

    /// Drop everything queued and wait for the consumer to finish the write
    /// it may be in the middle of.
    pub async fn shutdown(&self) {
        let dropped = self.halt();
        if dropped > 0 {
            debug!(dropped, "discarded queued commands on disconnect");
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                if error.is_panic() {
                    warn!(%error, "command consumer panicked");
                }
            }
        }
    }

    fn halt(&self) -> usize {
        self.stop.cancel();
        let mut queue = self.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

struct Consumer<T: Transport> {
    transport: Arc<T>,
    link: Arc<T::Link>,
    queue: Queue,
    wakeup: Arc<Notify>,
    stop: CancellationToken,
    write_timeout: Duration,
    spacing: Duration,
    on_failure: FailureHook,
}

impl<T: Transport> Consumer<T> {
    async fn run(self) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                next = self.next() => next,
            };

            if let Err(error) = self.write(&next).await {
                warn!(%error, code = next.frame.code(), "command write failed, ending session");
                self.stop.cancel();
                (self.on_failure)(&error);
                break;
            }
            debug!(frame = ?next.frame, "command written");

            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = sleep(self.spacing) => {}
            }
        }
        self.queue.lock().clear();
    }

    async fn next(&self) -> QueuedCommand {
        loop {
            let notified = self.wakeup.notified();
            let entry = self.queue.lock().pop_front();
            if let Some(entry) = entry {
                return entry;
            }
            notified.await;
        }
    }

    async fn write(&self, entry: &QueuedCommand) -> Result<(), TransportError> {
        let write = self
            .transport
            .write(self.link.as_ref(), entry.endpoint, entry.frame.as_bytes());
        match timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.write_timeout)),
        }
    }
}
