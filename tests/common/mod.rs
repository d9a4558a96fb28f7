#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bookoo_ultra::decoding::checksum;
use bookoo_ultra::{DisconnectHook, Endpoint, ScaleConfig, Transport, TransportError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone)]
pub struct Write {
    pub endpoint: Endpoint,
    pub bytes: Vec<u8>,
    pub at: Instant,
}

pub struct MockLink {
    pub id: usize,
}

#[derive(Default)]
struct Inner {
    writes: Vec<Write>,
    write_attempts: usize,
    sink: Option<mpsc::Sender<Vec<u8>>>,
    hook: Option<DisconnectHook>,
    connects: usize,
    disconnects: usize,
    cancelled_connects: usize,
    fail_connect: Option<TransportError>,
    connect_delay: Duration,
    fail_writes: Option<TransportError>,
    write_delay: Duration,
}

/// In-memory transport that records writes and lets tests inject
/// notifications and link loss.
#[derive(Default)]
pub struct MockTransport {
    inner: Mutex<Inner>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn writes(&self) -> Vec<Write> {
        self.inner.lock().writes.clone()
    }

    pub fn written_codes(&self) -> Vec<u8> {
        self.inner.lock().writes.iter().map(|w| w.bytes[2]).collect()
    }

    pub fn write_attempts(&self) -> usize {
        self.inner.lock().write_attempts
    }

    pub fn connects(&self) -> usize {
        self.inner.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.inner.lock().disconnects
    }

    pub fn cancelled_connects(&self) -> usize {
        self.inner.lock().cancelled_connects
    }

    pub fn fail_connect(&self, error: Option<TransportError>) {
        self.inner.lock().fail_connect = error;
    }

    pub fn delay_connect(&self, delay: Duration) {
        self.inner.lock().connect_delay = delay;
    }

    pub fn fail_writes(&self, error: Option<TransportError>) {
        self.inner.lock().fail_writes = error;
    }

    pub fn delay_writes(&self, delay: Duration) {
        self.inner.lock().write_delay = delay;
    }

    /// Deliver a notification as the radio would.
    pub fn notify(&self, bytes: &[u8]) {
        let sink = self.inner.lock().sink.clone();
        if let Some(sink) = sink {
            let _ = sink.try_send(bytes.to_vec());
        }
    }

    /// Simulate the scale dropping the link.
    pub fn drop_link(&self) {
        let hook = self.inner.lock().hook.clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Link = MockLink;

    async fn connect(
        &self,
        _address: &str,
        on_disconnect: DisconnectHook,
    ) -> Result<MockLink, TransportError> {
        let delay = self.inner.lock().connect_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let mut inner = self.inner.lock();
        if let Some(error) = inner.fail_connect.clone() {
            return Err(error);
        }
        inner.connects += 1;
        inner.hook = Some(on_disconnect);
        Ok(MockLink { id: inner.connects })
    }

    async fn subscribe(
        &self,
        _link: &MockLink,
        endpoint: Endpoint,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), TransportError> {
        assert_eq!(endpoint, Endpoint::Weight);
        self.inner.lock().sink = Some(sink);
        Ok(())
    }

    async fn write(
        &self,
        _link: &MockLink,
        endpoint: Endpoint,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let at = Instant::now();
        let (delay, failure) = {
            let mut inner = self.inner.lock();
            inner.write_attempts += 1;
            (inner.write_delay, inner.fail_writes.clone())
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if let Some(error) = failure {
            return Err(error);
        }
        self.inner.lock().writes.push(Write {
            endpoint,
            bytes: payload.to_vec(),
            at,
        });
        Ok(())
    }

    async fn disconnect(&self, _link: &MockLink) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        inner.disconnects += 1;
        inner.sink = None;
        Ok(())
    }

    async fn cancel_connect(&self, _address: &str) -> Result<(), TransportError> {
        self.inner.lock().cancelled_connects += 1;
        Ok(())
    }
}

pub fn config() -> ScaleConfig {
    ScaleConfig::default()
}

/// A valid telemetry frame for `weight` hundredths of a gram.
pub fn telemetry(weight_centigrams: u32, battery: u8) -> [u8; 20] {
    let w = weight_centigrams.to_be_bytes();
    let mut frame = [
        0xaa, 0x55, 0x00, 0x03, 0xe8, 0x02, 0x2b, w[1], w[2], w[3], 0x2b, 0x00, 0x96, battery,
        0x00, 0x0f, 0x03, 0x01, 0x00, 0x00,
    ];
    frame[19] = checksum(&frame[..19]);
    frame
}
