use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::constants::{COMMAND_CHARACTERISTIC_UUID, WEIGHT_CHARACTERISTIC_UUID};
use crate::error::TransportError;

/// Called by the transport when the link drops without being asked to.
pub type DisconnectHook = Arc<dyn Fn() + Send + Sync>;

/// Named GATT endpoints of the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Telemetry notifications.
    Weight,
    /// Command writes.
    Command,
}

impl Endpoint {
    pub fn uuid(&self) -> Uuid {
        match *self {
            Endpoint::Weight => WEIGHT_CHARACTERISTIC_UUID,
            Endpoint::Command => COMMAND_CHARACTERISTIC_UUID,
        }
    }
}

/// The BLE capability the driver sits on.
///
/// Notifications are pushed into the bounded `sink` handed to `subscribe`;
/// implementations must use `try_send` so a slow consumer never stalls the
/// radio. A full sink drops the buffer.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Link: Send + Sync + 'static;

    async fn connect(
        &self,
        address: &str,
        on_disconnect: DisconnectHook,
    ) -> Result<Self::Link, TransportError>;

    async fn subscribe(
        &self,
        link: &Self::Link,
        endpoint: Endpoint,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), TransportError>;

    async fn write(
        &self,
        link: &Self::Link,
        endpoint: Endpoint,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    async fn disconnect(&self, link: &Self::Link) -> Result<(), TransportError>;

    /// Release whatever a `connect` that was abandoned part way left behind.
    async fn cancel_connect(&self, _address: &str) -> Result<(), TransportError> {
        Ok(())
    }
}
