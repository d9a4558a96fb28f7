use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::transport::{DisconnectHook, Endpoint, Transport};

const LOOKUP_SCAN: Duration = Duration::from_secs(10);

/// [`Transport`] over the host's first Bluetooth adapter.
#[derive(Clone)]
pub struct BtleTransport {
    adapter: Adapter,
    lookup_scan: Duration,
}

pub struct BtleLink {
    peripheral: Peripheral,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BtleLink {
    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for BtleLink {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

impl BtleTransport {
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::DeviceNotFound("no Bluetooth adapter".into()))?;
        Ok(Self::from_adapter(adapter))
    }

    pub fn from_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            lookup_scan: LOOKUP_SCAN,
        }
    }

    /// How long `connect` scans for an address the adapter has not seen yet.
    pub fn with_lookup_scan(mut self, limit: Duration) -> Self {
        self.lookup_scan = limit;
        self
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn known_peripheral(&self, address: &str) -> Result<Option<Peripheral>, TransportError> {
        for peripheral in self.adapter.peripherals().await? {
            if same_address(&peripheral.address().to_string(), address) {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    /// Most platforms only know peripherals seen by a scan, so an address
    /// given up front is looked for with a short scan of its own.
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral, TransportError> {
        if let Some(peripheral) = self.known_peripheral(address).await? {
            return Ok(peripheral);
        }

        debug!(address, "scale not seen yet, scanning for it");
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        let lookup = async {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = self.adapter.peripheral(&id).await else {
                    continue;
                };
                if same_address(&peripheral.address().to_string(), address) {
                    return Some(peripheral);
                }
            }
            None
        };
        let found = timeout(self.lookup_scan, lookup).await.ok().flatten();
        if let Err(error) = self.adapter.stop_scan().await {
            debug!(%error, "error stopping lookup scan");
        }
        found.ok_or_else(|| TransportError::DeviceNotFound(address.to_string()))
    }

    fn characteristic(
        peripheral: &Peripheral,
        endpoint: Endpoint,
    ) -> Result<Characteristic, TransportError> {
        let uuid = endpoint.uuid();
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| TransportError::Link(format!("characteristic {uuid} not found")))
    }
}

#[async_trait]
impl Transport for BtleTransport {
    type Link = BtleLink;

    async fn connect(
        &self,
        address: &str,
        on_disconnect: DisconnectHook,
    ) -> Result<BtleLink, TransportError> {
        let peripheral = self.find_peripheral(address).await?;
        // subscribe before connecting so an early drop is not missed
        let mut events = self.adapter.events().await?;

        peripheral.connect().await?;
        if let Err(error) = peripheral.discover_services().await {
            if let Err(disconnect_error) = peripheral.disconnect().await {
                warn!(%disconnect_error, "error releasing scale after failed discovery");
            }
            return Err(error.into());
        }

        let id = peripheral.id();
        let watcher = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event {
                    if gone == id {
                        debug!("scale disconnected through adapter event");
                        on_disconnect();
                        break;
                    }
                }
            }
        });

        Ok(BtleLink {
            peripheral,
            tasks: Mutex::new(vec![watcher]),
        })
    }

    async fn subscribe(
        &self,
        link: &BtleLink,
        endpoint: Endpoint,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), TransportError> {
        let characteristic = Self::characteristic(&link.peripheral, endpoint)?;
        let mut notifications = link.peripheral.notifications().await?;
        link.peripheral.subscribe(&characteristic).await?;

        let uuid = characteristic.uuid;
        let pump = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != uuid {
                    continue;
                }
                match sink.try_send(notification.value) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => trace!("notification buffer full, dropping frame"),
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        });
        link.tasks.lock().push(pump);
        Ok(())
    }

    async fn write(
        &self,
        link: &BtleLink,
        endpoint: Endpoint,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let characteristic = Self::characteristic(&link.peripheral, endpoint)?;
        let write_type = if characteristic
            .properties
            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
        {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };
        link.peripheral
            .write(&characteristic, payload, write_type)
            .await?;
        Ok(())
    }

    async fn disconnect(&self, link: &BtleLink) -> Result<(), TransportError> {
        link.abort_tasks();
        link.peripheral.disconnect().await?;
        Ok(())
    }

    async fn cancel_connect(&self, address: &str) -> Result<(), TransportError> {
        if let Some(peripheral) = self.known_peripheral(address).await? {
            if peripheral.is_connected().await? {
                debug!(address, "releasing scale after an abandoned connect");
                peripheral.disconnect().await?;
            }
        }
        Ok(())
    }
}

fn same_address(peripheral: &str, wanted: &str) -> bool {
    peripheral.eq_ignore_ascii_case(wanted.trim())
}
