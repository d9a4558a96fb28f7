use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use btleplug::api::{Central, CentralEvent, Peripheral, ScanFilter};
use futures::stream::{Stream, StreamExt};
use tracing::debug;

use crate::btle_transport::BtleTransport;
use crate::constants::SCALE_NAME_PREFIXES;
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredScale {
    pub address: String,
    pub name: String,
}

pub fn is_scale_name(name: &str) -> bool {
    SCALE_NAME_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

pub struct BookooScanner {
    transport: BtleTransport,
}

impl BookooScanner {
    pub async fn new() -> Result<Self, TransportError> {
        Ok(Self {
            transport: BtleTransport::new().await?,
        })
    }

    /// Transport on the same adapter the scanner uses.
    pub fn transport(&self) -> BtleTransport {
        self.transport.clone()
    }

    pub async fn start_scan(
        &self,
    ) -> Result<Pin<Box<dyn Stream<Item = DiscoveredScale> + Send>>, TransportError> {
        let central = self.transport.adapter().clone();
        central.start_scan(ScanFilter::default()).await?;
        let mut events = central.events().await?;

        let scales = stream! {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = central.peripheral(&id).await else {
                    continue;
                };
                if let Some(scale) = Self::as_scale(&peripheral).await {
                    yield scale;
                }
            }
        };
        Ok(Box::pin(scales))
    }

    /// Scan for `timeout` and collect every distinct scale seen.
    pub async fn find_scales(&self, timeout: Duration) -> Result<Vec<DiscoveredScale>, TransportError> {
        debug!("looking for Bookoo scales");
        let mut scan = self.start_scan().await?;
        let mut found: Vec<DiscoveredScale> = Vec::new();

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                next = scan.next() => match next {
                    Some(scale) => {
                        if !found.iter().any(|s| s.address == scale.address) {
                            debug!(name = %scale.name, address = %scale.address, "found scale");
                            found.push(scale);
                        }
                    }
                    None => break,
                },
            }
        }

        self.transport.adapter().stop_scan().await?;
        Ok(found)
    }

    async fn as_scale(peripheral: &impl Peripheral) -> Option<DiscoveredScale> {
        let name = peripheral.properties().await.ok().flatten()?.local_name?;
        is_scale_name(&name).then(|| DiscoveredScale {
            address: peripheral.address().to_string(),
            name,
        })
    }
}
