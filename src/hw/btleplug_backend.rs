use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, trace};

use super::hardware::{
    AdvertisementStream, CharacteristicHandle, DeskLink, DiscoveredCharacteristic,
    DiscoveredService, HardwareClient, NotificationHandler,
};
use super::model::Advertisement;
use crate::error::{DeskError, LinkError};

const PERIPHERAL_POLL_INTERVAL: Duration = Duration::from_millis(250);
const ADVERTISEMENT_BUFFER: usize = 64;

/// Hardware client backed by the first `btleplug` adapter on the host.
#[derive(Debug, Default)]
pub(crate) struct BtleplugClient {
    radio: OnceCell<Radio>,
}

#[derive(Debug)]
struct Radio {
    _manager: Manager,
    adapter: Adapter,
}

impl BtleplugClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enables the radio on first use.
    #[instrument(skip(self), level = "trace")]
    async fn adapter(&self) -> Result<&Adapter, DeskError> {
        let radio = self
            .radio
            .get_or_try_init(|| async {
                let manager = Manager::new()
                    .await
                    .map_err(|source| DeskError::Radio {
                        source: source.into(),
                    })?;
                let adapters = manager.adapters().await.map_err(|source| DeskError::Radio {
                    source: source.into(),
                })?;
                let adapter = adapters.into_iter().next().ok_or(DeskError::NoAdapters)?;
                if let Ok(info) = adapter.adapter_info().await {
                    debug!(adapter = %info, "BLE radio enabled");
                }
                Ok::<_, DeskError>(Radio {
                    _manager: manager,
                    adapter,
                })
            })
            .await?;
        Ok(&radio.adapter)
    }
}

#[async_trait]
impl HardwareClient for BtleplugClient {
    #[instrument(skip(self), level = "debug")]
    async fn connect(
        &self,
        address: &str,
        limit: Duration,
    ) -> Result<Box<dyn DeskLink>, DeskError> {
        let adapter = self.adapter().await?;
        let connected = match timeout(limit, find_and_connect(adapter, address)).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::Timeout(limit)),
        };
        if let Err(error) = adapter.stop_scan().await {
            debug!(?error, "failed to stop adapter scan cleanly");
        }

        let peripheral = connected.map_err(|source| DeskError::Connection {
            address: address.to_string(),
            source,
        })?;
        info!(%address, "connected to peripheral");
        Ok(Box::new(BtleplugLink::new(peripheral)))
    }

    #[instrument(skip(self), level = "debug")]
    async fn start_scan(&self) -> Result<AdvertisementStream, DeskError> {
        let adapter = self.adapter().await?.clone();
        let mut events = adapter.events().await.map_err(|source| DeskError::Scan {
            source: source.into(),
        })?;
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|source| DeskError::Scan {
                source: source.into(),
            })?;

        let (sender, receiver) = mpsc::channel(ADVERTISEMENT_BUFFER);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let properties = peripheral.properties().await.ok().flatten();
                let (address, local_name) = match properties {
                    Some(properties) => (
                        peripheral_address(properties.address, &id.to_string()),
                        properties.local_name,
                    ),
                    None => (id.to_string(), None),
                };
                trace!(%address, ?local_name, "advertisement");
                if sender
                    .send(Advertisement::new(address, local_name))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(receiver)))
    }

    #[instrument(skip(self), level = "debug")]
    async fn stop_scan(&self) -> Result<(), DeskError> {
        self.adapter()
            .await?
            .stop_scan()
            .await
            .map_err(|source| DeskError::Scan {
                source: source.into(),
            })
    }
}

/// Scans until a peripheral with `address` appears, then connects to it.
async fn find_and_connect(adapter: &Adapter, address: &str) -> Result<Peripheral, LinkError> {
    adapter.start_scan(ScanFilter::default()).await?;
    loop {
        for peripheral in adapter.peripherals().await? {
            let id = peripheral.id().to_string();
            let reported = peripheral
                .properties()
                .await?
                .map(|properties| peripheral_address(properties.address, &id));
            let matches = [Some(&id), reported.as_ref()]
                .into_iter()
                .flatten()
                .any(|candidate| candidate.eq_ignore_ascii_case(address));
            if !matches {
                continue;
            }

            if !peripheral.is_connected().await? {
                peripheral.connect().await?;
            }
            return Ok(peripheral);
        }

        sleep(PERIPHERAL_POLL_INTERVAL).await;
    }
}

/// Some platforms hide the hardware address and report zeros; fall back to the
/// platform peripheral id there.
fn peripheral_address(address: BDAddr, id: &str) -> String {
    if address == BDAddr::default() {
        id.to_string()
    } else {
        address.to_string()
    }
}

/// Link bound to one connected `btleplug` peripheral.
#[derive(Debug)]
struct BtleplugLink {
    peripheral: Peripheral,
    characteristics: Vec<Characteristic>,
    listeners: Mutex<HashMap<CharacteristicHandle, JoinHandle<()>>>,
}

impl BtleplugLink {
    fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: Vec::new(),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    fn characteristic(&self, handle: CharacteristicHandle) -> Result<&Characteristic, LinkError> {
        self.characteristics
            .get(handle.index())
            .ok_or(LinkError::UnknownHandle(handle))
    }

    fn take_listener(&self, handle: CharacteristicHandle) -> Option<JoinHandle<()>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
    }

    fn abort_listeners(&self) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, listener) in listeners.drain() {
            listener.abort();
        }
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        self.abort_listeners();
    }
}

#[async_trait]
impl DeskLink for BtleplugLink {
    #[instrument(skip(self), level = "debug")]
    async fn discover(&mut self) -> Result<Vec<DiscoveredService>, LinkError> {
        self.peripheral.discover_services().await?;

        self.characteristics.clear();
        let mut services = Vec::new();
        for service in self.peripheral.services() {
            let mut characteristics = Vec::with_capacity(service.characteristics.len());
            for characteristic in service.characteristics {
                let handle = CharacteristicHandle::new(self.characteristics.len());
                characteristics.push(DiscoveredCharacteristic::new(characteristic.uuid, handle));
                self.characteristics.push(characteristic);
            }
            services.push(DiscoveredService::new(service.uuid, characteristics));
        }
        Ok(services)
    }

    #[instrument(skip(self), level = "trace", fields(%handle))]
    async fn read(&self, handle: CharacteristicHandle) -> Result<Vec<u8>, LinkError> {
        let characteristic = self.characteristic(handle)?;
        Ok(self.peripheral.read(characteristic).await?)
    }

    #[instrument(skip(self, payload), level = "trace", fields(%handle, payload_len = payload.len()))]
    async fn write_without_response(
        &self,
        handle: CharacteristicHandle,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        let characteristic = self.characteristic(handle)?;
        self.peripheral
            .write(characteristic, payload, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, on_notification), level = "debug", fields(%handle))]
    async fn subscribe(
        &self,
        handle: CharacteristicHandle,
        on_notification: NotificationHandler,
    ) -> Result<(), LinkError> {
        let characteristic = self.characteristic(handle)?;
        let expected_uuid = characteristic.uuid;
        let mut notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(characteristic).await?;

        let listener = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == expected_uuid {
                    on_notification(&notification.value);
                }
            }
        });
        let previous = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, listener);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(%handle))]
    async fn unsubscribe(&self, handle: CharacteristicHandle) -> Result<(), LinkError> {
        if let Some(listener) = self.take_listener(handle) {
            listener.abort();
        }
        let characteristic = self.characteristic(handle)?;
        self.peripheral.unsubscribe(characteristic).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn disconnect(self: Box<Self>) -> Result<(), LinkError> {
        self.abort_listeners();
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}
