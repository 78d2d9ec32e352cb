use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_stream::Stream;
use uuid::Uuid;

use super::btleplug_backend::BtleplugClient;
use super::fake_backend::{FakeDesk, FakeDeskConfig};
use super::model::Advertisement;
use crate::error::{DeskError, LinkError};

/// Callback invoked by a link for every notification payload.
///
/// Links call it from a context they own (a spawned task or the write path of a
/// fake), never from the caller's task.
pub type NotificationHandler = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Raw advertisements produced by a running scan.
pub type AdvertisementStream = Pin<Box<dyn Stream<Item = Advertisement> + Send + 'static>>;

/// Opaque per-link reference to one discovered characteristic.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, derive_more::Display,
)]
#[display("#{_0}")]
pub struct CharacteristicHandle(usize);

impl CharacteristicHandle {
    /// Creates a handle from a link-local index.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the link-local index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A characteristic reported during service discovery.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DiscoveredCharacteristic {
    uuid: Uuid,
    handle: CharacteristicHandle,
}

impl DiscoveredCharacteristic {
    #[must_use]
    pub fn new(uuid: Uuid, handle: CharacteristicHandle) -> Self {
        Self { uuid, handle }
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn handle(&self) -> CharacteristicHandle {
        self.handle
    }
}

/// A service reported during service discovery, with its characteristics.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DiscoveredService {
    uuid: Uuid,
    characteristics: Vec<DiscoveredCharacteristic>,
}

impl DiscoveredService {
    #[must_use]
    pub fn new(uuid: Uuid, characteristics: Vec<DiscoveredCharacteristic>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[must_use]
    pub fn characteristics(&self) -> &[DiscoveredCharacteristic] {
        &self.characteristics
    }
}

/// Entry point to a radio: opens desk links and runs advertisement scans.
///
/// Owned explicitly by the caller and handed to sessions and scanners, so tests can
/// substitute a fake radio.
#[async_trait]
pub trait HardwareClient: Send + Sync {
    /// Enables the radio and connects to the peripheral at `address` within `timeout`.
    async fn connect(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn DeskLink>, DeskError>;

    /// Starts a scan and returns the raw advertisement feed.
    async fn start_scan(&self) -> Result<AdvertisementStream, DeskError>;

    /// Stops a scan started by [`HardwareClient::start_scan`].
    async fn stop_scan(&self) -> Result<(), DeskError>;
}

/// A connected peripheral's GATT operations.
#[async_trait]
pub trait DeskLink: Send + Sync + Debug {
    /// Enumerates all services and, per service, all characteristics.
    async fn discover(&mut self) -> Result<Vec<DiscoveredService>, LinkError>;

    /// Reads a characteristic value.
    async fn read(&self, handle: CharacteristicHandle) -> Result<Vec<u8>, LinkError>;

    /// Writes a characteristic value without waiting for a response.
    async fn write_without_response(
        &self,
        handle: CharacteristicHandle,
        payload: &[u8],
    ) -> Result<(), LinkError>;

    /// Enables notifications and routes every payload to `on_notification`.
    async fn subscribe(
        &self,
        handle: CharacteristicHandle,
        on_notification: NotificationHandler,
    ) -> Result<(), LinkError>;

    /// Disables notifications and drops the registered handler.
    async fn unsubscribe(&self, handle: CharacteristicHandle) -> Result<(), LinkError>;

    /// Disconnects from the peripheral.
    async fn disconnect(self: Box<Self>) -> Result<(), LinkError>;
}

/// Creates a hardware client backed by the host's BLE adapter.
#[must_use]
pub fn real_hardware_client() -> Arc<dyn HardwareClient> {
    Arc::new(BtleplugClient::new())
}

/// Creates a hardware client backed by a simulated desk.
#[must_use]
pub fn fake_hardware_client(config: FakeDeskConfig) -> Arc<dyn HardwareClient> {
    Arc::new(FakeDesk::new(config))
}
