use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

use super::hardware::{
    CharacteristicHandle, DeskLink, DiscoveredService, HardwareClient, NotificationHandler,
};
use super::model::HeightSample;
use crate::error::DeskError;
use crate::handlers::HeightCodec;
use crate::protocol::{self, EndpointId, ResolvedIdentifiers};

const DEFAULT_NAME: &str = "desk";

/// Default bound on locating and connecting to a desk.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Characteristic UUIDs found on a connected peripheral, mapped to link handles.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub(crate) struct CharacteristicCatalog {
    by_uuid: HashMap<Uuid, CharacteristicHandle>,
}

impl CharacteristicCatalog {
    pub(crate) fn from_services(services: &[DiscoveredService]) -> Self {
        let mut by_uuid = HashMap::new();
        for service in services {
            for characteristic in service.characteristics() {
                by_uuid
                    .entry(characteristic.uuid())
                    .or_insert(characteristic.handle());
            }
        }
        Self { by_uuid }
    }

    pub(crate) fn get(&self, uuid: Uuid) -> Option<CharacteristicHandle> {
        self.by_uuid.get(&uuid).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_uuid.len()
    }
}

/// An open connection to one desk.
///
/// Created by [`DeviceSession::connect`]; the catalog is complete before any read
/// or write is possible. Consumed by [`DeviceSession::close`].
#[derive(Debug)]
pub struct DeviceSession {
    address: String,
    name: Option<String>,
    link: Box<dyn DeskLink>,
    identifiers: ResolvedIdentifiers,
    catalog: CharacteristicCatalog,
}

impl DeviceSession {
    /// Connects to the desk at `address` using [`DEFAULT_CONNECT_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// See [`DeviceSession::connect_with_timeout`].
    pub async fn connect(client: &dyn HardwareClient, address: &str) -> Result<Self, DeskError> {
        Self::connect_with_timeout(client, address, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connects to the desk at `address` and builds the characteristic catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if a fixed identifier is malformed, the connection cannot be
    /// opened within `timeout`, or service discovery fails.
    #[instrument(skip(client), level = "debug")]
    pub async fn connect_with_timeout(
        client: &dyn HardwareClient,
        address: &str,
        timeout: Duration,
    ) -> Result<Self, DeskError> {
        let identifiers = protocol::resolve_identifiers()?;
        let mut link = client.connect(address, timeout).await?;

        let services = match link.discover().await {
            Ok(services) => services,
            Err(source) => {
                if let Err(error) = link.disconnect().await {
                    debug!(?error, "failed to disconnect after discovery error");
                }
                return Err(DeskError::Discovery {
                    address: address.to_string(),
                    source,
                });
            }
        };
        let catalog = CharacteristicCatalog::from_services(&services);
        info!(
            services = services.len(),
            characteristics = catalog.len(),
            "connected to desk"
        );

        Ok(Self {
            address: address.to_string(),
            name: None,
            link,
            identifiers,
            catalog,
        })
    }

    /// Sets the display name reported by [`DeviceSession::name`].
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = (!name.trim().is_empty()).then_some(name);
        self
    }

    /// Returns the configured display name, or `"desk"`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_NAME)
    }

    /// Returns the address this session connected to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Reads the current height directly from the desk.
    ///
    /// # Errors
    ///
    /// Returns an error if the height characteristic is missing, the read fails, or
    /// the returned frame is too short.
    #[instrument(skip(self), level = "debug", fields(address = %self.address))]
    pub async fn get_height(&self) -> Result<HeightSample, DeskError> {
        let endpoint = EndpointId::Height;
        let handle = self.handle_for(endpoint)?;
        let frame = self
            .link
            .read(handle)
            .await
            .map_err(|source| DeskError::Read { endpoint, source })?;
        trace!(frame = %hex::encode(&frame), "height read");

        let meters = HeightCodec::decode_frame(&frame)?;
        Ok(HeightSample::read(meters))
    }

    #[instrument(skip(self, payload), level = "trace", fields(%endpoint, payload = %hex::encode(payload)))]
    pub(crate) async fn write(&self, endpoint: EndpointId, payload: &[u8]) -> Result<(), DeskError> {
        let handle = self.handle_for(endpoint)?;
        self.link
            .write_without_response(handle, payload)
            .await
            .map_err(|source| DeskError::Write { endpoint, source })
    }

    #[instrument(skip(self, on_notification), level = "debug", fields(%endpoint))]
    pub(crate) async fn subscribe(
        &self,
        endpoint: EndpointId,
        on_notification: NotificationHandler,
    ) -> Result<(), DeskError> {
        let handle = self.handle_for(endpoint)?;
        self.link
            .subscribe(handle, on_notification)
            .await
            .map_err(|source| DeskError::Subscription { endpoint, source })
    }

    #[instrument(skip(self), level = "debug", fields(%endpoint))]
    pub(crate) async fn unsubscribe(&self, endpoint: EndpointId) -> Result<(), DeskError> {
        let handle = self.handle_for(endpoint)?;
        self.link
            .unsubscribe(handle)
            .await
            .map_err(|source| DeskError::Subscription { endpoint, source })
    }

    /// Disconnects from the desk.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to disconnect.
    #[instrument(skip(self), level = "debug", fields(address = %self.address))]
    pub async fn close(self) -> Result<(), DeskError> {
        let Self { address, link, .. } = self;
        link.disconnect()
            .await
            .map_err(|source| DeskError::Disconnect { address, source })
    }

    fn handle_for(&self, endpoint: EndpointId) -> Result<CharacteristicHandle, DeskError> {
        self.identifiers
            .uuid(endpoint)
            .and_then(|uuid| self.catalog.get(uuid))
            .ok_or(DeskError::CharacteristicMissing { endpoint })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::DiscoveredCharacteristic;

    #[test]
    fn catalog_keeps_first_handle_for_duplicate_uuids() {
        let uuid = Uuid::from_u128(0x99fa0021_338a_1024_8a49_009c0215f78a);
        let services = vec![
            DiscoveredService::new(
                Uuid::from_u128(1),
                vec![DiscoveredCharacteristic::new(uuid, CharacteristicHandle::new(0))],
            ),
            DiscoveredService::new(
                Uuid::from_u128(2),
                vec![DiscoveredCharacteristic::new(uuid, CharacteristicHandle::new(7))],
            ),
        ];

        let catalog = CharacteristicCatalog::from_services(&services);

        assert_eq!(1, catalog.len());
        assert_eq!(Some(CharacteristicHandle::new(0)), catalog.get(uuid));
    }
}
