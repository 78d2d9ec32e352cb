use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use uuid::Uuid;

use crate::error::DeskError;

/// Lowest height the desk reports, in meters. Raw height `0` maps here.
pub const MIN_HEIGHT: f64 = 0.62;
/// Highest height the desk can reach, in meters.
pub const MAX_HEIGHT: f64 = 1.27;

/// Within this distance of the target the loop stops every tick, and outside it a
/// reversal is treated as the desk's safety cutoff.
pub const SAFETY_GUARD: f64 = 0.010;
/// Distance from the target at which a move is considered complete.
pub const STOP_TOLERANCE: f64 = 0.005;
/// Upper bound of residual motion after a stop, measured from a single pulse.
pub const SETTLE_DURATION: Duration = Duration::from_millis(100);

pub(crate) const STOP_OPCODE: [u8; 2] = [0xFF, 0x00];
pub(crate) const UP_OPCODE: [u8; 2] = [0x47, 0x00];
pub(crate) const DOWN_OPCODE: [u8; 2] = [0x46, 0x00];
pub(crate) const REFERENCE_INPUT_OPCODE: [u8; 2] = [0x01, 0x80];

/// Known desk GATT endpoints.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, EnumIter, Display)]
pub enum EndpointId {
    /// Service listed in desk advertisements. Not used as a scan filter.
    #[strum(to_string = "advertised_service")]
    AdvertisedService,
    /// Current height, readable and notifying.
    #[strum(to_string = "height")]
    Height,
    /// Movement command opcodes.
    #[strum(to_string = "command")]
    Command,
    /// Reference input, written alongside stop.
    #[strum(to_string = "reference_input")]
    ReferenceInput,
}

/// Endpoint category in GATT.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub(crate) enum EndpointKind {
    #[strum(to_string = "service")]
    Service,
    #[strum(to_string = "characteristic")]
    Characteristic,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: &'static str,
    kind: EndpointKind,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Endpoint UUID as written in the vendor documentation.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }

    /// Endpoint kind.
    pub(crate) fn kind(self) -> EndpointKind {
        self.kind
    }
}

/// Endpoint metadata keyed by typed endpoint IDs.
pub(crate) static ENDPOINTS_BY_ID: LazyLock<HashMap<EndpointId, EndpointMetadata>> =
    LazyLock::new(|| {
        EndpointId::iter()
            .map(|endpoint| (endpoint, metadata_for(endpoint)))
            .collect()
    });

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    *ENDPOINTS_BY_ID
        .get(&endpoint)
        .unwrap_or(&metadata_for(endpoint))
}

/// Parsed endpoint UUIDs, produced once per session by [`resolve_identifiers`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct ResolvedIdentifiers {
    by_endpoint: HashMap<EndpointId, Uuid>,
}

impl ResolvedIdentifiers {
    pub(crate) fn uuid(&self, endpoint: EndpointId) -> Option<Uuid> {
        self.by_endpoint.get(&endpoint).copied()
    }
}

/// Parses every fixed endpoint UUID, failing with a descriptive error instead of
/// aborting when one is malformed.
pub(crate) fn resolve_identifiers() -> Result<ResolvedIdentifiers, DeskError> {
    resolve_from(EndpointId::iter().map(|endpoint| (endpoint, endpoint_metadata(endpoint).uuid())))
}

fn resolve_from<'a>(
    entries: impl IntoIterator<Item = (EndpointId, &'a str)>,
) -> Result<ResolvedIdentifiers, DeskError> {
    let by_endpoint = entries
        .into_iter()
        .map(|(endpoint, raw)| {
            Uuid::parse_str(raw)
                .map(|uuid| (endpoint, uuid))
                .map_err(|source| DeskError::InvalidIdentifier {
                    endpoint,
                    value: raw.to_string(),
                    source,
                })
        })
        .collect::<Result<HashMap<_, _>, _>>()?;

    Ok(ResolvedIdentifiers { by_endpoint })
}

fn metadata_for(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::AdvertisedService => EndpointMetadata {
            name: "desk advertised service",
            uuid: "99fa0001-338a-1024-8a49-009c0215f78a",
            kind: EndpointKind::Service,
        },
        EndpointId::Height => EndpointMetadata {
            name: "desk height",
            uuid: "99fa0021-338a-1024-8a49-009c0215f78a",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::Command => EndpointMetadata {
            name: "desk command",
            uuid: "99fa0002-338a-1024-8a49-009c0215f78a",
            kind: EndpointKind::Characteristic,
        },
        EndpointId::ReferenceInput => EndpointMetadata {
            name: "desk reference input",
            uuid: "99fa0031-338a-1024-8a49-009c0215f78a",
            kind: EndpointKind::Characteristic,
        },
    }
}
