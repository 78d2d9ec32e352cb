use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::handlers::HeightCodecError;
use crate::hw::CharacteristicHandle;
use crate::protocol::{EndpointId, endpoint_metadata};

/// Errors returned by desk sessions, the command transport, the movement controller,
/// and the scanner.
#[derive(Debug, Error)]
pub enum DeskError {
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("failed to enable the BLE radio")]
    Radio {
        #[source]
        source: LinkError,
    },
    #[error("failed to scan for desks")]
    Scan {
        #[source]
        source: LinkError,
    },
    #[error("failed to connect to desk `{address}`")]
    Connection {
        address: String,
        #[source]
        source: LinkError,
    },
    #[error("failed to discover services on desk `{address}`")]
    Discovery {
        address: String,
        #[source]
        source: LinkError,
    },
    #[error("failed to disconnect from desk `{address}`")]
    Disconnect {
        address: String,
        #[source]
        source: LinkError,
    },
    #[error("fixed identifier for `{endpoint}` is not a valid UUID: `{value}`")]
    InvalidIdentifier {
        endpoint: EndpointId,
        value: String,
        #[source]
        source: uuid::Error,
    },
    #[error(
        "does not have required {kind} `{name}` ({uuid})",
        kind = endpoint_metadata(*endpoint).kind(),
        name = endpoint_metadata(*endpoint).name(),
        uuid = endpoint_metadata(*endpoint).uuid()
    )]
    CharacteristicMissing { endpoint: EndpointId },
    #[error("failed to read `{endpoint}`")]
    Read {
        endpoint: EndpointId,
        #[source]
        source: LinkError,
    },
    #[error("failed to write `{endpoint}`")]
    Write {
        endpoint: EndpointId,
        #[source]
        source: LinkError,
    },
    #[error("failed to configure `{endpoint}` notifications")]
    Subscription {
        endpoint: EndpointId,
        #[source]
        source: LinkError,
    },
    #[error("desk returned an unusable height frame")]
    HeightFrame(#[from] HeightCodecError),
    #[error("target height {target:.3}m is outside {min:.2}m..={max:.2}m")]
    TargetOutOfRange { target: f64, min: f64, max: f64 },
    #[error("desk move safety kicked in at {height:.3}m while moving to {target:.3}m")]
    SafetyKickIn { height: f64, target: f64 },
    #[error("cannot issue a move pulse without a direction")]
    UnknownDirection,
    #[error("both stop writes failed: {command}; {reference}")]
    StopFailed {
        command: Box<DeskError>,
        reference: Box<DeskError>,
    },
    #[error("move pulse failed: {movement}; stopping afterwards also failed: {stop}")]
    CombinedFailure {
        movement: Box<DeskError>,
        stop: Box<DeskError>,
    },
    #[error("failed while waiting for Ctrl+C")]
    Interrupt {
        #[source]
        source: std::io::Error,
    },
}

/// Failures raised by a BLE link implementation.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no peripheral with address `{address}` was seen")]
    PeripheralNotFound { address: String },
    #[error("timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),
    #[error("unknown characteristic handle {0}")]
    UnknownHandle(CharacteristicHandle),
    #[error("simulated link failure: {reason}")]
    Simulated { reason: String },
}

/// Errors returned by the configuration store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file `{}` as yaml", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to serialise configuration")]
    Serialise(#[source] serde_yaml::Error),
    #[error("failed to write configuration file `{}`", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "no desk address configured in `{}`; run `desk configure` first",
        path.display()
    )]
    MissingConnectionAddress { path: PathBuf },
}

/// Errors returned when parsing fake backend fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake scan fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain two pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain an empty address")]
    EmptyAddress,
}

/// Errors returned when validating command-line options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("device selection {selection} is out of range; {available} device(s) were found")]
    SelectionOutOfRange { selection: usize, available: usize },
    #[error("`{value}` is not a device number")]
    InvalidSelection { value: String },
    #[error("input closed before a desk was selected")]
    NoSelection,
    #[error("no desks were discovered within {}", humantime::format_duration(*.0))]
    NothingDiscovered(Duration),
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
