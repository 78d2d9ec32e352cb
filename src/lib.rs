mod app;
mod cli;
mod config;
mod error;
mod handlers;
mod hw;
mod protocol;
mod telemetry;
mod terminal;
mod utils;

pub use app::{SessionHandler, fake_hardware_client, real_hardware_client, run, run_with_clients};
pub use cli::{
    Args, Command, ConfigureArgs, FakeArgs, LogLevel, MonitorArgs, OutputFormat, PositionArgs,
    Settings,
};
pub use config::{
    Configuration, DEFAULT_SIT_HEIGHT, DEFAULT_STAND_HEIGHT, HeightPresets, default_config_path,
};
pub use error::{ConfigError, DeskError, FixtureError, LinkError};
pub use handlers::{
    CommandTransport, HeightCodec, HeightCodecError, MonitorSummary, MoveOutcome, MovePhase,
    MovementController,
};
pub use hw::{
    Advertisement, AdvertisementStream, CharacteristicHandle, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_FAKE_ADDRESS, DEFAULT_FAKE_HEIGHT, DEFAULT_FAKE_STEP, DeskLink, DeviceSession,
    Direction, DiscoveredCharacteristic, DiscoveredService, FakeDesk, FakeDeskConfig,
    FakeFailures, FakeJournal, FakeMotion, HardwareClient, HeightSample, NotificationHandler,
    SampleSource, ScanFixture, ScanResult, UniqueScan, UniqueScanner, WriteRecord,
};
pub use protocol::{EndpointId, MAX_HEIGHT, MIN_HEIGHT, SAFETY_GUARD, SETTLE_DURATION, STOP_TOLERANCE};
pub use terminal::TerminalClient;
