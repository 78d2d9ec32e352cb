mod btleplug_backend;
mod fake_backend;
mod hardware;
mod model;
mod scanner;
mod session;

pub use self::fake_backend::{
    DEFAULT_FAKE_ADDRESS, DEFAULT_FAKE_HEIGHT, DEFAULT_FAKE_STEP, FakeDesk, FakeDeskConfig,
    FakeFailures, FakeJournal, FakeMotion, ScanFixture, WriteRecord,
};
pub use self::hardware::{
    AdvertisementStream, CharacteristicHandle, DeskLink, DiscoveredCharacteristic,
    DiscoveredService, HardwareClient, NotificationHandler, fake_hardware_client,
    real_hardware_client,
};
pub use self::model::{Advertisement, Direction, HeightSample, SampleSource, ScanResult};
pub use self::scanner::{UniqueScan, UniqueScanner};
pub use self::session::{DEFAULT_CONNECT_TIMEOUT, DeviceSession};
