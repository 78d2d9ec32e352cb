use std::collections::{BTreeSet, HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tracing::{debug, instrument, trace};

use super::hardware::{
    AdvertisementStream, CharacteristicHandle, DeskLink, DiscoveredCharacteristic,
    DiscoveredService, HardwareClient, NotificationHandler,
};
use super::model::{Advertisement, Direction};
use crate::error::{DeskError, FixtureError, LinkError};
use crate::handlers::HeightCodec;
use crate::protocol::{
    self, DOWN_OPCODE, EndpointId, MAX_HEIGHT, MIN_HEIGHT, REFERENCE_INPUT_OPCODE, STOP_OPCODE,
    UP_OPCODE,
};

/// Address the fake desk answers to unless configured otherwise.
pub const DEFAULT_FAKE_ADDRESS: &str = "E8:5B:5B:24:22:E4";
/// Height the fake desk starts at unless configured otherwise.
pub const DEFAULT_FAKE_HEIGHT: f64 = 0.74;
/// Raw distance covered by one fake move pulse unless configured otherwise (10 mm).
pub const DEFAULT_FAKE_STEP: u16 = 100;

const CHARACTERISTICS: [EndpointId; 3] = [
    EndpointId::Height,
    EndpointId::Command,
    EndpointId::ReferenceInput,
];

/// How the fake desk responds to move pulses.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeMotion {
    /// Every pulse moves a fixed raw distance (tenths of a millimetre) in the
    /// requested direction, clamped to the desk's travel.
    Pulse { step: u16 },
    /// Every pulse reports the next scripted height regardless of direction. Once
    /// the script is exhausted the height holds.
    Script(Vec<f64>),
}

impl Default for FakeMotion {
    fn default() -> Self {
        Self::Pulse {
            step: DEFAULT_FAKE_STEP,
        }
    }
}

/// Failures the fake desk injects.
#[derive(Debug, Clone, Default, Builder)]
pub struct FakeFailures {
    #[builder(default)]
    connect: bool,
    #[builder(default)]
    discover: bool,
    #[builder(default)]
    read: bool,
    /// One-based index of the move pulse that fails.
    move_pulse: Option<usize>,
    #[builder(default)]
    stop_command: bool,
    #[builder(default)]
    reference_input: bool,
    #[builder(default)]
    unsubscribe: bool,
}

/// Settings for a simulated desk.
#[derive(Debug, Clone, Builder)]
pub struct FakeDeskConfig {
    #[builder(into, default = DEFAULT_FAKE_ADDRESS.to_string())]
    address: String,
    #[builder(into)]
    local_name: Option<String>,
    #[builder(default = DEFAULT_FAKE_HEIGHT)]
    initial_height: f64,
    #[builder(default)]
    motion: FakeMotion,
    /// Advertisements replayed, in order, by every scan.
    #[builder(default)]
    advertisements: Vec<Advertisement>,
    #[builder(default)]
    failures: FakeFailures,
    /// Endpoints left out of service discovery.
    #[builder(default)]
    missing_endpoints: Vec<EndpointId>,
    #[builder(default)]
    connect_delay: Duration,
}

impl Default for FakeDeskConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FakeDeskConfig {
    /// Returns the address the fake desk answers to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the advertised name of the fake desk.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }
}

/// Parsed `--fake-scan` fixture: `address|name` records separated by `;`, with
/// `-` standing for an advertisement without a name.
#[derive(Debug, Clone, derive_more::Into)]
pub struct ScanFixture {
    advertisements: Vec<Advertisement>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let advertisements = parse_scan_fixture(value)?;
        Ok(Self { advertisements })
    }
}

/// One write observed by the fake desk.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WriteRecord {
    endpoint: EndpointId,
    payload: Vec<u8>,
}

impl WriteRecord {
    #[must_use]
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn pulse(&self) -> Option<Direction> {
        if self.endpoint != EndpointId::Command {
            return None;
        }
        match <[u8; 2]>::try_from(self.payload.as_slice()).ok()? {
            UP_OPCODE => Some(Direction::Up),
            DOWN_OPCODE => Some(Direction::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct JournalState {
    writes: Vec<WriteRecord>,
    reads: usize,
    active_subscriptions: BTreeSet<EndpointId>,
    subscriptions_opened: usize,
    scans_started: usize,
    scans_stopped: usize,
    disconnects: usize,
}

/// Shared record of everything the fake desk was asked to do.
#[derive(Debug, Clone, Default)]
pub struct FakeJournal {
    state: Arc<Mutex<JournalState>>,
}

impl FakeJournal {
    fn lock(&self) -> MutexGuard<'_, JournalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every write attempt, in order, including failed ones.
    #[must_use]
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    /// Directions of every move pulse attempted.
    #[must_use]
    pub fn pulses(&self) -> Vec<Direction> {
        self.lock().writes.iter().filter_map(WriteRecord::pulse).collect()
    }

    /// Number of stop opcodes written to the command characteristic.
    #[must_use]
    pub fn stops(&self) -> usize {
        self.lock()
            .writes
            .iter()
            .filter(|write| write.endpoint == EndpointId::Command && write.payload == STOP_OPCODE)
            .count()
    }

    /// Number of direct height reads.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Endpoints with notifications currently enabled.
    #[must_use]
    pub fn active_subscriptions(&self) -> Vec<EndpointId> {
        self.lock().active_subscriptions.iter().copied().collect()
    }

    /// Number of subscriptions ever opened.
    #[must_use]
    pub fn subscriptions_opened(&self) -> usize {
        self.lock().subscriptions_opened
    }

    #[must_use]
    pub fn scans_started(&self) -> usize {
        self.lock().scans_started
    }

    #[must_use]
    pub fn scans_stopped(&self) -> usize {
        self.lock().scans_stopped
    }

    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }
}

#[derive(Debug)]
struct DeskState {
    raw: u16,
    script: VecDeque<u16>,
    pulses: usize,
}

/// Simulated desk and radio, used by tests and `--fake` runs.
#[derive(Debug)]
pub struct FakeDesk {
    config: FakeDeskConfig,
    desk: Arc<Mutex<DeskState>>,
    journal: FakeJournal,
}

impl FakeDesk {
    /// Creates a fake desk from explicit settings.
    #[must_use]
    pub fn new(config: FakeDeskConfig) -> Self {
        let script = match &config.motion {
            FakeMotion::Script(heights) => heights.iter().copied().map(raw_height).collect(),
            FakeMotion::Pulse { .. } => VecDeque::new(),
        };
        let desk = DeskState {
            raw: raw_height(config.initial_height),
            script,
            pulses: 0,
        };

        Self {
            config,
            desk: Arc::new(Mutex::new(desk)),
            journal: FakeJournal::default(),
        }
    }

    /// Returns a handle to the shared journal.
    #[must_use]
    pub fn journal(&self) -> FakeJournal {
        self.journal.clone()
    }
}

#[async_trait]
impl HardwareClient for FakeDesk {
    #[instrument(skip(self), level = "debug")]
    async fn connect(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn DeskLink>, DeskError> {
        let failure = |source| DeskError::Connection {
            address: address.to_string(),
            source,
        };

        if self.config.connect_delay > timeout {
            sleep(timeout).await;
            return Err(failure(LinkError::Timeout(timeout)));
        }
        if !self.config.connect_delay.is_zero() {
            sleep(self.config.connect_delay).await;
        }
        if self.config.failures.connect {
            return Err(failure(simulated("connect refused")));
        }
        if !address.eq_ignore_ascii_case(&self.config.address) {
            return Err(failure(LinkError::PeripheralNotFound {
                address: address.to_string(),
            }));
        }

        let characteristics = CHARACTERISTICS
            .into_iter()
            .filter(|endpoint| !self.config.missing_endpoints.contains(endpoint))
            .collect();
        Ok(Box::new(FakeLink {
            characteristics,
            failures: self.config.failures.clone(),
            motion: self.config.motion.clone(),
            desk: Arc::clone(&self.desk),
            journal: self.journal.clone(),
            handlers: Mutex::new(HashMap::new()),
        }))
    }

    async fn start_scan(&self) -> Result<AdvertisementStream, DeskError> {
        self.journal.lock().scans_started += 1;
        let replay = tokio_stream::iter(self.config.advertisements.clone());
        Ok(Box::pin(replay.chain(tokio_stream::pending())))
    }

    async fn stop_scan(&self) -> Result<(), DeskError> {
        self.journal.lock().scans_stopped += 1;
        Ok(())
    }
}

type SharedHandler = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Link to the simulated desk. Handles index into `characteristics`.
struct FakeLink {
    characteristics: Vec<EndpointId>,
    failures: FakeFailures,
    motion: FakeMotion,
    desk: Arc<Mutex<DeskState>>,
    journal: FakeJournal,
    handlers: Mutex<HashMap<CharacteristicHandle, SharedHandler>>,
}

impl std::fmt::Debug for FakeLink {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FakeLink")
            .field("characteristics", &self.characteristics)
            .finish_non_exhaustive()
    }
}

impl FakeLink {
    fn endpoint(&self, handle: CharacteristicHandle) -> Result<EndpointId, LinkError> {
        self.characteristics
            .get(handle.index())
            .copied()
            .ok_or(LinkError::UnknownHandle(handle))
    }

    fn handle_of(&self, endpoint: EndpointId) -> Option<CharacteristicHandle> {
        self.characteristics
            .iter()
            .position(|candidate| *candidate == endpoint)
            .map(CharacteristicHandle::new)
    }

    fn lock_desk(&self) -> MutexGuard<'_, DeskState> {
        self.desk.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handlers(&self) -> MutexGuard<'_, HashMap<CharacteristicHandle, SharedHandler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies one move pulse and returns the resulting raw height.
    fn pulse(&self, direction: Direction) -> Result<u16, LinkError> {
        let mut desk = self.lock_desk();
        desk.pulses += 1;
        if self.failures.move_pulse == Some(desk.pulses) {
            return Err(simulated("move pulse dropped"));
        }

        desk.raw = match (&self.motion, direction) {
            (FakeMotion::Script(_), _) => desk.script.pop_front().unwrap_or(desk.raw),
            (FakeMotion::Pulse { step }, Direction::Up) => {
                desk.raw.saturating_add(*step).min(raw_height(MAX_HEIGHT))
            }
            (FakeMotion::Pulse { step }, Direction::Down) => desk.raw.saturating_sub(*step),
            (FakeMotion::Pulse { .. }, Direction::Unknown) => desk.raw,
        };
        Ok(desk.raw)
    }

    fn notify_height(&self, raw: u16) {
        let Some(handle) = self.handle_of(EndpointId::Height) else {
            return;
        };
        let handler = self.lock_handlers().get(&handle).cloned();
        if let Some(handler) = handler {
            trace!(raw, "fake height notification");
            handler(&height_frame(raw));
        }
    }
}

#[async_trait]
impl DeskLink for FakeLink {
    async fn discover(&mut self) -> Result<Vec<DiscoveredService>, LinkError> {
        if self.failures.discover {
            return Err(simulated("service discovery failed"));
        }

        let characteristics = self
            .characteristics
            .iter()
            .enumerate()
            .filter_map(|(index, endpoint)| {
                let uuid = uuid::Uuid::parse_str(protocol::endpoint_metadata(*endpoint).uuid()).ok()?;
                Some(DiscoveredCharacteristic::new(uuid, CharacteristicHandle::new(index)))
            })
            .collect();
        let service_uuid =
            uuid::Uuid::parse_str(protocol::endpoint_metadata(EndpointId::AdvertisedService).uuid())
                .unwrap_or_default();
        Ok(vec![DiscoveredService::new(service_uuid, characteristics)])
    }

    async fn read(&self, handle: CharacteristicHandle) -> Result<Vec<u8>, LinkError> {
        let endpoint = self.endpoint(handle)?;
        self.journal.lock().reads += 1;
        if self.failures.read {
            return Err(simulated("read failed"));
        }
        if endpoint != EndpointId::Height {
            return Ok(Vec::new());
        }
        Ok(height_frame(self.lock_desk().raw).to_vec())
    }

    async fn write_without_response(
        &self,
        handle: CharacteristicHandle,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        let endpoint = self.endpoint(handle)?;
        self.journal.lock().writes.push(WriteRecord {
            endpoint,
            payload: payload.to_vec(),
        });

        let opcode = <[u8; 2]>::try_from(payload).ok();
        match (endpoint, opcode) {
            (EndpointId::Command, Some(STOP_OPCODE)) if self.failures.stop_command => {
                Err(simulated("stop command dropped"))
            }
            (EndpointId::Command, Some(UP_OPCODE)) => {
                let raw = self.pulse(Direction::Up)?;
                self.notify_height(raw);
                Ok(())
            }
            (EndpointId::Command, Some(DOWN_OPCODE)) => {
                let raw = self.pulse(Direction::Down)?;
                self.notify_height(raw);
                Ok(())
            }
            (EndpointId::ReferenceInput, Some(REFERENCE_INPUT_OPCODE))
                if self.failures.reference_input =>
            {
                Err(simulated("reference input dropped"))
            }
            _ => Ok(()),
        }
    }

    async fn subscribe(
        &self,
        handle: CharacteristicHandle,
        on_notification: NotificationHandler,
    ) -> Result<(), LinkError> {
        let endpoint = self.endpoint(handle)?;
        self.lock_handlers().insert(handle, Arc::from(on_notification));
        let mut journal = self.journal.lock();
        journal.active_subscriptions.insert(endpoint);
        journal.subscriptions_opened += 1;
        Ok(())
    }

    async fn unsubscribe(&self, handle: CharacteristicHandle) -> Result<(), LinkError> {
        let endpoint = self.endpoint(handle)?;
        if self.failures.unsubscribe {
            return Err(simulated("unsubscribe failed"));
        }
        self.lock_handlers().remove(&handle);
        self.journal.lock().active_subscriptions.remove(&endpoint);
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), LinkError> {
        self.lock_handlers().clear();
        let mut journal = self.journal.lock();
        journal.active_subscriptions.clear();
        journal.disconnects += 1;
        debug!("fake desk disconnected");
        Ok(())
    }
}

fn simulated(reason: &str) -> LinkError {
    LinkError::Simulated {
        reason: reason.to_string(),
    }
}

fn raw_height(meters: f64) -> u16 {
    let clamped = meters.clamp(MIN_HEIGHT, MAX_HEIGHT);
    u16::from_le_bytes(HeightCodec::encode(clamped).unwrap_or_default())
}

/// Height frames carry `[lo, hi]` followed by two speed bytes.
fn height_frame(raw: u16) -> [u8; 4] {
    let [lo, hi] = raw.to_le_bytes();
    [lo, hi, 0x00, 0x00]
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<Advertisement>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture.split(';').map(parse_scan_record).collect()
}

fn parse_scan_record(raw_record: &str) -> Result<Advertisement, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [address, name] = fields.as_slice() else {
        return Err(FixtureError::InvalidRecordFieldCount);
    };
    if address.is_empty() {
        return Err(FixtureError::EmptyAddress);
    }

    let local_name = match *name {
        "" | "-" => None,
        name => Some(name.to_string()),
    };
    Ok(Advertisement::new(*address, local_name))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("AA:BB|Desk 1234", 1)]
    #[case("AA:BB|Desk 1234;CC:DD|-;AA:BB|Desk 1234", 3)]
    fn parse_scan_fixture_parses_records(#[case] fixture: &str, #[case] expected_count: usize) {
        let advertisements = parse_scan_fixture(fixture).expect("fixture should parse");
        assert_eq!(expected_count, advertisements.len());
    }

    #[test]
    fn parse_scan_fixture_maps_dash_to_missing_name() {
        let advertisements = parse_scan_fixture("CC:DD|-").expect("fixture should parse");
        assert_eq!(vec![Advertisement::new("CC:DD", None)], advertisements);
    }

    #[rstest]
    #[case::empty("  ", FixtureError::EmptyFixture)]
    #[case::missing_name("AA:BB", FixtureError::InvalidRecordFieldCount)]
    #[case::extra_field("AA:BB|Desk|-40", FixtureError::InvalidRecordFieldCount)]
    #[case::blank_address(" |Desk", FixtureError::EmptyAddress)]
    fn parse_scan_fixture_rejects_malformed_records(
        #[case] fixture: &str,
        #[case] expected: FixtureError,
    ) {
        let error = parse_scan_fixture(fixture).expect_err("fixture should be rejected");
        assert_eq!(expected.to_string(), error.to_string());
    }

    #[test]
    fn height_frame_appends_speed_bytes() {
        assert_eq!([0xB0, 0x04, 0x00, 0x00], height_frame(1200));
    }

    #[test]
    fn raw_height_clamps_to_travel() {
        assert_eq!(0, raw_height(0.1));
        assert_eq!(6500, raw_height(2.0));
    }

    #[tokio::test]
    async fn connect_rejects_unknown_address() {
        let desk = FakeDesk::new(FakeDeskConfig::default());

        let result = desk.connect("00:00:00:00:00:00", Duration::from_secs(1)).await;

        assert_matches!(
            result,
            Err(DeskError::Connection {
                source: LinkError::PeripheralNotFound { .. },
                ..
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_times_out_when_desk_is_slow() {
        let config = FakeDeskConfig::builder()
            .connect_delay(Duration::from_secs(30))
            .build();
        let desk = FakeDesk::new(config);

        let result = desk.connect(DEFAULT_FAKE_ADDRESS, Duration::from_secs(1)).await;

        assert_matches!(
            result,
            Err(DeskError::Connection {
                source: LinkError::Timeout(limit),
                ..
            }) if limit == Duration::from_secs(1)
        );
    }
}
