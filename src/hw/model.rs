use serde::Serialize;
use serde_with::SerializeDisplay;

/// Where a height value came from.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, SerializeDisplay)]
pub enum SampleSource {
    /// A direct read of the height characteristic.
    #[display("read")]
    Read,
    /// A value pushed by the desk through the notification feed.
    #[display("notification")]
    Notification,
}

/// One decoded desk height, in meters, tagged with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeightSample {
    #[serde(rename = "height")]
    meters: f64,
    source: SampleSource,
}

impl HeightSample {
    pub(crate) fn read(meters: f64) -> Self {
        Self {
            meters,
            source: SampleSource::Read,
        }
    }

    pub(crate) fn notified(meters: f64) -> Self {
        Self {
            meters,
            source: SampleSource::Notification,
        }
    }

    /// Height in meters.
    #[must_use]
    pub fn meters(&self) -> f64 {
        self.meters
    }

    /// How the sample was obtained.
    #[must_use]
    pub fn source(&self) -> SampleSource {
        self.source
    }
}

/// Direction of a move pulse, or of motion observed between two samples.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, derive_more::Display)]
pub enum Direction {
    #[default]
    #[display("unknown")]
    Unknown,
    #[display("up")]
    Up,
    #[display("down")]
    Down,
}

impl Direction {
    /// Direction of travel from `previous` to `current`; `Unknown` when unchanged.
    #[must_use]
    pub fn observed(previous: f64, current: f64) -> Self {
        if current > previous {
            Self::Up
        } else if current < previous {
            Self::Down
        } else {
            Self::Unknown
        }
    }

    /// Whether this observed motion runs against the intended travel direction.
    #[must_use]
    pub fn contradicts(self, will_move_up: bool) -> bool {
        match self {
            Self::Up => !will_move_up,
            Self::Down => will_move_up,
            Self::Unknown => false,
        }
    }
}

/// A raw advertisement as reported by the scanning backend.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Advertisement {
    address: String,
    local_name: Option<String>,
}

impl Advertisement {
    /// Creates an advertisement record.
    #[must_use]
    pub fn new(address: impl Into<String>, local_name: Option<String>) -> Self {
        Self {
            address: address.into(),
            local_name,
        }
    }

    /// Returns the advertiser's address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the advertised local name, if any.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }
}

/// A uniquely discovered peripheral offered for selection.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ScanResult {
    address: String,
    name: Option<String>,
}

impl ScanResult {
    /// Creates a scan result.
    #[must_use]
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// Returns the peripheral address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the display name with surrounding whitespace removed, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

impl From<Advertisement> for ScanResult {
    fn from(advertisement: Advertisement) -> Self {
        Self::new(advertisement.address, advertisement.local_name)
    }
}
