use std::path::PathBuf;
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::config::default_config_path;
use crate::error::FixtureError;
use crate::hw::{
    Advertisement, DEFAULT_CONNECT_TIMEOUT, DEFAULT_FAKE_ADDRESS, DEFAULT_FAKE_HEIGHT,
    FakeDeskConfig, FakeMotion, ScanFixture,
};

const DEFAULT_FAKE_STEP_MM: f64 = 10.0;

/// Command-line options for the desk controller.
#[derive(Debug, Parser)]
#[command(name = "desk", about = "Drive a Bluetooth sit-stand desk.")]
pub struct Args {
    /// Configuration file holding the desk address and sit/stand heights.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides `RUST_LOG` with a fixed log level.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Shorthand for `--log-level debug`.
    #[arg(short, long, global = true, conflicts_with = "log_level")]
    verbose: bool,
    /// Output format. Defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// How long to look for and connect to the desk (e.g. `10s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    connect_timeout: Option<Duration>,
    /// Sit height in meters, overriding the configuration file.
    #[arg(long, global = true)]
    sit_height: Option<f64>,
    /// Stand height in meters, overriding the configuration file.
    #[arg(long, global = true)]
    stand_height: Option<f64>,
    /// Uses a simulated desk instead of the BLE adapter.
    #[arg(long, global = true)]
    fake: bool,
    /// Address of the simulated desk.
    #[arg(long, global = true, requires = "fake")]
    fake_address: Option<String>,
    /// Advertised name of the simulated desk.
    #[arg(long, global = true, requires = "fake")]
    fake_name: Option<String>,
    /// Starting height of the simulated desk in meters.
    #[arg(long, global = true, requires = "fake")]
    fake_height: Option<f64>,
    /// Distance the simulated desk travels per move pulse, in millimetres.
    #[arg(long, global = true, requires = "fake")]
    fake_step_mm: Option<f64>,
    /// Simulated advertisements in the form `address|name;address|-`.
    #[arg(long, global = true, requires = "fake")]
    fake_scan: Option<ScanFixture>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use desk::{Args, Command};
    ///
    /// let args = Args::new(Command::Height);
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            config: None,
            log_level: None,
            verbose: false,
            output: None,
            connect_timeout: None,
            sit_height: None,
            stand_height: None,
            fake: false,
            fake_address: None,
            fake_name: None,
            fake_height: None,
            fake_step_mm: None,
            fake_scan: None,
            command,
        }
    }

    /// Uses `path` as the configuration file.
    #[must_use]
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    /// Enables the simulated desk with pre-parsed settings.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            address,
            name,
            height,
            step_mm,
            scan_fixture,
        } = fake;

        self.fake = true;
        self.fake_address = Some(address);
        self.fake_name = name;
        self.fake_height = Some(height);
        self.fake_step_mm = Some(step_mm);
        self.fake_scan = scan_fixture;
        self
    }

    /// Returns the effective log-level override.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        if self.verbose {
            Some(LogLevel::Debug)
        } else {
            self.log_level
        }
    }

    /// Returns the explicitly requested output format.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Splits parsed arguments into the command, run settings and optional
    /// simulated-desk settings.
    #[must_use]
    pub fn into_parts(self, default_output: OutputFormat) -> (Command, Settings, Option<FakeArgs>) {
        let log_level = self.log_level();
        let Args {
            config,
            output,
            connect_timeout,
            sit_height,
            stand_height,
            fake,
            fake_address,
            fake_name,
            fake_height,
            fake_step_mm,
            fake_scan,
            command,
            ..
        } = self;

        let settings = Settings {
            config_path: config.unwrap_or_else(default_config_path),
            connect_timeout: connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            sit_height,
            stand_height,
            output: output.unwrap_or(default_output),
            log_level,
        };
        let fake_args = fake.then(|| FakeArgs {
            address: fake_address.unwrap_or_else(|| DEFAULT_FAKE_ADDRESS.to_string()),
            name: fake_name,
            height: fake_height.unwrap_or(DEFAULT_FAKE_HEIGHT),
            step_mm: fake_step_mm.unwrap_or(DEFAULT_FAKE_STEP_MM),
            scan_fixture: fake_scan,
        });

        (command, settings, fake_args)
    }
}

/// Settings shared by every command.
#[derive(Debug, Clone, Builder)]
pub struct Settings {
    #[builder(into, default = default_config_path())]
    config_path: PathBuf,
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    connect_timeout: Duration,
    sit_height: Option<f64>,
    stand_height: Option<f64>,
    #[builder(default = OutputFormat::Json)]
    output: OutputFormat,
    log_level: Option<LogLevel>,
}

impl Settings {
    #[must_use]
    pub fn config_path(&self) -> &std::path::Path {
        &self.config_path
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn sit_height(&self) -> Option<f64> {
        self.sit_height
    }

    #[must_use]
    pub fn stand_height(&self) -> Option<f64> {
        self.stand_height
    }

    #[must_use]
    pub fn output(&self) -> OutputFormat {
        self.output
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }
}

/// Simulated desk arguments for programmatic runs.
#[derive(Debug, Clone, Builder)]
pub struct FakeArgs {
    #[builder(into, default = DEFAULT_FAKE_ADDRESS.to_string())]
    address: String,
    #[builder(into)]
    name: Option<String>,
    #[builder(default = DEFAULT_FAKE_HEIGHT)]
    height: f64,
    #[builder(default = DEFAULT_FAKE_STEP_MM)]
    step_mm: f64,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan_fixture: Option<ScanFixture>,
}

impl FakeArgs {
    pub(crate) fn into_desk_config(self) -> FakeDeskConfig {
        let Self {
            address,
            name,
            height,
            step_mm,
            scan_fixture,
        } = self;

        let advertisements = scan_fixture.map_or_else(
            || vec![Advertisement::new(address.clone(), name.clone())],
            Into::into,
        );
        FakeDeskConfig::builder()
            .address(address)
            .maybe_local_name(name)
            .initial_height(height)
            .motion(FakeMotion::Pulse {
                step: step_from_millimetres(step_mm),
            })
            .advertisements(advertisements)
            .build()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn step_from_millimetres(step_mm: f64) -> u16 {
    (step_mm * 10.0).round().max(1.0) as u16
}

/// Supported CLI commands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Scan for desks, pick one, and save it to the configuration file.
    Configure(ConfigureArgs),
    /// Move the desk to the stand height.
    Stand,
    /// Move the desk to the sit height.
    Sit,
    /// Move the desk to an explicit height.
    Position(PositionArgs),
    /// Move to whichever of the sit and stand heights is further away.
    Toggle,
    /// Print every reported height until Ctrl+C.
    Monitor(MonitorArgs),
    /// Print the current height.
    Height,
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Configure(_) => "configure",
            Self::Stand => "stand",
            Self::Sit => "sit",
            Self::Position(_) => "position",
            Self::Toggle => "toggle",
            Self::Monitor(_) => "monitor",
            Self::Height => "height",
        }
    }
}

/// Arguments for the `configure` command.
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigureArgs {
    /// How long to scan before listing desks (e.g. `5s`).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    scan_duration: Duration,
    /// One-based number of the desk to save. Prompts when omitted.
    #[arg(long)]
    select: Option<usize>,
}

impl ConfigureArgs {
    #[must_use]
    pub fn new(scan_duration: Duration, select: Option<usize>) -> Self {
        Self {
            scan_duration,
            select,
        }
    }

    pub(crate) fn scan_duration(&self) -> Duration {
        self.scan_duration
    }

    pub(crate) fn select(&self) -> Option<usize> {
        self.select
    }
}

/// Arguments for the `position` command.
#[derive(Debug, Clone, clap::Args)]
pub struct PositionArgs {
    /// Target height in meters.
    height: f64,
}

impl PositionArgs {
    #[must_use]
    pub fn new(height: f64) -> Self {
        Self { height }
    }

    pub(crate) fn height(&self) -> f64 {
        self.height
    }
}

/// Arguments for the `monitor` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct MonitorArgs {
    /// Stop after this many heights. If omitted, monitor until Ctrl+C.
    #[arg(long)]
    max_samples: Option<usize>,
}

impl MonitorArgs {
    #[must_use]
    pub fn new(max_samples: Option<usize>) -> Self {
        Self { max_samples }
    }

    pub(crate) fn max_samples(&self) -> Option<usize> {
        self.max_samples
    }
}

/// Log levels accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// How command results are written to stdout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured tables for people.
    Pretty,
    /// One JSON document per line.
    Json,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
