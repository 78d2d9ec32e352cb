use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use desk_macros::progress;
use owo_colors::OwoColorize;
use tracing::{info, instrument};

use crate::cli::movement::MoveRequest;
use crate::cli::{Command, FakeArgs, LogLevel, Settings};
use crate::hw::{
    DEFAULT_CONNECT_TIMEOUT, DeviceSession, HardwareClient,
    fake_hardware_client as build_fake_hardware_client,
    real_hardware_client as build_real_hardware_client,
};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a hardware client backed by the real BLE transport.
#[must_use]
pub fn real_hardware_client() -> Arc<dyn HardwareClient> {
    build_real_hardware_client()
}

/// Creates a hardware client backed by a simulated desk.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Arc<dyn HardwareClient> {
    build_fake_hardware_client(fake_args.into_desk_config())
}

/// Session-level app helper for acquiring a desk connection.
pub struct SessionHandler {
    hardware_client: Arc<dyn HardwareClient>,
    timeout: Duration,
}

impl SessionHandler {
    /// Creates a session handler using the default connect timeout.
    ///
    /// ```
    /// # async fn demo() -> anyhow::Result<()> {
    /// let handler = desk::SessionHandler::new(desk::real_hardware_client());
    /// let _ = handler;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn new(hardware_client: Arc<dyn HardwareClient>) -> Self {
        Self {
            hardware_client,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Overrides how long to wait for the desk to appear and accept the connection.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connects to the desk at `address`, labelling the session with `name`.
    ///
    /// ```
    /// # async fn demo() -> anyhow::Result<()> {
    /// let session = desk::SessionHandler::new(desk::real_hardware_client())
    ///     .connect("E8:5B:5B:24:22:E4", Some("Desk 8421"))
    ///     .await?;
    /// session.close().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the desk cannot be found, connected to, or discovered.
    #[progress(
        message = "Connecting to desk",
        finished = format!("{} Connected", "✓".green()),
        failed = format!("{} Connection failed", "✗".red()),
    )]
    #[instrument(
        skip(self),
        level = "info",
        fields(timeout = %humantime::format_duration(self.timeout))
    )]
    pub async fn connect(&self, address: &str, name: Option<&str>) -> Result<DeviceSession> {
        let session = DeviceSession::connect_with_timeout(
            self.hardware_client.as_ref(),
            address,
            self.timeout,
        )
        .await?;
        let session = match name {
            Some(name) => session.with_name(name),
            None => session,
        };
        info!("connected to {}", session.name());
        Ok(session)
    }
}

/// Runs the CLI command against the given hardware client.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = desk::Args::try_parse_from([
///     "desk",
///     "--fake",
///     "--fake-scan",
///     "E8:5B:5B:24:22:E4|Desk 8421",
///     "configure",
///     "--select",
///     "1",
/// ])?;
/// let (command, settings, maybe_fake_args) = args.into_parts(desk::OutputFormat::Json);
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => desk::fake_hardware_client(fake_args),
///     None => desk::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// desk::run(command, &settings, &mut out, hardware_client).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the configuration cannot be used,
/// BLE interaction fails, or output writing fails.
pub async fn run<W>(
    command: Command,
    settings: &Settings,
    out: &mut W,
    hardware_client: Arc<dyn HardwareClient>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(command, settings, out, &SystemTerminalClient, hardware_client).await
}

/// Runs the CLI command with injected clients.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// struct FakeTerminal;
/// impl desk::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
///     fn prompt_line(&self, _prompt: &str) -> std::io::Result<Option<String>> {
///         Ok(Some("1\n".to_string()))
///     }
/// }
///
/// let settings = desk::Settings::builder()
///     .config_path(std::env::temp_dir().join("desk-doc.yml"))
///     .build();
/// let fake = desk::FakeArgs::builder().name("Desk 8421").build();
/// let command = desk::Command::Configure(desk::ConfigureArgs::new(
///     std::time::Duration::from_millis(50),
///     None,
/// ));
/// let mut out = Vec::new();
/// desk::run_with_clients(
///     command,
///     &settings,
///     &mut out,
///     &FakeTerminal,
///     desk::fake_hardware_client(fake),
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the configuration cannot be used,
/// BLE interaction fails, or output writing fails.
#[instrument(
    skip(settings, out, terminal_client, hardware_client),
    level = "info",
    fields(command = command.name(), log_level = ?settings.log_level())
)]
pub async fn run_with_clients<W>(
    command: Command,
    settings: &Settings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Arc<dyn HardwareClient>,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "desk",
        terminal_client.stderr_is_terminal(),
        settings.log_level().map(LogLevel::as_level_filter),
    )?;

    match command {
        Command::Configure(args) => {
            crate::cli::configure::run(hardware_client, &args, settings, out, terminal_client).await
        }
        Command::Stand => {
            crate::cli::movement::run(hardware_client, MoveRequest::Stand, settings, out, terminal_client)
                .await
        }
        Command::Sit => {
            crate::cli::movement::run(hardware_client, MoveRequest::Sit, settings, out, terminal_client)
                .await
        }
        Command::Position(args) => {
            let request = MoveRequest::Position(args.height());
            crate::cli::movement::run(hardware_client, request, settings, out, terminal_client).await
        }
        Command::Toggle => {
            crate::cli::movement::run(hardware_client, MoveRequest::Toggle, settings, out, terminal_client)
                .await
        }
        Command::Monitor(args) => {
            crate::cli::monitor::run(hardware_client, &args, settings, out, terminal_client).await
        }
        Command::Height => crate::cli::height::run(hardware_client, settings, out, terminal_client).await,
    }
}
