use std::io;
use std::sync::Arc;

use anyhow::Result;
use desk_macros::progress;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::HeightPresets;
use crate::error::DeskError;
use crate::handlers::{MoveOutcome, MovementController};
use crate::hw::{DeviceSession, HardwareClient};
use crate::terminal::TerminalClient;

use super::ui::{MoveOutcomeView, Painter};
use super::{OutputFormat, Settings, close_after, connect_configured, write_json_line};

/// Where a movement command sends the desk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum MoveRequest {
    Stand,
    Sit,
    Position(f64),
    Toggle,
}

impl MoveRequest {
    fn resolve_fixed(self, presets: HeightPresets) -> Option<f64> {
        match self {
            Self::Stand => Some(presets.stand),
            Self::Sit => Some(presets.sit),
            Self::Position(height) => Some(height),
            Self::Toggle => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct MoveReport<'a> {
    desk: &'a str,
    address: &'a str,
    #[serde(flatten)]
    outcome: &'a MoveOutcome,
}

/// Executes `stand`, `sit`, `position` and `toggle`.
#[instrument(skip(client, settings, out, terminal_client), level = "info", fields(output = ?settings.output()))]
pub(crate) async fn run<W>(
    client: Arc<dyn HardwareClient>,
    request: MoveRequest,
    settings: &Settings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let (config, session) = connect_configured(client, settings).await?;
    let presets = config.presets(settings.sit_height(), settings.stand_height());

    let command_result =
        run_with_session(&session, request, presets, settings.output(), out, &painter).await;
    close_after(session, command_result).await
}

async fn run_with_session<W>(
    session: &DeviceSession,
    request: MoveRequest,
    presets: HeightPresets,
    output_format: OutputFormat,
    out: &mut W,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let target = match request.resolve_fixed(presets) {
        Some(target) => target,
        None => {
            let current = session.get_height().await?.meters();
            let target = presets.toggle_target(current);
            info!(current, target, "toggling to the further preset");
            target
        }
    };

    let outcome = drive(session, target).await?;
    match output_format {
        OutputFormat::Pretty => {
            writeln!(
                out,
                "{}",
                MoveOutcomeView::new(session.name(), &outcome, painter)
            )?;
        }
        OutputFormat::Json => {
            write_json_line(
                out,
                &MoveReport {
                    desk: session.name(),
                    address: session.address(),
                    outcome: &outcome,
                },
            )?;
        }
    }
    Ok(())
}

#[progress(
    message = "Moving desk",
    finished = format!("{} Target reached", "✓".green()),
    failed = format!("{} Move failed", "✗".red()),
)]
#[instrument(skip(session), level = "info", fields(desk = session.name()))]
async fn drive(session: &DeviceSession, target: f64) -> Result<MoveOutcome, DeskError> {
    MovementController::new(session).move_to_target(target).await
}
