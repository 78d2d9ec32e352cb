use std::io;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::instrument;

use crate::hw::{DeviceSession, HardwareClient, HeightSample};
use crate::terminal::TerminalClient;

use super::ui::{HeightView, Painter};
use super::{OutputFormat, Settings, close_after, connect_configured, write_json_line};

#[derive(Debug, Serialize)]
struct HeightReport<'a> {
    desk: &'a str,
    address: &'a str,
    #[serde(flatten)]
    sample: HeightSample,
}

/// Executes the `height` command.
#[instrument(skip_all, level = "info", fields(output = ?settings.output()))]
pub(crate) async fn run<W>(
    client: Arc<dyn HardwareClient>,
    settings: &Settings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let (_config, session) = connect_configured(client, settings).await?;

    let command_result = report_height(&session, settings.output(), out, &painter).await;
    close_after(session, command_result).await
}

async fn report_height<W>(
    session: &DeviceSession,
    output_format: OutputFormat,
    out: &mut W,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let sample = session.get_height().await?;
    match output_format {
        OutputFormat::Pretty => {
            writeln!(out, "{}", HeightView::new(session.name(), sample, painter))?;
        }
        OutputFormat::Json => {
            write_json_line(
                out,
                &HeightReport {
                    desk: session.name(),
                    address: session.address(),
                    sample,
                },
            )?;
        }
    }
    Ok(())
}
