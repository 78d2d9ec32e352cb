use std::io;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::DeskError;
use crate::handlers::MovementController;
use crate::hw::{DeviceSession, HardwareClient, HeightSample};
use crate::terminal::TerminalClient;

use super::ui::{MonitorReadyView, MonitorSampleView, MonitorSummaryView, Painter};
use super::{MonitorArgs, OutputFormat, Settings, close_after, connect_configured, write_json_line};

#[derive(Debug, Serialize)]
struct SampleReport {
    index: usize,
    #[serde(flatten)]
    sample: HeightSample,
}

/// Executes the `monitor` command.
#[instrument(skip_all, level = "info", fields(max_samples = ?args.max_samples()))]
pub(crate) async fn run<W>(
    client: Arc<dyn HardwareClient>,
    args: &MonitorArgs,
    settings: &Settings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let (_config, session) = connect_configured(client, settings).await?;

    let command_result = monitor_with_session(
        &session,
        args.max_samples(),
        settings.output(),
        out,
        &painter,
    )
    .await;
    close_after(session, command_result).await
}

async fn monitor_with_session<W>(
    session: &DeviceSession,
    max_samples: Option<usize>,
    output_format: OutputFormat,
    out: &mut W,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    if output_format == OutputFormat::Pretty {
        writeln!(
            out,
            "{}",
            MonitorReadyView::new(session.name(), max_samples, painter)
        )?;
    }

    let done = CancellationToken::new();
    if max_samples == Some(0) {
        done.cancel();
    }
    let shutdown = {
        let done = done.clone();
        async move {
            tokio::select! {
                () = done.cancelled() => Ok(()),
                interrupted = tokio::signal::ctrl_c() => {
                    interrupted.map_err(|source| DeskError::Interrupt { source })
                }
            }
        }
    };

    let mut write_error: Option<anyhow::Error> = None;
    let summary = MovementController::new(session)
        .monitor_until(shutdown, |index, sample| {
            if write_error.is_some() || max_samples.is_some_and(|limit| index > limit) {
                return;
            }
            let written = match output_format {
                OutputFormat::Pretty => {
                    writeln!(out, "{}", MonitorSampleView::new(index, sample, painter))
                        .map_err(anyhow::Error::from)
                }
                OutputFormat::Json => write_json_line(out, &SampleReport { index, sample }),
            };
            if let Err(error) = written {
                write_error = Some(error);
                done.cancel();
            }
            if max_samples.is_some_and(|limit| index >= limit) {
                done.cancel();
            }
        })
        .await?;

    if let Some(error) = write_error {
        return Err(error);
    }
    match output_format {
        OutputFormat::Pretty => {
            writeln!(out)?;
            writeln!(out, "{}", MonitorSummaryView::new(&summary, painter))?;
        }
        OutputFormat::Json => write_json_line(out, &summary)?,
    }
    Ok(())
}
