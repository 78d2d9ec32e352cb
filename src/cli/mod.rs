pub(crate) mod command;
pub(crate) mod configure;
pub(crate) mod height;
pub(crate) mod monitor;
pub(crate) mod movement;
pub(crate) mod ui;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::app::SessionHandler;
use crate::config::Configuration;
use crate::hw::{DeviceSession, HardwareClient};

pub use self::command::{
    Args, Command, ConfigureArgs, FakeArgs, LogLevel, MonitorArgs, OutputFormat, PositionArgs,
    Settings,
};

/// Loads the configuration and connects to the desk it names.
pub(crate) async fn connect_configured(
    hardware_client: Arc<dyn HardwareClient>,
    settings: &Settings,
) -> Result<(Configuration, DeviceSession)> {
    let config = Configuration::load(settings.config_path())?;
    let address = config.require_connection_address(settings.config_path())?;
    let session = SessionHandler::new(hardware_client)
        .with_timeout(settings.connect_timeout())
        .connect(address, config.local_name())
        .await?;

    Ok((config, session))
}

/// Closes `session`, preferring the command's own error over a close failure.
pub(crate) async fn close_after(session: DeviceSession, command_result: Result<()>) -> Result<()> {
    let close_result = session.close().await;

    if let Err(error) = close_result {
        if command_result.is_ok() {
            return Err(error.into());
        }
        tracing::trace!(?error, "failed to close desk session cleanly");
    }

    command_result
}

pub(crate) fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
