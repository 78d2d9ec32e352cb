use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::Configuration;
use crate::error::{CliConfigError, DeskError};
use crate::hw::{HardwareClient, ScanResult, UniqueScanner};
use crate::terminal::TerminalClient;

use super::ui::{Painter, SavedDeskView, ScanResultsView, Spinner};
use super::{ConfigureArgs, OutputFormat, Settings, write_json_line};

#[derive(Debug, Serialize)]
struct ConfigureReport<'a> {
    discovered: &'a [ScanResult],
    selected: &'a ScanResult,
    config_path: &'a Path,
}

/// Executes the `configure` command.
#[instrument(
    skip_all,
    level = "info",
    fields(scan_duration = %humantime::format_duration(args.scan_duration()), select = ?args.select())
)]
pub(crate) async fn run<W>(
    client: Arc<dyn HardwareClient>,
    args: &ConfigureArgs,
    settings: &Settings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let config = Configuration::load(settings.config_path())?;

    let spinner = Spinner::new(terminal_client.stderr_is_terminal());
    let results = spinner
        .with_spinner("Scanning for desks", || {
            collect_scan_results(client, args.scan_duration())
        })
        .await?;
    if results.is_empty() {
        return Err(CliConfigError::NothingDiscovered(args.scan_duration()).into());
    }

    if settings.output() == OutputFormat::Pretty {
        writeln!(out, "{}", ScanResultsView::new(&results, &painter))?;
    }
    let selected = select_result(&results, args.select(), terminal_client)?;

    config
        .with_desk(selected.address(), selected.name())
        .save(settings.config_path())?;
    info!(
        address = selected.address(),
        name = selected.name(),
        "saved desk selection"
    );

    match settings.output() {
        OutputFormat::Pretty => {
            writeln!(
                out,
                "{}",
                SavedDeskView::new(selected, settings.config_path(), &painter)
            )?;
        }
        OutputFormat::Json => {
            write_json_line(
                out,
                &ConfigureReport {
                    discovered: &results,
                    selected,
                    config_path: settings.config_path(),
                },
            )?;
        }
    }
    Ok(())
}

async fn collect_scan_results(
    client: Arc<dyn HardwareClient>,
    scan_duration: Duration,
) -> Result<Vec<ScanResult>, DeskError> {
    let mut scan = UniqueScanner::start(client, CancellationToken::new()).await?;
    let deadline = sleep(scan_duration);
    tokio::pin!(deadline);

    let mut results = Vec::new();
    loop {
        tokio::select! {
            () = &mut deadline => break,
            next = scan.next() => match next {
                Some(result) => {
                    debug!(address = result.address(), name = result.name(), "discovered desk");
                    results.push(result);
                }
                None => break,
            },
        }
    }
    scan.shutdown().await;

    Ok(results)
}

fn select_result<'a>(
    results: &'a [ScanResult],
    preselected: Option<usize>,
    terminal_client: &dyn TerminalClient,
) -> Result<&'a ScanResult> {
    let selection = match preselected {
        Some(selection) => selection,
        None => prompt_selection(results.len(), terminal_client)?,
    };

    selection
        .checked_sub(1)
        .and_then(|index| results.get(index))
        .ok_or_else(|| {
            CliConfigError::SelectionOutOfRange {
                selection,
                available: results.len(),
            }
            .into()
        })
}

fn prompt_selection(available: usize, terminal_client: &dyn TerminalClient) -> Result<usize> {
    let line = terminal_client
        .prompt_line(&format!("Select a desk [1-{available}]: "))?
        .ok_or(CliConfigError::NoSelection)?;
    let value = line.trim();

    value.parse().map_err(|_error| {
        CliConfigError::InvalidSelection {
            value: value.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::hw::{Advertisement, FakeDesk, FakeDeskConfig};

    struct ScriptedTerminal {
        input: RefCell<Option<String>>,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedTerminal {
        fn answering(input: Option<&str>) -> Self {
            Self {
                input: RefCell::new(input.map(String::from)),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl TerminalClient for ScriptedTerminal {
        fn stdout_is_terminal(&self) -> bool {
            false
        }

        fn stderr_is_terminal(&self) -> bool {
            false
        }

        fn prompt_line(&self, prompt: &str) -> io::Result<Option<String>> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(self.input.borrow_mut().take())
        }
    }

    fn results() -> Vec<ScanResult> {
        vec![
            ScanResult::new("AA:AA", Some("Desk A".into())),
            ScanResult::new("BB:BB", None),
        ]
    }

    #[test]
    fn preselected_index_is_one_based() {
        let results = results();
        let terminal = ScriptedTerminal::answering(None);

        let selected = select_result(&results, Some(2), &terminal).expect("selection is valid");

        assert_eq!("BB:BB", selected.address());
        assert!(terminal.prompts.borrow().is_empty());
    }

    #[rstest]
    #[case::zero(0)]
    #[case::past_end(3)]
    fn out_of_range_selection_is_rejected(#[case] selection: usize) {
        let results = results();
        let terminal = ScriptedTerminal::answering(None);

        let error = select_result(&results, Some(selection), &terminal)
            .expect_err("selection should be rejected");

        assert_matches!(
            error.downcast_ref::<CliConfigError>(),
            Some(CliConfigError::SelectionOutOfRange { available: 2, .. })
        );
    }

    #[test]
    fn prompt_reads_trimmed_selection() {
        let results = results();
        let terminal = ScriptedTerminal::answering(Some(" 1\n"));

        let selected = select_result(&results, None, &terminal).expect("selection is valid");

        assert_eq!("AA:AA", selected.address());
        assert_eq!(vec!["Select a desk [1-2]: ".to_string()], *terminal.prompts.borrow());
    }

    #[rstest]
    #[case::not_a_number(Some("first\n"))]
    #[case::closed_input(None)]
    fn unusable_prompt_input_is_rejected(#[case] input: Option<&str>) {
        let results = results();
        let terminal = ScriptedTerminal::answering(input);

        let error = select_result(&results, None, &terminal).expect_err("input is unusable");

        assert_matches!(
            error.downcast_ref::<CliConfigError>(),
            Some(CliConfigError::InvalidSelection { .. } | CliConfigError::NoSelection)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scan_collects_unique_results_until_the_deadline() {
        let advertisements = vec![
            Advertisement::new("AA:AA", Some("Desk A".into())),
            Advertisement::new("BB:BB", None),
            Advertisement::new("AA:AA", Some("Desk A".into())),
        ];
        let desk = Arc::new(FakeDesk::new(
            FakeDeskConfig::builder()
                .advertisements(advertisements)
                .build(),
        ));

        let results = collect_scan_results(desk.clone(), Duration::from_secs(5))
            .await
            .expect("scan should succeed");

        assert_eq!(
            vec!["AA:AA", "BB:BB"],
            results.iter().map(ScanResult::address).collect::<Vec<_>>()
        );
        assert_eq!(1, desk.journal().scans_stopped());
    }
}
