use std::fmt::{self, Display, Formatter};
use std::path::Path;

use crate::hw::ScanResult;
use crate::utils::format_name;

use super::painter::Painter;
use super::table::Table;

/// Renders discovered desks as a numbered table.
pub(crate) struct ScanResultsView<'a> {
    results: &'a [ScanResult],
    painter: &'a Painter,
}

impl<'a> ScanResultsView<'a> {
    pub(crate) fn new(results: &'a [ScanResult], painter: &'a Painter) -> Self {
        Self { results, painter }
    }
}

impl Display for ScanResultsView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rows = self
            .results
            .iter()
            .enumerate()
            .map(|(index, result)| {
                let name = match result.name() {
                    Some(name) => self.painter.value(name),
                    None => self.painter.muted(format_name(None)),
                };
                vec![(index + 1).to_string(), result.address().to_string(), name]
            })
            .collect();
        let table = Table::grid(["#", "address", "name"], rows);

        write!(f, "{}", self.painter.heading("Discovered desks:"))?;
        write!(f, "\n{table}")
    }
}

/// Renders the desk saved by `configure`.
pub(crate) struct SavedDeskView<'a> {
    selected: &'a ScanResult,
    path: &'a Path,
    painter: &'a Painter,
}

impl<'a> SavedDeskView<'a> {
    pub(crate) fn new(selected: &'a ScanResult, path: &'a Path, painter: &'a Painter) -> Self {
        Self {
            selected,
            path,
            painter,
        }
    }
}

impl Display for SavedDeskView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.painter.success("Saved"),
            self.painter.value(format_name(self.selected.name())),
            self.painter.muted(format!("({})", self.selected.address())),
            self.painter.muted(format!("to {}", self.path.display()))
        )
    }
}
