use std::fmt::{self, Display, Formatter};

use crate::handlers::MoveOutcome;
use crate::utils::{format_meters, format_travel};

use super::painter::Painter;
use super::table::Table;

/// Renders a completed move as a key-value table.
pub(crate) struct MoveOutcomeView<'a> {
    desk: &'a str,
    outcome: &'a MoveOutcome,
    painter: &'a Painter,
}

impl<'a> MoveOutcomeView<'a> {
    pub(crate) fn new(desk: &'a str, outcome: &'a MoveOutcome, painter: &'a Painter) -> Self {
        Self {
            desk,
            outcome,
            painter,
        }
    }
}

impl Display for MoveOutcomeView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let starting = self.outcome.starting().meters();
        let reached = self.outcome.reached().meters();
        let table = Table::key_value(
            self.painter,
            vec![
                ("target", self.painter.value(format_meters(self.outcome.target()))),
                ("start", self.painter.value(format_meters(starting))),
                ("reached", self.painter.success(format_meters(reached))),
                ("travel", self.painter.value(format_travel(starting, reached))),
                ("pulses", self.painter.value(self.outcome.pulses().to_string())),
            ],
        );

        write!(
            f,
            "{}",
            self.painter.heading(format!("{} reached its target:", self.desk))
        )?;
        write!(f, "\n{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::hw::HeightSample;

    #[test]
    fn move_outcome_renders_table() {
        let outcome = MoveOutcome::new(
            1.0,
            HeightSample::read(0.74),
            HeightSample::notified(0.996),
            7,
        );
        let painter = Painter::new(false);
        assert_snapshot!(
            "move_outcome",
            MoveOutcomeView::new("Desk 8421", &outcome, &painter).to_string()
        );
    }
}
