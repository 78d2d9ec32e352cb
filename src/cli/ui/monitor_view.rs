use std::fmt::{self, Display, Formatter};

use crate::handlers::MonitorSummary;
use crate::hw::HeightSample;
use crate::utils::format_meters;

use super::painter::Painter;

/// Renders the line printed once monitoring starts.
pub(crate) struct MonitorReadyView<'a> {
    desk: &'a str,
    max_samples: Option<usize>,
    painter: &'a Painter,
}

impl<'a> MonitorReadyView<'a> {
    pub(crate) fn new(desk: &'a str, max_samples: Option<usize>, painter: &'a Painter) -> Self {
        Self {
            desk,
            max_samples,
            painter,
        }
    }
}

impl Display for MonitorReadyView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let until = match self.max_samples {
            Some(limit) => format!("until {limit} update(s) or Ctrl+C"),
            None => "until Ctrl+C".to_string(),
        };
        write!(
            f,
            "{} {} {}",
            self.painter.heading("Monitoring"),
            self.painter.value(self.desk),
            self.painter.muted(until)
        )
    }
}

/// Renders one notified height.
pub(crate) struct MonitorSampleView<'a> {
    index: usize,
    sample: HeightSample,
    painter: &'a Painter,
}

impl<'a> MonitorSampleView<'a> {
    pub(crate) fn new(index: usize, sample: HeightSample, painter: &'a Painter) -> Self {
        Self {
            index,
            sample,
            painter,
        }
    }
}

impl Display for MonitorSampleView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.painter.muted(format!("[{:04}]", self.index)),
            self.painter.value(format_meters(self.sample.meters()))
        )
    }
}

/// Renders the monitoring summary.
pub(crate) struct MonitorSummaryView<'a> {
    summary: &'a MonitorSummary,
    painter: &'a Painter,
}

impl<'a> MonitorSummaryView<'a> {
    pub(crate) fn new(summary: &'a MonitorSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for MonitorSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let received = format!("received {} height update(s)", self.summary.received());
        let received = if self.summary.received() == 0 {
            self.painter.warning(received)
        } else {
            self.painter.value(received)
        };
        write!(f, "{} {received}", self.painter.heading("Stopped:"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::unbounded(None, "Monitoring Desk 8421 until Ctrl+C")]
    #[case::bounded(Some(3), "Monitoring Desk 8421 until 3 update(s) or Ctrl+C")]
    fn ready_line_mentions_stop_condition(
        #[case] max_samples: Option<usize>,
        #[case] expected: &str,
    ) {
        let painter = Painter::new(false);
        let view = MonitorReadyView::new("Desk 8421", max_samples, &painter);
        assert_eq!(expected, view.to_string());
    }

    #[test]
    fn sample_line_is_indexed() {
        let painter = Painter::new(false);
        let view = MonitorSampleView::new(42, HeightSample::notified(0.7452), &painter);
        assert_eq!("[0042] 0.745 m", view.to_string());
    }

    #[test]
    fn summary_counts_updates() {
        let painter = Painter::new(false);
        let summary = MonitorSummary::new(5);
        assert_eq!(
            "Stopped: received 5 height update(s)",
            MonitorSummaryView::new(&summary, &painter).to_string()
        );
    }
}
