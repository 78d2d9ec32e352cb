use std::fmt::{self, Display, Formatter};

use crate::hw::HeightSample;
use crate::utils::format_meters;

use super::painter::Painter;

/// Renders a single height read.
pub(crate) struct HeightView<'a> {
    desk: &'a str,
    sample: HeightSample,
    painter: &'a Painter,
}

impl<'a> HeightView<'a> {
    pub(crate) fn new(desk: &'a str, sample: HeightSample, painter: &'a Painter) -> Self {
        Self {
            desk,
            sample,
            painter,
        }
    }
}

impl Display for HeightView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.painter.heading(format!("{}:", self.desk)),
            self.painter.value(format_meters(self.sample.meters())),
            self.painter.muted(format!("({})", self.sample.source()))
        )
    }
}
