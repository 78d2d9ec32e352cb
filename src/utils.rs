/// Formats a height in meters with millimetre precision.
pub(crate) fn format_meters(meters: f64) -> String {
    format!("{meters:.3} m")
}

/// Formats the signed distance from `from` to `to` in whole millimetres.
pub(crate) fn format_travel(from: f64, to: f64) -> String {
    let millimetres = ((to - from) * 1000.0).round();
    if millimetres == 0.0 {
        return "0 mm".to_string();
    }
    format!("{millimetres:+.0} mm")
}

/// Formats an optional advertised name for terminal output.
pub(crate) fn format_name(name: Option<&str>) -> &str {
    name.unwrap_or("<unnamed>")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn format_meters_rounds_to_millimetres() {
        assert_eq!("0.740 m", format_meters(0.7404));
    }

    #[rstest]
    #[case::up(0.74, 1.0, "+260 mm")]
    #[case::down(1.12, 0.74, "-380 mm")]
    #[case::none(0.74, 0.7401, "0 mm")]
    fn format_travel_is_signed(#[case] from: f64, #[case] to: f64, #[case] expected: &str) {
        assert_eq!(expected, format_travel(from, to));
    }

    #[test]
    fn format_name_handles_unknown() {
        assert_eq!("<unnamed>", format_name(None));
    }
}
