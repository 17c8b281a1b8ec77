use chrono::{Local, SecondsFormat};
use console::Style;

/// Width of the chart bar in characters - one character per 5%.
pub const BAR_WIDTH: usize = 20;

/// Cosmetic presentation of report lines, resolved from the command line once.
pub struct ReportStyle {
    /// Style applied to the whole of a plain report line. Defaults to no styling.
    pub style: Style,
    /// Whether to prepend an ISO-8601 timestamp in brackets to each line.
    pub timestamp: bool,
}

impl ReportStyle {
    fn timestamp_prefix(&self) -> String {
        if self.timestamp {
            format!("[{}] ", Local::now().to_rfc3339_opts(SecondsFormat::Secs, true))
        } else {
            String::new()
        }
    }

    /// The plain report line: just the throughput.
    pub fn plain_line(&self, throughput: f64) -> String {
        let line = format!("{}{:.2} lines/sec\n", self.timestamp_prefix(), throughput);
        format!("{}", self.style.apply_to(line))
    }

    /// The chart report line: percentage of the baseline, a fixed-width bar, an
    /// overflow marker (blank unless the bar clamped), and the raw throughput.
    pub fn chart_line(&self, throughput: f64, baseline: f64) -> String {
        let percentage = throughput / baseline * 100.0;
        let (filled, overflowed) = bar_segments(percentage);
        let marker = if overflowed { "=" } else { " " };
        format!(
            "{}{:6.2}% |{}{}|{}  {:.2} lines/sec\n",
            self.timestamp_prefix(),
            percentage,
            "=".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            Style::new().red().apply_to(marker),
            throughput
        )
    }

    /// Rendered in place of a percentage bar while the 100% level is still being
    /// sampled.
    pub fn calibration_line(&self, throughput: f64) -> String {
        format!(
            "{}    - % | <==>               |   {:.2} lines/sec\n",
            self.timestamp_prefix(),
            throughput
        )
    }
}

/// Bar math: one filled segment per 5 percentage points, with the remainder rounded
/// half-up. Anything beyond 100% clamps to a full bar and reports overflow.
pub fn bar_segments(percentage: f64) -> (usize, bool) {
    let mut filled = (percentage / 5.0).floor() as i64;
    if (percentage % 5.0) * 2.0 >= 5.0 {
        filled += 1;
    }
    if filled > BAR_WIDTH as i64 {
        (BAR_WIDTH, true)
    } else {
        (filled as usize, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn unstyled() -> ReportStyle {
        ReportStyle { style: Style::new(), timestamp: false }
    }

    #[test]
    fn bar_segments_rounds_half_up() {
        assert_eq!(bar_segments(0.0), (0, false));
        assert_eq!(bar_segments(4.9), (1, false)); // remainder 4.9 rounds up
        assert_eq!(bar_segments(2.0), (0, false)); // remainder 2.0 stays down
        assert_eq!(bar_segments(47.5), (10, false)); // floor gives 9, remainder 2.5 rounds up
        assert_eq!(bar_segments(50.0), (10, false)); // exact multiple, no rounding
        assert_eq!(bar_segments(12.0), (2, false)); // remainder 2.0, stays down
        assert_eq!(bar_segments(13.0), (3, false)); // remainder 3.0, rounds up
        assert_eq!(bar_segments(100.0), (20, false));
    }

    #[test]
    fn bar_segments_clamps_with_overflow() {
        assert_eq!(bar_segments(500.0), (20, true));
        assert_eq!(bar_segments(102.5), (20, true)); // rounding pushes past the bar
        assert_eq!(bar_segments(101.0), (20, false)); // floor is 20 exactly; nothing was cut off
    }

    #[test]
    fn plain_line_format() {
        console::set_colors_enabled(false);
        assert_eq!(unstyled().plain_line(3.0), "3.00 lines/sec\n");
        assert_eq!(unstyled().plain_line(0.0166), "0.02 lines/sec\n");
    }

    #[test]
    fn chart_line_format() {
        console::set_colors_enabled(false);
        // baseline 100, throughput 47.5: 10 filled segments, no overflow marker
        assert_eq!(
            unstyled().chart_line(47.5, 100.0),
            " 47.50% |==========          |   47.50 lines/sec\n"
        );
        // baseline 10, throughput 50: clamped bar with the overflow marker
        assert_eq!(
            unstyled().chart_line(50.0, 10.0),
            "500.00% |====================|=  50.00 lines/sec\n"
        );
    }

    #[test]
    fn calibration_line_format() {
        console::set_colors_enabled(false);
        assert_eq!(
            unstyled().calibration_line(3.0),
            "    - % | <==>               |   3.00 lines/sec\n"
        );
    }

    #[test]
    fn timestamp_prefix_is_bracketed_rfc3339() {
        console::set_colors_enabled(false);
        let style = ReportStyle { style: Style::new(), timestamp: true };
        let line = style.plain_line(1.0);
        let re = Regex::new(r"^\[\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(Z|[+-]\d{2}:\d{2})\] 1\.00 lines/sec\n$").unwrap();
        assert!(re.is_match(&line), "unexpected line: {line:?}");
    }
}
