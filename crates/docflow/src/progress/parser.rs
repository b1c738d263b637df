//! Parser for progress-bar lines emitted by the converter.
//!
//! Converters report progress as tqdm-style bars such as
//! `Recognizing Text: 45%|████▌     | 9/20 [00:03<00:04, 2.71it/s]`.
//! Patterns are tried from most to least specific and the first match wins.

use std::sync::LazyLock;

use regex::Regex;

/// `label: NN%|bar| n/m [timing]`
static FULL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?):\s*(\d+)%\|[^|]*\|\s*(\d+/\d+)\s*\[.+\]").expect("valid regex")
});

/// `label: NN% ... n/m`
static MEDIUM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):\s*(\d+)%.*?(\d+/\d+)").expect("valid regex"));

/// `label: NN%`
static MINIMAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):\s*(\d+)%").expect("valid regex"));

/// A structured progress event extracted from one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub task: String,
    pub percentage: u8,
    pub progress_info: Option<String>,
}

/// Classification of a single diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Progress(ProgressUpdate),
    /// Looks like a progress bar but matched no known pattern. Usually means
    /// the converter changed its output format.
    FormatDrift(String),
    /// Ordinary diagnostic output.
    Passthrough,
    Blank,
}

pub fn parse_line(line: &str) -> LineKind {
    let line = line.trim();
    if line.is_empty() {
        return LineKind::Blank;
    }

    let patterns: [&Regex; 3] = [&FULL_PATTERN, &MEDIUM_PATTERN, &MINIMAL_PATTERN];
    for pattern in patterns {
        if let Some(update) = pattern.captures(line).and_then(|caps| {
            let task = caps.get(1)?.as_str().trim();
            let percentage = caps.get(2)?.as_str().parse::<u64>().ok()?.min(100) as u8;
            Some(ProgressUpdate {
                task: task.to_string(),
                percentage,
                progress_info: caps.get(3).map(|m| m.as_str().to_string()),
            })
        }) {
            return LineKind::Progress(update);
        }
    }

    if looks_like_progress(line) {
        LineKind::FormatDrift(line.to_string())
    } else {
        LineKind::Passthrough
    }
}

fn looks_like_progress(line: &str) -> bool {
    line.contains('%') && line.contains(['|', '[', ']'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(line: &str) -> ProgressUpdate {
        match parse_line(line) {
            LineKind::Progress(update) => update,
            other => panic!("expected progress for {:?}, got {:?}", line, other),
        }
    }

    #[test]
    fn test_full_pattern() {
        let update = progress("Recognizing Text: 45%|████▌     | 9/20 [00:03<00:04, 2.71it/s]");
        assert_eq!(update.task, "Recognizing Text");
        assert_eq!(update.percentage, 45);
        assert_eq!(update.progress_info.as_deref(), Some("9/20"));
    }

    #[test]
    fn test_medium_pattern() {
        let update = progress("Detecting bboxes: 50% done, page 3/6");
        assert_eq!(update.task, "Detecting bboxes");
        assert_eq!(update.percentage, 50);
        assert_eq!(update.progress_info.as_deref(), Some("3/6"));
    }

    #[test]
    fn test_minimal_pattern_has_no_info() {
        let update = progress("Loading models: 12%");
        assert_eq!(update.task, "Loading models");
        assert_eq!(update.percentage, 12);
        assert_eq!(update.progress_info, None);
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let update = progress("\r  Layout:  100%|##########| 4/4 [00:01<00:00]  ");
        assert_eq!(update.task, "Layout");
        assert_eq!(update.percentage, 100);
        assert_eq!(update.progress_info.as_deref(), Some("4/4"));
    }

    #[test]
    fn test_percentage_is_clamped() {
        assert_eq!(progress("Odd: 180%").percentage, 100);
    }

    #[test]
    fn test_drift_is_reported() {
        assert_eq!(
            parse_line("|████| 45% complete"),
            LineKind::FormatDrift("|████| 45% complete".to_string())
        );
        assert!(matches!(
            parse_line("[stage two] at 45 %"),
            LineKind::FormatDrift(_)
        ));
    }

    #[test]
    fn test_plain_lines_pass_through() {
        assert_eq!(parse_line("Loaded layout model on cpu"), LineKind::Passthrough);
        assert_eq!(parse_line("used 50% of memory"), LineKind::Passthrough);
        assert_eq!(parse_line("   "), LineKind::Blank);
    }
}
