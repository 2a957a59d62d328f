use std::sync::LazyLock;

use regex::Regex;

use super::EngineProgress;

// Hardcoded patterns that always compile.
static GUESSES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)g ").expect("valid regex"));
static PERCENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+)%").expect("valid regex"));
static RATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.?\d*)p/s").expect("valid regex"));
static CURRENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"current:\s*(.+)").expect("valid regex"));

/// Parse a John the Ripper status chunk.
///
/// Each field is taken from the first match of its pattern anywhere in `raw`.
pub fn parse(raw: &str) -> EngineProgress {
    let mut info = EngineProgress::default();

    if let Some(caps) = GUESSES.captures(raw) {
        info.cracked_count = caps[1].parse().ok();
    }
    if let Some(caps) = PERCENT.captures(raw) {
        info.progress_percent = caps[1].parse().ok();
    }
    if let Some(caps) = RATE.captures(raw) {
        info.rate_per_second = caps[1].parse().ok();
    }
    if raw.contains("current:") {
        if let Some(caps) = CURRENT.captures(raw) {
            info.current_candidate = Some(caps[1].trim().to_string());
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_line() {
        let info = parse("1g 0:00:05:00 3.47% 1500p/s");
        assert_eq!(info.cracked_count, Some(1));
        assert_eq!(info.progress_percent, Some(3.47));
        assert_eq!(info.rate_per_second, Some(1500.0));
        assert!(info.current_candidate.is_none());
        assert!(info.eta_seconds.is_none());
    }

    #[test]
    fn fractional_rate() {
        let info = parse("0g 0:00:00:10 0.01% 2345.6p/s");
        assert_eq!(info.cracked_count, Some(0));
        assert_eq!(info.rate_per_second, Some(2345.6));
    }

    #[test]
    fn current_candidate_is_rest_of_line() {
        let info = parse("0g 0:00:00:02 1.00% 10p/s current:   hunter2  \nnext line");
        assert_eq!(info.current_candidate.as_deref(), Some("hunter2"));
    }

    #[test]
    fn integer_percent_is_not_matched() {
        let info = parse("0g 0:00:00:02 50% 10p/s");
        assert!(info.progress_percent.is_none());
    }

    #[test]
    fn guess_count_requires_trailing_space() {
        let info = parse("12g");
        assert!(info.cracked_count.is_none());
    }
}
