use std::sync::LazyLock;

use regex::Regex;

use super::EngineProgress;

// Hardcoded patterns that always compile.
static PERCENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+)%").expect("valid regex"));
static SPEED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)\s*[kMG]?H/s").expect("valid regex"));
static ESTIMATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) days, (\d+):(\d+):(\d+)").expect("valid regex"));

/// Parse a Hashcat status screen.
///
/// Lines are inspected independently; a line is classified by the first of
/// `Progress`, `Speed`, `Time.Estimated` it contains. Later lines overwrite
/// values found on earlier ones.
pub fn parse(raw: &str) -> EngineProgress {
    let mut info = EngineProgress::default();

    for line in raw.trim().lines() {
        if line.contains("Progress") {
            if let Some(caps) = PERCENT.captures(line) {
                info.progress_percent = caps[1].parse().ok();
            }
        } else if line.contains("Speed") {
            if let Some(caps) = SPEED.captures(line) {
                if let Ok(speed) = caps[1].parse::<f64>() {
                    info.rate_per_second = Some(speed * unit_multiplier(line));
                }
            }
        } else if line.contains("Time.Estimated") {
            if let Some(caps) = ESTIMATED.captures(line) {
                info.eta_seconds = duration_seconds(&caps);
            }
        }
    }

    info
}

fn unit_multiplier(line: &str) -> f64 {
    if line.contains("kH/s") {
        1e3
    } else if line.contains("MH/s") {
        1e6
    } else if line.contains("GH/s") {
        1e9
    } else {
        1.0
    }
}

fn duration_seconds(caps: &regex::Captures<'_>) -> Option<u64> {
    let days: u64 = caps[1].parse().ok()?;
    let hours: u64 = caps[2].parse().ok()?;
    let minutes: u64 = caps[3].parse().ok()?;
    let seconds: u64 = caps[4].parse().ok()?;
    days.checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_in_kilohashes() {
        let info = parse("Speed.#1.........:  1234.5 kH/s");
        assert_eq!(info.rate_per_second, Some(1_234_500.0));
    }

    #[test]
    fn speed_units_scale() {
        assert_eq!(parse("Speed.#1.....: 42 H/s").rate_per_second, Some(42.0));
        assert_eq!(
            parse("Speed.#1.....: 3 MH/s").rate_per_second,
            Some(3_000_000.0)
        );
        assert_eq!(
            parse("Speed.#1.....: 1.5 GH/s").rate_per_second,
            Some(1_500_000_000.0)
        );
    }

    #[test]
    fn estimated_time_to_seconds() {
        let info = parse("Time.Estimated...: 2 days, 03:04:05");
        assert_eq!(info.eta_seconds, Some(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5));
        assert_eq!(info.eta_seconds, Some(183_845));
    }

    #[test]
    fn full_status_screen() {
        let screen = "\
Session..........: hashcat
Status...........: Running
Time.Estimated...: Tue Jan 16 10:00:00 2024 (0 days, 00:10:00)
Speed.#1.........:   876.0 MH/s (10.21ms) @ Accel:64 Loops:1 Thr:256 Vec:1
Progress.........: 5242880/14344385 (36.55%)
";
        let info = parse(screen);
        assert_eq!(info.progress_percent, Some(36.55));
        assert_eq!(info.rate_per_second, Some(876_000_000.0));
        assert_eq!(info.eta_seconds, Some(600));
        assert!(info.cracked_count.is_none());
    }

    #[test]
    fn oversized_day_count_yields_no_eta() {
        let info = parse("Time.Estimated...: 999999999999999999 days, 00:00:00");
        assert!(info.eta_seconds.is_none());

        let info = parse("Time.Estimated...: 213503982334601 days, 23:59:59");
        assert!(info.eta_seconds.is_none());
    }

    #[test]
    fn eta_without_days_is_ignored() {
        let info = parse("Time.Estimated...: 00:10:00");
        assert!(info.eta_seconds.is_none());
    }
}
