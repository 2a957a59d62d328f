//! Normalization of external cracking-engine status output.
//!
//! Engines are black boxes that print human-oriented status text. Each adapter
//! turns a chunk of that text into an [`EngineProgress`] record whose fields are
//! `None` whenever the corresponding pattern was not found. Parsing never fails.
//!
//! - [`john`]: single-line status (`1g 0:00:05:00 3.47% 1500p/s ...`)
//! - [`hashcat`]: multi-line status screen (`Progress`, `Speed.#1`, `Time.Estimated`)

pub mod hashcat;
pub mod john;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    John,
    Hashcat,
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::John => "john",
            EngineKind::Hashcat => "hashcat",
        }
    }

    /// Parse a raw status chunk with the adapter for this engine.
    pub fn parse(self, raw: &str) -> EngineProgress {
        match self {
            EngineKind::John => john::parse(raw),
            EngineKind::Hashcat => hashcat::parse(raw),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "john" => Ok(EngineKind::John),
            "hashcat" => Ok(EngineKind::Hashcat),
            other => Err(format!("unknown engine: {}", other)),
        }
    }
}

/// Partial progress extracted from one chunk of engine output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cracked_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_candidate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
}

impl EngineProgress {
    /// True when no pattern matched.
    pub fn is_empty(&self) -> bool {
        self.cracked_count.is_none()
            && self.progress_percent.is_none()
            && self.rate_per_second.is_none()
            && self.current_candidate.is_none()
            && self.eta_seconds.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_kind_from_str_is_case_insensitive() {
        assert_eq!("John".parse::<EngineKind>(), Ok(EngineKind::John));
        assert_eq!("HASHCAT".parse::<EngineKind>(), Ok(EngineKind::Hashcat));
        assert!("aircrack".parse::<EngineKind>().is_err());
    }

    #[test]
    fn dispatch_uses_matching_adapter() {
        let john = EngineKind::John.parse("3g 12.50% 900p/s");
        assert_eq!(john.cracked_count, Some(3));

        let hashcat = EngineKind::Hashcat.parse("3g 12.50% 900p/s");
        assert!(hashcat.cracked_count.is_none());
    }

    #[test]
    fn unmatched_text_is_empty() {
        assert!(EngineKind::John.parse("Loaded 1 password hash").is_empty());
        assert!(EngineKind::Hashcat.parse("Session..........: hashcat").is_empty());
    }
}
