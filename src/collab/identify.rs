use std::sync::LazyLock;

use regex::Regex;

use super::{HashIdentifier, MAX_CANDIDATES};
use crate::coordinator::HashTypeInfo;

/// Engine codes per hash type: `(name, john format, hashcat mode)`.
const FORMATS: &[(&str, &str, u32)] = &[
    ("yescrypt", "yescrypt", 7100),
    ("bcrypt", "bcrypt", 3200),
    ("scrypt", "scrypt", 8900),
    ("argon2", "argon2", 26600),
    ("md5crypt", "md5crypt", 500),
    ("sha256crypt", "sha256crypt", 7400),
    ("sha512crypt", "sha512crypt", 1800),
    ("MD5", "raw-md5", 0),
    ("NTLM", "nt", 1000),
    ("LM", "lm", 3000),
    ("SHA1", "raw-sha1", 100),
    ("MySQL41", "mysql-sha1", 300),
    ("SHA224", "raw-sha224", 1300),
    ("SHA256", "raw-sha256", 1400),
    ("SHA3-256", "raw-sha3", 17400),
    ("SHA384", "raw-sha384", 10800),
    ("SHA3-384", "raw-sha3", 17500),
    ("SHA512", "raw-sha512", 1700),
    ("SHA3-512", "raw-sha3", 17600),
    ("MySQL323", "mysql", 200),
    ("PostgreSQL MD5", "postgres", 12),
];

// Hardcoded patterns that always compile.
static PREFIXES: LazyLock<Vec<(Regex, &'static str, f64)>> = LazyLock::new(|| {
    [
        (r"^\$y\$", "yescrypt", 0.95),
        (r"^\$gy\$", "yescrypt", 0.90),
        (r"^\$2[aby]?\$", "bcrypt", 0.95),
        (r"^\$7\$", "scrypt", 0.90),
        (r"^\$argon2(id|i|d)?\$", "argon2", 0.95),
        (r"^\$1\$", "md5crypt", 0.90),
        (r"^\$5\$", "sha256crypt", 0.90),
        (r"^\$6\$", "sha512crypt", 0.90),
        (r"^md5[a-f0-9]{32}$", "PostgreSQL MD5", 0.85),
    ]
    .into_iter()
    .map(|(pattern, name, confidence)| (Regex::new(pattern).expect("valid regex"), name, confidence))
    .collect()
});

static HEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]+$").expect("valid regex"));

fn by_length(len: usize) -> &'static [&'static str] {
    match len {
        16 => &["MySQL323"],
        32 => &["MD5", "NTLM", "LM"],
        40 => &["SHA1", "MySQL41"],
        56 => &["SHA224"],
        64 => &["SHA256", "SHA3-256"],
        96 => &["SHA384", "SHA3-384"],
        128 => &["SHA512", "SHA3-512"],
        _ => &[],
    }
}

/// Identification from well-known prefixes and hex digest lengths.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternIdentifier;

impl PatternIdentifier {
    pub fn new() -> Self {
        Self
    }
}

impl HashIdentifier for PatternIdentifier {
    fn identify(&self, hash: &str) -> Vec<HashTypeInfo> {
        let hash = hash.trim();
        let mut candidates: Vec<HashTypeInfo> = Vec::new();

        for (pattern, name, confidence) in PREFIXES.iter() {
            if pattern.is_match(hash) {
                push_best(&mut candidates, info(name, *confidence));
            }
        }

        if HEX.is_match(hash) {
            // The first listed type for a digest length is the most common one.
            for (rank, name) in by_length(hash.len()).iter().enumerate() {
                let confidence = if rank == 0 { 0.7 } else { 0.3 };
                push_best(&mut candidates, info(name, confidence));
            }
        }

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates.truncate(MAX_CANDIDATES);
        candidates
    }
}

fn info(name: &str, confidence: f64) -> HashTypeInfo {
    let base = HashTypeInfo::new(name, confidence);
    match FORMATS.iter().find(|(n, _, _)| *n == name) {
        Some((_, john, mode)) => base.with_john(*john).with_hashcat(*mode),
        None => base,
    }
}

/// Keep one candidate per type, the most confident.
fn push_best(candidates: &mut Vec<HashTypeInfo>, candidate: HashTypeInfo) {
    match candidates
        .iter_mut()
        .find(|c| c.hash_type == candidate.hash_type)
    {
        Some(existing) if existing.confidence < candidate.confidence => *existing = candidate,
        Some(_) => {}
        None => candidates.push(candidate),
    }
}
