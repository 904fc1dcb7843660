//! Workflow identifier generation and validation.
//!
//! Workflow IDs are opaque strings shaped `wf-YYYYMMDD-HHMMSS-rrrrr`: a UTC
//! timestamp plus a 5-character base36 suffix drawn from the OS CSPRNG. When
//! the CSPRNG is unavailable the suffix degrades to a zero-padded decimal of
//! the current sub-second nanoseconds, which keeps IDs unique enough within a
//! single process.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const SUFFIX_LEN: usize = 5;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque workflow identifier, unique within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Generate a fresh ID stamped with the current UTC time.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generate an ID for a specific instant (used by tests and backfills).
    pub fn generate_at(now: DateTime<Utc>) -> Self {
        WorkflowId(format!(
            "wf-{}-{}",
            now.format("%Y%m%d-%H%M%S"),
            random_suffix(now)
        ))
    }

    /// Wrap an existing string without validation (storage round-trips).
    pub fn from_string(raw: String) -> Self {
        WorkflowId(raw)
    }

    /// Check the `wf-YYYYMMDD-HHMMSS-rrrrr` shape.
    pub fn is_valid(raw: &str) -> bool {
        let parts: Vec<&str> = raw.splitn(4, '-').collect();
        if parts.len() != 4 || parts[0] != "wf" {
            return false;
        }
        let (date, time, suffix) = (parts[1], parts[2], parts[3]);
        date.len() == 8
            && date.bytes().all(|b| b.is_ascii_digit())
            && time.len() == 6
            && time.bytes().all(|b| b.is_ascii_digit())
            && suffix.len() == SUFFIX_LEN
            && suffix
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(raw: &str) -> Self {
        WorkflowId(raw.to_string())
    }
}

fn random_suffix(now: DateTime<Utc>) -> String {
    let mut bytes = [0u8; SUFFIX_LEN];
    match rand::rngs::OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => bytes
            .iter()
            .map(|b| BASE36[(*b as usize) % BASE36.len()] as char)
            .collect(),
        Err(_) => {
            let nanos = now.timestamp_subsec_nanos() as u64;
            format!("{:05}", nanos % 100_000)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_id_matches_expected_shape() {
        let id = WorkflowId::generate();
        assert!(WorkflowId::is_valid(id.as_str()), "bad id: {id}");
        assert!(id.as_str().starts_with("wf-"));
        assert_eq!(id.as_str().len(), "wf-20250101-120000-abcde".len());
    }

    #[test]
    fn generate_at_embeds_the_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 8, 1, 14, 30, 5).unwrap();
        let id = WorkflowId::generate_at(at);
        assert!(id.as_str().starts_with("wf-20250801-143005-"));
    }

    #[test]
    fn suffixes_differ_across_generations() {
        let at = Utc.with_ymd_and_hms(2025, 8, 1, 14, 30, 5).unwrap();
        let a = WorkflowId::generate_at(at);
        let b = WorkflowId::generate_at(at);
        // Same second, different random suffix (collision odds: 36^-5).
        assert_ne!(a, b);
    }

    #[test]
    fn validation_rejects_malformed_ids() {
        for bad in [
            "",
            "wf-",
            "wf-2025-0801-143005-abcde",
            "wf-20250801-143005-ABCDE",
            "wf-20250801-143005-abcd",
            "run-20250801-143005-abcde",
            "wf-20250801-143005-abcde-extra?",
        ] {
            // The last case actually parses as a 4th part containing '-'; the
            // suffix length check rejects it.
            assert!(!WorkflowId::is_valid(bad), "accepted: {bad}");
        }
    }

    #[test]
    fn serde_is_transparent() {
        let id = WorkflowId::from("wf-20250801-143005-abcde");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"wf-20250801-143005-abcde\"");
        let parsed: WorkflowId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
