//! Progress record schema versions.
//!
//! Record schema versions:
//! - v0: Legacy record with no `schemaVersion` key. Dates may be RFC3339,
//!   bare `YYYY-MM-DD`, or the `Tue Mar 10 2026` date-string form.
//! - v1: `schemaVersion: 1`, all timestamps RFC3339.
//!
//! Decoding always goes through a lenient intermediate shape so a record
//! with missing fields or odd dates still yields a usable [`UserProgress`].

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{LessonProgress, UserProgress};

/// Current record schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Key holding the schema version in a stored record.
const VERSION_KEY: &str = "schemaVersion";

/// Record schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// v0: unversioned legacy record
    Legacy,
    /// v1: versioned record
    V1,
    /// Written by a newer release; read best-effort
    Newer(u32),
}

impl SchemaVersion {
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Legacy => 0,
            Self::V1 => 1,
            Self::Newer(v) => v,
        }
    }
}

/// A decoded record along with what was needed to get it into shape.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub progress: UserProgress,
    pub version: SchemaVersion,
    /// True if invariants had to be repaired during decoding.
    pub repaired: bool,
}

/// Detect the schema version of a parsed record.
///
/// Detection logic:
/// - Not a JSON object -> error (corrupt)
/// - No `schemaVersion` key -> v0
/// - `schemaVersion` not a non-negative integer -> error (corrupt)
pub fn detect_version(value: &serde_json::Value) -> Result<SchemaVersion> {
    let Some(obj) = value.as_object() else {
        bail!("Progress record is not a JSON object");
    };

    let Some(raw) = obj.get(VERSION_KEY) else {
        return Ok(SchemaVersion::Legacy);
    };

    let version = raw
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .with_context(|| format!("Invalid {VERSION_KEY}: {raw}"))?;

    Ok(match version {
        0 => SchemaVersion::Legacy,
        CURRENT_VERSION => SchemaVersion::V1,
        v => SchemaVersion::Newer(v),
    })
}

/// Decode a stored record, migrating older versions.
pub fn decode_record(content: &str) -> Result<DecodedRecord> {
    let value: serde_json::Value =
        serde_json::from_str(content).context("Progress record is not valid JSON")?;
    let version = detect_version(&value)?;

    if let SchemaVersion::Newer(v) = version {
        warn!(
            version = v,
            current = CURRENT_VERSION,
            "Progress record written by a newer release; reading known fields only"
        );
    }

    let raw: RawRecord =
        serde_json::from_value(value).context("Progress record has invalid field types")?;
    let mut progress = raw.into_progress();
    let repaired = progress.normalize();
    if repaired {
        warn!(
            version = version.as_u32(),
            total_xp = progress.total_xp,
            "Progress record was inconsistent; XP and completions repaired"
        );
    }

    Ok(DecodedRecord {
        progress,
        version,
        repaired,
    })
}

/// Encode a record at the current schema version.
pub fn encode_record(progress: &UserProgress) -> Result<String> {
    let record = StoredRecord {
        schema_version: CURRENT_VERSION,
        progress,
    };
    serde_json::to_string_pretty(&record).context("Failed to serialize progress record")
}

/// Parse an activity timestamp in any of the accepted forms.
///
/// Date-only forms resolve to midnight UTC.
#[must_use]
pub fn parse_activity_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN).and_utc());
    }

    // "Tue Mar 10 2026", possibly followed by a time and zone name
    let head: Vec<&str> = raw.split_whitespace().take(4).collect();
    if head.len() == 4 {
        if let Ok(date) = NaiveDate::parse_from_str(&head.join(" "), "%a %b %d %Y") {
            return Some(date.and_time(NaiveTime::MIN).and_utc());
        }
    }
    None
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord<'a> {
    schema_version: u32,
    #[serde(flatten)]
    progress: &'a UserProgress,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    #[serde(rename = "totalXP")]
    total_xp: u32,
    completed_lessons: Vec<String>,
    lesson_progress: BTreeMap<String, RawLessonProgress>,
    current_streak: u32,
    last_activity_date: Option<String>,
    badges: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawLessonProgress {
    lesson_id: String,
    completed: bool,
    #[serde(rename = "earnedXP")]
    earned_xp: u32,
    completed_at: Option<String>,
}

impl RawRecord {
    fn into_progress(self) -> UserProgress {
        let lesson_progress = self
            .lesson_progress
            .into_iter()
            .map(|(id, raw)| {
                let entry = LessonProgress {
                    lesson_id: if raw.lesson_id.is_empty() {
                        id.clone()
                    } else {
                        raw.lesson_id
                    },
                    completed: raw.completed,
                    earned_xp: raw.earned_xp,
                    completed_at: raw.completed_at.as_deref().and_then(parse_activity_date),
                };
                (id, entry)
            })
            .collect();

        let last_activity_date = self.last_activity_date.as_deref().and_then(|raw| {
            let parsed = parse_activity_date(raw);
            if parsed.is_none() {
                warn!(value = raw, "Unrecognized lastActivityDate; treating as absent");
            }
            parsed
        });

        UserProgress {
            total_xp: self.total_xp,
            completed_lesson_ids: self.completed_lessons.into_iter().collect(),
            lesson_progress,
            current_streak: self.current_streak,
            last_activity_date,
            badges: self.badges.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_detect_legacy_without_version_key() {
        let value = serde_json::json!({ "totalXP": 0 });
        assert_eq!(detect_version(&value).unwrap(), SchemaVersion::Legacy);
    }

    #[test]
    fn test_detect_v1() {
        let value = serde_json::json!({ "schemaVersion": 1 });
        assert_eq!(detect_version(&value).unwrap(), SchemaVersion::V1);
    }

    #[test]
    fn test_detect_newer() {
        let value = serde_json::json!({ "schemaVersion": 7 });
        assert_eq!(detect_version(&value).unwrap(), SchemaVersion::Newer(7));
    }

    #[test]
    fn test_detect_rejects_non_object() {
        let value = serde_json::json!([1, 2, 3]);
        assert!(detect_version(&value).is_err());
    }

    #[test]
    fn test_detect_rejects_bad_version() {
        let value = serde_json::json!({ "schemaVersion": "one" });
        assert!(detect_version(&value).is_err());
    }

    #[test]
    fn test_decode_legacy_record_with_date_string() {
        let content = r#"{
            "totalXP": 25,
            "completedLessons": ["L1", "L2"],
            "lessonProgress": {
                "L1": {"lessonId": "L1", "completed": true, "earnedXP": 10},
                "L2": {"lessonId": "L2", "completed": true, "earnedXP": 15}
            },
            "currentStreak": 2,
            "lastActivityDate": "Tue Mar 10 2026",
            "badges": ["starter"]
        }"#;

        let decoded = decode_record(content).unwrap();
        assert_eq!(decoded.version, SchemaVersion::Legacy);
        assert!(!decoded.repaired);
        assert_eq!(decoded.progress.total_xp, 25);
        assert_eq!(decoded.progress.current_streak, 2);
        assert_eq!(
            decoded.progress.last_activity_date,
            Some(Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap())
        );
        assert!(decoded.progress.badges.contains("starter"));
    }

    #[test]
    fn test_decode_defaults_missing_fields() {
        let decoded = decode_record("{}").unwrap();
        assert_eq!(decoded.progress, UserProgress::default());
    }

    #[test]
    fn test_decode_repairs_inconsistent_total() {
        let content = r#"{
            "schemaVersion": 1,
            "totalXP": 500,
            "completedLessons": ["L1"],
            "lessonProgress": {"L1": {"lessonId": "L1", "completed": true, "earnedXP": 10}},
            "currentStreak": 1,
            "badges": []
        }"#;

        let decoded = decode_record(content).unwrap();
        assert!(decoded.repaired);
        assert_eq!(decoded.progress.total_xp, 10);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_record("not json at all").is_err());
        assert!(decode_record(r#"{"totalXP": -4}"#).is_err());
    }

    #[test]
    fn test_encode_writes_current_version() {
        let mut progress = UserProgress::default();
        progress.record_completion("L1", 10, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());

        let encoded = encode_record(&progress).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["schemaVersion"], CURRENT_VERSION);
        assert_eq!(value["totalXP"], 10);

        let decoded = decode_record(&encoded).unwrap();
        assert_eq!(decoded.version, SchemaVersion::V1);
        assert_eq!(decoded.progress, progress);
    }

    #[test]
    fn test_parse_activity_date_forms() {
        let midnight = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(parse_activity_date("2026-03-10"), Some(midnight));
        assert_eq!(
            parse_activity_date(
                "Tue Mar 10 2026 14:03:00 GMT+0100 (Central European Standard Time)"
            ),
            Some(midnight)
        );
        assert_eq!(
            parse_activity_date("2026-03-10T08:30:00+02:00"),
            Some(Utc.with_ymd_and_hms(2026, 3, 10, 6, 30, 0).unwrap())
        );
        assert_eq!(parse_activity_date("yesterday"), None);
    }
}
