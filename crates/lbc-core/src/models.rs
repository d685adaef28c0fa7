//! Typed read-only views over service responses.
//!
//! Every model keeps the response object it was parsed from in `raw`, so
//! fields this crate does not know about yet are never lost.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Status of a submission as reported while polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Complete,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => JobStatus::Pending,
            "complete" => JobStatus::Complete,
            "failed" => JobStatus::Failed,
            other => JobStatus::Other(other.to_string()),
        }
    }

    pub fn of(response: &Value) -> Self {
        Self::parse(
            response
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Complete,
    Failed,
}

impl ExperimentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExperimentStatus::Complete => "complete",
            ExperimentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one submission. A `failed` experiment is a normal
/// result, not an error; `error` is set exactly when `status` is `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionResult {
    pub experiment_id: String,
    pub status: ExperimentStatus,
    pub result_data: Option<Value>,
    pub error: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WellResult {
    pub well_idx: usize,
    pub img_b64: Option<String>,
    pub score: Option<f64>,
}

pub fn experiment_id_of(response: &Value) -> Result<String> {
    let id = response
        .get("experiment_id")
        .or_else(|| response.get("id"))
        .ok_or_else(|| Error::format("response is missing experiment_id"))?;
    match id {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::format(format!("invalid experiment_id: {}", id))),
    }
}

impl SubmissionResult {
    pub fn from_response(raw: Value) -> Result<Self> {
        let experiment_id = experiment_id_of(&raw)?;
        let status = match JobStatus::of(&raw) {
            JobStatus::Complete => ExperimentStatus::Complete,
            JobStatus::Failed => ExperimentStatus::Failed,
            other => {
                return Err(Error::format(format!(
                    "experiment {} is not finished (status {})",
                    experiment_id, other
                )))
            }
        };
        let result_data = raw.get("result_data").filter(|v| !v.is_null()).cloned();
        let error = match status {
            ExperimentStatus::Complete => None,
            ExperimentStatus::Failed => Some(
                raw.get("error")
                    .or_else(|| raw.get("error_message"))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or("experiment failed without an error message")
                    .to_string(),
            ),
        };
        Ok(Self {
            experiment_id,
            status,
            result_data,
            error,
            raw,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.status == ExperimentStatus::Complete
    }

    fn result_field(&self, key: &str) -> Option<&Value> {
        self.result_data.as_ref().and_then(|data| data.get(key))
    }

    /// Well label to base64 image, from a successful result.
    pub fn well_images(&self) -> BTreeMap<String, String> {
        self.result_field("well_images")
            .and_then(Value::as_object)
            .map(|images| {
                images
                    .iter()
                    .filter_map(|(label, img)| img.as_str().map(|s| (label.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.result_field("duration_seconds")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    pub fn score(&self) -> Option<f64> {
        self.result_field("score")
            .or_else(|| self.raw.get("score"))
            .and_then(Value::as_f64)
    }

    pub fn well_results(&self) -> Vec<WellResult> {
        let wells = self
            .result_field("wells")
            .or_else(|| self.raw.get("wells"))
            .and_then(Value::as_array);
        let Some(wells) = wells else {
            return Vec::new();
        };
        wells
            .iter()
            .filter_map(|w| {
                let well_idx = w.get("well_idx").and_then(Value::as_u64)? as usize;
                Some(WellResult {
                    well_idx,
                    img_b64: w.get("img_b64").and_then(Value::as_str).map(str::to_string),
                    score: w.get("score").and_then(Value::as_f64),
                })
            })
            .collect()
    }
}

/// One row of a submission listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSummary {
    pub experiment_id: String,
    pub status: JobStatus,
    pub raw: Value,
}

pub fn parse_experiment_list(response: Value) -> Result<Vec<ExperimentSummary>> {
    let items = unwrap_list(response, &["submissions", "experiments", "jobs"])?;
    items
        .into_iter()
        .map(|raw| {
            Ok(ExperimentSummary {
                experiment_id: experiment_id_of(&raw)?,
                status: JobStatus::of(&raw),
                raw,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_name: String,
    pub best_score: Option<f64>,
    pub wells_consumed: u64,
    pub raw: Value,
}

#[derive(Deserialize)]
struct EntryFields {
    rank: u32,
    user_name: String,
    #[serde(default)]
    best_score: Option<f64>,
    #[serde(default)]
    wells_consumed: u64,
}

/// Parses a leaderboard and orders it by ascending rank, whatever order the
/// service used. Ranks must be unique and start at 1.
pub fn parse_leaderboard(response: Value) -> Result<Vec<LeaderboardEntry>> {
    let items = unwrap_list(response, &["entries"])?;
    let mut entries = Vec::with_capacity(items.len());
    for raw in items {
        let fields = EntryFields::deserialize(&raw)
            .map_err(|e| Error::format(format!("invalid leaderboard entry: {}", e)))?;
        if fields.rank == 0 {
            return Err(Error::format("leaderboard rank must be at least 1"));
        }
        entries.push(LeaderboardEntry {
            rank: fields.rank,
            user_name: fields.user_name,
            best_score: fields.best_score,
            wells_consumed: fields.wells_consumed,
            raw,
        });
    }
    entries.sort_by_key(|e| e.rank);
    let mut seen = BTreeSet::new();
    for entry in &entries {
        if !seen.insert(entry.rank) {
            return Err(Error::format(format!(
                "leaderboard rank {} appears more than once",
                entry.rank
            )));
        }
    }
    Ok(entries)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetImage {
    Base64(String),
    Url(String),
}

impl TargetImage {
    pub fn from_response(response: &Value) -> Result<Self> {
        let field = |key: &str| response.get(key).and_then(Value::as_str).map(str::to_string);
        if let Some(b64) = field("image_base64").or_else(|| field("target_image_base64")) {
            return Ok(TargetImage::Base64(b64));
        }
        if let Some(url) = field("image_url") {
            return Ok(TargetImage::Url(url));
        }
        Err(Error::format(
            "target response has neither image_base64 nor image_url",
        ))
    }

    /// Image bytes for the inline form. Accepts a bare base64 string or a
    /// `data:` URI.
    pub fn decode_bytes(&self) -> Result<Option<Vec<u8>>> {
        match self {
            TargetImage::Url(_) => Ok(None),
            TargetImage::Base64(data) => {
                let encoded = match data.split_once(";base64,") {
                    Some((_, rest)) => rest,
                    None => data.as_str(),
                };
                STANDARD
                    .decode(encoded.trim())
                    .map(Some)
                    .map_err(|e| Error::format(format!("target image is not valid base64: {}", e)))
            }
        }
    }
}

fn unwrap_list(response: Value, keys: &[&str]) -> Result<Vec<Value>> {
    match response {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in keys {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return Ok(items);
                }
            }
            Err(Error::format(format!(
                "expected a list or an object with one of {:?}",
                keys
            )))
        }
        other => Err(Error::format(format!("expected a list, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_result_always_carries_error() {
        let with_message = SubmissionResult::from_response(json!({
            "experiment_id": "e1", "status": "failed", "error": "plate jammed"
        }))
        .expect("parse");
        assert_eq!(with_message.status, ExperimentStatus::Failed);
        assert_eq!(with_message.error.as_deref(), Some("plate jammed"));

        let legacy = SubmissionResult::from_response(json!({
            "id": "e2", "status": "failed", "error_message": null
        }))
        .expect("parse");
        assert_eq!(legacy.experiment_id, "e2");
        assert!(legacy.error.is_some());
    }

    #[test]
    fn complete_result_drops_error_and_keeps_raw() {
        let raw = json!({
            "experiment_id": "e3",
            "status": "complete",
            "result_data": {"score": 0.8, "duration_seconds": 42.5, "well_images": {"A1": "aGk="}},
            "error": "ignored",
            "queue_position": 7
        });
        let result = SubmissionResult::from_response(raw.clone()).expect("parse");
        assert!(result.is_complete());
        assert_eq!(result.error, None);
        assert_eq!(result.raw["queue_position"], 7);
        assert_eq!(result.score(), Some(0.8));
        assert_eq!(result.duration_seconds(), 42.5);
        assert_eq!(result.well_images().get("A1").map(String::as_str), Some("aGk="));
        assert_eq!(result.raw, raw);
    }

    #[test]
    fn pending_response_is_not_a_result() {
        let err =
            SubmissionResult::from_response(json!({"experiment_id": "e4", "status": "pending"}))
                .expect_err("pending");
        assert_eq!(err.kind(), "format_error");
    }

    #[test]
    fn well_results_read_per_well_scores() {
        let result = SubmissionResult::from_response(json!({
            "experiment_id": "e5",
            "status": "complete",
            "result_data": {"wells": [
                {"well_idx": 0, "score": 0.5},
                {"well_idx": 1, "img_b64": "eA=="}
            ]}
        }))
        .expect("parse");
        let wells = result.well_results();
        assert_eq!(wells.len(), 2);
        assert_eq!(wells[0].score, Some(0.5));
        assert_eq!(wells[1].img_b64.as_deref(), Some("eA=="));
    }

    #[test]
    fn leaderboard_is_sorted_by_rank() {
        let entries = parse_leaderboard(json!({"entries": [
            {"rank": 3, "user_name": "c", "best_score": null, "wells_consumed": 10},
            {"rank": 1, "user_name": "a", "best_score": 0.91, "wells_consumed": 96, "team": "x"},
            {"rank": 2, "user_name": "b", "best_score": 0.5, "wells_consumed": 40}
        ]}))
        .expect("parse");
        let ranks: Vec<u32> = entries.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(entries[0].raw["team"], "x");
        assert_eq!(entries[2].best_score, None);
    }

    #[test]
    fn leaderboard_rejects_duplicate_or_zero_rank() {
        let duplicate = json!([
            {"rank": 1, "user_name": "a", "wells_consumed": 1},
            {"rank": 1, "user_name": "b", "wells_consumed": 2}
        ]);
        assert!(matches!(parse_leaderboard(duplicate), Err(Error::Format(_))));
        let zero = json!([{"rank": 0, "user_name": "a", "wells_consumed": 1}]);
        assert!(matches!(parse_leaderboard(zero), Err(Error::Format(_))));
    }

    #[test]
    fn target_prefers_inline_image() {
        let inline = TargetImage::from_response(&json!({
            "image_base64": "data:image/png;base64,aGVsbG8="
        }))
        .expect("target");
        assert_eq!(inline.decode_bytes().expect("bytes"), Some(b"hello".to_vec()));
        let url =
            TargetImage::from_response(&json!({"image_url": "https://img/1.png"})).expect("target");
        assert_eq!(url, TargetImage::Url("https://img/1.png".into()));
        assert!(TargetImage::from_response(&json!({})).is_err());
    }

    #[test]
    fn experiment_list_accepts_wrapped_and_bare_forms() {
        let bare = parse_experiment_list(json!([{"id": "a", "status": "pending"}])).expect("bare");
        assert_eq!(bare[0].status, JobStatus::Pending);
        let wrapped = parse_experiment_list(json!({
            "submissions": [{"experiment_id": "b", "status": "running"}]
        }))
        .expect("wrapped");
        assert_eq!(wrapped[0].status, JobStatus::Other("running".into()));
        assert!(!wrapped[0].status.is_terminal());
    }
}
