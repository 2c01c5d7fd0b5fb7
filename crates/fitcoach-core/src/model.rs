//! Wire types exchanged with the fitness backend.
//!
//! Field names follow the backend's camelCase JSON. Snapshot structs default
//! every field so a partially populated provider never fails decoding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A chat model the backend can route to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOption {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub full_name: String,
}

impl ModelOption {
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    pub include_context: bool,
    pub model: String,
}

impl ChatRequest {
    /// A single-turn request carrying just the user's prompt
    pub fn single(prompt: &str, model: &str, include_context: bool) -> Self {
        Self {
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            include_context,
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub used_context: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub prompt: String,
    pub model: String,
    pub include_context: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StravaSummary {
    pub activity_count: u32,
    pub total_distance_km: f64,
    pub total_moving_hours: f64,
    pub average_distance_km: f64,
    pub latest_activity_label: Option<String>,
    pub chart_labels: Vec<String>,
    pub chart_distances_km: Vec<f64>,
    pub type_counts: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GarminSummary {
    pub latest_date: Option<String>,
    pub body_battery_max: Option<i32>,
    pub body_battery_min: Option<i32>,
    pub weight: Option<f64>,
    #[serde(rename = "vo2Max")]
    pub vo2_max: Option<f64>,
    pub resting_heart_rate: Option<i32>,
    pub sleep_score: Option<i32>,
    pub sleep_duration_hours: Option<f64>,
    pub chart_labels: Vec<String>,
    pub body_battery_max_series: Vec<Option<i32>>,
    pub sleep_score_series: Vec<Option<i32>>,
    pub resting_heart_rate_series: Vec<Option<i32>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoverySummary {
    pub workout_label: Option<String>,
    pub workout_end_timestamp: Option<String>,
    pub minutes_to_recovery: Option<i32>,
    pub status: Option<String>,
    pub guidance: Option<String>,
}

/// Aggregated provider snapshot plus human-readable status messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessContext {
    pub messages: Vec<String>,
    pub strava: Option<StravaSummary>,
    pub garmin: Option<GarminSummary>,
    pub recovery: Option<RecoverySummary>,
}

impl FitnessContext {
    /// One-line overview, e.g. `Strava ✓ · Garmin ✓ · token expired`
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.strava.is_some() {
            parts.push("Strava ✓".to_string());
        }
        if self.garmin.is_some() {
            parts.push("Garmin ✓".to_string());
        }
        if self.recovery.is_some() {
            parts.push("Recovery ✓".to_string());
        }
        if !self.messages.is_empty() {
            parts.push(self.messages.join(" | "));
        }
        if parts.is_empty() {
            "Empty".to_string()
        } else {
            parts.join(" · ")
        }
    }

    /// Detail lines for the context panel, one per populated metric
    pub fn detail_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(strava) = &self.strava {
            lines.push(format!(
                "Strava: {} activities, {:.1} km, {:.1} h moving",
                strava.activity_count, strava.total_distance_km, strava.total_moving_hours
            ));
            if let Some(label) = &strava.latest_activity_label {
                lines.push(format!("  latest: {}", label));
            }
        }

        if let Some(garmin) = &self.garmin {
            let mut metrics = Vec::new();
            if let (Some(max), Some(min)) = (garmin.body_battery_max, garmin.body_battery_min) {
                metrics.push(format!("body battery {}-{}", min, max));
            }
            if let Some(rhr) = garmin.resting_heart_rate {
                metrics.push(format!("RHR {}", rhr));
            }
            if let Some(score) = garmin.sleep_score {
                metrics.push(format!("sleep {}", score));
            }
            if let Some(vo2) = garmin.vo2_max {
                metrics.push(format!("VO2max {:.1}", vo2));
            }
            let date = garmin.latest_date.as_deref().unwrap_or("latest");
            if metrics.is_empty() {
                lines.push(format!("Garmin ({})", date));
            } else {
                lines.push(format!("Garmin ({}): {}", date, metrics.join(", ")));
            }
        }

        if let Some(recovery) = &self.recovery {
            let status = recovery.status.as_deref().unwrap_or("unknown");
            match recovery.minutes_to_recovery {
                Some(minutes) => lines.push(format!("Recovery: {} ({} min left)", status, minutes)),
                None => lines.push(format!("Recovery: {}", status)),
            }
            if let Some(guidance) = &recovery.guidance {
                lines.push(format!("  {}", guidance));
            }
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_option_decodes_camel_case() {
        let json = r#"[{"name":"gemini-pro","displayName":"Gemini Pro","fullName":"models/gemini-pro"}]"#;
        let models: Vec<ModelOption> = serde_json::from_str(json).unwrap();
        assert_eq!(models[0].name, "gemini-pro");
        assert_eq!(models[0].label(), "Gemini Pro");
        assert_eq!(models[0].full_name, "models/gemini-pro");
    }

    #[test]
    fn test_model_label_falls_back_to_name() {
        let model: ModelOption = serde_json::from_str(r#"{"name":"gemini-flash"}"#).unwrap();
        assert_eq!(model.label(), "gemini-flash");
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let request = ChatRequest::single("how was my week?", "gemini-pro", true);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "messages": [{"role": "user", "content": "how was my week?"}],
                "includeContext": true,
                "model": "gemini-pro",
            })
        );
    }

    #[test]
    fn test_context_summary() {
        assert_eq!(FitnessContext::default().summary(), "Empty");

        let ctx = FitnessContext {
            messages: vec!["Garmin not configured".into(), "Sheets ok".into()],
            strava: Some(StravaSummary::default()),
            garmin: None,
            recovery: Some(RecoverySummary::default()),
        };
        assert_eq!(
            ctx.summary(),
            "Strava ✓ · Recovery ✓ · Garmin not configured | Sheets ok"
        );
    }

    #[test]
    fn test_context_tolerates_partial_snapshots() {
        let json = r#"{
            "messages": [],
            "strava": {"activityCount": 3, "totalDistanceKm": 21.5, "typeCounts": {"Run": 3}},
            "garmin": {"latestDate": "2024-05-01", "vo2Max": 51.0, "sleepScoreSeries": [80, null]},
            "recovery": null
        }"#;
        let ctx: FitnessContext = serde_json::from_str(json).unwrap();
        let strava = ctx.strava.as_ref().unwrap();
        assert_eq!(strava.activity_count, 3);
        assert_eq!(strava.type_counts.get("Run"), Some(&3));
        let garmin = ctx.garmin.as_ref().unwrap();
        assert_eq!(garmin.vo2_max, Some(51.0));
        assert_eq!(garmin.sleep_score_series, vec![Some(80), None]);
        assert!(ctx.recovery.is_none());

        let lines = ctx.detail_lines();
        assert_eq!(lines[0], "Strava: 3 activities, 21.5 km, 0.0 h moving");
        assert_eq!(lines[1], "Garmin (2024-05-01): VO2max 51.0");
    }

    #[test]
    fn test_context_missing_messages_defaults_empty() {
        let ctx: FitnessContext = serde_json::from_str("{}").unwrap();
        assert!(ctx.messages.is_empty());
        assert!(ctx.detail_lines().is_empty());
    }
}
