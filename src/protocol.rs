//! Wire protocol for the measurement workflow
//!
//! All messages are JSON envelopes carrying at least a `type` discriminator
//! and a `ts` Unix timestamp; most also carry a `sender` identity tag.
//! Topic names are derived from the executor identity under the `v1/` prefix.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Sender tag stamped on every message this peer publishes.
pub const SENDER: &str = "B";

/// Version advertised in the ready status message.
pub const STATUS_VERSION: &str = "1.0.0";

/// Version stamp on the published operating configuration.
pub const SETTING_VERSION: &str = "2025.09.10-01";

/// Get current timestamp in seconds since Unix epoch
pub fn now_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The six logical channels of one executor identity.
///
/// `status` and `config_setting` are retained by the broker, the rest are
/// transient streams.
#[derive(Debug, Clone)]
pub struct TopicSet {
    /// B -> A: job start signal
    pub ctrl_start: String,
    /// A -> B: job end signal
    pub ctrl_end: String,
    /// A -> B: positioning commands
    pub cmd_point: String,
    /// B -> A: measurement results
    pub telemetry_result: String,
    /// B -> A: operating configuration (retained)
    pub config_setting: String,
    /// B -> A: liveness/state announcements (retained, also the will topic)
    pub status: String,
}

impl TopicSet {
    /// Derive the topic set for the given executor identity
    pub fn new(executor_id: &str) -> Self {
        Self {
            ctrl_start: format!("v1/{executor_id}/ctrl/start"),
            ctrl_end: format!("v1/{executor_id}/ctrl/end"),
            cmd_point: format!("v1/{executor_id}/cmd/point"),
            telemetry_result: format!("v1/{executor_id}/telemetry/result"),
            config_setting: format!("v1/{executor_id}/config/setting"),
            status: format!("v1/{executor_id}/status"),
        }
    }
}

/// A target position on the scan table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Euclidean distance from the table origin
    pub fn distance_from_origin(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

/// Messages the controller may deliver on the subscribed topics.
///
/// Unknown `type` values fail to parse and are discarded by the dispatcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// Positioning command on `cmd/point`
    #[serde(rename = "move_point")]
    MovePoint {
        point: Point,
        /// Deduplication key; absent or empty means no idempotency requested
        #[serde(default)]
        req_id: Option<String>,
        #[serde(default)]
        sender: Option<String>,
    },
    /// Job boundary signal on `ctrl/end`
    #[serde(rename = "end")]
    End {
        #[serde(default)]
        ts: Option<u64>,
        #[serde(default)]
        sender: Option<String>,
    },
}

/// Retained liveness/state announcement on the `status` topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub online: bool,
    pub sender: String,
    pub ts: u64,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl StatusMessage {
    /// Status published right after connecting
    pub fn ready() -> Self {
        Self {
            online: true,
            sender: SENDER.into(),
            ts: now_ts(),
            state: "ready".into(),
            version: Some(STATUS_VERSION.into()),
        }
    }

    /// Status published when the `end` signal is processed
    pub fn completed() -> Self {
        Self {
            online: true,
            sender: SENDER.into(),
            ts: now_ts(),
            state: "completed".into(),
            version: None,
        }
    }

    /// Last-will payload the broker publishes on unclean disconnect
    pub fn will() -> Self {
        Self {
            online: false,
            sender: SENDER.into(),
            ts: now_ts(),
            state: "disconnected".into(),
            version: None,
        }
    }
}

/// Spatial bounds and analysis parameters the executor operates within.
///
/// Published verbatim on `config/setting`; the simulator also uses the x/y
/// bounds to reject unreachable targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingEnvelope {
    pub start_x: f64,
    pub start_y: f64,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub sig_x_min: f64,
    pub sig_y_min: f64,
    pub analysis_mode: String,
    pub sampling_rate: u32,
}

impl Default for OperatingEnvelope {
    fn default() -> Self {
        Self {
            start_x: 0.0,
            start_y: 0.0,
            x_min: -50.0,
            x_max: 50.0,
            y_min: -50.0,
            y_max: 50.0,
            sig_x_min: 0.1,
            sig_y_min: 0.1,
            analysis_mode: "full_spectrum".into(),
            sampling_rate: 1000,
        }
    }
}

impl OperatingEnvelope {
    /// Whether the point lies inside the reachable x/y bounds
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x_min
            && point.x <= self.x_max
            && point.y >= self.y_min
            && point.y <= self.y_max
    }
}

/// Retained configuration announcement on `config/setting`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub parameters: OperatingEnvelope,
    pub ts: u64,
    pub sender: String,
    pub version: String,
}

impl SettingMessage {
    pub fn new(parameters: OperatingEnvelope) -> Self {
        Self {
            msg_type: "setting".into(),
            parameters,
            ts: now_ts(),
            sender: SENDER.into(),
            version: SETTING_VERSION.into(),
        }
    }
}

/// Job start signal on `ctrl/start` carrying a fresh job identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub ts: u64,
    pub sender: String,
    pub job_id: String,
    pub message: String,
}

impl StartMessage {
    pub fn new(job_id: String) -> Self {
        Self {
            msg_type: "start".into(),
            ts: now_ts(),
            sender: SENDER.into(),
            job_id,
            message: "device ready, measurement may begin".into(),
        }
    }
}

/// Metadata attached to every feature-set result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInfo {
    pub duration_ms: u64,
    pub sampling_rate: u32,
    pub data_points: u32,
    pub algorithm_version: String,
}

/// Outcome of one positioning command, published on `telemetry/result`.
///
/// The `req_id` field must echo the triggering command's `req_id` exactly
/// (and be absent when the command carried none); the controller correlates
/// retries on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResultRecord {
    #[serde(rename = "result_feature_set")]
    FeatureSet {
        features: Vec<String>,
        values: Vec<f64>,
        point: Point,
        ts: u64,
        sender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        req_id: Option<String>,
        analysis_info: AnalysisInfo,
    },
    #[serde(rename = "result_error")]
    Error {
        error: String,
        point: Point,
        ts: u64,
        sender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        req_id: Option<String>,
    },
}

impl ResultRecord {
    /// Build a successful result echoing the command's `req_id`
    pub fn feature_set(
        point: Point,
        features: Vec<String>,
        values: Vec<f64>,
        analysis_info: AnalysisInfo,
        req_id: Option<String>,
    ) -> Self {
        Self::FeatureSet {
            features,
            values,
            point,
            ts: now_ts(),
            sender: SENDER.into(),
            req_id,
            analysis_info,
        }
    }

    /// Build an error result echoing the command's `req_id`
    pub fn error(point: Point, error: String, req_id: Option<String>) -> Self {
        Self::Error {
            error,
            point,
            ts: now_ts(),
            sender: SENDER.into(),
            req_id,
        }
    }

    /// Error results are never cached; a retry re-executes
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn req_id(&self) -> Option<&str> {
        match self {
            Self::FeatureSet { req_id, .. } | Self::Error { req_id, .. } => req_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_derivation() {
        let topics = TopicSet::new("id1");
        assert_eq!(topics.ctrl_start, "v1/id1/ctrl/start");
        assert_eq!(topics.ctrl_end, "v1/id1/ctrl/end");
        assert_eq!(topics.cmd_point, "v1/id1/cmd/point");
        assert_eq!(topics.telemetry_result, "v1/id1/telemetry/result");
        assert_eq!(topics.config_setting, "v1/id1/config/setting");
        assert_eq!(topics.status, "v1/id1/status");
    }

    #[test]
    fn test_parse_move_point() {
        let raw = r#"{"type":"move_point","point":{"x":10.0,"y":-3.5},"req_id":"A1","sender":"A"}"#;
        match serde_json::from_str::<InboundMessage>(raw).expect("parse failed") {
            InboundMessage::MovePoint { point, req_id, sender } => {
                assert_eq!(point.x, 10.0);
                assert_eq!(point.y, -3.5);
                assert_eq!(req_id.as_deref(), Some("A1"));
                assert_eq!(sender.as_deref(), Some("A"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_move_point_without_req_id() {
        let raw = r#"{"type":"move_point","point":{"x":0,"y":0}}"#;
        match serde_json::from_str::<InboundMessage>(raw).expect("parse failed") {
            InboundMessage::MovePoint { req_id, .. } => assert!(req_id.is_none()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = r#"{"type":"reboot","ts":1}"#;
        assert!(serde_json::from_str::<InboundMessage>(raw).is_err());
    }

    #[test]
    fn test_result_echoes_req_id() {
        let point = Point { x: 1.0, y: 2.0 };
        let record = ResultRecord::error(point, "boom".into(), Some("R7".into()));
        assert_eq!(record.req_id(), Some("R7"));

        let json = serde_json::to_string(&record).expect("serialize failed");
        assert!(json.contains(r#""type":"result_error""#));
        assert!(json.contains(r#""req_id":"R7""#));
    }

    #[test]
    fn test_absent_req_id_is_omitted() {
        let point = Point { x: 0.0, y: 0.0 };
        let record = ResultRecord::error(point, "boom".into(), None);
        let json = serde_json::to_string(&record).expect("serialize failed");
        assert!(!json.contains("req_id"));
    }

    #[test]
    fn test_envelope_bounds() {
        let envelope = OperatingEnvelope::default();
        assert!(envelope.contains(Point { x: 50.0, y: -50.0 }));
        assert!(!envelope.contains(Point { x: 50.1, y: 0.0 }));
        assert!(!envelope.contains(Point { x: 0.0, y: -51.0 }));
    }
}
