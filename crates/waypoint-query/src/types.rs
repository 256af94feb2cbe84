use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use utoipa::ToSchema;
use waypoint_core::UtcDateTime;

use crate::normalize::normalize_path;
use crate::pattern::ValuePattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitKind {
    Pageview,
    Event,
}

impl HitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitKind::Pageview => "pageview",
            HitKind::Event => "event",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pageview" => Some(HitKind::Pageview),
            "event" => Some(HitKind::Event),
            _ => None,
        }
    }
}

impl fmt::Display for HitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pageview or custom event of a session, already normalized.
///
/// `path_or_name` is the normalized path for pageviews and the raw event name
/// for events. `page_context` is the normalized path the hit happened on; for
/// pageviews it equals `path_or_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedHit {
    pub session_id: String,
    pub timestamp: UtcDateTime,
    pub seq: u64,
    pub kind: HitKind,
    pub path_or_name: String,
    pub page_context: String,
    pub params: BTreeMap<String, String>,
}

impl NormalizedHit {
    pub fn pageview(
        session_id: impl Into<String>,
        timestamp: UtcDateTime,
        seq: u64,
        url: &str,
    ) -> Self {
        let path = normalize_path(url);
        Self {
            session_id: session_id.into(),
            timestamp,
            seq,
            kind: HitKind::Pageview,
            page_context: path.clone(),
            path_or_name: path,
            params: BTreeMap::new(),
        }
    }

    pub fn event(
        session_id: impl Into<String>,
        timestamp: UtcDateTime,
        seq: u64,
        name: impl Into<String>,
        page_url: &str,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp,
            seq,
            kind: HitKind::Event,
            path_or_name: name.into(),
            page_context: normalize_path(page_url),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The page this hit belongs to
    pub fn page(&self) -> &str {
        &self.page_context
    }
}

/// Hit as stored by the tracker, before normalization.
///
/// This is the shape of fixture files and of rows in the hits table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHit {
    pub website_id: String,
    pub session_id: String,
    pub timestamp: UtcDateTime,
    #[serde(default)]
    pub seq: Option<u64>,
    pub kind: HitKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl RawHit {
    /// Normalizes the hit. Events without a name are dropped.
    pub fn normalize(self, fallback_seq: u64) -> Option<NormalizedHit> {
        let seq = self.seq.unwrap_or(fallback_seq);
        let url = self.url.as_deref().unwrap_or("/");

        let hit = match self.kind {
            HitKind::Pageview => NormalizedHit::pageview(self.session_id, self.timestamp, seq, url),
            HitKind::Event => {
                let name = self.event_name.filter(|name| !name.trim().is_empty())?;
                NormalizedHit::event(self.session_id, self.timestamp, seq, name, url)
            }
        };

        Some(NormalizedHit {
            params: stringify_params(self.params),
            ..hit
        })
    }
}

/// Event properties are compared as strings; non-string JSON values use
/// their JSON rendering.
pub fn stringify_params(params: BTreeMap<String, serde_json::Value>) -> BTreeMap<String, String> {
    params
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}

/// All in-window hits of one session, ordered by `(timestamp, seq)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHits {
    pub session_id: String,
    pub hits: Vec<NormalizedHit>,
}

impl SessionHits {
    pub fn new(session_id: impl Into<String>, mut hits: Vec<NormalizedHit>) -> Self {
        hits.sort_by(|a, b| (a.timestamp, a.seq).cmp(&(b.timestamp, b.seq)));
        Self {
            session_id: session_id.into(),
            hits,
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Inclusive `[start, end]` time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: UtcDateTime,
    pub end: UtcDateTime,
}

impl TimeWindow {
    /// `None` when `start` is after `end`
    pub fn new(start: UtcDateTime, end: UtcDateTime) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, timestamp: &UtcDateTime) -> bool {
        *timestamp >= self.start && *timestamp <= self.end
    }
}

/// Matches hits of one kind whose path (or event name) fits a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitFilter {
    pub kind: HitKind,
    pub pattern: ValuePattern,
}

impl HitFilter {
    pub fn new(kind: HitKind, pattern: ValuePattern) -> Self {
        Self { kind, pattern }
    }

    pub fn matches(&self, hit: &NormalizedHit) -> bool {
        hit.kind == self.kind && self.pattern.matches(&hit.path_or_name)
    }
}

/// What an analysis needs from the warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitStreamRequest {
    pub website_id: String,
    pub window: TimeWindow,
    /// Restrict the stream to one hit kind (timing and journeys read pageviews only)
    pub kind: Option<HitKind>,
    /// Only sessions containing at least one matching hit are returned, with
    /// their full stream
    pub anchor: Option<HitFilter>,
}

impl HitStreamRequest {
    pub fn new(website_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            website_id: website_id.into(),
            window,
            kind: None,
            anchor: None,
        }
    }

    pub fn with_kind(mut self, kind: HitKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_anchor(mut self, anchor: HitFilter) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn admits(&self, website_id: &str, hit: &NormalizedHit) -> bool {
        website_id == self.website_id
            && self.window.contains(&hit.timestamp)
            && self.kind.map_or(true, |kind| kind == hit.kind)
    }
}

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_TIB: f64 = BYTES_PER_GB * 1024.0;

/// Result of a dry run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueryStats {
    #[serde(rename = "totalBytesProcessedGB")]
    pub total_bytes_processed_gb: f64,
    #[serde(rename = "estimatedCostUSD")]
    pub estimated_cost_usd: f64,
}

impl QueryStats {
    pub fn from_bytes(bytes: u64, cost_per_tib_usd: f64) -> Self {
        let bytes = bytes as f64;
        Self {
            total_bytes_processed_gb: bytes / BYTES_PER_GB,
            estimated_cost_usd: bytes / BYTES_PER_TIB * cost_per_tib_usd,
        }
    }
}

/// Limits a provider enforces on every fetch
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderLimits {
    pub hits_table: String,
    pub max_rows_scanned: u64,
    pub query_timeout: Duration,
    pub row_width_bytes: u64,
    pub cost_per_tib_usd: f64,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self {
            hits_table: "hits".to_string(),
            max_rows_scanned: 5_000_000,
            query_timeout: Duration::from_secs(60),
            row_width_bytes: 256,
            cost_per_tib_usd: 6.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    fn at(secs: i64) -> UtcDateTime {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_session_hits_sorted_by_timestamp_then_seq() {
        let session = SessionHits::new(
            "s1",
            vec![
                NormalizedHit::pageview("s1", at(5), 0, "/c"),
                NormalizedHit::pageview("s1", at(0), 2, "/b"),
                NormalizedHit::pageview("s1", at(0), 1, "/a"),
            ],
        );

        let paths: Vec<&str> = session.hits.iter().map(|h| h.path_or_name.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_raw_hit_normalization() {
        let raw: RawHit = serde_json::from_value(serde_json::json!({
            "websiteId": "w1",
            "sessionId": "s1",
            "timestamp": "2024-03-01T10:00:00Z",
            "kind": "event",
            "url": "https://example.com/checkout/?step=1",
            "eventName": "purchase",
            "params": {"plan": "pro", "seats": 3, "coupon": null}
        }))
        .unwrap();

        let hit = raw.normalize(7).unwrap();
        assert_eq!(hit.seq, 7);
        assert_eq!(hit.kind, HitKind::Event);
        assert_eq!(hit.path_or_name, "purchase");
        assert_eq!(hit.page(), "/checkout");
        assert_eq!(hit.params.get("plan").map(String::as_str), Some("pro"));
        assert_eq!(hit.params.get("seats").map(String::as_str), Some("3"));
        assert!(!hit.params.contains_key("coupon"));
    }

    #[test]
    fn test_unnamed_event_is_dropped() {
        let raw = RawHit {
            website_id: "w1".into(),
            session_id: "s1".into(),
            timestamp: at(0),
            seq: None,
            kind: HitKind::Event,
            url: Some("/".into()),
            event_name: Some("  ".into()),
            params: BTreeMap::new(),
        };
        assert!(raw.normalize(0).is_none());
    }

    #[test]
    fn test_time_window_is_inclusive() {
        assert!(TimeWindow::new(at(10), at(0)).is_none());

        let window = TimeWindow::new(at(0), at(10)).unwrap();
        assert!(window.contains(&at(0)));
        assert!(window.contains(&at(10)));
        assert!(!window.contains(&at(11)));
    }

    #[test]
    fn test_query_stats_from_bytes() {
        let stats = QueryStats::from_bytes(1024 * 1024 * 1024 * 1024, 6.25);
        assert_eq!(stats.total_bytes_processed_gb, 1024.0);
        assert_eq!(stats.estimated_cost_usd, 6.25);

        let json = serde_json::to_value(stats).unwrap();
        assert!(json.get("totalBytesProcessedGB").is_some());
        assert!(json.get("estimatedCostUSD").is_some());
    }
}
