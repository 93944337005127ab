use sentry_core::{IssueLevel, IssueStatus};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct IssueView {
    pub id: String,
    pub fingerprint: String,
    pub title: String,
    pub culprit: Option<String>,
    pub level: String,
    pub platform: String,
    pub first_seen: String,
    pub last_seen: String,
    pub count: i64,
    pub user_count: i64,
    pub status: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    pub id: String,
    pub issue_id: String,
    pub timestamp: String,
    pub received_at: String,
    pub level: String,
    pub platform: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub transaction_name: Option<String>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub user_ip: Option<String>,
    pub tags: Option<Value>,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourlyBucketView {
    pub bucket_start: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueDetail {
    #[serde(flatten)]
    pub issue: IssueView,
    pub hourly_buckets: Vec<HourlyBucketView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuesPage {
    pub issues: Vec<IssueView>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventsPage {
    pub events: Vec<EventView>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsPoint {
    pub bucket: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub total: i64,
    pub series: Vec<StatsPoint>,
}

#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<IssueStatus>,
    pub level: Option<IssueLevel>,
    pub query: Option<String>,
    pub environment: Option<String>,
    pub sort: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub status: Option<IssueStatus>,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub event_id: String,
    pub issue_id: String,
}
