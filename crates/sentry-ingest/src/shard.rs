use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, Order, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use sentry_core::{generate_event_id, now_iso8601, CoreError, IssueStatus};
use sentry_entities::shard::{events, issue_stats, issue_users, issues};

use crate::fingerprint;
use crate::types::{
    EventView, EventsPage, HourlyBucketView, IngestOutcome, IssueDetail, IssueFilter, IssueUpdate,
    IssueView, IssuesPage, StatsPoint, StatsResult,
};

const DEFAULT_ISSUES_LIMIT: u64 = 25;
const MAX_ISSUES_LIMIT: u64 = 100;
const ISSUE_DETAIL_BUCKET_HOURS: usize = 168;
const USER_HASH_HEX_LEN: usize = 32;

/// Per-project storage engine (§4.3). Owns one sqlite handle and serializes all
/// writes behind `write_lock` so the step-sequences of `ingest`/`update_issue`
/// are atomic with respect to each other, per the single-writer-per-shard model
/// in §5 — concurrent callers queue on the mutex rather than racing the DB.
///
/// `write_lock` is shared (via `ShardPool::write_lock`), not owned: a `Shard`
/// is constructed fresh per request, so the lock itself must outlive any one
/// instance for two concurrent requests against the same project to actually
/// serialize against each other rather than each locking their own mutex.
pub struct Shard {
    db: Arc<DatabaseConnection>,
    write_lock: Arc<Mutex<()>>,
}

impl Shard {
    pub fn new(db: Arc<DatabaseConnection>, write_lock: Arc<Mutex<()>>) -> Self {
        Self { db, write_lock }
    }

    pub async fn ingest(&self, raw_event: Value) -> Result<IngestOutcome, CoreError> {
        let _guard = self.write_lock.lock().await;

        let event_id = raw_event
            .get("event_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_event_id);

        // Duplicate event_id: idempotent success, no counters touched (§4.3
        // failure policy, §9 open question resolved by preserving this as the
        // explicit behavior).
        if let Some(existing) = events::Entity::find_by_id(event_id.clone())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
        {
            return Ok(IngestOutcome {
                event_id: existing.id,
                issue_id: existing.issue_id,
            });
        }

        let now = now_iso8601();
        let timestamp = raw_event
            .get("timestamp")
            .and_then(timestamp_as_string)
            .unwrap_or_else(|| now.clone());

        let derived = fingerprint::derive(&raw_event, &event_id);

        let txn = self.db.begin().await.map_err(db_err)?;

        let issue = issues::Entity::find()
            .filter(issues::Column::Fingerprint.eq(derived.fingerprint.clone()))
            .one(&txn)
            .await
            .map_err(db_err)?;

        let issue_id = match issue {
            Some(existing) => {
                let mut active: issues::ActiveModel = existing.clone().into();
                active.last_seen = Set(now.clone());
                active.count = Set(existing.count + 1);
                active.update(&txn).await.map_err(db_err)?;
                existing.id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let active = issues::ActiveModel {
                    id: Set(id.clone()),
                    fingerprint: Set(derived.fingerprint.clone()),
                    title: Set(derived.title.clone()),
                    culprit: Set(derived.culprit.clone()),
                    level: Set(derived.level.as_str().to_string()),
                    platform: Set(derived.platform.clone()),
                    first_seen: Set(now.clone()),
                    last_seen: Set(now.clone()),
                    count: Set(1),
                    user_count: Set(0),
                    status: Set(IssueStatus::Unresolved.as_str().to_string()),
                    metadata: Set(Some(derived.metadata.clone())),
                };
                active.insert(&txn).await.map_err(db_err)?;
                id
            }
        };

        let event_active = events::ActiveModel {
            id: Set(event_id.clone()),
            issue_id: Set(issue_id.clone()),
            timestamp: Set(timestamp.clone()),
            received_at: Set(now.clone()),
            level: Set(derived.level.as_str().to_string()),
            platform: Set(raw_event.get("platform").and_then(Value::as_str).map(str::to_string)),
            environment: Set(raw_event.get("environment").and_then(Value::as_str).map(str::to_string)),
            release: Set(raw_event.get("release").and_then(Value::as_str).map(str::to_string)),
            transaction_name: Set(raw_event.get("transaction").and_then(Value::as_str).map(str::to_string)),
            user_id: Set(user_field(&raw_event, "id")),
            user_email: Set(user_field(&raw_event, "email")),
            user_ip: Set(user_field(&raw_event, "ip_address")),
            tags: Set(extract_tags(&raw_event)),
            data: Set(raw_event.clone()),
        };
        event_active.insert(&txn).await.map_err(db_err)?;

        let bucket_start = floor_hour(&timestamp);
        upsert_bucket(&txn, &issue_id, &bucket_start).await?;

        if let Some(identifier) = user_identifier(&raw_event) {
            record_user(&txn, &issue_id, &identifier, &now).await?;
        }

        txn.commit().await.map_err(db_err)?;

        Ok(IngestOutcome { event_id, issue_id })
    }

    pub async fn get_issues(&self, filter: IssueFilter) -> Result<IssuesPage, CoreError> {
        let limit = filter.limit.unwrap_or(DEFAULT_ISSUES_LIMIT).min(MAX_ISSUES_LIMIT);
        let sort = IssueSort::parse(filter.sort.as_deref());

        let mut query = issues::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(issues::Column::Status.eq(status.as_str()));
        }
        if let Some(level) = filter.level {
            query = query.filter(issues::Column::Level.eq(level.as_str()));
        }
        if let Some(environment) = &filter.environment {
            let matching_ids: Vec<String> = events::Entity::find()
                .filter(events::Column::Environment.eq(environment.clone()))
                .select_only()
                .column(events::Column::IssueId)
                .distinct()
                .into_tuple()
                .all(self.db.as_ref())
                .await
                .map_err(db_err)?;
            query = query.filter(issues::Column::Id.is_in(matching_ids));
        }
        if let Some(needle) = &filter.query {
            let pattern = format!("%{}%", needle.to_lowercase());
            query = query.filter(
                Condition::any()
                    .add(issues::Column::Title.like(&pattern))
                    .add(issues::Column::Culprit.like(&pattern)),
            );
        }
        if let Some(cursor) = &filter.cursor {
            query = query.filter(sort.column().lt(cursor.clone()));
        }

        let mut rows = query
            .order_by(sort.column(), Order::Desc)
            .limit(limit + 1)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;

        let has_more = rows.len() as u64 > limit;
        if has_more {
            rows.truncate(limit as usize);
        }
        let next_cursor = if has_more {
            rows.last().map(|issue| sort.value(issue))
        } else {
            None
        };

        Ok(IssuesPage {
            issues: rows.into_iter().map(issue_view).collect(),
            next_cursor,
            has_more,
        })
    }

    pub async fn get_issue(&self, issue_id: &str) -> Result<IssueDetail, CoreError> {
        let issue = issues::Entity::find_by_id(issue_id.to_string())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or(CoreError::IssueNotFound)?;

        let buckets = issue_stats::Entity::find()
            .filter(issue_stats::Column::IssueId.eq(issue_id.to_string()))
            .order_by(issue_stats::Column::BucketStart, Order::Desc)
            .limit(ISSUE_DETAIL_BUCKET_HOURS as u64)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(IssueDetail {
            issue: issue_view(issue),
            hourly_buckets: buckets
                .into_iter()
                .map(|b| HourlyBucketView {
                    bucket_start: b.bucket_start,
                    count: b.count,
                })
                .collect(),
        })
    }

    pub async fn update_issue(&self, issue_id: &str, update: IssueUpdate) -> Result<IssueView, CoreError> {
        let _guard = self.write_lock.lock().await;

        let Some(status) = update.status else {
            return Err(CoreError::NoUpdates);
        };

        let existing = issues::Entity::find_by_id(issue_id.to_string())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or(CoreError::IssueNotFound)?;

        let mut active: issues::ActiveModel = existing.into();
        active.status = Set(status.as_str().to_string());
        let updated = active.update(self.db.as_ref()).await.map_err(db_err)?;

        Ok(issue_view(updated))
    }

    pub async fn delete_issue(&self, issue_id: &str) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().await;

        let exists = issues::Entity::find_by_id(issue_id.to_string())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .is_some();
        if !exists {
            return Err(CoreError::IssueNotFound);
        }

        let txn = self.db.begin().await.map_err(db_err)?;
        issue_users::Entity::delete_many()
            .filter(issue_users::Column::IssueId.eq(issue_id.to_string()))
            .exec(&txn)
            .await
            .map_err(db_err)?;
        issue_stats::Entity::delete_many()
            .filter(issue_stats::Column::IssueId.eq(issue_id.to_string()))
            .exec(&txn)
            .await
            .map_err(db_err)?;
        events::Entity::delete_many()
            .filter(events::Column::IssueId.eq(issue_id.to_string()))
            .exec(&txn)
            .await
            .map_err(db_err)?;
        issues::Entity::delete_by_id(issue_id.to_string())
            .exec(&txn)
            .await
            .map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;

        Ok(())
    }

    pub async fn get_issue_events(
        &self,
        issue_id: &str,
        cursor: Option<String>,
        limit: Option<u64>,
    ) -> Result<EventsPage, CoreError> {
        let limit = limit.unwrap_or(DEFAULT_ISSUES_LIMIT).min(MAX_ISSUES_LIMIT);

        let mut query = events::Entity::find().filter(events::Column::IssueId.eq(issue_id.to_string()));
        if let Some(cursor) = cursor {
            query = query.filter(events::Column::Timestamp.lt(cursor));
        }

        let mut rows = query
            .order_by(events::Column::Timestamp, Order::Desc)
            .limit(limit + 1)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;

        let has_more = rows.len() as u64 > limit;
        if has_more {
            rows.truncate(limit as usize);
        }
        let next_cursor = if has_more {
            rows.last().map(|e| e.timestamp.clone())
        } else {
            None
        };

        Ok(EventsPage {
            events: rows.into_iter().map(event_view).collect(),
            next_cursor,
            has_more,
        })
    }

    pub async fn get_event(&self, event_id: &str) -> Result<EventView, CoreError> {
        let event = events::Entity::find_by_id(event_id.to_string())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or(CoreError::EventNotFound)?;
        Ok(event_view(event))
    }

    pub async fn get_latest_events(&self, limit: Option<u64>) -> Result<Vec<EventView>, CoreError> {
        let limit = limit.unwrap_or(DEFAULT_ISSUES_LIMIT).min(MAX_ISSUES_LIMIT);
        let rows = events::Entity::find()
            .order_by(events::Column::Timestamp, Order::Desc)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(event_view).collect())
    }

    pub async fn get_stats(
        &self,
        interval: Option<String>,
        start: Option<String>,
        end: Option<String>,
    ) -> Result<StatsResult, CoreError> {
        let now = Utc::now();
        let (default_start, default_end) = match interval.as_deref() {
            Some("1w") => (now - chrono::Duration::days(7), now),
            _ => (now - chrono::Duration::days(1), now),
        };

        let start = start.unwrap_or_else(|| format_time(default_start));
        let end = end.unwrap_or_else(|| format_time(default_end));

        let rows = issue_stats::Entity::find()
            .filter(issue_stats::Column::BucketStart.gte(start))
            .filter(issue_stats::Column::BucketStart.lt(end))
            .order_by(issue_stats::Column::BucketStart, Order::Asc)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;

        let mut merged: std::collections::BTreeMap<String, i64> = std::collections::BTreeMap::new();
        for row in &rows {
            *merged.entry(row.bucket_start.clone()).or_insert(0) += row.count;
        }

        let total: i64 = merged.values().sum();
        let series = merged
            .into_iter()
            .map(|(bucket, count)| StatsPoint { bucket, count })
            .collect();

        Ok(StatsResult { total, series })
    }
}

/// The keyset sort column for `get_issues` (§4.3 "optional `sort` (default
/// `last_seen`)"). Both variants are ISO-8601 text columns, so lexicographic
/// ordering equals chronological ordering for either one. An unrecognized
/// value falls back to the default rather than erroring.
#[derive(Clone, Copy)]
enum IssueSort {
    LastSeen,
    FirstSeen,
}

impl IssueSort {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("first_seen") => IssueSort::FirstSeen,
            _ => IssueSort::LastSeen,
        }
    }

    fn column(self) -> issues::Column {
        match self {
            IssueSort::LastSeen => issues::Column::LastSeen,
            IssueSort::FirstSeen => issues::Column::FirstSeen,
        }
    }

    fn value(self, issue: &issues::Model) -> String {
        match self {
            IssueSort::LastSeen => issue.last_seen.clone(),
            IssueSort::FirstSeen => issue.first_seen.clone(),
        }
    }
}

fn issue_view(model: issues::Model) -> IssueView {
    IssueView {
        id: model.id,
        fingerprint: model.fingerprint,
        title: model.title,
        culprit: model.culprit,
        level: model.level,
        platform: model.platform,
        first_seen: model.first_seen,
        last_seen: model.last_seen,
        count: model.count,
        user_count: model.user_count,
        status: model.status,
        metadata: model.metadata,
    }
}

fn event_view(model: events::Model) -> EventView {
    EventView {
        id: model.id,
        issue_id: model.issue_id,
        timestamp: model.timestamp,
        received_at: model.received_at,
        level: model.level,
        platform: model.platform,
        environment: model.environment,
        release: model.release,
        transaction_name: model.transaction_name,
        user_id: model.user_id,
        user_email: model.user_email,
        user_ip: model.user_ip,
        tags: model.tags,
        data: model.data,
    }
}

async fn upsert_bucket(
    txn: &sea_orm::DatabaseTransaction,
    issue_id: &str,
    bucket_start: &str,
) -> Result<(), CoreError> {
    let existing = issue_stats::Entity::find()
        .filter(issue_stats::Column::IssueId.eq(issue_id.to_string()))
        .filter(issue_stats::Column::BucketStart.eq(bucket_start.to_string()))
        .one(txn)
        .await
        .map_err(db_err)?;

    match existing {
        Some(bucket) => {
            let mut active: issue_stats::ActiveModel = bucket.clone().into();
            active.count = Set(bucket.count + 1);
            active.update(txn).await.map_err(db_err)?;
        }
        None => {
            let active = issue_stats::ActiveModel {
                issue_id: Set(issue_id.to_string()),
                bucket_start: Set(bucket_start.to_string()),
                count: Set(1),
            };
            active.insert(txn).await.map_err(db_err)?;
        }
    }
    Ok(())
}

async fn record_user(
    txn: &sea_orm::DatabaseTransaction,
    issue_id: &str,
    identifier: &str,
    now: &str,
) -> Result<(), CoreError> {
    let hash = user_hash(identifier);

    let existing = issue_users::Entity::find()
        .filter(issue_users::Column::IssueId.eq(issue_id.to_string()))
        .filter(issue_users::Column::UserHash.eq(hash.clone()))
        .one(txn)
        .await
        .map_err(db_err)?;

    match existing {
        Some(row) => {
            let mut active: issue_users::ActiveModel = row.into();
            active.last_seen = Set(now.to_string());
            active.update(txn).await.map_err(db_err)?;
        }
        None => {
            let active = issue_users::ActiveModel {
                issue_id: Set(issue_id.to_string()),
                user_hash: Set(hash),
                first_seen: Set(now.to_string()),
                last_seen: Set(now.to_string()),
            };
            active.insert(txn).await.map_err(db_err)?;

            let issue = issues::Entity::find_by_id(issue_id.to_string())
                .one(txn)
                .await
                .map_err(db_err)?
                .ok_or(CoreError::IssueNotFound)?;
            let mut active: issues::ActiveModel = issue.clone().into();
            active.user_count = Set(issue.user_count + 1);
            active.update(txn).await.map_err(db_err)?;
        }
    }
    Ok(())
}

fn user_identifier(event: &Value) -> Option<String> {
    let user = event.get("user")?;
    for field in ["id", "email", "ip_address", "username"] {
        if let Some(value) = user.get(field).and_then(Value::as_str) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn user_field(event: &Value, field: &str) -> Option<String> {
    event
        .get("user")
        .and_then(|u| u.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn user_hash(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    hex::encode(digest)[..USER_HASH_HEX_LEN].to_string()
}

fn extract_tags(event: &Value) -> Option<Value> {
    match event.get("tags") {
        Some(Value::Object(map)) => Some(Value::Object(map.clone())),
        Some(Value::Array(pairs)) => {
            let mut map = serde_json::Map::new();
            for pair in pairs {
                if let Some(arr) = pair.as_array() {
                    if let (Some(key), Some(value)) = (arr.first().and_then(Value::as_str), arr.get(1)) {
                        map.insert(key.to_string(), value.clone());
                    }
                }
            }
            if map.is_empty() {
                None
            } else {
                Some(Value::Object(map))
            }
        }
        _ => None,
    }
}

fn timestamp_as_string(value: &Value) -> Option<String> {
    if let Some(s) = value.as_str() {
        return Some(s.to_string());
    }
    // Some SDKs send a numeric unix timestamp.
    value.as_f64().map(|secs| {
        let dt = DateTime::from_timestamp(secs as i64, 0).unwrap_or_else(Utc::now);
        format_time(dt)
    })
}

fn floor_hour(timestamp: &str) -> String {
    let parsed = DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let floored = parsed
        .with_minute(0)
        .and_then(|dt| dt.with_second(0))
        .and_then(|dt| dt.with_nanosecond(0))
        .unwrap_or(parsed);
    format_time(floored)
}

fn format_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn db_err(err: sea_orm::DbErr) -> CoreError {
    CoreError::Internal(err.into())
}
