mod auth;
mod coordinator;
mod envelope;
mod fingerprint;
mod query;
mod shard;
mod types;

pub use auth::{parse_dsn, resolve_sentry_key, ParsedDsn};
pub use coordinator::{IngestRequest, IngestResponse, IngestionCoordinator};
pub use envelope::{parse_envelope, parse_legacy_event, Envelope, EnvelopeError, EnvelopeItem};
pub use fingerprint::{derive as derive_fingerprint, Derived};
pub use query::QueryFacade;
pub use shard::Shard;
pub use types::{
    EventView, EventsPage, HourlyBucketView, IngestOutcome, IssueDetail, IssueFilter, IssueUpdate,
    IssueView, IssuesPage, StatsPoint, StatsResult,
};
