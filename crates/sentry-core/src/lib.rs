mod error;
mod ids;
mod types;

pub use error::{CoreError, CoreResult, ErrorKind};
pub use ids::{generate_event_id, generate_public_key};
pub use types::{now_iso8601, IssueLevel, IssueStatus, UtcDateTime};
