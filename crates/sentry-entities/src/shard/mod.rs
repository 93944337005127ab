pub mod events;
pub mod issue_stats;
pub mod issue_users;
pub mod issues;
