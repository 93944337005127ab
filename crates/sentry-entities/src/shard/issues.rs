use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Grouped aggregate of events sharing a fingerprint, scoped to one project shard.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "issues")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub fingerprint: String,

    pub title: String,
    pub culprit: Option<String>,
    pub level: String,
    pub platform: String,

    /// ISO-8601, millisecond precision, `Z` suffix — lexicographic order == time order.
    pub first_seen: String,
    pub last_seen: String,

    pub count: i64,
    pub user_count: i64,
    pub status: String,

    /// `{type, value, filename?, function?}`, small and rarely queried.
    pub metadata: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::events::Entity")]
    Events,
    #[sea_orm(has_many = "super::issue_stats::Entity")]
    IssueStats,
    #[sea_orm(has_many = "super::issue_users::Entity")]
    IssueUsers,
}

impl Related<super::events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl Related<super::issue_stats::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssueStats.def()
    }
}

impl Related<super::issue_users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssueUsers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
