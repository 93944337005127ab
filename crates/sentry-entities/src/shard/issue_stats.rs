use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Hourly event count per issue. `bucket_start` is the event timestamp floored to
/// the hour in UTC, stored as ISO-8601 for the same lexicographic-ordering reason
/// as every other timestamp column in this store.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "issue_stats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub issue_id: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub bucket_start: String,

    pub count: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::issues::Entity",
        from = "Column::IssueId",
        to = "super::issues::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Issues,
}

impl Related<super::issues::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Issues.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
