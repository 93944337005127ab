use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One SDK-reported occurrence. `data` retains the normalized payload verbatim so
/// future normalization rules can re-derive state from history.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub issue_id: String,

    /// SDK-supplied, ISO-8601.
    pub timestamp: String,
    /// Server-supplied, ISO-8601, monotonically reflects arrival order.
    pub received_at: String,

    pub level: String,
    pub platform: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub transaction_name: Option<String>,

    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub user_ip: Option<String>,

    pub tags: Option<Json>,
    pub data: Json,
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
