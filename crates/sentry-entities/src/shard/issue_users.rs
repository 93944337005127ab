use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One distinct user-hash seen against an issue. Row count per `issue_id` must
/// equal `issues.user_count`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "issue_users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub issue_id: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub user_hash: String,

    pub first_seen: String,
    pub last_seen: String,
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
