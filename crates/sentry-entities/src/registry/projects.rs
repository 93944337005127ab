use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per project owned by the Registry store. `public_key` routes ingestion
/// traffic; `slug` routes dashboard traffic. Both are globally unique.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub public_key: String,

    pub name: String,

    #[sea_orm(unique)]
    pub slug: String,

    pub platform: String,

    pub owner_user_id: String,

    /// ISO-8601, millisecond precision, `Z` suffix.
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::project_members::Entity")]
    ProjectMembers,
}

impl Related<super::project_members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectMembers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
