use sentry_entities::registry::projects;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub public_key: String,
    pub name: String,
    pub slug: String,
    pub platform: String,
    pub owner_user_id: String,
    pub created_at: String,
}

impl From<projects::Model> for Project {
    fn from(model: projects::Model) -> Self {
        Self {
            id: model.id,
            public_key: model.public_key,
            name: model.name,
            slug: model.slug,
            platform: model.platform,
            owner_user_id: model.owner_user_id,
            created_at: model.created_at,
        }
    }
}
