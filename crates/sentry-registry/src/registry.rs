use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use sentry_core::{generate_public_key, now_iso8601};
use sentry_entities::registry::{project_members, projects};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::slug::slugify;
use crate::types::Project;

const OWNER_ROLE: &str = "owner";
const SLUG_RETRY_LIMIT: u32 = 5;

/// Concrete implementation of the Registry interface (§6.4). The identity service
/// that authenticates `user_id` values is out of scope; this type only consumes
/// the `user_id` the transport layer hands it and answers access-control queries
/// against the `project_members` table.
pub struct ProjectRegistry {
    db: DatabaseConnection,
}

impl ProjectRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_project_by_key(&self, public_key: &str) -> Result<Project, RegistryError> {
        projects::Entity::find()
            .filter(projects::Column::PublicKey.eq(public_key))
            .one(&self.db)
            .await?
            .map(Project::from)
            .ok_or(RegistryError::NotFound)
    }

    pub async fn get_project_by_slug(
        &self,
        slug: &str,
        user_id: &str,
    ) -> Result<Project, RegistryError> {
        let project = projects::Entity::find()
            .filter(projects::Column::Slug.eq(slug))
            .one(&self.db)
            .await?
            .ok_or(RegistryError::NotFound)?;

        let is_member = project_members::Entity::find()
            .filter(project_members::Column::ProjectId.eq(&project.id))
            .filter(project_members::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .is_some();

        // A caller without access sees "not found", never "forbidden" — §4.5
        // deliberately avoids leaking project existence.
        if !is_member {
            return Err(RegistryError::NotFound);
        }

        Ok(project.into())
    }

    pub async fn create_project(
        &self,
        name: &str,
        platform: &str,
        user_id: &str,
    ) -> Result<Project, RegistryError> {
        let base_slug = slugify(name);
        let txn = self.db.begin().await?;

        let mut slug = base_slug.clone();
        let mut attempt = 0;
        let project_id = Uuid::new_v4().to_string();
        let public_key = generate_public_key();
        let created_at = now_iso8601();

        loop {
            let active = projects::ActiveModel {
                id: Set(project_id.clone()),
                public_key: Set(public_key.clone()),
                name: Set(name.to_string()),
                slug: Set(slug.clone()),
                platform: Set(platform.to_string()),
                owner_user_id: Set(user_id.to_string()),
                created_at: Set(created_at.clone()),
            };

            match active.insert(&txn).await {
                Ok(model) => {
                    let membership = project_members::ActiveModel {
                        project_id: Set(model.id.clone()),
                        user_id: Set(user_id.to_string()),
                        role: Set(OWNER_ROLE.to_string()),
                    };
                    membership.insert(&txn).await?;
                    txn.commit().await?;
                    return Ok(model.into());
                }
                Err(_err) if attempt < SLUG_RETRY_LIMIT => {
                    attempt += 1;
                    slug = format!("{base_slug}-{}", &Uuid::new_v4().simple().to_string()[..6]);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn delete_project(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<(), RegistryError> {
        let membership = project_members::Entity::find()
            .filter(project_members::Column::ProjectId.eq(project_id))
            .filter(project_members::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or(RegistryError::Forbidden)?;

        if membership.role != OWNER_ROLE {
            return Err(RegistryError::Forbidden);
        }

        let txn = self.db.begin().await?;
        project_members::Entity::delete_many()
            .filter(project_members::Column::ProjectId.eq(project_id))
            .exec(&txn)
            .await?;
        projects::Entity::delete_by_id(project_id.to_string())
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentry_database::{create_registry_schema, open_sqlite};

    async fn test_registry() -> ProjectRegistry {
        let db = open_sqlite("sqlite::memory:").await.unwrap();
        create_registry_schema(&db).await.unwrap();
        ProjectRegistry::new(db)
    }

    #[tokio::test]
    async fn create_then_lookup_by_key_and_slug() {
        let registry = test_registry().await;
        let project = registry
            .create_project("My App", "javascript", "user-1")
            .await
            .unwrap();

        assert_eq!(project.slug, "my-app");
        let by_key = registry.get_project_by_key(&project.public_key).await.unwrap();
        assert_eq!(by_key.id, project.id);

        let by_slug = registry
            .get_project_by_slug(&project.slug, "user-1")
            .await
            .unwrap();
        assert_eq!(by_slug.id, project.id);
    }

    #[tokio::test]
    async fn slug_lookup_hides_existence_from_non_members() {
        let registry = test_registry().await;
        let project = registry
            .create_project("Private App", "python", "owner")
            .await
            .unwrap();

        let result = registry.get_project_by_slug(&project.slug, "stranger").await;
        assert!(matches!(result, Err(RegistryError::NotFound)));
    }

    #[tokio::test]
    async fn duplicate_names_get_distinct_slugs() {
        let registry = test_registry().await;
        let a = registry.create_project("Dup", "node", "u1").await.unwrap();
        let b = registry.create_project("Dup", "node", "u1").await.unwrap();
        assert_ne!(a.slug, b.slug);
    }

    #[tokio::test]
    async fn delete_requires_owner_role() {
        let registry = test_registry().await;
        let project = registry.create_project("App", "node", "owner").await.unwrap();
        let forbidden = registry.delete_project(&project.id, "stranger").await;
        assert!(matches!(forbidden, Err(RegistryError::Forbidden)));

        registry.delete_project(&project.id, "owner").await.unwrap();
        let after = registry.get_project_by_key(&project.public_key).await;
        assert!(matches!(after, Err(RegistryError::NotFound)));
    }
}
