pub mod registry;
pub mod shard;

pub mod prelude {
    pub use crate::registry::project_members::Entity as ProjectMembers;
    pub use crate::registry::projects::Entity as Projects;
    pub use crate::shard::events::Entity as Events;
    pub use crate::shard::issue_stats::Entity as IssueStats;
    pub use crate::shard::issue_users::Entity as IssueUsers;
    pub use crate::shard::issues::Entity as Issues;
}
