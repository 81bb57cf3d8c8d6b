pub mod agent_repo;
pub mod delivery_repo;
pub mod event_repo;
pub mod review_loop_repo;
pub mod schema;
pub mod store;
pub mod util;
pub mod workflow_repo;

pub use schema::{open_and_migrate, with_test_db};
pub use store::DbStore;

#[cfg(test)]
mod repo_tests;
#[cfg(test)]
mod service_tests;
