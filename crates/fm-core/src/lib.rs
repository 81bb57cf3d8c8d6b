pub mod agents;
pub mod deliveries;
pub mod error;
pub mod events;
pub mod foreman;
pub mod normalize;
pub mod review_loops;
pub mod store;
pub mod transitions;
pub mod workflows;

pub mod types;

pub use crate::error::ForemanError;
pub use crate::foreman::{Foreman, ForemanConfig, RequestContext};
pub use crate::store::Store;
