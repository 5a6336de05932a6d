use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod bootstrap;
pub mod entity_store;
pub mod forecast;
pub mod planner;

/// Clock source shared by the store and the forecast service.
pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
