pub mod allocation;
pub mod attendance;
pub mod clients;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod jobs;
pub mod lifecycle;
pub mod materializer;
pub mod models;
pub mod regime;
pub mod resolver;
pub mod routes;
pub mod schedule;
pub mod schema;
pub mod sessions;
pub mod state;
pub mod store;
pub mod waiting_list;
pub mod workers;

pub use jobs::{JobFlags, JobOrchestrator, JobRun, JobType};
pub use workers::{default_handlers, Scheduler};
