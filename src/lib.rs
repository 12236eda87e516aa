pub mod api;
pub mod config;
pub mod database;
pub mod errors;
pub mod logging;
pub mod models;
pub mod review_service;
pub mod sm2_scheduler;
pub mod stats;

pub use config::Config;
pub use database::{Database, ReviewRepository};
pub use errors::*;
pub use models::*;
pub use review_service::ReviewService;
pub use sm2_scheduler::{Quality, SM2Scheduler, SchedulingError, schedule_next_review};
