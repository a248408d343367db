#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod gateway;
pub mod history;
pub mod progress_service;
pub mod tracker;

pub use training_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, GatewayError, ProgressServiceError, TrackerError};
pub use gateway::{
    GatewayResponse, HttpGateway, LocalGateway, ProgressGateway, SetCompletionRequest,
};
pub use history::WeekSummary;
pub use progress_service::ProgressService;
pub use tracker::{Notice, ProgressTracker, Severity, TrackerEvent, TrackerState};
