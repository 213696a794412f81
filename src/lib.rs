pub mod api;
pub mod application;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod queue;
pub mod services;
pub mod telemetry;
pub mod utils;
pub mod worker;
