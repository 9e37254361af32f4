pub mod aggregate;
pub mod alerts;
pub mod analytics;
pub mod config;
pub mod error;
pub mod event;
pub mod grouping;
pub mod spatial;
pub mod window;
