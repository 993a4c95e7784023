//! User registration service: axum routes over a Postgres session manager.

pub mod app;
pub mod config;
pub mod db;
pub mod dependencies;
pub mod error;
pub mod extractors;
pub mod orders;
pub mod response;
pub mod state;
pub mod users;
