//! `healthtrack` - A self-hosted daily health tracker
//!
//! Users log sleep, water intake, weight and mood once a day. The crate
//! provides the storage, analytics, notifications, exports and backups
//! behind the web application, plus the axum front end itself.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod analytics;
pub mod auth;
pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod food;
pub mod logging;
pub mod mailer;
pub mod notification;
pub mod rate_limit;
pub mod record;
pub mod reminders;
pub mod storage;
pub mod template;
pub mod tracker;
pub mod user;
pub mod web;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use storage::{Storage, StorageStats};
pub use tracker::Tracker;
