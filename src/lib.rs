//! Single- and limited-use private URLs
//!
//! A private URL maps an `(action, token)` pair to an optional payload,
//! with an optional expiration time and hit limit. Resolving it notifies
//! registered subscribers and counts the hit.

pub mod availability;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod middleware;
pub mod model;
pub mod route;
pub mod token;

pub use error::{Error, Result};
