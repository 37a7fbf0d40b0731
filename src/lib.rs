pub mod accounts;
pub mod auth;
pub mod booking;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod limits;
pub mod mailer;
pub mod meeting;
pub mod model;
pub mod notify;
pub mod observability;
pub mod payment;
pub mod reaper;
pub mod seed;
pub mod state;
pub mod store;
pub mod teachers;
pub mod wal;

#[cfg(test)]
mod testing;
