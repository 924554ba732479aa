pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod delivery;
pub mod domain;
pub mod effects;
pub mod error;
pub mod item_sync;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod numbering;
pub mod reminders;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod workers;

pub use workers::ReminderWorker;
