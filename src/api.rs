pub mod audit_logs;
pub mod dashboard;
pub mod departments;
pub mod error_logs;
pub mod health;
pub mod processes;
pub mod projects;
pub mod tasks;
pub mod templates;
pub mod time_tracking;
pub mod users;
