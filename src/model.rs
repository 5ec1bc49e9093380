pub mod audit_log;
pub mod department;
pub mod error_log;
pub mod process;
pub mod project;
pub mod role;
pub mod task;
pub mod template;
pub mod time_entry;
pub mod user;
