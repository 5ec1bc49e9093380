pub mod audit;
pub mod db_utils;
pub mod error_reporter;
pub mod otp_replay;
pub mod pagination;
