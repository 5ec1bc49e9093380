pub mod auth;
pub mod handlers;
pub mod jwt;
pub mod mfa;
pub mod middleware;
pub mod password;
