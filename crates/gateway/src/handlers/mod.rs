pub mod auth;
pub mod download;
pub mod extract;
pub mod files;
pub mod middleware;
