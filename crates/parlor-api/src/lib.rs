pub mod auth;
pub mod error;
pub mod middleware;
pub mod pages;
pub mod render;
pub mod session;
