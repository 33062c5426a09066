// elearn-client - session-layer client for the elearn REST backend

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
