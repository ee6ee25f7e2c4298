//! Command handlers

pub mod config;
pub mod health;
pub mod store;
