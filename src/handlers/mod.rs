//! HTTP handlers

pub mod health;
pub mod auth;
pub mod users;
pub mod reports;
pub mod alerts;
pub mod map;
pub mod ai;
pub mod audit;
