//! VogueVault payments service: Paystack checkout, refunds, saved cards and
//! gateway webhooks over Postgres.

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod workers;
