//! Metered API gateway: admission control, API-key authentication and a
//! success-only usage ledger in front of pluggable external integrations.

pub mod config;
pub mod dao;
pub mod gateway;
pub mod logger;
pub mod web;
