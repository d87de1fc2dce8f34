//! Datescape library
//!
//! Data-access layer for a date-planning app: restaurants, events, lodges and
//! user plans read through a persisted TTL response cache.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
