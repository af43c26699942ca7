//! Bookkeeping Service - invoice analytics, currency normalization and
//! receiver merges.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
