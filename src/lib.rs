//! Library exports for authsync, shared between the binary and tests.

pub mod config;
pub mod models;
pub mod profiles;
pub mod providers;
pub mod routes;
pub mod session;
pub mod startup;
pub mod state;
pub mod storage;
pub mod utils;
