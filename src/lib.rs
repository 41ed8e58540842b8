pub mod capture;
pub mod config;
pub mod data;
pub mod diff;
pub mod engine;
pub mod error;
pub mod normalizer;
pub mod notify;
pub mod store;
pub mod utils;
