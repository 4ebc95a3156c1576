pub mod analysis;
pub mod config;
pub mod core;
pub mod error;
pub mod exchange;
pub mod health;
pub mod http;
pub mod models;
pub mod scheduler;
pub mod store;
#[cfg(test)]
pub mod test_helpers;
pub mod trading;
