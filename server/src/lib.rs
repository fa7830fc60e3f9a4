pub mod config;
pub mod connection_manager;
pub mod database;
pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod store;

#[cfg(test)]
mod memory;
