pub mod config_store;
pub mod service;
