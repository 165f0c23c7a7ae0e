pub mod actors;
pub mod attribution;
pub mod balance;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod models;
pub mod storage;
pub mod types;
pub mod withdrawal;
