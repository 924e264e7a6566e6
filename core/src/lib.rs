pub mod codec;
pub mod db;
pub mod error;
pub mod models;
pub mod repo;
pub mod search;
pub mod service;
pub mod sheet_csv;
pub mod shopping;
pub mod store;
