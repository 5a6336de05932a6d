pub mod config;
pub mod document_mapper;
pub mod document_store;
pub mod error;
pub mod retry;
pub mod weather_client;
