pub mod http_api;
pub mod kv_store;
pub mod logger;
pub mod settings;
