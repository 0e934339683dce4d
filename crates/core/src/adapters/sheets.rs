pub mod auth;
pub mod cell_values;
pub mod google_backend;
pub mod http_client;
pub mod in_memory_backend;
pub mod value_range_factory;
