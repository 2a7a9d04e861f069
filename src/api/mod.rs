pub mod api_types;
pub mod client;
pub mod gateway;
pub mod tracker;
pub mod types;
