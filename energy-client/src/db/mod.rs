pub mod energy_queries;
pub mod upload_queries;
