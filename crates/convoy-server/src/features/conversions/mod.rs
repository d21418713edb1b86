pub mod commands;
pub mod routes;

pub use commands::{CreateConversionCommand, CreateConversionError, CreateConversionResponse};

pub use routes::conversions_routes;
