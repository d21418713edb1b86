pub mod create;

pub use create::{
    handle as handle_create, CreateConversionCommand, CreateConversionError,
    CreateConversionResponse,
};
