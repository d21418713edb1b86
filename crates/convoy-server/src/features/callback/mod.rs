pub mod routes;
pub mod sanitize;

pub use routes::callback_routes;
pub use sanitize::MarkupStripper;
