pub mod loader;
pub mod models;
pub mod routes;
pub mod validation;

pub use loader::load_config;
pub use models::*;
pub use validation::{GatewayConfigValidator, ValidationError, ValidationResult};
