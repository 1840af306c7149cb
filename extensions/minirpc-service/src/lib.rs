mod error;
pub use error::ServiceError;

mod method_type;
pub use method_type::*;

mod service;
pub use service::*;

mod service_registry;
pub use service_registry::*;
