mod default_server;
pub use default_server::*;

mod rpc_server;
pub use rpc_server::Server;

pub mod utils;

pub use minirpc_service::{MethodError, Service, ServiceError, ServiceRegistry};
