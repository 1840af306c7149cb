use crate::Server;
use minirpc_service::{Service, ServiceError};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Process-wide server behind the free-standing [`register`] and [`accept`].
///
/// It is an ordinary [`Server`], built on first use and never reset.
static DEFAULT_SERVER: Lazy<Arc<Server>> = Lazy::new(|| Arc::new(Server::new()));

pub fn default_server() -> Arc<Server> {
    DEFAULT_SERVER.clone()
}

/// Registers `service` on the default server.
pub fn register(service: impl Into<Service>) -> Result<(), ServiceError> {
    DEFAULT_SERVER.register(service)
}

/// Accepts connections on `listener` for the default server.
pub async fn accept(listener: TcpListener) {
    default_server().accept(listener).await
}
