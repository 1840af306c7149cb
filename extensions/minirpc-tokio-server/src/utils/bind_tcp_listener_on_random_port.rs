use std::io::Result;
use tokio::net::TcpListener;

/// Binds a `TcpListener` to an OS-assigned port on `127.0.0.1`.
///
/// Returns the listener together with the port it landed on, ready to hand
/// to [`Server::accept`](crate::Server::accept).
pub async fn bind_tcp_listener_on_random_port() -> Result<(TcpListener, u16)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    Ok((listener, port))
}
