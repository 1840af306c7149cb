//! Note: This `Server` does not include authentication or transport
//! security. It is meant for trusted, internal network communication.

use minirpc::handshake::read_options;
use minirpc::{Body, CodecError, CodecReader, CodecWriter, HandshakeError, Header, new_codec};
use minirpc_service::{Invocation, MethodType, Service, ServiceError, ServiceRegistry};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;

/// Write half of a connection, shared by every in-flight request on it.
///
/// Holding the lock across one `write` keeps a reply's header and body
/// contiguous on the wire.
type SharedWriter = Arc<Mutex<Box<dyn CodecWriter>>>;

/// One decoded request whose target has been resolved.
struct Request {
    header: Header,
    service: Arc<Service>,
    mtype: Arc<MethodType>,
    invocation: Box<dyn Invocation>,
}

/// Why a request could not be turned into a [`Request`].
enum ReadError {
    /// The stream can no longer be trusted; the connection ends.
    Fatal(CodecError),

    /// Only this request failed; its header is answered with `message`.
    Request(Header, String),
}

/// An RPC server that accepts TCP connections (or any duplex stream) and
/// dispatches framed requests to registered services.
pub struct Server {
    registry: ServiceRegistry,
    shutdown: watch::Sender<bool>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Server {
            registry: ServiceRegistry::new(),
            shutdown,
        }
    }

    /// Publishes a service. See [`ServiceRegistry::register`].
    pub fn register(&self, service: impl Into<Service>) -> Result<(), ServiceError> {
        self.registry.register(service)
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Accepts connections until [`Server::shutdown`] is called.
    ///
    /// Each connection is served on its own task. A failed accept is logged
    /// and the loop keeps going.
    pub async fn accept(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown = self.shutdown.subscribe();

        match listener.local_addr() {
            Ok(address) => tracing::info!("rpc server: listening on {}", address),
            Err(e) => tracing::warn!("rpc server: listener has no local address: {}", e),
        }

        loop {
            let accepted = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    tracing::info!("rpc server: accepted connection from {}", peer);
                    tokio::spawn(self.clone().serve_conn(stream));
                }
                Err(e) => {
                    tracing::error!("rpc server: accept error: {}", e);
                }
            }
        }

        tracing::info!("rpc server: accept loop stopped");
    }

    /// Serves a single connection until the peer hangs up, a fatal read
    /// error occurs or the server shuts down.
    ///
    /// The connection is closed when this returns, including when the
    /// handshake is rejected.
    pub async fn serve_conn<S>(self: Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut buffered = BufReader::new(read_half);

        let opt = match read_options(&mut buffered).await {
            Ok(opt) => opt,
            Err(HandshakeError::Closed) => {
                tracing::debug!("rpc server: connection closed before handshake");
                return;
            }
            Err(e) => {
                tracing::warn!("rpc server: options error: {}", e);
                return;
            }
        };

        tracing::debug!("rpc server: negotiated codec {}", opt.codec_type);

        let (reader, writer) = new_codec(opt.codec_type, buffered, write_half);
        self.serve_codec(reader, writer).await;
    }

    /// Runs the read/dispatch/reply loop over an already negotiated codec.
    ///
    /// Requests are read one after another while their methods run
    /// concurrently, so replies may go out in a different order than the
    /// requests came in. All in-flight requests are finished before the
    /// writer is closed.
    pub async fn serve_codec(
        self: Arc<Self>,
        mut reader: Box<dyn CodecReader>,
        writer: Box<dyn CodecWriter>,
    ) {
        let sending: SharedWriter = Arc::new(Mutex::new(writer));
        let mut in_flight = JoinSet::new();
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let header = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => {
                    tracing::debug!("rpc server: shutdown requested, draining connection");
                    break;
                }
                header = reader.read_header() => header,
            };

            let header = match header {
                Ok(header) => header,
                Err(CodecError::Closed) => break,
                Err(e) => {
                    tracing::error!("rpc server: read header error: {}", e);
                    break;
                }
            };

            match self.read_request(header, reader.as_mut()).await {
                Ok(request) => {
                    in_flight.spawn(handle_request(sending.clone(), request));
                }
                Err(ReadError::Request(mut header, message)) => {
                    tracing::debug!("rpc server: rejecting seq {}: {}", header.seq, message);
                    header.error = message;
                    send_response(&sending, &header, &()).await;
                }
                Err(ReadError::Fatal(e)) => {
                    tracing::error!("rpc server: read body error: {}", e);
                    break;
                }
            }

            // Reap finished requests so the set does not grow with the
            // lifetime of the connection.
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}

        if let Err(e) = sending.lock().await.close().await {
            tracing::debug!("rpc server: close error: {}", e);
        }
    }

    /// Stops the accept loop and every connection loop.
    ///
    /// Connections stop reading new requests, finish the ones already
    /// running and then close.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves the header's target and decodes the request body.
    ///
    /// The body is always consumed, even when the target is unknown, so the
    /// next header is read from a frame boundary.
    async fn read_request(
        &self,
        header: Header,
        reader: &mut dyn CodecReader,
    ) -> Result<Request, ReadError> {
        let (service, mtype) = match self.registry.find_service(&header.service_method) {
            Ok(found) => found,
            Err(e) => {
                reader.read_body(None).await.map_err(ReadError::Fatal)?;
                return Err(ReadError::Request(header, e.to_string()));
            }
        };

        let mut invocation = mtype.new_invocation();
        let decoded = reader.read_body(Some(invocation.argv())).await;
        match decoded {
            Ok(()) => Ok(Request {
                header,
                service,
                mtype,
                invocation,
            }),
            Err(e) if e.is_fatal() => Err(ReadError::Fatal(e)),
            Err(e) => Err(ReadError::Request(
                header,
                format!("rpc server: read argv err: {}", e),
            )),
        }
    }
}

/// Runs one request's method on the blocking pool and writes its reply.
async fn handle_request(sending: SharedWriter, request: Request) {
    let Request {
        mut header,
        service,
        mtype,
        invocation,
    } = request;

    tracing::debug!(
        "rpc server: dispatch {} seq {}",
        header.service_method,
        header.seq
    );

    let outcome = tokio::task::spawn_blocking(move || service.call(&mtype, invocation)).await;

    match outcome {
        Ok(Ok(reply)) => {
            let mut writer = sending.lock().await;
            match writer.write(&header, &*reply).await {
                Ok(()) => {}
                Err(e) if !e.is_fatal() => {
                    header.error = format!("rpc server: encode reply err: {}", e);
                    if let Err(e) = writer.write(&header, &()).await {
                        tracing::error!("rpc server: write response error: {}", e);
                    }
                }
                Err(e) => tracing::error!("rpc server: write response error: {}", e),
            }
        }
        Ok(Err(e)) => {
            header.error = e.to_string();
            send_response(&sending, &header, &()).await;
        }
        Err(e) => {
            tracing::error!(
                "rpc server: {} seq {} did not complete: {}",
                header.service_method,
                header.seq,
                e
            );
            header.error = format!("rpc server: {} panicked", header.service_method);
            send_response(&sending, &header, &()).await;
        }
    }
}

async fn send_response(sending: &SharedWriter, header: &Header, body: &dyn Body) {
    let mut writer = sending.lock().await;
    if let Err(e) = writer.write(header, body).await {
        tracing::error!("rpc server: write response error: {}", e);
    }
}
