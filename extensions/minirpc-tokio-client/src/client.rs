use crate::RpcError;
use crate::call::{Call, PendingCall, TypedPending};
use minirpc::constants::DEFAULT_DONE_CAPACITY;
use minirpc::handshake::{parse_options, write_options};
use minirpc::{Body, CodecReader, CodecWriter, Header, Options, new_codec};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

/// Outstanding calls plus the client's lifecycle flags.
struct CallTable {
    /// Next sequence number. Starts at 1; 0 is never issued.
    seq: u64,
    pending: HashMap<u64, Box<dyn PendingCall>>,
    /// Set by [`Client::close`].
    closing: bool,
    /// Set once the receive loop has terminated every pending call.
    shutdown: bool,
}

struct ClientInner {
    /// Orders writes on the wire. Always taken before `table`.
    sending: tokio::sync::Mutex<Box<dyn CodecWriter>>,
    table: Mutex<CallTable>,
    /// Flipped to `true` when the client is closed, dropped or its connection
    /// fails. Stops the receive loop and aborts a write stuck on the peer.
    stop: watch::Sender<bool>,
}

impl ClientInner {
    fn lock_table(&self) -> MutexGuard<'_, CallTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assigns the next sequence number and inserts the call.
    ///
    /// Hands the call back if the client is closing or shut down.
    fn register_call(
        &self,
        mut call: Box<dyn PendingCall>,
    ) -> Result<u64, Box<dyn PendingCall>> {
        let mut table = self.lock_table();
        if table.closing || table.shutdown {
            return Err(call);
        }

        let seq = table.seq;
        call.assign_seq(seq);
        table.pending.insert(seq, call);
        table.seq += 1;
        Ok(seq)
    }

    fn remove_call(&self, seq: u64) -> Option<Box<dyn PendingCall>> {
        self.lock_table().pending.remove(&seq)
    }

    /// Registers `call` and writes its request.
    ///
    /// Runs in its own task so the frame is either written whole or the
    /// writer is closed, whatever happens to the caller's future.
    async fn send_call(
        self: Arc<Self>,
        service_method: String,
        args: Arc<dyn Body>,
        call: Box<dyn PendingCall>,
    ) {
        let mut stop = self.stop.subscribe();
        let mut writer = self.sending.lock().await;

        let seq = match self.register_call(call) {
            Ok(seq) => seq,
            Err(call) => {
                drop(writer);
                call.complete(Some(RpcError::Shutdown)).await;
                return;
            }
        };

        let header = Header::request(&service_method, seq);
        let written = tokio::select! {
            result = writer.write(&header, &*args) => Some(result),
            _ = stop.wait_for(|stopped| *stopped) => None,
        };

        let err = match written {
            Some(Ok(())) => return,
            Some(Err(e)) => RpcError::from(e),
            None => {
                // The frame may be half written; nothing more can follow it.
                let _ = writer.close().await;
                RpcError::Shutdown
            }
        };
        drop(writer);

        // A reply or a termination may already have claimed the call.
        if let Some(call) = self.remove_call(seq) {
            call.complete(Some(err)).await;
        }
    }

    /// Marks the client shut down, closes the writer and completes every
    /// pending call with `err`.
    ///
    /// The table is emptied under the send lock so no write is mid-flight
    /// for a call being terminated; completions are delivered after both
    /// locks are released.
    async fn terminate_calls(&self, err: RpcError) {
        self.stop.send_replace(true);

        let pending = {
            let mut writer = self.sending.lock().await;
            let pending = {
                let mut table = self.lock_table();
                table.shutdown = true;
                std::mem::take(&mut table.pending)
            };
            if let Err(e) = writer.close().await {
                tracing::debug!("rpc client: closing writer: {}", e);
            }
            pending
        };

        if !pending.is_empty() {
            tracing::debug!(
                "rpc client: terminating {} pending calls: {}",
                pending.len(),
                err
            );
        }

        for (_, call) in pending {
            call.complete(Some(err.clone())).await;
        }
    }
}

/// An RPC client bound to one connection.
///
/// Calls may be issued concurrently from any number of tasks; replies are
/// matched to their calls by sequence number, so they can arrive in any
/// order. A background task reads replies for as long as the connection
/// lives.
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Performs the handshake over `stream` and starts the receive loop.
    ///
    /// `opts` may hold at most one [`Options`]; none selects the defaults.
    pub async fn new<S>(stream: S, opts: &[Options]) -> Result<Client, RpcError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let opt = parse_options(opts)?;
        Self::handshake(stream, opt).await
    }

    async fn handshake<S>(stream: S, opt: Options) -> Result<Client, RpcError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);

        write_options(&mut write_half, &opt).await?;

        let (reader, writer) =
            new_codec(opt.codec_type, BufReader::new(read_half), write_half);
        Ok(Self::from_codec(reader, writer))
    }

    /// Wraps an already negotiated codec.
    pub fn from_codec(reader: Box<dyn CodecReader>, writer: Box<dyn CodecWriter>) -> Client {
        let (stop, _) = watch::channel(false);
        let inner = Arc::new(ClientInner {
            sending: tokio::sync::Mutex::new(writer),
            table: Mutex::new(CallTable {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
            stop,
        });

        tokio::spawn(receive(inner.clone(), reader));

        Client { inner }
    }

    /// Sends a call and returns once the request is written; the finished
    /// [`Call`] is delivered on `done`.
    ///
    /// The receive loop waits for room on `done`, so a caller that stops
    /// draining it holds up every other reply on the connection. Dropping
    /// this future does not cancel the request: it is still written whole
    /// and its completion still goes to `done`.
    pub async fn go<A, R>(
        &self,
        service_method: &str,
        args: A,
        done: mpsc::Sender<Call<A, R>>,
    ) where
        A: Serialize + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let args = Arc::new(args);
        let call = Call::new(service_method, args.clone());
        let pending: Box<dyn PendingCall> = Box::new(TypedPending::new(call, done));

        let send = self
            .inner
            .clone()
            .send_call(service_method.to_string(), args, pending);
        if let Err(e) = tokio::spawn(send).await {
            tracing::error!("rpc client: send task for {} failed: {}", service_method, e);
        }
    }

    /// Like [`Client::go`], with a fresh completion channel of
    /// [`DEFAULT_DONE_CAPACITY`] whose receiver is returned.
    pub async fn go_default<A, R>(
        &self,
        service_method: &str,
        args: A,
    ) -> mpsc::Receiver<Call<A, R>>
    where
        A: Serialize + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let (done, receiver) = mpsc::channel(DEFAULT_DONE_CAPACITY);
        self.go(service_method, args, done).await;
        receiver
    }

    /// Invokes `service_method` and waits for its reply.
    ///
    /// `reply` is overwritten only on success and left untouched on error.
    /// The future may be dropped (under a `tokio::time::timeout`, say)
    /// without leaving a partial request on the connection.
    pub async fn call<A, R>(
        &self,
        service_method: &str,
        args: A,
        reply: &mut R,
    ) -> Result<(), RpcError>
    where
        A: Serialize + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let (done, mut receiver) = mpsc::channel(1);
        self.go(service_method, args, done).await;

        let call: Call<A, R> = receiver.recv().await.ok_or(RpcError::Shutdown)?;
        *reply = call.into_result()?;
        Ok(())
    }

    /// Closes the connection.
    ///
    /// Returns without waiting on writes in progress: those are aborted, and
    /// every pending call completes with [`RpcError::Shutdown`]. Closing a
    /// second time returns that same error.
    pub async fn close(&self) -> Result<(), RpcError> {
        {
            let mut table = self.inner.lock_table();
            if table.closing {
                return Err(RpcError::Shutdown);
            }
            table.closing = true;
        }

        self.inner.stop.send_replace(true);
        Ok(())
    }

    /// `true` until the client is closed or its connection fails.
    pub fn is_available(&self) -> bool {
        let table = self.inner.lock_table();
        !table.closing && !table.shutdown
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.inner.stop.send_replace(true);
    }
}

/// Reads replies and completes the matching calls until the connection
/// fails or the client is closed.
async fn receive(inner: Arc<ClientInner>, mut reader: Box<dyn CodecReader>) {
    let mut stop = inner.stop.subscribe();

    let err = loop {
        let header = tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => break RpcError::Shutdown,
            header = reader.read_header() => header,
        };

        let header = match header {
            Ok(header) => header,
            Err(e) => break RpcError::Codec(e),
        };

        match inner.remove_call(header.seq) {
            // Usually a call whose write failed part way.
            None => {
                if let Err(e) = reader.read_body(None).await {
                    break RpcError::Codec(e);
                }
            }
            Some(call) if header.is_error() => {
                let drained = reader.read_body(None).await;
                call.complete(Some(RpcError::Remote(header.error))).await;
                if let Err(e) = drained {
                    break RpcError::Codec(e);
                }
            }
            Some(mut call) => {
                let decoded = reader.read_body(Some(call.reply_slot())).await;
                match decoded {
                    Ok(()) => call.complete(None).await,
                    Err(e) if e.is_fatal() => {
                        call.complete(Some(RpcError::Codec(e.clone()))).await;
                        break RpcError::Codec(e);
                    }
                    Err(e) => call.complete(Some(RpcError::Codec(e))).await,
                }
            }
        }
    };

    match &err {
        RpcError::Shutdown => tracing::debug!("rpc client: receive loop stopped"),
        err => tracing::debug!("rpc client: connection terminated: {}", err),
    }

    inner.terminate_calls(err).await;
}

/// Connects to `address` and performs the handshake.
///
/// `network` is one of `tcp`, `tcp4`, `tcp6` or, on Unix, `unix`. At most
/// one [`Options`] may be given; more is rejected before anything is dialed.
pub async fn dial(network: &str, address: &str, opts: &[Options]) -> Result<Client, RpcError> {
    let opt = parse_options(opts)?;

    match network {
        "tcp" => {
            let stream = TcpStream::connect(address).await?;
            Client::handshake(stream, opt).await
        }
        "tcp4" => {
            let stream = connect_tcp_filtered(address, SocketAddr::is_ipv4).await?;
            Client::handshake(stream, opt).await
        }
        "tcp6" => {
            let stream = connect_tcp_filtered(address, SocketAddr::is_ipv6).await?;
            Client::handshake(stream, opt).await
        }
        #[cfg(unix)]
        "unix" => {
            let stream = tokio::net::UnixStream::connect(address).await?;
            Client::handshake(stream, opt).await
        }
        other => Err(RpcError::UnsupportedNetwork(other.to_string())),
    }
}

/// Connects to the first resolved address of the wanted family.
async fn connect_tcp_filtered(
    address: &str,
    family: fn(&SocketAddr) -> bool,
) -> Result<TcpStream, std::io::Error> {
    let mut last_err = None;

    for addr in tokio::net::lookup_host(address).await?.filter(family) {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("no address of the requested family for {}", address),
        )
    }))
}
