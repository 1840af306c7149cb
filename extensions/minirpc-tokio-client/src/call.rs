use crate::RpcError;
use minirpc::BodySlot;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One RPC invocation, handed back through its completion channel once it
/// finishes.
#[derive(Debug)]
pub struct Call<A, R> {
    /// Sequence number the request went out under. `0` if the call was
    /// rejected before a number was assigned.
    pub seq: u64,
    pub service_method: String,
    pub args: Arc<A>,
    /// Decoded reply. Only set when the call succeeded.
    pub reply: Option<R>,
    pub error: Option<RpcError>,
}

impl<A, R> Call<A, R> {
    pub(crate) fn new(service_method: &str, args: Arc<A>) -> Self {
        Self {
            seq: 0,
            service_method: service_method.to_string(),
            args,
            reply: None,
            error: None,
        }
    }

    /// The reply on success, the call's error otherwise.
    pub fn into_result(self) -> Result<R, RpcError> {
        match (self.error, self.reply) {
            (Some(err), _) => Err(err),
            (None, Some(reply)) => Ok(reply),
            (None, None) => Err(RpcError::Remote(format!(
                "rpc client: {} completed without a reply",
                self.service_method
            ))),
        }
    }
}

/// A registered call as seen by the receive loop: somewhere to decode the
/// reply into, and a way to finish it.
#[async_trait::async_trait]
pub(crate) trait PendingCall: Send {
    fn assign_seq(&mut self, seq: u64);

    fn reply_slot(&mut self) -> &mut dyn BodySlot;

    /// Records `error` (if any) and delivers the call, waiting for room on
    /// the completion channel. Consumes the entry so it can only happen once.
    async fn complete(self: Box<Self>, error: Option<RpcError>);
}

pub(crate) struct TypedPending<A, R> {
    call: Call<A, R>,
    done: mpsc::Sender<Call<A, R>>,
}

impl<A, R> TypedPending<A, R> {
    pub(crate) fn new(call: Call<A, R>, done: mpsc::Sender<Call<A, R>>) -> Self {
        Self { call, done }
    }
}

#[async_trait::async_trait]
impl<A, R> PendingCall for TypedPending<A, R>
where
    A: Send + Sync + 'static,
    R: DeserializeOwned + Send + 'static,
{
    fn assign_seq(&mut self, seq: u64) {
        self.call.seq = seq;
    }

    fn reply_slot(&mut self) -> &mut dyn BodySlot {
        &mut self.call.reply
    }

    async fn complete(self: Box<Self>, error: Option<RpcError>) {
        let TypedPending { mut call, done } = *self;
        if error.is_some() {
            call.reply = None;
        }
        call.error = error;

        if let Err(mpsc::error::SendError(call)) = done.send(call).await {
            tracing::debug!(
                "rpc client: nobody waiting on {} seq {}",
                call.service_method,
                call.seq
            );
        }
    }
}
