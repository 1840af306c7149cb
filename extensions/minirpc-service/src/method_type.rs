use crate::ServiceError;
use minirpc::{Body, BodySlot};
use serde::{Serialize, de::DeserializeOwned};
use std::error::Error;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Boxed error type accepted from registered methods.
pub type MethodError = Box<dyn Error + Send + Sync>;

/// One in-flight call of a registered method.
///
/// Created per request with a fresh, empty argument slot and a fresh reply
/// value. The dispatcher decodes the request body into [`Invocation::argv`]
/// and then hands the invocation to [`Service::call`](crate::Service::call).
pub trait Invocation: Send {
    /// Slot the request body decodes into.
    fn argv(&mut self) -> &mut dyn BodySlot;

    /// Runs the bound method and yields the populated reply.
    fn invoke(self: Box<Self>) -> Result<Box<dyn Body>, ServiceError>;
}

/// Type-erased constructor of invocations for one method.
trait MethodHandler: Send + Sync {
    fn new_invocation(&self) -> Box<dyn Invocation>;
}

/// Descriptor of one invocable method on a service.
///
/// Immutable after registration except for the call counter.
pub struct MethodType {
    name: String,
    arg_type: &'static str,
    reply_type: &'static str,
    num_calls: AtomicU64,
    handler: Box<dyn MethodHandler>,
}

impl MethodType {
    pub(crate) fn new<S, A, R, E, F>(name: &str, receiver: Arc<S>, func: F) -> Self
    where
        S: Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Default + Send + Sync + 'static,
        E: Into<MethodError> + 'static,
        F: Fn(&S, A, &mut R) -> Result<(), E> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            arg_type: std::any::type_name::<A>(),
            reply_type: std::any::type_name::<R>(),
            num_calls: AtomicU64::new(0),
            handler: Box::new(TypedHandler {
                name: name.to_string(),
                receiver,
                func: Arc::new(func),
                _types: PhantomData,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the argument.
    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    /// Rust type name of the reply.
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// How many times this method has been invoked, successful or not.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::SeqCst)
    }

    /// Allocates an empty argument slot and a default reply for one call.
    ///
    /// `Default` gives mapping and sequence replies an empty, non-null
    /// container the method can fill in place.
    pub fn new_invocation(&self) -> Box<dyn Invocation> {
        self.handler.new_invocation()
    }

    pub(crate) fn record_call(&self) {
        self.num_calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodType")
            .field("name", &self.name)
            .field("arg_type", &self.arg_type)
            .field("reply_type", &self.reply_type)
            .field("num_calls", &self.num_calls())
            .finish()
    }
}

struct TypedHandler<S, A, R, F> {
    name: String,
    receiver: Arc<S>,
    func: Arc<F>,
    _types: PhantomData<fn(A) -> R>,
}

impl<S, A, R, E, F> MethodHandler for TypedHandler<S, A, R, F>
where
    S: Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Default + Send + Sync + 'static,
    E: Into<MethodError> + 'static,
    F: Fn(&S, A, &mut R) -> Result<(), E> + Send + Sync + 'static,
{
    fn new_invocation(&self) -> Box<dyn Invocation> {
        Box::new(TypedInvocation {
            name: self.name.clone(),
            receiver: self.receiver.clone(),
            func: self.func.clone(),
            argv: None::<A>,
            replyv: R::default(),
        })
    }
}

struct TypedInvocation<S, A, R, F> {
    name: String,
    receiver: Arc<S>,
    func: Arc<F>,
    argv: Option<A>,
    replyv: R,
}

impl<S, A, R, E, F> Invocation for TypedInvocation<S, A, R, F>
where
    S: Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Default + Send + Sync + 'static,
    E: Into<MethodError> + 'static,
    F: Fn(&S, A, &mut R) -> Result<(), E> + Send + Sync + 'static,
{
    fn argv(&mut self) -> &mut dyn BodySlot {
        &mut self.argv
    }

    fn invoke(self: Box<Self>) -> Result<Box<dyn Body>, ServiceError> {
        let TypedInvocation {
            name,
            receiver,
            func,
            argv,
            mut replyv,
        } = *self;

        let argv = argv.ok_or(ServiceError::MissingArgument(name))?;

        func(&receiver, argv, &mut replyv)
            .map_err(|e| ServiceError::Method(e.into().to_string()))?;

        Ok(Box::new(replyv))
    }
}
