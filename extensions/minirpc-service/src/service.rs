use crate::{Invocation, MethodError, MethodType, ServiceError};
use minirpc::Body;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::sync::Arc;

/// A named receiver together with its invocable methods.
///
/// Built with [`Service::new`] or [`Service::with_name`], which return a
/// [`ServiceBuilder`] for binding methods, and handed to
/// [`ServiceRegistry::register`](crate::ServiceRegistry::register).
///
/// ```ignore
/// let service = Service::new(Arith)
///     .method("Sum", |_: &Arith, args: Args, reply: &mut i64| {
///         *reply = args.num1 + args.num2;
///         Ok::<_, MethodError>(())
///     });
/// ```
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<MethodType>>,
}

impl Service {
    /// Starts a service named after the receiver's type.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<S>(receiver: S) -> ServiceBuilder<S>
    where
        S: Send + Sync + 'static,
    {
        Self::with_name(type_base_name::<S>(), receiver)
    }

    /// Starts a service under an explicit name.
    pub fn with_name<S>(name: impl Into<String>, receiver: S) -> ServiceBuilder<S>
    where
        S: Send + Sync + 'static,
    {
        ServiceBuilder {
            name: name.into(),
            receiver: Arc::new(receiver),
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<Arc<MethodType>> {
        self.methods.get(name).cloned()
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodType>> {
        self.methods.values()
    }

    /// Runs one invocation of `mtype` against this service's receiver.
    ///
    /// The method's call counter is bumped exactly once, before the method
    /// body runs, whether or not it succeeds.
    pub fn call(
        &self,
        mtype: &MethodType,
        invocation: Box<dyn Invocation>,
    ) -> Result<Box<dyn Body>, ServiceError> {
        mtype.record_call();
        invocation.invoke()
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        methods.sort_unstable();

        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &methods)
            .finish()
    }
}

/// Binds methods to a receiver before registration.
pub struct ServiceBuilder<S> {
    name: String,
    receiver: Arc<S>,
    methods: HashMap<String, Arc<MethodType>>,
}

impl<S> ServiceBuilder<S>
where
    S: Send + Sync + 'static,
{
    /// Binds `func` as an invocable method.
    ///
    /// Only exported names (leading uppercase ASCII letter) are kept. The
    /// argument is taken by value and decoded fresh for every call; the reply
    /// starts as `R::default()` and is filled in place.
    pub fn method<A, R, E, F>(mut self, name: &str, func: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Default + Send + Sync + 'static,
        E: Into<MethodError> + 'static,
        F: Fn(&S, A, &mut R) -> Result<(), E> + Send + Sync + 'static,
    {
        if !is_exported(name) {
            tracing::debug!("rpc server: skipping unexported method {}.{}", self.name, name);
            return self;
        }

        let mtype = MethodType::new(name, self.receiver.clone(), func);
        self.methods.insert(name.to_string(), Arc::new(mtype));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(self) -> Service {
        Service {
            name: self.name,
            methods: self.methods,
        }
    }
}

impl<S> From<ServiceBuilder<S>> for Service
where
    S: Send + Sync + 'static,
{
    fn from(builder: ServiceBuilder<S>) -> Self {
        builder.build()
    }
}

/// Whether `name` is visible to remote callers.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Last path segment of `S`'s type name, without generic parameters.
fn type_base_name<S>() -> String {
    let full = std::any::type_name::<S>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_string()
}
