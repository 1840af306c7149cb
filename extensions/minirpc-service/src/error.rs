use thiserror::Error;

/// Errors raised while registering, resolving or invoking service methods.
///
/// Resolution and invocation errors travel back to the caller as the reply
/// header's error text, so their `Display` output is part of the wire
/// contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The requested name had no `.` separating service and method.
    #[error("rpc server: service/method request ill-formed: {0}")]
    IllFormed(String),

    #[error("rpc server: can't find service {0}")]
    ServiceNotFound(String),

    #[error("rpc server: can't find method {0}")]
    MethodNotFound(String),

    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),

    /// Service names must start with an uppercase ASCII letter.
    #[error("rpc server: {0} is not a valid service name")]
    InvalidServiceName(String),

    /// An invocation ran before its argument body was decoded.
    #[error("rpc server: argument for {0} was never decoded")]
    MissingArgument(String),

    /// The method itself returned an error. Displays the method's message verbatim.
    #[error("{0}")]
    Method(String),
}
