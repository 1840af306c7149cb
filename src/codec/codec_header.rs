use serde::{Deserialize, Serialize};

/// Envelope written in front of every request and reply body.
///
/// A reply echoes the `seq` of the request it answers, which is how the
/// client matches replies to outstanding calls regardless of arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Target of the call, formatted as `"Service.Method"`.
    pub service_method: String,

    /// Per-connection call identifier. `0` is reserved and never issued by a
    /// live client; numbering starts at `1`.
    pub seq: u64,

    /// Error text reported by the server. Empty means success.
    pub error: String,
}

impl Header {
    /// Builds a request header. Each call gets its own fresh value.
    pub fn request(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}
