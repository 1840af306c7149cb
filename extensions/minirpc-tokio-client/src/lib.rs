mod call;
pub use call::Call;

mod client;
pub use client::{Client, dial};

mod error;
pub use error::RpcError;

pub use minirpc::{CodecType, Options};
