//! RPC pool error types, in the same hand-written-enum idiom as
//! [`crate::element::error::RegistryError`].

#[derive(Debug, Clone)]
pub enum RpcError {
    /// The pool isn't accepting new queries (not started, or stopping).
    NotRunning,
    /// Queueing this query would exceed `max_concurrent_queries`.
    QueueFull,
    /// A result arrived for a `result_handler_id` nothing registered for.
    NoSuchResultHandler(u64),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::NotRunning => write!(f, "rpc pool is not running"),
            RpcError::QueueFull => write!(f, "rpc pool queue is at max_concurrent_queries"),
            RpcError::NoSuchResultHandler(id) => write!(f, "no result handler registered for id {id}"),
        }
    }
}

impl std::error::Error for RpcError {}

pub type Result<T> = std::result::Result<T, RpcError>;
