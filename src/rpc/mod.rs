//! Worker-threaded control-plane query pool (spec §1 item 7, §4.10, §6.5).

pub mod error;
pub mod pool;
pub mod query;
pub mod services;

pub use error::RpcError;
pub use pool::{ResultHandler, RpcPool};
pub use query::{Codec, Query, QueryId, QueryResult};
pub use services::ServicesManager;
