pub mod client;
pub mod cluster;
pub mod codec;
pub mod network;
pub mod node;
pub mod request;
pub mod storage;
pub mod txn;
pub mod util;

pub use client::{Client, Database, DatabaseOptions};
pub use cluster::Cluster;
pub use network::{boot, NetworkBuilder, NetworkGuard};
pub use txn::{RangeOption, RangeResult, RetryOptions, StreamingMode, Transaction};
pub use util::{Error, ErrorClass, Result};
