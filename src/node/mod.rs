use crate::codec::Value;
use crate::request::{Request, Response};
use crate::storage::{CommitRequest, Engine, RangeRequest, RangeScan, Version};
use crate::util::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Node {
    type Req: Request;
    type Res: Response;

    async fn process(&self, req: Self::Req) -> Result<Self::Res>;
}

/// Requests understood by a storage node.
#[derive(Debug)]
pub enum StorageRequest {
    GetReadVersion,
    Get { key: Vec<u8>, version: Version },
    GetRange(Box<RangeRequest>),
    Commit(CommitRequest),
}

#[derive(Debug)]
pub enum StorageResponse {
    ReadVersion(Version),
    Value(Option<Value>),
    Range(RangeScan),
    Committed(Version),
}

/// Serves one storage engine on the network.
pub struct StorageNode<E: Engine> {
    engine: Arc<E>,
}

impl<E: Engine> StorageNode<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<E> Node for StorageNode<E>
where
    E: Engine + 'static,
{
    type Req = StorageRequest;
    type Res = StorageResponse;

    async fn process(&self, req: Self::Req) -> Result<Self::Res> {
        let engine = self.engine.clone();
        Ok(match req {
            StorageRequest::GetReadVersion => StorageResponse::ReadVersion(engine.read_version()?),
            StorageRequest::Get { key, version } => {
                StorageResponse::Value(engine.get(&key, version)?)
            }
            StorageRequest::GetRange(range) => StorageResponse::Range(engine.get_range(&range)?),
            StorageRequest::Commit(commit) => StorageResponse::Committed(engine.commit(commit)?),
        })
    }
}
