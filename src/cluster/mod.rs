use crate::client::{Database, StorageSender};
use crate::network::NetworkGuard;
use crate::node::{StorageNode, StorageRequest, StorageResponse};
use crate::request::channel::new_channel_connect;
use crate::request::Sender;
use crate::storage::{EngineConfig, InMemEngine};
use crate::util::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

mod file;
pub use file::ConnectionString;

/// The only database name a cluster serves.
pub const DATABASE_NAME: &str = "DB";

/// A connection to the cluster named by a connection string.
pub struct Cluster {
    connection: ConnectionString,
    sender: StorageSender,
}

impl Cluster {
    /// Connects to the cluster described by the cluster file at `path`.
    pub async fn open(network: &NetworkGuard, path: impl AsRef<Path>) -> Result<Cluster> {
        let connection = ConnectionString::load(path).await?;
        Self::connect_with(network, connection, EngineConfig::default()).await
    }

    pub async fn connect(network: &NetworkGuard, connection: &str) -> Result<Cluster> {
        Self::connect_with(network, connection.parse()?, EngineConfig::default()).await
    }

    /// Connects, creating the cluster's storage with `config` if this network
    /// has not served it yet. Storage that already exists keeps the config it
    /// was created with, and `config` is ignored.
    pub async fn connect_with(
        network: &NetworkGuard,
        connection: ConnectionString,
        config: EngineConfig,
    ) -> Result<Cluster> {
        let mut created = false;
        let engine = network.engine(&connection.to_string(), || {
            created = true;
            InMemEngine::new(config.clone())
        })?;
        if !created {
            debug!(
                cluster = %connection,
                ignored = ?config,
                "cluster storage exists, keeping its config"
            );
        }
        let node = Arc::new(StorageNode::new(engine));
        let sender = new_channel_connect(network.handle(), node, network.queue_depth());
        // The cluster is usable once it answers.
        let version = match sender.send(StorageRequest::GetReadVersion).await? {
            StorageResponse::ReadVersion(v) => v,
            other => return Err(Error::internal(format!("unexpected response {:?}", other))),
        };
        info!(cluster = %connection, version, "connected to cluster");
        Ok(Cluster { connection, sender })
    }

    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection
    }

    pub fn create_database(&self, name: &str) -> Result<Database> {
        if name != DATABASE_NAME {
            return Err(Error::InvalidDatabaseName(name.to_owned()));
        }
        Ok(Database::new(self.sender.clone()))
    }
}
