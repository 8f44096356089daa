use async_trait::async_trait;

use crate::{
    domain::{Credentials, Entity, Partition, ResultRecord},
    errors::ClientError,
    proxy::ProxyDescriptor,
    Result,
};

/// Everything needed to open one platform session.
#[derive(Clone, Debug)]
pub struct SessionSpec {
    pub session_path: std::path::PathBuf,
    pub credentials: Credentials,
    pub proxy: Option<ProxyDescriptor>,
}

/// Hexagonal port for the platform's public directory search.
///
/// A session object is connected at most once and must be disconnected on
/// every exit path once connected.
#[async_trait]
pub trait DirectorySession: Send + Sync {
    async fn connect(&mut self) -> std::result::Result<(), ClientError>;

    /// Best-effort; never fails.
    async fn disconnect(&mut self);

    async fn search(&self, query: &str, limit: usize)
        -> std::result::Result<Vec<Entity>, ClientError>;

    /// Best-effort member count; `None` when every strategy failed.
    async fn participant_count(&self, entity: &Entity) -> Option<u64> {
        entity.participants_hint
    }

    fn link(&self, entity: &Entity) -> Option<String> {
        entity.public_link()
    }
}

/// Builds a fresh, unconnected session for one account.
pub trait DirectoryConnector: Send + Sync {
    fn session(&self, spec: SessionSpec) -> Box<dyn DirectorySession>;
}

/// Append-only destination for result records, one stream per partition.
pub trait ResultSink: Send + Sync {
    fn append(&self, partition: Partition, record: &ResultRecord) -> Result<()>;
}
