//! Backend capabilities supplied by the pool's owner

use std::sync::Arc;

use async_trait::async_trait;
use sluice_core::{Connection, Result};

/// Factory trait for creating and validating backend connections
///
/// `create` is the backend-connect capability: it establishes one raw
/// connection using whatever parameters the factory was built with.
/// `validate` is the health-check capability.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Establish a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Check that a connection is still usable
    ///
    /// Default implementation requires the connection to be open and to
    /// answer a ping.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed() && conn.ping().await.is_ok()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}
