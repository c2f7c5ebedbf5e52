use async_trait::async_trait;

use crate::error::Result;

/// Binary store for photos and signatures. References are content
/// addressed (`cas:sha256:<hex>`), so writing the same bytes twice yields
/// the same reference and binaries are never overwritten.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Stores `bytes` and returns their reference.
    async fn put(&self, bytes: &[u8], content_type: &str) -> Result<String>;

    async fn get(&self, storage_ref: &str) -> Result<Vec<u8>>;
}
