//! Content-addressed photo stores.

mod cas_fs;
mod cas_supabase;

pub use cas_fs::FsPhotoStore;
pub use cas_supabase::SupabasePhotoStore;

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::app::ports::PhotoStore;
use crate::config::{PhotoConfig, PhotoStoreKind};
use crate::error::{AppError, Result};

const REF_PREFIX: &str = "cas:sha256:";

/// Hex SHA-256 digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn storage_ref_for(hex: &str) -> String {
    format!("{REF_PREFIX}{hex}")
}

/// Extracts and checks the digest of a `cas:sha256:<hex>` reference.
pub fn parse_storage_ref(storage_ref: &str) -> Result<&str> {
    let hex = storage_ref
        .strip_prefix(REF_PREFIX)
        .ok_or_else(|| AppError::PhotoStore(format!("bad storage reference '{storage_ref}'")))?;
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::PhotoStore(format!(
            "bad storage reference '{storage_ref}'"
        )));
    }
    Ok(hex)
}

/// `sha256/ab/cd/abcd...` layout shared by both stores.
pub(crate) fn object_path(hex: &str) -> String {
    format!("sha256/{}/{}/{}", &hex[0..2], &hex[2..4], hex)
}

pub fn photo_store_from_config(config: &PhotoConfig) -> Result<Arc<dyn PhotoStore>> {
    match config.store {
        PhotoStoreKind::Fs => Ok(Arc::new(FsPhotoStore::new(config.root.clone()))),
        PhotoStoreKind::Supabase => Ok(Arc::new(SupabasePhotoStore::from_config(
            &config.supabase,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_round_trip_through_the_digest() {
        let hex = content_hash(b"roof");
        let r = storage_ref_for(&hex);
        assert_eq!(parse_storage_ref(&r).unwrap(), hex);
        assert!(object_path(&hex).starts_with(&format!("sha256/{}/", &hex[0..2])));
    }

    #[test]
    fn malformed_refs_are_rejected() {
        assert!(parse_storage_ref("sha256:abc").is_err());
        assert!(parse_storage_ref("cas:sha256:../../etc/passwd").is_err());
    }
}
