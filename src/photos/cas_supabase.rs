use async_trait::async_trait;
use tracing::{debug, warn};

use super::{content_hash, object_path, parse_storage_ref, storage_ref_for};
use crate::app::ports::PhotoStore;
use crate::config::SupabaseConfig;
use crate::error::{AppError, Result};

/// Supabase Storage bucket with the same content-addressed layout as the
/// filesystem store.
pub struct SupabasePhotoStore {
    client: reqwest::Client,
    base_url: String,
    key: String,
    bucket: String,
    prefix: String,
}

impl SupabasePhotoStore {
    pub fn from_config(config: &SupabaseConfig) -> Result<Self> {
        let missing = |name: &str| AppError::Config(format!("Supabase photo store needs {name}"));
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config
                .url
                .clone()
                .ok_or_else(|| missing("SUPABASE_URL or SUPABASE_PROJECT_REF"))?
                .trim_end_matches('/')
                .to_string(),
            key: config
                .service_role_key
                .clone()
                .ok_or_else(|| missing("SUPABASE_SERVICE_ROLE_KEY"))?,
            bucket: config.bucket.clone().ok_or_else(|| missing("SUPABASE_BUCKET"))?,
            prefix: config
                .prefix
                .clone()
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn object_url(&self, hex: &str) -> String {
        let path = if self.prefix.is_empty() {
            object_path(hex)
        } else {
            format!("{}/{}", self.prefix, object_path(hex))
        };
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }
}

#[async_trait]
impl PhotoStore for SupabasePhotoStore {
    async fn put(&self, bytes: &[u8], content_type: &str) -> Result<String> {
        let hex = content_hash(bytes);
        let endpoint = self.object_url(&hex);

        // upsert=true keeps repeated uploads of the same content idempotent
        let resp = self
            .client
            .put(&endpoint)
            .header("Authorization", format!("Bearer {}", self.key))
            .header("apikey", self.key.clone())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .query(&[("upsert", "true")])
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Supabase upload failed: {} - {}", status, body);
            return Err(AppError::PhotoStore(format!(
                "Supabase upload failed: {status}"
            )));
        }
        debug!("Uploaded {} bytes to Supabase as {}", bytes.len(), hex);
        Ok(storage_ref_for(&hex))
    }

    async fn get(&self, storage_ref: &str) -> Result<Vec<u8>> {
        let hex = parse_storage_ref(storage_ref)?;
        let resp = self
            .client
            .get(self.object_url(hex))
            .header("Authorization", format!("Bearer {}", self.key))
            .header("apikey", self.key.clone())
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(resp.bytes().await?.to_vec()),
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::BAD_REQUEST => {
                Err(AppError::not_found("photo binary", storage_ref))
            }
            s => Err(AppError::PhotoStore(format!("Supabase fetch failed: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SupabaseConfig {
        SupabaseConfig {
            url: Some("https://abcd.supabase.co/".to_string()),
            service_role_key: Some("secret".to_string()),
            bucket: Some("inspection-photos".to_string()),
            prefix: Some("prod/".to_string()),
        }
    }

    #[test]
    fn object_urls_use_prefix_and_cas_layout() {
        let store = SupabasePhotoStore::from_config(&config()).unwrap();
        let hex = content_hash(b"x");
        assert_eq!(
            store.object_url(&hex),
            format!(
                "https://abcd.supabase.co/storage/v1/object/inspection-photos/prod/sha256/{}/{}/{}",
                &hex[0..2],
                &hex[2..4],
                hex
            )
        );
    }

    #[test]
    fn missing_bucket_is_a_config_error() {
        let mut cfg = config();
        cfg.bucket = None;
        assert!(matches!(
            SupabasePhotoStore::from_config(&cfg),
            Err(AppError::Config(_))
        ));
    }
}
