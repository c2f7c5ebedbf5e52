#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use roof_inspect::config::Config;
use roof_inspect::photos::FsPhotoStore;
use roof_inspect::server::{create_router, AppState};
use roof_inspect::storage::InMemoryStorage;

pub const BOUNDARY: &str = "roof-inspect-test-boundary";

/// A router over fresh in-memory storage and a throwaway photo directory.
pub struct TestApp {
    pub router: Router,
    _photos: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let state = AppState::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(FsPhotoStore::new(dir.path())),
            config,
        );
        Ok(Self {
            router: create_router(state),
            _photos: dir,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await?.to_vec();
        Ok(TestResponse {
            status,
            content_type,
            bytes,
        })
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = user {
            builder = builder.header("x-user-id", id.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, user: Uuid) -> Result<TestResponse> {
        self.call(Method::GET, uri, Some(user), None).await
    }

    pub async fn post(&self, uri: &str, user: Uuid, body: Value) -> Result<TestResponse> {
        self.call(Method::POST, uri, Some(user), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, user: Uuid, body: Value) -> Result<TestResponse> {
        self.call(Method::PATCH, uri, Some(user), Some(body)).await
    }

    /// Bootstraps the first admin, then adds a user with `role` through them.
    pub async fn bootstrap_admin(&self) -> Result<Uuid> {
        let response = self
            .call(
                Method::POST,
                "/api/users",
                None,
                Some(json!({ "email": "admin@example.nz", "name": "Ada Admin" })),
            )
            .await?;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        Ok(id_of(&response.json()))
    }

    pub async fn add_user(&self, admin: Uuid, email: &str, role: &str) -> Result<Uuid> {
        let response = self
            .post(
                "/api/users",
                admin,
                json!({ "email": email, "name": email.split('@').next().unwrap_or(email), "role": role }),
            )
            .await?;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        Ok(id_of(&response.json()))
    }

    pub async fn create_report(&self, user: Uuid, address: &str) -> Result<Value> {
        let response = self
            .post(
                "/api/reports",
                user,
                json!({ "propertyAddress": address, "clientName": "Harbour Trust" }),
            )
            .await?;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        Ok(response.json())
    }

    pub async fn upload_photo(
        &self,
        user: Uuid,
        report_id: Uuid,
        content_type: &str,
        bytes: &[u8],
        fields: &[(&str, String)],
    ) -> Result<TestResponse> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/reports/{}/photos", report_id))
            .header("x-user-id", user.to_string())
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(content_type, bytes, fields)))?;
        self.send(request).await
    }
}

pub fn id_of(value: &Value) -> Uuid {
    value["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("no id in {}", value))
}

pub fn multipart_body(content_type: &str, bytes: &[u8], fields: &[(&str, String)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"roof.jpg\"\r\nContent-Type: {}\r\n\r\n",
            BOUNDARY, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn signature_data_url() -> String {
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend_from_slice(b"ink");
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

pub fn jpeg_bytes() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.extend_from_slice(b"roof photo pixels");
    bytes
}
