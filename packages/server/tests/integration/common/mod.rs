use std::net::SocketAddr;

use ::common::config::{ChunkBackend, StorageConfig};
use reqwest::Client;
use reqwest::header::HeaderMap;
use sea_orm::{ColumnTrait, ConnectOptions, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::{Value, json};

use server::config::{AdminConfig, AppConfig, AuthConfig, CorsConfig, DatabaseConfig, ServerConfig};
use server::entity::user;
use server::state::AppState;

pub mod routes {
    pub const SIGNUP: &str = "/api/v1/auth/signup";
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const ME: &str = "/api/v1/auth/me";
    pub const PROFILE: &str = "/api/v1/auth/profile";
    pub const CHANGE_PASSWORD: &str = "/api/v1/auth/change-password";

    pub const RESOURCES: &str = "/api/v1/resources";
    pub const UPLOAD: &str = "/api/v1/resources/upload";
    pub const MY_BOOKMARKS: &str = "/api/v1/resources/user/bookmarks";
    pub const MY_UPLOADS: &str = "/api/v1/resources/user/my-uploads";

    pub fn resource(id: i32) -> String {
        format!("/api/v1/resources/{id}")
    }

    pub fn like(id: i32) -> String {
        format!("/api/v1/resources/{id}/like")
    }

    pub fn bookmark(id: i32) -> String {
        format!("/api/v1/resources/{id}/bookmark")
    }

    pub fn file(file_id: &str) -> String {
        format!("/api/v1/files/{file_id}")
    }

    pub fn file_info(file_id: &str) -> String {
        format!("/api/v1/files/{file_id}/info")
    }

    pub const ADMIN_STATS: &str = "/api/v1/admin/stats";
    pub const ADMIN_RESOURCES: &str = "/api/v1/admin/resources";
    pub const ADMIN_USERS: &str = "/api/v1/admin/users";

    pub fn admin_resource(id: i32) -> String {
        format!("/api/v1/admin/resources/{id}")
    }

    pub fn approve(id: i32) -> String {
        format!("/api/v1/admin/resources/{id}/approve")
    }

    pub fn reject(id: i32) -> String {
        format!("/api/v1/admin/resources/{id}/reject")
    }

    pub fn admin_user(id: i32) -> String {
        format!("/api/v1/admin/users/{id}")
    }

    pub fn toggle_status(id: i32) -> String {
        format!("/api/v1/admin/users/{id}/toggle-status")
    }
}

/// Chunk size used by test servers, small enough that modest files span
/// several chunks.
pub const TEST_CHUNK_SIZE: u32 = 64 * 1024;

/// Upload cap used by test servers.
pub const TEST_MAX_SIZE: u64 = 1024 * 1024;

/// A running test server backed by an in-memory SQLite database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

/// Response whose body is kept as bytes, for file downloads.
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A file part for multipart uploads.
pub struct FilePart {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn pdf(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            mime: "application/pdf".to_string(),
            bytes,
        }
    }
}

/// Deterministic, non-repeating test content of `len` bytes.
pub fn sample_bytes(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut i: u32 = 0;
    while out.len() < len {
        out.push((i.wrapping_mul(31).wrapping_add(i >> 8) % 251) as u8);
        i += 1;
    }
    out.truncate(len);
    out
}

/// Text fields of a valid resource upload.
pub fn resource_fields(title: &str) -> Vec<(&'static str, String)> {
    vec![
        ("title", title.to_string()),
        ("description", format!("Notes about {title}")),
        ("branch", "CSE".to_string()),
        ("semester", "3".to_string()),
        ("subject", "Data Structures".to_string()),
        ("kind", "Notes".to_string()),
    ]
}

pub fn test_storage_config() -> StorageConfig {
    StorageConfig {
        max_size_bytes: TEST_MAX_SIZE,
        chunk_size_bytes: TEST_CHUNK_SIZE,
        chunk_backend: ChunkBackend::Database,
        ..Default::default()
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_storage_config()).await
    }

    pub async fn spawn_with(storage: StorageConfig) -> Self {
        // One connection keeps every query on the same in-memory database.
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = server::database::connect_and_sync(opts)
            .await
            .expect("Failed to set up test database");
        server::seed::seed_role_permissions(&db)
            .await
            .expect("Failed to seed roles");
        server::seed::ensure_indexes(&db)
            .await
            .expect("Failed to create indexes");

        let blobs = server::storage::build_blob_store(&db, storage.clone())
            .await
            .expect("Failed to build blob store");

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: "test-secret-for-integration-tests".to_string(),
                token_ttl_days: 7,
            },
            storage,
            admin: AdminConfig::default(),
        };

        let state = AppState {
            db: db.clone(),
            blobs,
            config: app_config,
        };

        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_without_token(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn put_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PUT request");

        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// GET a path and keep the body as bytes, optionally with a `Range` header.
    pub async fn download(&self, path: &str, range: Option<&str>) -> RawResponse {
        let mut req = self.client.get(self.url(path));
        if let Some(range) = range {
            req = req.header("Range", range);
        }
        let res = req.send().await.expect("Failed to send download request");
        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let bytes = res
            .bytes()
            .await
            .expect("Failed to read download body")
            .to_vec();
        RawResponse {
            status,
            headers,
            bytes,
        }
    }

    /// POST a multipart form. Text fields are sent before the file part.
    pub async fn upload(
        &self,
        fields: &[(&str, String)],
        file: Option<FilePart>,
        token: &str,
    ) -> TestResponse {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name.to_string(), value.clone());
        }
        if let Some(file) = file {
            let part = reqwest::multipart::Part::bytes(file.bytes)
                .file_name(file.name)
                .mime_str(&file.mime)
                .expect("Failed to set MIME type");
            form = form.part("file", part);
        }

        let res = self
            .client
            .post(self.url(routes::UPLOAD))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// Sign up a student and return `(token, user_id)`.
    pub async fn create_student(&self, email: &str) -> (String, i32) {
        let res = self
            .post_without_token(
                routes::SIGNUP,
                &json!({
                    "name": "Test Student",
                    "email": email,
                    "password": "password123",
                    "branch": "CSE",
                    "semester": 3,
                }),
            )
            .await;
        assert_eq!(res.status, 201, "Signup failed: {}", res.text);
        res.token_and_id()
    }

    /// Sign up, promote to admin in the database, then log in again so the
    /// token carries admin permissions.
    pub async fn create_admin(&self, email: &str) -> (String, i32) {
        let (_, id) = self.create_student(email).await;

        let db_user = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await
            .expect("DB query failed")
            .expect("User not found after signup");
        let mut active: user::ActiveModel = db_user.into();
        active.role = Set("admin".to_string());
        user::Entity::update(active)
            .exec(&self.db)
            .await
            .expect("Failed to update user role");

        let res = self
            .post_without_token(
                routes::LOGIN,
                &json!({"email": email, "password": "password123"}),
            )
            .await;
        assert_eq!(res.status, 200, "Login failed: {}", res.text);
        (res.token_and_id().0, id)
    }

    /// Upload a resource with valid fields and return the response body.
    pub async fn upload_resource(&self, token: &str, title: &str, bytes: Vec<u8>) -> Value {
        let res = self
            .upload(
                &resource_fields(title),
                Some(FilePart::pdf(&format!("{title}.pdf"), bytes)),
                token,
            )
            .await;
        assert_eq!(res.status, 201, "Upload failed: {}", res.text);
        res.body
    }

    /// Upload a resource and approve it, returning `(resource_id, file_id)`.
    pub async fn approved_resource(&self, student: &str, admin: &str, title: &str) -> (i32, String) {
        let body = self.upload_resource(student, title, sample_bytes(2048)).await;
        let id = body["id"].as_i64().expect("resource id") as i32;
        let res = self.put_with_token(&routes::approve(id), &json!({}), admin).await;
        assert_eq!(res.status, 200, "Approve failed: {}", res.text);
        (id, body["file_id"].as_str().expect("file id").to_string())
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    pub fn id(&self) -> i32 {
        self.body["id"]
            .as_i64()
            .expect("response body should contain 'id'") as i32
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }

    fn token_and_id(&self) -> (String, i32) {
        let token = self.body["token"]
            .as_str()
            .expect("response should contain a token")
            .to_string();
        let id = self.body["user"]["id"]
            .as_i64()
            .expect("response should contain user.id") as i32;
        (token, id)
    }
}
