#![allow(dead_code)]

use chrono::Duration;
use portal_backend::helper::asset_store::AssetStore;
use portal_backend::helper::auth_helpers::TokenService;
use portal_backend::helper::user_helpers::{self, RegisterRequest};
use portal_backend::models::db_operations::departments_db_operations::{self, DepartmentRecord};
use portal_backend::models::{Role, User};
use portal_backend::policy::{PolicyRules, VisibilityPolicy};
use portal_backend::setup::db_setup::setup_portal_db;
use portal_backend::{build_pool, AppState, DbPool};
use tempfile::TempDir;

pub const PASSWORD: &str = "correct horse battery";
const BOUNDARY: &str = "----portal-test-boundary";

/// A fully initialised portal on a throwaway database and upload root.
pub struct TestPortal {
    pub pool: DbPool,
    pub state: AppState,
    _dir: TempDir,
}

impl TestPortal {
    pub fn new() -> Self {
        Self::with_rules(PolicyRules::default())
    }

    pub fn with_rules(rules: PolicyRules) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = build_pool(&dir.path().join("portal.db")).unwrap();
        setup_portal_db(&mut pool.get().unwrap()).unwrap();
        let state = AppState {
            assets: AssetStore::new(dir.path().join("uploads")),
            tokens: TokenService::new(b"integration-test-secret-0123456789abcdef", Duration::hours(1)),
            policy: VisibilityPolicy::new(rules),
            bcrypt_cost: 4,
        };
        state.assets.ensure_layout().unwrap();
        TestPortal { pool, state, _dir: dir }
    }

    pub fn department(&self, name: &str, code: &str) -> i64 {
        let conn = self.pool.get().unwrap();
        departments_db_operations::create_department(
            &conn,
            code,
            &DepartmentRecord { name: name.to_string(), ..Default::default() },
        )
        .unwrap()
    }

    /// Registers a user and returns it with a bearer header value.
    pub fn user(&self, username: &str, role: Role, department_id: Option<i64>) -> (User, String) {
        let conn = self.pool.get().unwrap();
        let user = user_helpers::register(
            &conn,
            self.state.bcrypt_cost,
            RegisterRequest {
                username: Some(username.to_string()),
                password: Some(PASSWORD.to_string()),
                full_name: Some(format!("{} test", username)),
                email: Some(format!("{}@portal.test", username)),
                role: Some(role),
                department_id,
                ..Default::default()
            },
        )
        .unwrap();
        let token = self.state.tokens.issue(&user).unwrap();
        (user, format!("Bearer {}", token))
    }
}

/// Builds the actix test service for a [`TestPortal`].
macro_rules! portal_app {
    ($portal:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($portal.pool.clone()))
                .app_data(actix_web::web::Data::new($portal.state.clone()))
                .configure(portal_backend::routes::config_api),
        )
        .await
    };
}

pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub bytes: &'a [u8],
}

/// Encodes a multipart/form-data body. Returns `(content_type, body)`.
pub fn multipart(fields: &[(&str, &str)], file: Option<FilePart>) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    if let Some(file) = file {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.field, file.file_name, file.mime_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

pub fn pdf_part(bytes: &[u8]) -> FilePart<'_> {
    FilePart { field: "document", file_name: "report.pdf", mime_type: "application/pdf", bytes }
}
