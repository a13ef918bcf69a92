use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::helper::asset_store::AssetStore;
use crate::helper::auth_helpers::TokenService;
use crate::policy::{PolicyRules, VisibilityPolicy};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Request-independent collaborators, built once at start-up and shared by
/// every worker through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub assets: AssetStore,
    pub tokens: TokenService,
    pub policy: VisibilityPolicy,
    pub bcrypt_cost: u32,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, hex::FromHexError> {
        Ok(AppState {
            assets: AssetStore::new(config.uploads_root()),
            tokens: TokenService::from_hex_secret(&config.jwt_secret, config.jwt_ttl_hours)?,
            policy: VisibilityPolicy::new(PolicyRules {
                managers_moderate_all_news: config.news_managers_moderate_all,
                authors_read_unpublished_news: config.news_author_reads_unpublished,
            }),
            bcrypt_cost: config.bcrypt_cost,
        })
    }
}

/// Opens the SQLite pool. Every connection enforces foreign keys and waits on
/// a busy database instead of failing, so concurrent counter updates queue up.
pub fn build_pool(db_path: &Path) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;")
    });
    Pool::builder().build(manager)
}

pub mod config;
pub mod error;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod routes;
pub mod setup;
