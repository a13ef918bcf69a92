pub mod asset_store;
pub mod auth_helpers;
pub mod department_helpers;
pub mod document_helpers;
pub mod news_helpers;
pub mod query_helpers;
pub mod stats_helpers;
pub mod upload_helpers;
pub mod user_helpers;
