use actix_web::{error::JsonPayloadError, error::PathError, error::QueryPayloadError, web, HttpRequest};

use crate::error::ApiError;

pub mod auth;
pub mod departments;
pub mod documents;
pub mod news;
pub mod stats;
pub mod users;

/// JSON bodies above this size are rejected before deserialization.
const JSON_LIMIT_BYTES: usize = 256 * 1024;

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::Validation(format!("Invalid JSON body: {}", err)).into()
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::Validation(format!("Invalid query string: {}", err)).into()
}

fn path_error(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::NotFound(format!("No resource matches this path: {}", err)).into()
}

/// Mounts the whole REST surface under `/api`.
pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().limit(JSON_LIMIT_BYTES).error_handler(json_error))
            .app_data(web::QueryConfig::default().error_handler(query_error))
            .app_data(web::PathConfig::default().error_handler(path_error))
            .configure(auth::config_auth)
            .configure(users::config_users)
            .configure(departments::config_departments)
            .configure(news::config_news)
            .configure(documents::config_documents)
            .configure(stats::config_stats),
    );
}
