use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::helper::stats_helpers;
use crate::middleware::AuthenticatedUser;
use crate::models::DataResponse;
use crate::{AppState, DbPool};

pub fn config_stats(cfg: &mut web::ServiceConfig) {
    cfg.route("/stats", web::get().to(overview));
}

async fn overview(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let stats = stats_helpers::overview(&conn, &state.policy, &caller.identity())?;
    Ok(HttpResponse::Ok().json(DataResponse::new(stats)))
}
