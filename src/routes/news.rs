use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::helper::asset_store::AssetKind;
use crate::helper::news_helpers::{self, NewsForm};
use crate::helper::query_helpers::ListQuery;
use crate::helper::upload_helpers::read_upload_form;
use crate::middleware::AuthenticatedUser;
use crate::models::{DataResponse, MessageResponse, Role};
use crate::{AppState, DbPool};

const EDITORIAL_ROLES: &[Role] = &[Role::Admin, Role::Manager];

pub fn config_news(cfg: &mut web::ServiceConfig) {
    // The unauthenticated routes must be registered before `/{id}`.
    cfg.service(
        web::scope("/news")
            .route("/public", web::get().to(list_public_news))
            .route("/public/{id}", web::get().to(get_public_news))
            .route("", web::get().to(list_news))
            .route("", web::post().to(create_news))
            .route("/{id}", web::get().to(get_news))
            .route("/{id}", web::put().to(update_news))
            .route("/{id}", web::delete().to(delete_news))
            .route("/{id}/toggle-publish", web::put().to(toggle_publish)),
    );
}

async fn list_public_news(pool: web::Data<DbPool>, query: web::Query<ListQuery>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let page = news_helpers::list_public_news(&conn, &query)?;
    Ok(HttpResponse::Ok().json(page.into_response()))
}

async fn get_public_news(
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let news = news_helpers::read_public_news(&conn, &state.policy, path.into_inner())?;
    Ok(HttpResponse::Ok().json(DataResponse::new(news)))
}

async fn list_news(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let page = news_helpers::list_news(&conn, &state.policy, &caller.identity(), &query)?;
    Ok(HttpResponse::Ok().json(page.into_response()))
}

async fn get_news(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let news = news_helpers::read_news(&conn, &state.policy, &caller.identity(), path.into_inner())?;
    Ok(HttpResponse::Ok().json(DataResponse::new(news)))
}

async fn create_news(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let identity = caller.identity();
    state
        .policy
        .create_news(&identity)
        .require("Only admins and managers can create news.")?;

    let mut form = read_upload_form(payload, AssetKind::Thumbnail).await?;
    let fields = NewsForm::from_upload(&form)?;
    let thumbnail = form.file.take();

    let news = web::block(move || -> Result<_, ApiError> {
        let conn = pool.get()?;
        news_helpers::create_news(&conn, &state.assets, &state.policy, &identity, fields, thumbnail)
    })
    .await??;
    Ok(HttpResponse::Created().json(MessageResponse::with_data("News created successfully.", news)))
}

async fn update_news(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    caller.require_role(EDITORIAL_ROLES)?;
    let identity = caller.identity();
    let id = path.into_inner();

    let mut form = read_upload_form(payload, AssetKind::Thumbnail).await?;
    let fields = NewsForm::from_upload(&form)?;
    let thumbnail = form.file.take();

    let news = web::block(move || -> Result<_, ApiError> {
        let conn = pool.get()?;
        news_helpers::update_news(&conn, &state.assets, &state.policy, &identity, id, fields, thumbnail)
    })
    .await??;
    Ok(HttpResponse::Ok().json(MessageResponse::with_data("News updated successfully.", news)))
}

async fn delete_news(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    caller.require_role(EDITORIAL_ROLES)?;
    let identity = caller.identity();
    let id = path.into_inner();

    web::block(move || -> Result<_, ApiError> {
        let conn = pool.get()?;
        news_helpers::delete_news(&conn, &state.assets, &state.policy, &identity, id)
    })
    .await??;
    Ok(HttpResponse::Ok().json(MessageResponse::message("News deleted successfully.")))
}

async fn toggle_publish(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    caller.require_role(EDITORIAL_ROLES)?;
    let conn = pool.get()?;
    let news = news_helpers::toggle_publish(&conn, &state.policy, &caller.identity(), path.into_inner())?;
    let message = if news.is_published { "News published." } else { "News unpublished." };
    Ok(HttpResponse::Ok().json(MessageResponse::with_data(message, news)))
}
