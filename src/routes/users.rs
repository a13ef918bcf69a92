use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::helper::asset_store::AssetKind;
use crate::helper::upload_helpers::read_upload_form;
use crate::helper::user_helpers::{self, ChangePasswordRequest, ProfileChanges, UpdateUserRequest};
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::users_db_operations;
use crate::models::{CollectionResponse, DataResponse, MessageResponse};
use crate::{AppState, DbPool};

pub fn config_users(cfg: &mut web::ServiceConfig) {
    // Self-service routes first, so they are not captured by `/{id}`.
    cfg.service(
        web::scope("/users")
            .route("", web::get().to(list_users))
            .route("/profile", web::put().to(update_profile))
            .route("/change-password", web::put().to(change_password))
            .route("/{id}", web::get().to(get_user))
            .route("/{id}", web::put().to(update_user))
            .route("/{id}", web::delete().to(delete_user))
            .route("/{id}/toggle-status", web::put().to(toggle_status)),
    );
}

fn require_admin(state: &AppState, caller: &AuthenticatedUser) -> Result<(), ApiError> {
    state
        .policy
        .manage_users(&caller.identity())
        .require("Only admins can manage user accounts.")
}

async fn list_users(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &caller)?;
    let conn = pool.get()?;
    let users = users_db_operations::read_all_users(&conn)?;
    Ok(HttpResponse::Ok().json(CollectionResponse::new(users)))
}

async fn get_user(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &caller)?;
    let conn = pool.get()?;
    let user = users_db_operations::read_user(&conn, path.into_inner())?
        .ok_or_else(|| ApiError::NotFound("User not found.".to_string()))?;
    Ok(HttpResponse::Ok().json(DataResponse::new(user)))
}

async fn update_user(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &caller)?;
    let mut conn = pool.get()?;
    let user = user_helpers::update_user(&mut conn, path.into_inner(), body.into_inner())?;
    Ok(HttpResponse::Ok().json(MessageResponse::with_data("User updated successfully.", user)))
}

async fn delete_user(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &caller)?;
    let user_id = path.into_inner();
    web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        user_helpers::delete_user(&mut conn, &state.assets, user_id)
    })
    .await??;
    log::info!("User {} deleted by {}", user_id, caller.username);
    Ok(HttpResponse::Ok().json(MessageResponse::message("User deleted successfully.")))
}

async fn toggle_status(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &caller)?;
    let mut conn = pool.get()?;
    let user = user_helpers::toggle_status(&mut conn, path.into_inner())?;
    let message = if user.is_active { "User account activated." } else { "User account deactivated." };
    Ok(HttpResponse::Ok().json(MessageResponse::with_data(message, user)))
}

async fn update_profile(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut form = read_upload_form(payload, AssetKind::Avatar).await?;
    let changes = ProfileChanges::from_form(&form);
    let avatar = form.file.take();
    let user_id = caller.id;

    let user = web::block(move || -> Result<_, ApiError> {
        let conn = pool.get()?;
        user_helpers::update_profile(&conn, &state.assets, user_id, changes, avatar)
    })
    .await??;
    Ok(HttpResponse::Ok().json(MessageResponse::with_data("Profile updated successfully.", user)))
}

async fn change_password(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let cost = state.bcrypt_cost;
    let user_id = caller.id;
    web::block(move || -> Result<_, ApiError> {
        let conn = pool.get()?;
        user_helpers::change_password(&conn, cost, user_id, body.into_inner())
    })
    .await??;
    Ok(HttpResponse::Ok().json(MessageResponse::message("Password changed successfully.")))
}
