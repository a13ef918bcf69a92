use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::helper::{auth_helpers, user_helpers};
use crate::middleware::AuthenticatedUser;
use crate::models::{DataResponse, MessageResponse, User};
use crate::{AppState, DbPool};

#[derive(Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    message: &'static str,
    token: String,
    user: User,
}

pub fn config_auth(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/login", web::post().to(login))
            .route("/register", web::post().to(register))
            .route("/me", web::get().to(me)),
    );
}

async fn login(
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let LoginRequest { username, password } = body.into_inner();
    let (username, password) = match (username, password) {
        (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => (u.trim().to_string(), p),
        _ => return Err(ApiError::Validation("Please enter a username and password.".to_string())),
    };

    let (token, user) = web::block(move || -> Result<_, ApiError> {
        let conn = pool.get()?;
        auth_helpers::login(&conn, &state.tokens, &username, &password)
    })
    .await??;

    log::info!("User '{}' logged in", user.username);
    Ok(HttpResponse::Ok().json(LoginResponse { success: true, message: "Login successful.", token, user }))
}

async fn register(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    body: web::Json<user_helpers::RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    state
        .policy
        .manage_users(&caller.identity())
        .require("Only admins can register new users.")?;

    let cost = state.bcrypt_cost;
    let user = web::block(move || -> Result<_, ApiError> {
        let conn = pool.get()?;
        user_helpers::register(&conn, cost, body.into_inner())
    })
    .await??;

    Ok(HttpResponse::Created().json(MessageResponse::with_data("User registered successfully.", user)))
}

async fn me(caller: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(DataResponse::new(caller.into_inner()))
}
