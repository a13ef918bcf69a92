use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::helper::department_helpers::{self, DepartmentRequest};
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::{departments_db_operations, users_db_operations};
use crate::models::{CollectionResponse, DataResponse, MessageResponse};
use crate::{AppState, DbPool};

pub fn config_departments(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/departments")
            .route("", web::get().to(list_departments))
            .route("", web::post().to(create_department))
            .route("/{id}", web::get().to(get_department))
            .route("/{id}", web::put().to(update_department))
            .route("/{id}", web::delete().to(delete_department))
            .route("/{id}/users", web::get().to(department_users)),
    );
}

fn require_admin(state: &AppState, caller: &AuthenticatedUser) -> Result<(), ApiError> {
    state
        .policy
        .manage_departments(&caller.identity())
        .require("Only admins can manage departments.")
}

async fn list_departments(_caller: AuthenticatedUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let departments = departments_db_operations::read_all_departments(&conn)?;
    Ok(HttpResponse::Ok().json(CollectionResponse::new(departments)))
}

async fn get_department(
    _caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let department = department_helpers::fetch_department(&conn, path.into_inner())?;
    Ok(HttpResponse::Ok().json(DataResponse::new(department)))
}

async fn department_users(
    _caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let department = department_helpers::fetch_department(&conn, path.into_inner())?;
    let users = users_db_operations::read_users_in_department(&conn, department.id)?;
    Ok(HttpResponse::Ok().json(CollectionResponse::new(users)))
}

async fn create_department(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    body: web::Json<DepartmentRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &caller)?;
    let conn = pool.get()?;
    let department = department_helpers::create_department(&conn, body.into_inner())?;
    log::info!("Department '{}' ({}) created by {}", department.name, department.code, caller.username);
    Ok(HttpResponse::Created().json(MessageResponse::with_data("Department created successfully.", department)))
}

async fn update_department(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<DepartmentRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &caller)?;
    let conn = pool.get()?;
    let department = department_helpers::update_department(&conn, path.into_inner(), body.into_inner())?;
    Ok(HttpResponse::Ok().json(MessageResponse::with_data("Department updated successfully.", department)))
}

async fn delete_department(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &caller)?;
    let mut conn = pool.get()?;
    department_helpers::delete_department(&mut conn, path.into_inner())?;
    Ok(HttpResponse::Ok().json(MessageResponse::message("Department deleted successfully.")))
}
