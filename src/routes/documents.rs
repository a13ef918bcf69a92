use actix_multipart::Multipart;
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};

use crate::error::ApiError;
use crate::helper::asset_store::{transfer_response, AssetKind, Disposition};
use crate::helper::document_helpers::{self, UpdateDocumentRequest};
use crate::helper::query_helpers::ListQuery;
use crate::helper::upload_helpers::read_upload_form;
use crate::middleware::AuthenticatedUser;
use crate::models::{DataResponse, MessageResponse};
use crate::{AppState, DbPool};

pub fn config_documents(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/documents")
            .route("", web::get().to(list_documents))
            .route("", web::post().to(create_document))
            .route("/{id}", web::get().to(get_document))
            .route("/{id}", web::put().to(update_document))
            .route("/{id}", web::delete().to(delete_document))
            .route("/{id}/download", web::get().to(download_document))
            .route("/{id}/preview", web::get().to(preview_document)),
    );
}

async fn list_documents(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let page = document_helpers::list_documents(&conn, &state.policy, &caller.identity(), &query)?;
    Ok(HttpResponse::Ok().json(page.into_response()))
}

async fn get_document(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let document = document_helpers::readable_document(&conn, &state.policy, &caller.identity(), path.into_inner())?;
    Ok(HttpResponse::Ok().json(DataResponse::new(document)))
}

async fn create_document(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let identity = caller.identity();
    let mut form = read_upload_form(payload, AssetKind::Document).await?;
    let file = form.file.take();

    let document = web::block(move || -> Result<_, ApiError> {
        let conn = pool.get()?;
        document_helpers::create_document(&conn, &state.assets, &state.policy, &identity, &form, file)
    })
    .await??;
    log::info!("Document {} uploaded by {}", document.id, caller.username);
    Ok(HttpResponse::Created().json(MessageResponse::with_data("Document uploaded successfully.", document)))
}

async fn update_document(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<UpdateDocumentRequest>,
) -> Result<HttpResponse, ApiError> {
    let conn = pool.get()?;
    let document = document_helpers::update_document(
        &conn,
        &state.policy,
        &caller.identity(),
        path.into_inner(),
        body.into_inner(),
    )?;
    Ok(HttpResponse::Ok().json(MessageResponse::with_data("Document updated successfully.", document)))
}

async fn delete_document(
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let identity = caller.identity();
    let id = path.into_inner();
    web::block(move || -> Result<_, ApiError> {
        let conn = pool.get()?;
        document_helpers::delete_document(&conn, &state.assets, &state.policy, &identity, id)
    })
    .await??;
    Ok(HttpResponse::Ok().json(MessageResponse::message("Document deleted successfully.")))
}

/// Authorize, open the file, build the response, and count it as a download
/// only when it is a full `200` attachment. Revalidations (`304`) and byte
/// ranges (`206`) are not counted, and a missing file fails before anything is.
async fn transfer(
    req: HttpRequest,
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    id: i64,
    disposition: Disposition,
) -> Result<HttpResponse, ApiError> {
    let document = {
        let conn = pool.get()?;
        document_helpers::readable_document(&conn, &state.policy, &caller.identity(), id)?
    };
    let file = state.assets.open(AssetKind::Document, &document.file_path).await?;
    let response = transfer_response(file, &req, disposition, &document.file_name, &document.file_type);

    if disposition == Disposition::Attachment && response.status() == StatusCode::OK {
        let conn = pool.get()?;
        document_helpers::record_download(&conn, document.id)?;
    }
    Ok(response)
}

async fn download_document(
    req: HttpRequest,
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    transfer(req, caller, pool, state, path.into_inner(), Disposition::Attachment).await
}

async fn preview_document(
    req: HttpRequest,
    caller: AuthenticatedUser,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    transfer(req, caller, pool, state, path.into_inner(), Disposition::Inline).await
}
