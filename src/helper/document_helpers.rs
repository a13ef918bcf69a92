use crate::error::ApiError;
use crate::helper::asset_store::{AssetKind, AssetStore, IncomingFile};
use crate::helper::query_helpers::{ListQuery, Page};
use crate::helper::upload_helpers::UploadForm;
use crate::helper::user_helpers::ensure_department;
use crate::models::db_operations::documents_db_operations::{self, DocumentRecord, StoredFile};
use crate::models::{Document, DocumentCategory, Identity};
use crate::policy::{DocumentFacts, ResourceAction, VisibilityPolicy};
use rusqlite::Connection;
use serde::Deserialize;

/// Metadata-only edit, sent as JSON. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<DocumentCategory>,
    pub is_public: Option<bool>,
    pub department_id: Option<i64>,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Document not found.".to_string())
}

fn load(conn: &Connection, id: i64) -> Result<Document, ApiError> {
    documents_db_operations::read_document(conn, id)?.ok_or_else(not_found)
}

pub fn list_documents(conn: &Connection, policy: &VisibilityPolicy, who: &Identity, query: &ListQuery) -> Result<Page<Document>, ApiError> {
    let filter = query.document_filter(policy.document_scope(who))?;
    Ok(documents_db_operations::list_documents(conn, &filter, query.page_request())?)
}

/// Loads a document the caller may read. Used for detail, download and
/// preview alike.
pub fn readable_document(conn: &Connection, policy: &VisibilityPolicy, who: &Identity, id: i64) -> Result<Document, ApiError> {
    let document = load(conn, id)?;
    policy
        .document(who, DocumentFacts::from(&document), ResourceAction::Read)
        .require("You do not have permission to access this document.")?;
    Ok(document)
}

/// Accounts for one completed download.
pub fn record_download(conn: &Connection, id: i64) -> Result<(), ApiError> {
    if documents_db_operations::increment_download_count(conn, id)? == 0 {
        return Err(not_found());
    }
    Ok(())
}

pub fn create_document(
    conn: &Connection,
    assets: &AssetStore,
    policy: &VisibilityPolicy,
    who: &Identity,
    form: &UploadForm,
    file: Option<IncomingFile>,
) -> Result<Document, ApiError> {
    policy.create_document(who).require("You do not have permission to upload documents.")?;
    let file = file.ok_or_else(|| ApiError::Validation("Please upload a document file.".to_string()))?;
    let requested_department = form.id("departmentId")?;
    ensure_department(conn, requested_department)?;

    let record = DocumentRecord {
        title: form.required("title", "Title")?,
        description: form.text("description").map(str::to_string),
        category: form.parse::<DocumentCategory>("category")?.unwrap_or_default(),
        is_public: form.flag("isPublic").unwrap_or(false),
        department_id: policy.document_department(who, requested_department),
    };

    let key = assets.store(AssetKind::Document, &file)?;
    let stored = StoredFile {
        file_name: file.original_name.clone(),
        file_path: key.clone(),
        file_size: file.size() as i64,
        file_type: file.mime_type.clone(),
    };
    match documents_db_operations::create_document(conn, &record, &stored, who.id) {
        Ok(id) => load(conn, id),
        Err(e) => {
            assets.discard_orphan(AssetKind::Document, &key);
            Err(e.into())
        }
    }
}

pub fn update_document(
    conn: &Connection,
    policy: &VisibilityPolicy,
    who: &Identity,
    id: i64,
    req: UpdateDocumentRequest,
) -> Result<Document, ApiError> {
    let existing = load(conn, id)?;
    policy
        .document(who, DocumentFacts::from(&existing), ResourceAction::Update)
        .require("You do not have permission to update this document.")?;

    let mut record = DocumentRecord::from(&existing);
    if let Some(title) = req.title.map(|t| t.trim().to_string()) {
        if title.is_empty() {
            return Err(ApiError::Validation("Title cannot be empty.".to_string()));
        }
        record.title = title;
    }
    if let Some(description) = req.description {
        record.description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
    }
    if let Some(category) = req.category {
        record.category = category;
    }
    if let Some(is_public) = req.is_public {
        record.is_public = is_public;
    }
    if let Some(department_id) = req.department_id {
        ensure_department(conn, Some(department_id))?;
        record.department_id = Some(department_id);
    }

    documents_db_operations::update_document(conn, id, &record)?;
    load(conn, id)
}

/// Removes the row, then the stored file. A file already gone from disk
/// does not fail the delete.
pub fn delete_document(conn: &Connection, assets: &AssetStore, policy: &VisibilityPolicy, who: &Identity, id: i64) -> Result<(), ApiError> {
    let document = load(conn, id)?;
    policy
        .document(who, DocumentFacts::from(&document), ResourceAction::Delete)
        .require("You do not have permission to delete this document.")?;
    documents_db_operations::delete_document(conn, id)?;
    if let Err(e) = assets.delete(AssetKind::Document, &document.file_path) {
        log::warn!("Document {} deleted but file {} was not released: {}", id, document.file_path, e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::setup::db_setup::setup_portal_db;
    use tempfile::TempDir;

    struct Fixture {
        conn: Connection,
        assets: AssetStore,
        _dir: TempDir,
        hr_staff: Identity,
        it_staff: Identity,
        admin: Identity,
    }

    fn fixture() -> Fixture {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        setup_portal_db(&mut conn).unwrap();
        conn.execute_batch(
            "INSERT INTO departments (id, name, code, created_at, updated_at) VALUES (1, 'HR', 'HR', 'now', 'now');
             INSERT INTO departments (id, name, code, created_at, updated_at) VALUES (2, 'IT', 'IT', 'now', 'now');
             INSERT INTO users (id, username, password_hash, full_name, email, role, department_id, created_at, updated_at)
                 VALUES (1, 'admin', 'h', 'Admin', 'admin@example.org', 'admin', NULL, 'now', 'now');
             INSERT INTO users (id, username, password_hash, full_name, email, role, department_id, created_at, updated_at)
                 VALUES (2, 'hr', 'h', 'HR Staff', 'hr@example.org', 'staff', 1, 'now', 'now');
             INSERT INTO users (id, username, password_hash, full_name, email, role, department_id, created_at, updated_at)
                 VALUES (3, 'it', 'h', 'IT Staff', 'it@example.org', 'staff', 2, 'now', 'now');",
        )
        .unwrap();
        let dir = TempDir::new().unwrap();
        Fixture {
            conn,
            assets: AssetStore::new(dir.path()),
            _dir: dir,
            admin: Identity { id: 1, role: Role::Admin, department_id: None, is_active: true },
            hr_staff: Identity { id: 2, role: Role::Staff, department_id: Some(1), is_active: true },
            it_staff: Identity { id: 3, role: Role::Staff, department_id: Some(2), is_active: true },
        }
    }

    fn upload_form(pairs: &[(&str, &str)]) -> UploadForm {
        let mut form = UploadForm::default();
        for (k, v) in pairs {
            form.insert_text(k, v);
        }
        form
    }

    fn pdf() -> IncomingFile {
        IncomingFile { original_name: "plan.pdf".into(), mime_type: "application/pdf".into(), bytes: b"%PDF-1.4".to_vec() }
    }

    #[test]
    fn private_document_is_department_scoped() {
        let f = fixture();
        let policy = VisibilityPolicy::default();
        let doc = create_document(&f.conn, &f.assets, &policy, &f.hr_staff, &upload_form(&[("title", "Payroll")]), Some(pdf())).unwrap();
        assert_eq!(doc.department_id, Some(1));
        assert!(!doc.is_public);

        assert!(matches!(readable_document(&f.conn, &policy, &f.it_staff, doc.id), Err(ApiError::Forbidden(_))));
        assert!(readable_document(&f.conn, &policy, &f.hr_staff, doc.id).is_ok());
        assert!(readable_document(&f.conn, &policy, &f.admin, doc.id).is_ok());

        let it_list = list_documents(&f.conn, &policy, &f.it_staff, &ListQuery::default()).unwrap();
        assert_eq!(it_list.total, 0);
    }

    #[test]
    fn public_form_is_readable_across_departments() {
        let f = fixture();
        let policy = VisibilityPolicy::default();
        let form = upload_form(&[("title", "Leave request"), ("category", "form"), ("isPublic", "true"), ("departmentId", "1")]);
        let doc = create_document(&f.conn, &f.assets, &policy, &f.hr_staff, &form, Some(pdf())).unwrap();
        let seen = readable_document(&f.conn, &policy, &f.it_staff, doc.id).unwrap();
        assert_eq!(seen.category, DocumentCategory::Form);
        assert_eq!(seen.file_name, "plan.pdf");
        assert_eq!(seen.file_size, 8);
        assert_eq!(seen.file_type, "application/pdf");
    }

    #[test]
    fn upload_requires_file_and_title() {
        let f = fixture();
        let policy = VisibilityPolicy::default();
        let missing_file = create_document(&f.conn, &f.assets, &policy, &f.hr_staff, &upload_form(&[("title", "x")]), None);
        assert!(matches!(missing_file, Err(ApiError::Validation(_))));
        let missing_title = create_document(&f.conn, &f.assets, &policy, &f.hr_staff, &upload_form(&[]), Some(pdf()));
        assert!(matches!(missing_title, Err(ApiError::Validation(_))));
    }

    #[test]
    fn only_uploader_or_admin_mutates() {
        let f = fixture();
        let policy = VisibilityPolicy::default();
        let form = upload_form(&[("title", "Shared"), ("isPublic", "true")]);
        let doc = create_document(&f.conn, &f.assets, &policy, &f.hr_staff, &form, Some(pdf())).unwrap();

        let rename = || UpdateDocumentRequest { title: Some("Renamed".into()), ..Default::default() };
        assert!(matches!(update_document(&f.conn, &policy, &f.it_staff, doc.id, rename()), Err(ApiError::Forbidden(_))));
        assert_eq!(update_document(&f.conn, &policy, &f.hr_staff, doc.id, rename()).unwrap().title, "Renamed");

        assert!(matches!(delete_document(&f.conn, &f.assets, &policy, &f.it_staff, doc.id), Err(ApiError::Forbidden(_))));
        f.assets.delete(AssetKind::Document, &doc.file_path).unwrap();
        delete_document(&f.conn, &f.assets, &policy, &f.admin, doc.id).unwrap();
        assert!(matches!(load(&f.conn, doc.id), Err(ApiError::NotFound(_))));
    }
}
