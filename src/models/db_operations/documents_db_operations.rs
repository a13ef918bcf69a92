use crate::helper::query_helpers::{DocumentFilter, Page, PageRequest};
use crate::models::{now_timestamp, DepartmentRef, Document, DocumentCategory, UserSummary};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

const DOCUMENT_SELECT: &str = "SELECT d.id, d.title, d.description, d.file_name, d.file_path, d.file_size, d.file_type, \
     d.category, d.download_count, d.is_public, d.uploader_id, up.full_name, up.avatar, \
     d.department_id, dep.name, dep.code, d.created_at, d.updated_at \
     FROM documents d \
     LEFT JOIN users up ON up.id = d.uploader_id \
     LEFT JOIN departments dep ON dep.id = d.department_id";

fn map_document(row: &Row) -> Result<Document, RusqliteError> {
    let uploader_id: Option<i64> = row.get(10)?;
    let uploader = match (uploader_id, row.get::<_, Option<String>>(11)?) {
        (Some(id), Some(full_name)) => Some(UserSummary { id, full_name, avatar: row.get(12)? }),
        _ => None,
    };
    let department_id: Option<i64> = row.get(13)?;
    let department = match (department_id, row.get::<_, Option<String>>(14)?, row.get::<_, Option<String>>(15)?) {
        (Some(id), Some(name), Some(code)) => Some(DepartmentRef { id, name, code }),
        _ => None,
    };
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        file_name: row.get(3)?,
        file_path: row.get(4)?,
        file_size: row.get(5)?,
        file_type: row.get(6)?,
        category: row.get(7)?,
        download_count: row.get(8)?,
        is_public: row.get(9)?,
        uploader_id,
        uploader,
        department_id,
        department,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

/// Metadata columns that can change after upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentRecord {
    pub title: String,
    pub description: Option<String>,
    pub category: DocumentCategory,
    pub is_public: bool,
    pub department_id: Option<i64>,
}

impl From<&Document> for DocumentRecord {
    fn from(d: &Document) -> Self {
        DocumentRecord {
            title: d.title.clone(),
            description: d.description.clone(),
            category: d.category,
            is_public: d.is_public,
            department_id: d.department_id,
        }
    }
}

/// The stored file behind a document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
}

pub fn create_document(conn: &Connection, record: &DocumentRecord, file: &StoredFile, uploader_id: i64) -> Result<i64, RusqliteError> {
    conn.execute(
        "INSERT INTO documents (title, description, file_name, file_path, file_size, file_type, category, is_public,
             uploader_id, department_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            record.title,
            record.description,
            file.file_name,
            file.file_path,
            file.file_size,
            file.file_type,
            record.category,
            record.is_public,
            uploader_id,
            record.department_id,
            now_timestamp()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_document(conn: &Connection, id: i64) -> Result<Option<Document>, RusqliteError> {
    conn.query_row(&format!("{} WHERE d.id = ?1", DOCUMENT_SELECT), [id], map_document)
        .optional()
}

/// One page of documents, newest first, restricted by `filter`.
pub fn list_documents(conn: &Connection, filter: &DocumentFilter, page: PageRequest) -> Result<Page<Document>, RusqliteError> {
    let clause = filter.where_clause();
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM documents d{}", clause.sql()),
        clause.params().as_slice(),
        |row| row.get(0),
    )?;

    let (limit, offset) = (page.limit(), page.offset());
    let mut args = clause.params();
    args.push(&limit as &dyn ToSql);
    args.push(&offset as &dyn ToSql);
    let mut stmt = conn.prepare(&format!(
        "{}{} ORDER BY d.created_at DESC, d.id DESC LIMIT ? OFFSET ?",
        DOCUMENT_SELECT,
        clause.sql()
    ))?;
    let items = stmt
        .query_map(args.as_slice(), map_document)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page { items, total, request: page })
}

pub fn update_document(conn: &Connection, id: i64, record: &DocumentRecord) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE documents SET title = ?1, description = ?2, category = ?3, is_public = ?4, department_id = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            record.title,
            record.description,
            record.category,
            record.is_public,
            record.department_id,
            now_timestamp(),
            id
        ],
    )
}

/// Atomic `download_count + 1`; concurrent downloads never lose an update.
pub fn increment_download_count(conn: &Connection, id: i64) -> Result<usize, RusqliteError> {
    conn.execute("UPDATE documents SET download_count = download_count + 1 WHERE id = ?1", [id])
}

pub fn delete_document(conn: &Connection, id: i64) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM documents WHERE id = ?1", [id])
}
