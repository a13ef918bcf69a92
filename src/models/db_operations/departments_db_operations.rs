use crate::models::{now_timestamp, Department};
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row, TransactionBehavior};

const DEPARTMENT_SELECT: &str = "SELECT id, name, code, description, head_of_department, phone_number, email, created_at, updated_at FROM departments";

fn map_department(row: &Row) -> Result<Department, RusqliteError> {
    Ok(Department {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        description: row.get(3)?,
        head_of_department: row.get(4)?,
        phone_number: row.get(5)?,
        email: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Mutable columns of a department. `code` is only written on insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepartmentRecord {
    pub name: String,
    pub description: Option<String>,
    pub head_of_department: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

impl From<&Department> for DepartmentRecord {
    fn from(d: &Department) -> Self {
        DepartmentRecord {
            name: d.name.clone(),
            description: d.description.clone(),
            head_of_department: d.head_of_department.clone(),
            phone_number: d.phone_number.clone(),
            email: d.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartmentDeletion {
    Deleted,
    NotFound,
    HasUsers(i64),
}

pub fn create_department(conn: &Connection, code: &str, record: &DepartmentRecord) -> Result<i64, RusqliteError> {
    conn.execute(
        "INSERT INTO departments (name, code, description, head_of_department, phone_number, email, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            record.name,
            code,
            record.description,
            record.head_of_department,
            record.phone_number,
            record.email,
            now_timestamp()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_department(conn: &Connection, id: i64) -> Result<Option<Department>, RusqliteError> {
    conn.query_row(&format!("{} WHERE id = ?1", DEPARTMENT_SELECT), [id], map_department)
        .optional()
}

pub fn read_all_departments(conn: &Connection) -> Result<Vec<Department>, RusqliteError> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY name", DEPARTMENT_SELECT))?;
    let rows = stmt.query_map([], map_department)?;
    rows.collect()
}

pub fn department_exists(conn: &Connection, id: i64) -> Result<bool, RusqliteError> {
    conn.query_row("SELECT EXISTS(SELECT 1 FROM departments WHERE id = ?1)", [id], |row| row.get(0))
}

pub fn name_taken(conn: &Connection, name: &str, except_id: Option<i64>) -> Result<bool, RusqliteError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM departments WHERE name = ?1 AND (?2 IS NULL OR id != ?2))",
        params![name, except_id],
        |row| row.get(0),
    )
}

pub fn code_taken(conn: &Connection, code: &str) -> Result<bool, RusqliteError> {
    conn.query_row("SELECT EXISTS(SELECT 1 FROM departments WHERE code = ?1)", [code], |row| row.get(0))
}

pub fn update_department(conn: &Connection, id: i64, record: &DepartmentRecord) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE departments SET name = ?1, description = ?2, head_of_department = ?3, phone_number = ?4, email = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            record.name,
            record.description,
            record.head_of_department,
            record.phone_number,
            record.email,
            now_timestamp(),
            id
        ],
    )
}

/// Deletes a department only while no user belongs to it. The member count
/// and the delete run under one write lock, so a concurrent assignment can
/// not slip in between.
pub fn delete_department_if_empty(conn: &mut Connection, id: i64) -> Result<DepartmentDeletion, RusqliteError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !department_exists(&tx, id)? {
        return Ok(DepartmentDeletion::NotFound);
    }
    let members: i64 = tx.query_row("SELECT COUNT(*) FROM users WHERE department_id = ?1", [id], |row| row.get(0))?;
    if members > 0 {
        return Ok(DepartmentDeletion::HasUsers(members));
    }
    tx.execute("DELETE FROM departments WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(DepartmentDeletion::Deleted)
}

pub fn count_departments(conn: &Connection) -> Result<i64, RusqliteError> {
    conn.query_row("SELECT COUNT(*) FROM departments", [], |row| row.get(0))
}
