use crate::error::ApiError;
use crate::models::db_operations::departments_db_operations::{self, DepartmentDeletion, DepartmentRecord};
use crate::models::Department;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub head_of_department: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn not_found() -> ApiError {
    ApiError::NotFound("Department not found.".to_string())
}

pub fn fetch_department(conn: &Connection, id: i64) -> Result<Department, ApiError> {
    departments_db_operations::read_department(conn, id)?.ok_or_else(not_found)
}

pub fn create_department(conn: &Connection, req: DepartmentRequest) -> Result<Department, ApiError> {
    let name = non_blank(req.name).ok_or_else(|| ApiError::Validation("Department name is required.".to_string()))?;
    let code = non_blank(req.code).ok_or_else(|| ApiError::Validation("Department code is required.".to_string()))?;

    if departments_db_operations::code_taken(conn, &code)? {
        return Err(ApiError::Conflict("Department code already exists.".to_string()));
    }
    if departments_db_operations::name_taken(conn, &name, None)? {
        return Err(ApiError::Conflict("Department name already exists.".to_string()));
    }

    let record = DepartmentRecord {
        name,
        description: non_blank(req.description),
        head_of_department: non_blank(req.head_of_department),
        phone_number: non_blank(req.phone_number),
        email: non_blank(req.email),
    };
    let id = departments_db_operations::create_department(conn, &code, &record)?;
    fetch_department(conn, id)
}

/// Absent fields are kept; a present but blank optional field is cleared.
/// The code is write-once, so only an identical code may be echoed back.
pub fn update_department(conn: &Connection, id: i64, req: DepartmentRequest) -> Result<Department, ApiError> {
    let existing = fetch_department(conn, id)?;

    if let Some(code) = non_blank(req.code) {
        if code != existing.code {
            return Err(ApiError::Validation("Department code cannot be changed after creation.".to_string()));
        }
    }

    let mut record = DepartmentRecord::from(&existing);
    if let Some(name) = non_blank(req.name) {
        if departments_db_operations::name_taken(conn, &name, Some(id))? {
            return Err(ApiError::Conflict("Department name already exists.".to_string()));
        }
        record.name = name;
    }
    if req.description.is_some() {
        record.description = non_blank(req.description);
    }
    if req.head_of_department.is_some() {
        record.head_of_department = non_blank(req.head_of_department);
    }
    if req.phone_number.is_some() {
        record.phone_number = non_blank(req.phone_number);
    }
    if req.email.is_some() {
        record.email = non_blank(req.email);
    }

    departments_db_operations::update_department(conn, id, &record)?;
    fetch_department(conn, id)
}

pub fn delete_department(conn: &mut Connection, id: i64) -> Result<(), ApiError> {
    match departments_db_operations::delete_department_if_empty(conn, id)? {
        DepartmentDeletion::Deleted => Ok(()),
        DepartmentDeletion::NotFound => Err(not_found()),
        DepartmentDeletion::HasUsers(count) => Err(ApiError::Conflict(format!(
            "Cannot delete the department because {} user(s) still belong to it.",
            count
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::setup_portal_db;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        setup_portal_db(&mut conn).unwrap();
        conn
    }

    fn req(name: &str, code: &str) -> DepartmentRequest {
        DepartmentRequest { name: Some(name.into()), code: Some(code.into()), ..Default::default() }
    }

    #[test]
    fn code_is_write_once() {
        let conn = test_conn();
        let dep = create_department(&conn, req("Finance", "FIN")).unwrap();
        let same = update_department(&conn, dep.id, DepartmentRequest { code: Some("FIN".into()), description: Some("Money".into()), ..Default::default() }).unwrap();
        assert_eq!(same.description.as_deref(), Some("Money"));
        let changed = update_department(&conn, dep.id, DepartmentRequest { code: Some("FN".into()), ..Default::default() });
        assert!(matches!(changed, Err(ApiError::Validation(_))));
        assert_eq!(fetch_department(&conn, dep.id).unwrap().code, "FIN");
    }

    #[test]
    fn duplicates_are_conflicts() {
        let conn = test_conn();
        create_department(&conn, req("Finance", "FIN")).unwrap();
        assert!(matches!(create_department(&conn, req("Other", "FIN")), Err(ApiError::Conflict(_))));
        assert!(matches!(create_department(&conn, req("Finance", "F2")), Err(ApiError::Conflict(_))));
        assert!(matches!(create_department(&conn, req("", "F3")), Err(ApiError::Validation(_))));
    }

    #[test]
    fn blocked_delete_reports_member_count() {
        let mut conn = test_conn();
        let dep = create_department(&conn, req("Ops", "OPS")).unwrap();
        conn.execute(
            "INSERT INTO users (username, password_hash, full_name, email, department_id, created_at, updated_at)
             VALUES ('op', 'h', 'Op', 'op@example.org', ?1, 'now', 'now')",
            [dep.id],
        )
        .unwrap();
        match delete_department(&mut conn, dep.id) {
            Err(ApiError::Conflict(message)) => assert!(message.contains("1 user")),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert!(matches!(delete_department(&mut conn, 4242), Err(ApiError::NotFound(_))));
    }
}
