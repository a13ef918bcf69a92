use crate::models::{now_timestamp, DepartmentRef, Role, User};
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

const USER_SELECT: &str = "SELECT u.id, u.username, u.full_name, u.email, u.role, u.is_active, u.department_id, \
     dep.name, dep.code, u.avatar, u.position, u.phone_number, u.last_login, u.created_at, u.updated_at \
     FROM users u LEFT JOIN departments dep ON dep.id = u.department_id";

fn map_user(row: &Row) -> Result<User, RusqliteError> {
    let department_id: Option<i64> = row.get(6)?;
    let department = match (department_id, row.get::<_, Option<String>>(7)?, row.get::<_, Option<String>>(8)?) {
        (Some(id), Some(name), Some(code)) => Some(DepartmentRef { id, name, code }),
        _ => None,
    };
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
        role: row.get(4)?,
        is_active: row.get(5)?,
        department_id,
        department,
        avatar: row.get(9)?,
        position: row.get(10)?,
        phone_number: row.get(11)?,
        last_login: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

/// Column values written on insert and on full-row updates.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub department_id: Option<i64>,
    pub position: Option<String>,
    pub phone_number: Option<String>,
}

impl From<&User> for UserRecord {
    fn from(user: &User) -> Self {
        UserRecord {
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_active: user.is_active,
            department_id: user.department_id,
            position: user.position.clone(),
            phone_number: user.phone_number.clone(),
        }
    }
}

pub fn create_user(conn: &Connection, username: &str, password_hash: &str, record: &UserRecord) -> Result<i64, RusqliteError> {
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO users (username, password_hash, full_name, email, role, is_active, department_id, position, phone_number, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            username,
            password_hash,
            record.full_name,
            record.email,
            record.role,
            record.is_active,
            record.department_id,
            record.position,
            record.phone_number,
            now
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_user(conn: &Connection, user_id: i64) -> Result<Option<User>, RusqliteError> {
    conn.query_row(&format!("{} WHERE u.id = ?1", USER_SELECT), [user_id], map_user)
        .optional()
}

pub fn read_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, RusqliteError> {
    conn.query_row(&format!("{} WHERE u.username = ?1", USER_SELECT), [username], map_user)
        .optional()
}

/// `(id, password_hash)` for a username, used only by login.
pub fn read_credentials(conn: &Connection, username: &str) -> Result<Option<(i64, String)>, RusqliteError> {
    conn.query_row(
        "SELECT id, password_hash FROM users WHERE username = ?1",
        [username],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

pub fn read_password_hash(conn: &Connection, user_id: i64) -> Result<Option<String>, RusqliteError> {
    conn.query_row("SELECT password_hash FROM users WHERE id = ?1", [user_id], |row| row.get(0))
        .optional()
}

pub fn read_all_users(conn: &Connection) -> Result<Vec<User>, RusqliteError> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY u.created_at DESC, u.id DESC", USER_SELECT))?;
    let rows = stmt.query_map([], map_user)?;
    rows.collect()
}

pub fn read_users_by_role(conn: &Connection, role: Role) -> Result<Vec<User>, RusqliteError> {
    let mut stmt = conn.prepare(&format!("{} WHERE u.role = ?1 ORDER BY u.id", USER_SELECT))?;
    let rows = stmt.query_map([role], map_user)?;
    rows.collect()
}

pub fn read_users_in_department(conn: &Connection, department_id: i64) -> Result<Vec<User>, RusqliteError> {
    let mut stmt = conn.prepare(&format!("{} WHERE u.department_id = ?1 ORDER BY u.full_name", USER_SELECT))?;
    let rows = stmt.query_map([department_id], map_user)?;
    rows.collect()
}

pub fn username_exists(conn: &Connection, username: &str) -> Result<bool, RusqliteError> {
    conn.query_row("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)", [username], |row| row.get(0))
}

/// Whether `email` belongs to a user other than `except_id`.
pub fn email_taken(conn: &Connection, email: &str, except_id: Option<i64>) -> Result<bool, RusqliteError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 AND (?2 IS NULL OR id != ?2))",
        params![email, except_id],
        |row| row.get(0),
    )
}

pub fn update_user(conn: &Connection, user_id: i64, record: &UserRecord) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE users SET full_name = ?1, email = ?2, role = ?3, is_active = ?4, department_id = ?5,
             position = ?6, phone_number = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            record.full_name,
            record.email,
            record.role,
            record.is_active,
            record.department_id,
            record.position,
            record.phone_number,
            now_timestamp(),
            user_id
        ],
    )
}

pub fn set_avatar(conn: &Connection, user_id: i64, avatar: Option<&str>) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE users SET avatar = ?1, updated_at = ?2 WHERE id = ?3",
        params![avatar, now_timestamp(), user_id],
    )
}

pub fn set_active(conn: &Connection, user_id: i64, is_active: bool) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        params![is_active, now_timestamp(), user_id],
    )
}

pub fn update_password_hash(conn: &Connection, user_id: i64, password_hash: &str) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
        params![password_hash, now_timestamp(), user_id],
    )
}

pub fn delete_user(conn: &Connection, user_id: i64) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM users WHERE id = ?1", [user_id])
}

pub fn update_last_login_time(conn: &Connection, user_id: i64) -> Result<(), RusqliteError> {
    conn.execute("UPDATE users SET last_login = ?1 WHERE id = ?2", params![now_timestamp(), user_id])?;
    Ok(())
}

pub fn count_active_admins(conn: &Connection) -> Result<i64, RusqliteError> {
    conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active = 1",
        [],
        |row| row.get(0),
    )
}

pub fn count_users(conn: &Connection) -> Result<i64, RusqliteError> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
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

    fn record(name: &str, email: &str, role: Role) -> UserRecord {
        UserRecord {
            full_name: name.into(),
            email: email.into(),
            role,
            is_active: true,
            department_id: None,
            position: None,
            phone_number: None,
        }
    }

    #[test]
    fn create_and_read_back() {
        let conn = test_conn();
        let id = create_user(&conn, "alice", "hash", &record("Alice", "alice@example.org", Role::Manager)).unwrap();
        let user = read_user(&conn, id).unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, Role::Manager);
        assert!(user.department.is_none());
        assert_eq!(read_credentials(&conn, "alice").unwrap(), Some((id, "hash".to_string())));
        assert!(read_user(&conn, id + 100).unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_rejected_by_schema() {
        let conn = test_conn();
        create_user(&conn, "bob", "h", &record("Bob", "bob@example.org", Role::Staff)).unwrap();
        assert!(create_user(&conn, "bob", "h", &record("Bob", "bob2@example.org", Role::Staff)).is_err());
        assert!(username_exists(&conn, "bob").unwrap());
    }

    #[test]
    fn email_taken_ignores_self() {
        let conn = test_conn();
        let id = create_user(&conn, "carol", "h", &record("Carol", "carol@example.org", Role::Staff)).unwrap();
        assert!(email_taken(&conn, "carol@example.org", None).unwrap());
        assert!(!email_taken(&conn, "carol@example.org", Some(id)).unwrap());
    }

    #[test]
    fn active_admin_count_tracks_status() {
        let conn = test_conn();
        let id = create_user(&conn, "root", "h", &record("Root", "root@example.org", Role::Admin)).unwrap();
        assert_eq!(count_active_admins(&conn).unwrap(), 1);
        set_active(&conn, id, false).unwrap();
        assert_eq!(count_active_admins(&conn).unwrap(), 0);
    }
}
