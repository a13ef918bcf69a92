use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn setup_portal_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    println!("- Creating 'departments' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS departments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            code TEXT NOT NULL UNIQUE,
            description TEXT,
            head_of_department TEXT,
            phone_number TEXT,
            email TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    println!("- Creating 'users' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL DEFAULT 'staff' CHECK(role IN ('admin', 'manager', 'staff')),
            is_active INTEGER NOT NULL DEFAULT 1,
            department_id INTEGER,
            avatar TEXT,
            position TEXT,
            phone_number TEXT,
            last_login TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (department_id) REFERENCES departments(id) ON DELETE RESTRICT
        )",
        [],
    )?;

    println!("- Creating 'news' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS news (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            summary TEXT,
            thumbnail TEXT,
            category TEXT NOT NULL DEFAULT 'other'
                CHECK(category IN ('announcement', 'policy', 'event', 'training', 'report', 'other')),
            views INTEGER NOT NULL DEFAULT 0,
            is_published INTEGER NOT NULL DEFAULT 0,
            author_id INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL
        )",
        [],
    )?;

    println!("- Creating 'documents' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            file_type TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'other'
                CHECK(category IN ('regulation', 'report', 'form', 'plan', 'official', 'other')),
            download_count INTEGER NOT NULL DEFAULT 0,
            is_public INTEGER NOT NULL DEFAULT 0,
            uploader_id INTEGER,
            department_id INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (uploader_id) REFERENCES users(id) ON DELETE SET NULL,
            FOREIGN KEY (department_id) REFERENCES departments(id) ON DELETE SET NULL
        )",
        [],
    )?;

    println!("- Creating indexes...");
    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_users_department ON users(department_id);
         CREATE INDEX IF NOT EXISTS idx_news_created ON news(created_at);
         CREATE INDEX IF NOT EXISTS idx_documents_created ON documents(created_at);
         CREATE INDEX IF NOT EXISTS idx_documents_department ON documents(department_id);",
    )?;

    tx.commit()?;
    Ok(())
}
