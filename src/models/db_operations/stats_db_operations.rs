use crate::models::CategoryCount;
use rusqlite::{Connection, Error as RusqliteError};

/// Portal-wide totals, independent of the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub news_count: i64,
    pub documents_count: i64,
    pub total_views: i64,
    pub total_downloads: i64,
}

pub fn read_totals(conn: &Connection) -> Result<Totals, RusqliteError> {
    let (news_count, total_views) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(views), 0) FROM news",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let (documents_count, total_downloads) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(download_count), 0) FROM documents",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(Totals { news_count, documents_count, total_views, total_downloads })
}

fn count_by_category(conn: &Connection, table: &str) -> Result<Vec<CategoryCount>, RusqliteError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT category, COUNT(*) FROM {} GROUP BY category ORDER BY COUNT(*) DESC, category",
        table
    ))?;
    let rows = stmt.query_map([], |row| Ok(CategoryCount { category: row.get(0)?, count: row.get(1)? }))?;
    rows.collect()
}

pub fn news_by_category(conn: &Connection) -> Result<Vec<CategoryCount>, RusqliteError> {
    count_by_category(conn, "news")
}

pub fn documents_by_category(conn: &Connection) -> Result<Vec<CategoryCount>, RusqliteError> {
    count_by_category(conn, "documents")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::setup_portal_db;

    #[test]
    fn empty_portal_has_zero_totals() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_portal_db(&mut conn).unwrap();
        assert_eq!(read_totals(&conn).unwrap(), Totals::default());
        assert!(news_by_category(&conn).unwrap().is_empty());
    }

    #[test]
    fn categories_are_grouped() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_portal_db(&mut conn).unwrap();
        conn.execute_batch(
            "INSERT INTO news (title, content, category, views, created_at, updated_at) VALUES
                ('a', 'x', 'event', 3, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z'),
                ('b', 'x', 'event', 4, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z'),
                ('c', 'x', 'policy', 0, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z');",
        )
        .unwrap();
        let counts = news_by_category(&conn).unwrap();
        assert_eq!(counts[0], CategoryCount { category: "event".into(), count: 2 });
        assert_eq!(read_totals(&conn).unwrap().total_views, 7);
    }
}
