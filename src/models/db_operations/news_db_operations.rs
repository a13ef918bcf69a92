use crate::helper::query_helpers::{NewsFilter, Page, PageRequest};
use crate::models::{now_timestamp, News, NewsCategory, UserSummary};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

const NEWS_SELECT: &str = "SELECT n.id, n.title, n.content, n.summary, n.thumbnail, n.category, n.views, n.is_published, \
     n.author_id, a.full_name, a.avatar, n.created_at, n.updated_at \
     FROM news n LEFT JOIN users a ON a.id = n.author_id";

fn map_news(row: &Row) -> Result<News, RusqliteError> {
    let author_id: Option<i64> = row.get(8)?;
    let author = match (author_id, row.get::<_, Option<String>>(9)?) {
        (Some(id), Some(full_name)) => Some(UserSummary { id, full_name, avatar: row.get(10)? }),
        _ => None,
    };
    Ok(News {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        summary: row.get(3)?,
        thumbnail: row.get(4)?,
        category: row.get(5)?,
        views: row.get(6)?,
        is_published: row.get(7)?,
        author_id,
        author,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsRecord {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub category: NewsCategory,
    pub is_published: bool,
}

impl From<&News> for NewsRecord {
    fn from(n: &News) -> Self {
        NewsRecord {
            title: n.title.clone(),
            content: n.content.clone(),
            summary: n.summary.clone(),
            category: n.category,
            is_published: n.is_published,
        }
    }
}

pub fn create_news(conn: &Connection, record: &NewsRecord, thumbnail: Option<&str>, author_id: i64) -> Result<i64, RusqliteError> {
    conn.execute(
        "INSERT INTO news (title, content, summary, thumbnail, category, is_published, author_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            record.title,
            record.content,
            record.summary,
            thumbnail,
            record.category,
            record.is_published,
            author_id,
            now_timestamp()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_news(conn: &Connection, id: i64) -> Result<Option<News>, RusqliteError> {
    conn.query_row(&format!("{} WHERE n.id = ?1", NEWS_SELECT), [id], map_news)
        .optional()
}

/// One page of news, newest first, restricted by `filter`.
pub fn list_news(conn: &Connection, filter: &NewsFilter, page: PageRequest) -> Result<Page<News>, RusqliteError> {
    let clause = filter.where_clause();
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM news n{}", clause.sql()),
        clause.params().as_slice(),
        |row| row.get(0),
    )?;

    let (limit, offset) = (page.limit(), page.offset());
    let mut args = clause.params();
    args.push(&limit as &dyn ToSql);
    args.push(&offset as &dyn ToSql);
    let mut stmt = conn.prepare(&format!(
        "{}{} ORDER BY n.created_at DESC, n.id DESC LIMIT ? OFFSET ?",
        NEWS_SELECT,
        clause.sql()
    ))?;
    let items = stmt
        .query_map(args.as_slice(), map_news)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page { items, total, request: page })
}

pub fn update_news(conn: &Connection, id: i64, record: &NewsRecord) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE news SET title = ?1, content = ?2, summary = ?3, category = ?4, is_published = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            record.title,
            record.content,
            record.summary,
            record.category,
            record.is_published,
            now_timestamp(),
            id
        ],
    )
}

pub fn set_thumbnail(conn: &Connection, id: i64, thumbnail: Option<&str>) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE news SET thumbnail = ?1, updated_at = ?2 WHERE id = ?3",
        params![thumbnail, now_timestamp(), id],
    )
}

/// Flips the published flag in place.
pub fn toggle_published(conn: &Connection, id: i64) -> Result<usize, RusqliteError> {
    conn.execute(
        "UPDATE news SET is_published = 1 - is_published, updated_at = ?1 WHERE id = ?2",
        params![now_timestamp(), id],
    )
}

/// Atomic `views + 1`. Does not touch `updated_at`.
pub fn increment_views(conn: &Connection, id: i64) -> Result<usize, RusqliteError> {
    conn.execute("UPDATE news SET views = views + 1 WHERE id = ?1", [id])
}

pub fn delete_news(conn: &Connection, id: i64) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM news WHERE id = ?1", [id])
}
