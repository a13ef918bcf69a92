use crate::error::ApiError;
use crate::helper::asset_store::{AssetKind, AssetStore, IncomingFile};
use crate::helper::query_helpers::{ListQuery, Page};
use crate::helper::upload_helpers::UploadForm;
use crate::models::db_operations::news_db_operations::{self, NewsRecord};
use crate::models::{Identity, News, NewsCategory};
use crate::policy::{NewsFacts, NewsScope, ResourceAction, VisibilityPolicy};
use rusqlite::Connection;

/// Fields of a News create/update form. `None` means "not sent".
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NewsForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub category: Option<NewsCategory>,
    pub is_published: Option<bool>,
}

impl NewsForm {
    pub fn from_upload(form: &UploadForm) -> Result<Self, ApiError> {
        Ok(NewsForm {
            title: form.text("title").map(str::to_string),
            content: form.text("content").map(str::to_string),
            summary: form.text("summary").map(str::to_string),
            category: form.parse::<NewsCategory>("category")?,
            is_published: form.flag("isPublished"),
        })
    }
}

fn not_found() -> ApiError {
    ApiError::NotFound("News not found.".to_string())
}

fn load(conn: &Connection, id: i64) -> Result<News, ApiError> {
    news_db_operations::read_news(conn, id)?.ok_or_else(not_found)
}

pub fn list_news(conn: &Connection, policy: &VisibilityPolicy, who: &Identity, query: &ListQuery) -> Result<Page<News>, ApiError> {
    let filter = query.news_filter(policy.news_scope(who))?;
    Ok(news_db_operations::list_news(conn, &filter, query.page_request())?)
}

pub fn list_public_news(conn: &Connection, query: &ListQuery) -> Result<Page<News>, ApiError> {
    let filter = query.news_filter(NewsScope::PublishedOnly)?;
    Ok(news_db_operations::list_news(conn, &filter, query.page_request())?)
}

/// Counts the view only after the read is authorized, then returns the
/// row as stored after the increment.
fn record_view(conn: &Connection, news: &News) -> Result<News, ApiError> {
    if news_db_operations::increment_views(conn, news.id)? == 0 {
        return Err(not_found());
    }
    load(conn, news.id)
}

pub fn read_news(conn: &Connection, policy: &VisibilityPolicy, who: &Identity, id: i64) -> Result<News, ApiError> {
    let news = load(conn, id)?;
    policy
        .news(who, NewsFacts::from(&news), ResourceAction::Read)
        .require("You do not have permission to view this news item.")?;
    record_view(conn, &news)
}

pub fn read_public_news(conn: &Connection, policy: &VisibilityPolicy, id: i64) -> Result<News, ApiError> {
    let news = load(conn, id)?;
    policy
        .public_news(NewsFacts::from(&news))
        .require("You do not have permission to view this news item.")?;
    record_view(conn, &news)
}

pub fn create_news(
    conn: &Connection,
    assets: &AssetStore,
    policy: &VisibilityPolicy,
    who: &Identity,
    form: NewsForm,
    thumbnail: Option<IncomingFile>,
) -> Result<News, ApiError> {
    policy
        .create_news(who)
        .require("Only admins and managers can create news.")?;
    let record = NewsRecord {
        title: form.title.ok_or_else(|| ApiError::Validation("Title is required.".to_string()))?,
        content: form.content.ok_or_else(|| ApiError::Validation("Content is required.".to_string()))?,
        summary: form.summary,
        category: form.category.unwrap_or_default(),
        is_published: form.is_published.unwrap_or(false),
    };

    let thumbnail_key = thumbnail.map(|file| assets.store(AssetKind::Thumbnail, &file)).transpose()?;
    match news_db_operations::create_news(conn, &record, thumbnail_key.as_deref(), who.id) {
        Ok(id) => load(conn, id),
        Err(e) => {
            if let Some(key) = thumbnail_key.as_deref() {
                assets.discard_orphan(AssetKind::Thumbnail, key);
            }
            Err(e.into())
        }
    }
}

pub fn update_news(
    conn: &Connection,
    assets: &AssetStore,
    policy: &VisibilityPolicy,
    who: &Identity,
    id: i64,
    form: NewsForm,
    thumbnail: Option<IncomingFile>,
) -> Result<News, ApiError> {
    let existing = load(conn, id)?;
    policy
        .news(who, NewsFacts::from(&existing), ResourceAction::Update)
        .require("You do not have permission to update this news item.")?;

    let mut record = NewsRecord::from(&existing);
    if let Some(title) = form.title {
        record.title = title;
    }
    if let Some(content) = form.content {
        record.content = content;
    }
    if form.summary.is_some() {
        record.summary = form.summary;
    }
    if let Some(category) = form.category {
        record.category = category;
    }
    if let Some(is_published) = form.is_published {
        record.is_published = is_published;
    }

    match thumbnail {
        Some(file) => assets.replace(AssetKind::Thumbnail, existing.thumbnail.as_deref(), &file, |key| {
            let tx = conn.unchecked_transaction()?;
            news_db_operations::update_news(&tx, id, &record)?;
            news_db_operations::set_thumbnail(&tx, id, Some(key))?;
            tx.commit()?;
            Ok::<_, ApiError>(())
        })?,
        None => {
            news_db_operations::update_news(conn, id, &record)?;
        }
    }
    load(conn, id)
}

pub fn delete_news(conn: &Connection, assets: &AssetStore, policy: &VisibilityPolicy, who: &Identity, id: i64) -> Result<(), ApiError> {
    let news = load(conn, id)?;
    policy
        .news(who, NewsFacts::from(&news), ResourceAction::Delete)
        .require("You do not have permission to delete this news item.")?;
    news_db_operations::delete_news(conn, id)?;
    if let Some(key) = news.thumbnail.as_deref() {
        if let Err(e) = assets.delete(AssetKind::Thumbnail, key) {
            log::warn!("News {} deleted but thumbnail {} was not released: {}", id, key, e);
        }
    }
    Ok(())
}

pub fn toggle_publish(conn: &Connection, policy: &VisibilityPolicy, who: &Identity, id: i64) -> Result<News, ApiError> {
    let news = load(conn, id)?;
    policy
        .news(who, NewsFacts::from(&news), ResourceAction::TogglePublish)
        .require("You do not have permission to change the publish status of this news item.")?;
    news_db_operations::toggle_published(conn, id)?;
    load(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::policy::PolicyRules;
    use crate::setup::db_setup::setup_portal_db;
    use tempfile::TempDir;

    struct Fixture {
        conn: Connection,
        assets: AssetStore,
        _dir: TempDir,
        admin: Identity,
        manager: Identity,
        other_manager: Identity,
        staff: Identity,
    }

    fn fixture() -> Fixture {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        setup_portal_db(&mut conn).unwrap();
        for (name, role) in [("admin", "admin"), ("manager", "manager"), ("staff", "staff"), ("manager2", "manager")] {
            conn.execute(
                "INSERT INTO users (username, password_hash, full_name, email, role, created_at, updated_at)
                 VALUES (?1, 'h', ?1, ?1 || '@example.org', ?2, 'now', 'now')",
                [name, role],
            )
            .unwrap();
        }
        let dir = TempDir::new().unwrap();
        let identity = |id, role| Identity { id, role, department_id: None, is_active: true };
        Fixture {
            conn,
            assets: AssetStore::new(dir.path()),
            _dir: dir,
            admin: identity(1, Role::Admin),
            manager: identity(2, Role::Manager),
            staff: identity(3, Role::Staff),
            other_manager: identity(4, Role::Manager),
        }
    }

    fn draft(title: &str) -> NewsForm {
        NewsForm { title: Some(title.into()), content: Some("Body".into()), ..Default::default() }
    }

    #[test]
    fn unpublished_news_scenario() {
        let f = fixture();
        let policy = VisibilityPolicy::default();
        let news = create_news(&f.conn, &f.assets, &policy, &f.manager, draft("Draft"), None).unwrap();
        assert!(!news.is_published);
        assert_eq!(news.author_id, Some(f.manager.id));

        let denied = read_news(&f.conn, &policy, &f.staff, news.id);
        assert!(matches!(denied, Err(ApiError::Forbidden(_))));
        assert_eq!(load(&f.conn, news.id).unwrap().views, 0);

        let seen = read_news(&f.conn, &policy, &f.admin, news.id).unwrap();
        assert_eq!(seen.views, 1);

        let staff_page = list_news(&f.conn, &policy, &f.staff, &ListQuery::default()).unwrap();
        assert_eq!(staff_page.total, 0);
        let public = read_public_news(&f.conn, &policy, news.id);
        assert!(matches!(public, Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn staff_cannot_create_news() {
        let f = fixture();
        let policy = VisibilityPolicy::default();
        let result = create_news(&f.conn, &f.assets, &policy, &f.staff, draft("Nope"), None);
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn manager_moderation_is_configurable() {
        let f = fixture();
        let strict = VisibilityPolicy::default();
        let news = create_news(&f.conn, &f.assets, &strict, &f.manager, draft("Owned"), None).unwrap();
        assert!(matches!(toggle_publish(&f.conn, &strict, &f.other_manager, news.id), Err(ApiError::Forbidden(_))));

        let relaxed = VisibilityPolicy::new(PolicyRules { managers_moderate_all_news: true, ..Default::default() });
        let toggled = toggle_publish(&f.conn, &relaxed, &f.other_manager, news.id).unwrap();
        assert!(toggled.is_published);
    }

    #[test]
    fn thumbnail_is_replaced_and_released() {
        let f = fixture();
        let policy = VisibilityPolicy::default();
        let image = |bytes: &[u8]| IncomingFile {
            original_name: "cover.jpg".into(),
            mime_type: "image/jpeg".into(),
            bytes: bytes.to_vec(),
        };
        let news = create_news(&f.conn, &f.assets, &policy, &f.manager, draft("Pictured"), Some(image(b"a"))).unwrap();
        let first = news.thumbnail.clone().unwrap();

        let updated = update_news(&f.conn, &f.assets, &policy, &f.manager, news.id, NewsForm::default(), Some(image(b"b"))).unwrap();
        let second = updated.thumbnail.clone().unwrap();
        assert_eq!(updated.title, "Pictured");
        assert!(f.assets.locate(AssetKind::Thumbnail, &first).is_err());
        assert!(f.assets.locate(AssetKind::Thumbnail, &second).is_ok());

        delete_news(&f.conn, &f.assets, &policy, &f.admin, news.id).unwrap();
        assert!(f.assets.locate(AssetKind::Thumbnail, &second).is_err());
        assert!(matches!(load(&f.conn, news.id), Err(ApiError::NotFound(_))));
    }
}
