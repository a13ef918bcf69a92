use crate::error::ApiError;
use crate::helper::query_helpers::{ListQuery, PageRequest};
use crate::models::db_operations::{
    departments_db_operations, documents_db_operations, news_db_operations, stats_db_operations, users_db_operations,
};
use crate::models::{Identity, OverviewStats};
use crate::policy::VisibilityPolicy;
use rusqlite::Connection;

const RECENT_ITEMS: u32 = 5;

/// Totals are portal-wide; the recent lists go through the caller's
/// listing scope so they never leak items the caller could not list.
pub fn overview(conn: &Connection, policy: &VisibilityPolicy, who: &Identity) -> Result<OverviewStats, ApiError> {
    let totals = stats_db_operations::read_totals(conn)?;
    let recent = PageRequest::new(Some(1), Some(RECENT_ITEMS));
    let unfiltered = ListQuery::default();

    let recent_news = news_db_operations::list_news(conn, &unfiltered.news_filter(policy.news_scope(who))?, recent)?;
    let recent_documents =
        documents_db_operations::list_documents(conn, &unfiltered.document_filter(policy.document_scope(who))?, recent)?;

    Ok(OverviewStats {
        users_count: users_db_operations::count_users(conn)?,
        departments_count: departments_db_operations::count_departments(conn)?,
        news_count: totals.news_count,
        documents_count: totals.documents_count,
        total_views: totals.total_views,
        total_downloads: totals.total_downloads,
        documents_by_category: stats_db_operations::documents_by_category(conn)?,
        news_by_category: stats_db_operations::news_by_category(conn)?,
        recent_news: recent_news.items,
        recent_documents: recent_documents.items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::setup::db_setup::setup_portal_db;

    #[test]
    fn recent_news_respects_caller_scope() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_portal_db(&mut conn).unwrap();
        conn.execute_batch(
            "INSERT INTO news (title, content, is_published, views, created_at, updated_at) VALUES
                ('draft', 'x', 0, 2, '2024-01-02T00:00:00.000Z', '2024-01-02T00:00:00.000Z'),
                ('live', 'x', 1, 5, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z');",
        )
        .unwrap();
        let policy = VisibilityPolicy::default();
        let staff = Identity { id: 9, role: Role::Staff, department_id: None, is_active: true };
        let manager = Identity { id: 8, role: Role::Manager, department_id: None, is_active: true };

        let for_staff = overview(&conn, &policy, &staff).unwrap();
        assert_eq!(for_staff.news_count, 2);
        assert_eq!(for_staff.total_views, 7);
        assert_eq!(for_staff.recent_news.len(), 1);
        assert_eq!(for_staff.recent_news[0].title, "live");

        let for_manager = overview(&conn, &policy, &manager).unwrap();
        assert_eq!(for_manager.recent_news[0].title, "draft");
    }
}
