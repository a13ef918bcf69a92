use crate::error::ApiError;
use crate::models::{DocumentCategory, ListResponse, NewsCategory};
use crate::policy::{DocumentScope, NewsScope};
use rusqlite::types::ToSql;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Query-string parameters accepted by every listing endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub department_id: Option<String>,
    pub search: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ListQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }

    pub fn news_filter(&self, scope: NewsScope) -> Result<NewsFilter, ApiError> {
        Ok(NewsFilter {
            scope,
            category: non_blank(&self.category)
                .map(|c| c.parse::<NewsCategory>().map_err(ApiError::Validation))
                .transpose()?,
            search: non_blank(&self.search).map(str::to_string),
        })
    }

    pub fn document_filter(&self, scope: DocumentScope) -> Result<DocumentFilter, ApiError> {
        Ok(DocumentFilter {
            scope,
            category: non_blank(&self.category)
                .map(|c| c.parse::<DocumentCategory>().map_err(ApiError::Validation))
                .transpose()?,
            department_id: non_blank(&self.department_id)
                .map(|d| d.parse::<i64>().map_err(|_| ApiError::Validation("'departmentId' must be a numeric id.".to_string())))
                .transpose()?,
            search: non_blank(&self.search).map(str::to_string),
        })
    }
}

/// A 1-based page with a bounded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        PageRequest {
            page: page.unwrap_or(1).max(1),
            page_size: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        let size = i64::from(self.page_size);
        (total + size - 1) / size
    }
}

/// One page of results plus the unpaged total.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub request: PageRequest,
}

impl<T: Serialize> Page<T> {
    pub fn into_response(self) -> ListResponse<T> {
        ListResponse {
            success: true,
            count: self.total,
            total_pages: self.request.total_pages(self.total),
            current_page: self.request.page,
            data: self.items,
        }
    }
}

/// Accumulates `AND`-ed SQL predicates with their positional parameters.
#[derive(Default)]
pub struct WhereClause {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl WhereClause {
    pub fn push(&mut self, clause: impl Into<String>, params: Vec<Box<dyn ToSql>>) {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    /// Case-insensitive substring match of `term` against any of `columns`.
    pub fn push_contains(&mut self, columns: &[&str], term: &str) {
        let clause = columns
            .iter()
            .map(|c| format!("instr(lower({}), lower(?)) > 0", c))
            .collect::<Vec<_>>()
            .join(" OR ");
        let params = columns.iter().map(|_| Box::new(term.to_string()) as Box<dyn ToSql>).collect();
        self.push(format!("({})", clause), params);
    }

    pub fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewsFilter {
    pub scope: NewsScope,
    pub category: Option<NewsCategory>,
    pub search: Option<String>,
}

impl NewsFilter {
    /// Builds the predicate over the `n` (news) alias. The visibility scope
    /// is always part of it, so counts and pages agree.
    pub fn where_clause(&self) -> WhereClause {
        let mut w = WhereClause::default();
        if self.scope == NewsScope::PublishedOnly {
            w.push("n.is_published = 1", vec![]);
        }
        if let Some(category) = self.category {
            w.push("n.category = ?", vec![Box::new(category) as Box<dyn ToSql>]);
        }
        if let Some(term) = &self.search {
            w.push_contains(&["n.title", "n.content"], term);
        }
        w
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFilter {
    pub scope: DocumentScope,
    pub category: Option<DocumentCategory>,
    pub department_id: Option<i64>,
    pub search: Option<String>,
}

impl DocumentFilter {
    /// Builds the predicate over the `d` (documents) alias.
    pub fn where_clause(&self) -> WhereClause {
        let mut w = WhereClause::default();
        match self.scope {
            DocumentScope::Everything => {}
            DocumentScope::PublicOrDepartment(Some(department_id)) => {
                w.push("(d.is_public = 1 OR d.department_id = ?)", vec![Box::new(department_id) as Box<dyn ToSql>]);
            }
            DocumentScope::PublicOrDepartment(None) => w.push("(d.is_public = 1 OR d.department_id IS NULL)", vec![]),
        }
        if let Some(category) = self.category {
            w.push("d.category = ?", vec![Box::new(category) as Box<dyn ToSql>]);
        }
        if let Some(department_id) = self.department_id {
            w.push("d.department_id = ?", vec![Box::new(department_id) as Box<dyn ToSql>]);
        }
        if let Some(term) = &self.search {
            w.push_contains(&["d.title", "d.description"], term);
        }
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, None, 1, 10, 0)]
    #[case(Some(0), Some(0), 1, 1, 0)]
    #[case(Some(3), Some(20), 3, 20, 40)]
    #[case(Some(2), Some(5000), 2, MAX_PAGE_SIZE, 100)]
    fn page_request_normalisation(
        #[case] page: Option<u32>,
        #[case] limit: Option<u32>,
        #[case] expected_page: u32,
        #[case] expected_size: u32,
        #[case] expected_offset: i64,
    ) {
        let req = PageRequest::new(page, limit);
        assert_eq!(req.page, expected_page);
        assert_eq!(req.page_size, expected_size);
        assert_eq!(req.offset(), expected_offset);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(10, 1)]
    #[case(11, 2)]
    fn total_pages_rounds_up(#[case] total: i64, #[case] pages: i64) {
        assert_eq!(PageRequest::new(None, Some(10)).total_pages(total), pages);
    }

    #[test]
    fn out_of_range_page_keeps_page_number() {
        let page: Page<i32> = Page { items: vec![], total: 3, request: PageRequest::new(Some(9), None) };
        let response = page.into_response();
        assert_eq!(response.current_page, 9);
        assert_eq!(response.total_pages, 1);
        assert!(response.data.is_empty());
    }

    #[test]
    fn staff_news_filter_ands_published_with_search() {
        let query = ListQuery { search: Some(" budget ".into()), category: Some("event".into()), ..Default::default() };
        let filter = query.news_filter(NewsScope::PublishedOnly).unwrap();
        let w = filter.where_clause();
        assert_eq!(
            w.sql(),
            " WHERE n.is_published = 1 AND n.category = ? AND (instr(lower(n.title), lower(?)) > 0 OR instr(lower(n.content), lower(?)) > 0)"
        );
        assert_eq!(w.params().len(), 3);
    }

    #[test]
    fn document_scope_without_department_includes_unfiled() {
        let filter = ListQuery::default().document_filter(DocumentScope::PublicOrDepartment(None)).unwrap();
        assert_eq!(filter.where_clause().sql(), " WHERE (d.is_public = 1 OR d.department_id IS NULL)");
        assert!(filter.where_clause().params().is_empty());
        let admin = ListQuery::default().document_filter(DocumentScope::Everything).unwrap();
        assert_eq!(admin.where_clause().sql(), "");
    }

    #[test]
    fn bad_filters_are_validation_errors() {
        let q = ListQuery { category: Some("gossip".into()), ..Default::default() };
        assert!(matches!(q.news_filter(NewsScope::Everything), Err(ApiError::Validation(_))));
        let q = ListQuery { department_id: Some("abc".into()), ..Default::default() };
        assert!(matches!(q.document_filter(DocumentScope::Everything), Err(ApiError::Validation(_))));
        let q = ListQuery { department_id: Some("".into()), ..Default::default() };
        assert_eq!(q.document_filter(DocumentScope::Everything).unwrap().department_id, None);
    }
}
