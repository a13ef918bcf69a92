use chrono::{SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a closed, lowercase-named enum that round-trips through JSON and
/// SQLite TEXT columns.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "'{}' is not a valid {}. Expected one of: {}",
                        other,
                        stringify!($name),
                        [$($text),+].join(", ")
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value.as_str()?.parse().map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(
    /// Portal-wide role of a user.
    Role {
        Admin => "admin",
        Manager => "manager",
        Staff => "staff",
    }
);

text_enum!(
    NewsCategory {
        Announcement => "announcement",
        Policy => "policy",
        Event => "event",
        Training => "training",
        Report => "report",
        Other => "other",
    }
);

text_enum!(
    DocumentCategory {
        Regulation => "regulation",
        Report => "report",
        Form => "form",
        Plan => "plan",
        Official => "official",
        Other => "other",
    }
);

impl Default for Role {
    fn default() -> Self {
        Role::Staff
    }
}

impl Default for NewsCategory {
    fn default() -> Self {
        NewsCategory::Other
    }
}

impl Default for DocumentCategory {
    fn default() -> Self {
        DocumentCategory::Other
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so they sort correctly.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The authenticated caller, as resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: i64,
    pub role: Role,
    pub department_id: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRef {
    pub id: i64,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub full_name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub department_id: Option<i64>,
    pub department: Option<DepartmentRef>,
    pub avatar: Option<String>,
    pub position: Option<String>,
    pub phone_number: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            role: self.role,
            department_id: self.department_id,
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub head_of_department: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct News {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub thumbnail: Option<String>,
    pub category: NewsCategory,
    pub views: i64,
    pub is_published: bool,
    pub author_id: Option<i64>,
    pub author: Option<UserSummary>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub category: DocumentCategory,
    pub download_count: i64,
    pub is_public: bool,
    pub uploader_id: Option<i64>,
    pub uploader: Option<UserSummary>,
    pub department_id: Option<i64>,
    pub department: Option<DepartmentRef>,
    pub created_at: String,
    pub updated_at: String,
}

/// Envelope shared by every list endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T: Serialize> {
    pub success: bool,
    pub count: i64,
    pub total_pages: i64,
    pub current_page: u32,
    pub data: Vec<T>,
}

/// Envelope shared by every mutation endpoint.
#[derive(Debug, Serialize)]
pub struct MessageResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> MessageResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        MessageResponse { success: true, message: message.into(), data: Some(data) }
    }
}

impl MessageResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        MessageResponse { success: true, message: message.into(), data: None }
    }
}

/// Envelope for unpaged collections.
#[derive(Debug, Serialize)]
pub struct CollectionResponse<T: Serialize> {
    pub success: bool,
    pub count: usize,
    pub data: Vec<T>,
}

impl<T: Serialize> CollectionResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        CollectionResponse { success: true, count: data.len(), data }
    }
}

/// Envelope for single-item reads.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> DataResponse<T> {
    pub fn new(data: T) -> Self {
        DataResponse { success: true, data }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub users_count: i64,
    pub departments_count: i64,
    pub news_count: i64,
    pub documents_count: i64,
    pub total_views: i64,
    pub total_downloads: i64,
    pub documents_by_category: Vec<CategoryCount>,
    pub news_by_category: Vec<CategoryCount>,
    pub recent_news: Vec<News>,
    pub recent_documents: Vec<Document>,
}

pub mod db_operations;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_parse_and_reject() {
        assert_eq!("manager".parse::<Role>(), Ok(Role::Manager));
        assert_eq!("form".parse::<DocumentCategory>(), Ok(DocumentCategory::Form));
        let err = "gossip".parse::<NewsCategory>().unwrap_err();
        assert!(err.contains("announcement"), "error should list allowed values: {err}");
    }

    #[test]
    fn text_enums_serialize_lowercase() {
        let json = serde_json::to_string(&NewsCategory::Training).unwrap();
        assert_eq!(json, "\"training\"");
    }
}
