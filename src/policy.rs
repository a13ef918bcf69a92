//! Access rules for News, Documents and administrative resources.
//!
//! Everything here is a pure function of the caller's [`Identity`] and a
//! snapshot of the resource's stored attributes, so the rules can be checked
//! without a database.

use crate::error::ApiError;
use crate::models::{Document, Identity, News, Role};

/// Operations on a resource that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAction {
    Read,
    Update,
    Delete,
    TogglePublish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotVisible,
    Unpublished,
    NotOwner,
    RoleRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Turns a denial into a 403 carrying `message`.
    pub fn require(self, message: &str) -> Result<(), ApiError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                log::debug!("Access denied ({:?}): {}", reason, message);
                Err(ApiError::Forbidden(message.to_string()))
            }
        }
    }

    fn from_bool(allowed: bool, reason: DenyReason) -> Self {
        if allowed { Decision::Allow } else { Decision::Deny(reason) }
    }
}

/// The stored attributes of a Document that access depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentFacts {
    pub is_public: bool,
    pub department_id: Option<i64>,
    pub uploader_id: Option<i64>,
}

impl From<&Document> for DocumentFacts {
    fn from(doc: &Document) -> Self {
        DocumentFacts {
            is_public: doc.is_public,
            department_id: doc.department_id,
            uploader_id: doc.uploader_id,
        }
    }
}

/// The stored attributes of a News item that access depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewsFacts {
    pub is_published: bool,
    pub author_id: Option<i64>,
}

impl From<&News> for NewsFacts {
    fn from(news: &News) -> Self {
        NewsFacts { is_published: news.is_published, author_id: news.author_id }
    }
}

/// Which Documents a listing may include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentScope {
    Everything,
    /// Public documents plus those filed under the given department. `None`
    /// matches documents filed under no department.
    PublicOrDepartment(Option<i64>),
}

/// Which News items a listing may include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsScope {
    Everything,
    PublishedOnly,
}

/// Operator switches for the configurable News rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyRules {
    /// Managers pass the owner-or-admin check on any News item.
    pub managers_moderate_all_news: bool,
    /// Authors may read their own unpublished News.
    pub authors_read_unpublished_news: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityPolicy {
    rules: PolicyRules,
}

fn is_owner(who: &Identity, owner_id: Option<i64>) -> bool {
    owner_id == Some(who.id)
}

fn is_editorial(role: Role) -> bool {
    matches!(role, Role::Admin | Role::Manager)
}

impl VisibilityPolicy {
    pub fn new(rules: PolicyRules) -> Self {
        VisibilityPolicy { rules }
    }

    pub fn rules(&self) -> PolicyRules {
        self.rules
    }

    // --- Documents ---

    pub fn document_scope(&self, who: &Identity) -> DocumentScope {
        if who.role == Role::Admin {
            DocumentScope::Everything
        } else {
            DocumentScope::PublicOrDepartment(who.department_id)
        }
    }

    pub fn document(&self, who: &Identity, doc: DocumentFacts, action: ResourceAction) -> Decision {
        match action {
            // Read covers detail, download and preview.
            ResourceAction::Read => {
                // Two absent departments compare equal, matching the listing scope.
                let same_department = doc.department_id == who.department_id;
                Decision::from_bool(
                    doc.is_public || same_department || who.role == Role::Admin,
                    DenyReason::NotVisible,
                )
            }
            ResourceAction::Update | ResourceAction::Delete | ResourceAction::TogglePublish => {
                Decision::from_bool(
                    is_owner(who, doc.uploader_id) || who.role == Role::Admin,
                    DenyReason::NotOwner,
                )
            }
        }
    }

    /// Any authenticated caller may upload.
    pub fn create_document(&self, _who: &Identity) -> Decision {
        Decision::Allow
    }

    /// Department a new Document is filed under when the upload names none.
    pub fn document_department(&self, who: &Identity, requested: Option<i64>) -> Option<i64> {
        requested.or(who.department_id)
    }

    // --- News ---

    pub fn news_scope(&self, who: &Identity) -> NewsScope {
        if is_editorial(who.role) {
            NewsScope::Everything
        } else {
            NewsScope::PublishedOnly
        }
    }

    pub fn create_news(&self, who: &Identity) -> Decision {
        Decision::from_bool(is_editorial(who.role), DenyReason::RoleRequired)
    }

    pub fn news(&self, who: &Identity, news: NewsFacts, action: ResourceAction) -> Decision {
        match action {
            ResourceAction::Read => {
                let author_exception = self.rules.authors_read_unpublished_news && is_owner(who, news.author_id);
                Decision::from_bool(
                    news.is_published || is_editorial(who.role) || author_exception,
                    DenyReason::Unpublished,
                )
            }
            ResourceAction::Update | ResourceAction::Delete | ResourceAction::TogglePublish => {
                if !is_editorial(who.role) {
                    return Decision::Deny(DenyReason::RoleRequired);
                }
                let moderator = who.role == Role::Admin
                    || (self.rules.managers_moderate_all_news && who.role == Role::Manager);
                Decision::from_bool(is_owner(who, news.author_id) || moderator, DenyReason::NotOwner)
            }
        }
    }

    /// The unauthenticated surface only ever sees published items.
    pub fn public_news(&self, news: NewsFacts) -> Decision {
        Decision::from_bool(news.is_published, DenyReason::Unpublished)
    }

    // --- Administration ---

    pub fn manage_departments(&self, who: &Identity) -> Decision {
        Decision::from_bool(who.role == Role::Admin, DenyReason::RoleRequired)
    }

    pub fn manage_users(&self, who: &Identity) -> Decision {
        Decision::from_bool(who.role == Role::Admin, DenyReason::RoleRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn caller(id: i64, role: Role, department_id: Option<i64>) -> Identity {
        Identity { id, role, department_id, is_active: true }
    }

    fn doc(is_public: bool, department_id: Option<i64>, uploader_id: i64) -> DocumentFacts {
        DocumentFacts { is_public, department_id, uploader_id: Some(uploader_id) }
    }

    fn news(is_published: bool, author_id: i64) -> NewsFacts {
        NewsFacts { is_published, author_id: Some(author_id) }
    }

    #[rstest]
    #[case::private_other_department(caller(3, Role::Staff, Some(2)), doc(false, Some(1), 9), false)]
    #[case::manager_other_department(caller(3, Role::Manager, Some(2)), doc(false, Some(1), 9), false)]
    #[case::public_document(caller(3, Role::Staff, Some(2)), doc(true, Some(1), 9), true)]
    #[case::same_department(caller(3, Role::Staff, Some(1)), doc(false, Some(1), 9), true)]
    #[case::admin_sees_all(caller(1, Role::Admin, Some(4)), doc(false, Some(1), 9), true)]
    #[case::no_department_on_either_side(caller(3, Role::Staff, None), doc(false, None, 9), true)]
    #[case::caller_without_department(caller(3, Role::Staff, None), doc(false, Some(1), 9), false)]
    #[case::document_without_department(caller(3, Role::Staff, Some(1)), doc(false, None, 9), false)]
    fn document_read(#[case] who: Identity, #[case] facts: DocumentFacts, #[case] allowed: bool) {
        let policy = VisibilityPolicy::default();
        assert_eq!(policy.document(&who, facts, ResourceAction::Read).is_allowed(), allowed);
    }

    #[rstest]
    #[case::uploader(caller(9, Role::Staff, Some(1)), true)]
    #[case::admin(caller(1, Role::Admin, None), true)]
    #[case::same_department_colleague(caller(3, Role::Staff, Some(1)), false)]
    #[case::manager(caller(2, Role::Manager, Some(1)), false)]
    fn document_mutation(#[case] who: Identity, #[case] allowed: bool) {
        let policy = VisibilityPolicy::default();
        for action in [ResourceAction::Update, ResourceAction::Delete] {
            assert_eq!(policy.document(&who, doc(true, Some(1), 9), action).is_allowed(), allowed);
        }
    }

    #[test]
    fn orphaned_document_is_admin_only_for_mutation() {
        let policy = VisibilityPolicy::default();
        let facts = DocumentFacts { is_public: true, department_id: None, uploader_id: None };
        assert!(!policy.document(&caller(3, Role::Staff, None), facts, ResourceAction::Delete).is_allowed());
        assert!(policy.document(&caller(1, Role::Admin, None), facts, ResourceAction::Delete).is_allowed());
    }

    #[test]
    fn document_scope_and_default_department() {
        let policy = VisibilityPolicy::default();
        let staff = caller(3, Role::Staff, Some(2));
        assert_eq!(policy.document_scope(&staff), DocumentScope::PublicOrDepartment(Some(2)));
        assert_eq!(policy.document_scope(&caller(1, Role::Admin, None)), DocumentScope::Everything);
        assert_eq!(policy.document_department(&staff, None), Some(2));
        assert_eq!(policy.document_department(&staff, Some(5)), Some(5));
        assert!(policy.create_document(&staff).is_allowed());
    }

    #[rstest]
    #[case::staff_unpublished(caller(3, Role::Staff, None), news(false, 2), false)]
    #[case::staff_published(caller(3, Role::Staff, None), news(true, 2), true)]
    #[case::manager_unpublished(caller(5, Role::Manager, None), news(false, 2), true)]
    #[case::admin_unpublished(caller(1, Role::Admin, None), news(false, 2), true)]
    fn news_read(#[case] who: Identity, #[case] facts: NewsFacts, #[case] allowed: bool) {
        let policy = VisibilityPolicy::default();
        assert_eq!(policy.news(&who, facts, ResourceAction::Read).is_allowed(), allowed);
    }

    #[test]
    fn news_scope_forces_published_for_staff() {
        let policy = VisibilityPolicy::default();
        assert_eq!(policy.news_scope(&caller(3, Role::Staff, None)), NewsScope::PublishedOnly);
        assert_eq!(policy.news_scope(&caller(2, Role::Manager, None)), NewsScope::Everything);
        assert_eq!(policy.news_scope(&caller(1, Role::Admin, None)), NewsScope::Everything);
    }

    #[rstest]
    #[case::author_manager(caller(2, Role::Manager, None), true)]
    #[case::admin(caller(1, Role::Admin, None), true)]
    #[case::other_manager(caller(5, Role::Manager, None), false)]
    #[case::staff(caller(3, Role::Staff, None), false)]
    fn news_mutation_default_rules(#[case] who: Identity, #[case] allowed: bool) {
        let policy = VisibilityPolicy::default();
        for action in [ResourceAction::Update, ResourceAction::Delete, ResourceAction::TogglePublish] {
            assert_eq!(policy.news(&who, news(true, 2), action).is_allowed(), allowed);
        }
    }

    #[test]
    fn demoted_author_loses_news_mutation() {
        let policy = VisibilityPolicy::default();
        let decision = policy.news(&caller(2, Role::Staff, None), news(true, 2), ResourceAction::Update);
        assert_eq!(decision, Decision::Deny(DenyReason::RoleRequired));
    }

    #[test]
    fn configurable_news_rules() {
        let policy = VisibilityPolicy::new(PolicyRules {
            managers_moderate_all_news: true,
            authors_read_unpublished_news: true,
        });
        assert!(policy.news(&caller(5, Role::Manager, None), news(true, 2), ResourceAction::Delete).is_allowed());
        // Author parity only matters for non-editorial roles.
        assert!(policy.news(&caller(3, Role::Staff, None), news(false, 3), ResourceAction::Read).is_allowed());
        assert!(!policy.news(&caller(4, Role::Staff, None), news(false, 3), ResourceAction::Read).is_allowed());
    }

    #[test]
    fn news_creation_and_admin_gates() {
        let policy = VisibilityPolicy::default();
        assert!(policy.create_news(&caller(2, Role::Manager, None)).is_allowed());
        assert!(!policy.create_news(&caller(3, Role::Staff, None)).is_allowed());
        assert!(policy.manage_departments(&caller(1, Role::Admin, None)).is_allowed());
        assert!(!policy.manage_departments(&caller(2, Role::Manager, None)).is_allowed());
        assert!(!policy.manage_users(&caller(2, Role::Manager, None)).is_allowed());
        assert!(!policy.public_news(news(false, 2)).is_allowed());
    }

    #[test]
    fn denial_maps_to_forbidden() {
        let err = Decision::Deny(DenyReason::NotOwner).require("nope").unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(ref m) if m == "nope"));
        assert!(Decision::Allow.require("unused").is_ok());
    }
}
