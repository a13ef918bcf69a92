use crate::error::ApiError;
use crate::helper::asset_store::{AssetKind, AssetStore, IncomingFile};
use crate::helper::auth_helpers::{hash_password, verify_password};
use crate::helper::upload_helpers::UploadForm;
use crate::models::db_operations::departments_db_operations;
use crate::models::db_operations::users_db_operations::{self, UserRecord};
use crate::models::{Role, User};
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;

pub const LAST_ADMIN_MESSAGE: &str = "Cannot deactivate or demote the last active admin account.";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub department_id: Option<i64>,
    pub position: Option<String>,
    pub phone_number: Option<String>,
}

/// Admin edit of another account. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub department_id: Option<i64>,
    pub position: Option<String>,
    pub phone_number: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// Self-service profile fields, read from the multipart profile form.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub position: Option<String>,
}

impl ProfileChanges {
    pub fn from_form(form: &UploadForm) -> Self {
        ProfileChanges {
            full_name: form.text("fullName").map(str::to_string),
            email: form.text("email").map(str::to_string),
            phone_number: form.text("phoneNumber").map(str::to_string),
            position: form.text("position").map(str::to_string),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(value: Option<String>, label: &str) -> Result<String, ApiError> {
    non_blank(value).ok_or_else(|| ApiError::Validation(format!("{} is required.", label)))
}

fn checked_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email.to_string()),
        _ => Err(ApiError::Validation(format!("'{}' is not a valid email address.", email))),
    }
}

pub fn ensure_department(conn: &Connection, department_id: Option<i64>) -> Result<(), ApiError> {
    match department_id {
        Some(id) if !departments_db_operations::department_exists(conn, id)? => {
            Err(ApiError::Validation(format!("Department {} does not exist.", id)))
        }
        _ => Ok(()),
    }
}

fn guard_last_admin(conn: &Connection) -> Result<(), ApiError> {
    if users_db_operations::count_active_admins(conn)? <= 1 {
        return Err(ApiError::Conflict(LAST_ADMIN_MESSAGE.to_string()));
    }
    Ok(())
}

fn reload(conn: &Connection, user_id: i64) -> Result<User, ApiError> {
    users_db_operations::read_user(conn, user_id)?.ok_or_else(|| ApiError::NotFound("User not found.".to_string()))
}

pub fn register(conn: &Connection, bcrypt_cost: u32, req: RegisterRequest) -> Result<User, ApiError> {
    let username = required(req.username, "Username")?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::Validation("Password is required.".to_string()))?;
    let full_name = required(req.full_name, "Full name")?;
    let email = checked_email(&required(req.email, "Email")?)?;

    if users_db_operations::username_exists(conn, &username)? {
        return Err(ApiError::Conflict("Username already exists.".to_string()));
    }
    if users_db_operations::email_taken(conn, &email, None)? {
        return Err(ApiError::Conflict("Email already exists.".to_string()));
    }
    ensure_department(conn, req.department_id)?;

    let record = UserRecord {
        full_name,
        email,
        role: req.role.unwrap_or_default(),
        is_active: true,
        department_id: req.department_id,
        position: non_blank(req.position),
        phone_number: non_blank(req.phone_number),
    };
    let password_hash = hash_password(&password, bcrypt_cost)?;
    let id = users_db_operations::create_user(conn, &username, &password_hash, &record)?;
    log::info!("Registered user '{}' with role {}", username, record.role);
    reload(conn, id)
}

pub fn update_user(conn: &mut Connection, user_id: i64, req: UpdateUserRequest) -> Result<User, ApiError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing = reload(&tx, user_id)?;
    let mut record = UserRecord::from(&existing);

    if let Some(full_name) = non_blank(req.full_name) {
        record.full_name = full_name;
    }
    if let Some(email) = req.email {
        let email = checked_email(&email)?;
        if users_db_operations::email_taken(&tx, &email, Some(user_id))? {
            return Err(ApiError::Conflict("Email already exists.".to_string()));
        }
        record.email = email;
    }
    if let Some(role) = req.role {
        record.role = role;
    }
    if let Some(department_id) = req.department_id {
        ensure_department(&tx, Some(department_id))?;
        record.department_id = Some(department_id);
    }
    if req.position.is_some() {
        record.position = non_blank(req.position);
    }
    if req.phone_number.is_some() {
        record.phone_number = non_blank(req.phone_number);
    }
    if let Some(is_active) = req.is_active {
        record.is_active = is_active;
    }

    let was_active_admin = existing.role == Role::Admin && existing.is_active;
    let stays_active_admin = record.role == Role::Admin && record.is_active;
    if was_active_admin && !stays_active_admin {
        guard_last_admin(&tx)?;
    }

    users_db_operations::update_user(&tx, user_id, &record)?;
    tx.commit()?;
    reload(conn, user_id)
}

/// Flips `is_active`. The admin count and the write share one transaction.
pub fn toggle_status(conn: &mut Connection, user_id: i64) -> Result<User, ApiError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let user = reload(&tx, user_id)?;
    if user.role == Role::Admin && user.is_active {
        guard_last_admin(&tx)?;
    }
    users_db_operations::set_active(&tx, user_id, !user.is_active)?;
    tx.commit()?;
    reload(conn, user_id)
}

/// Deletes the account, then releases its avatar.
pub fn delete_user(conn: &mut Connection, assets: &AssetStore, user_id: i64) -> Result<(), ApiError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let user = reload(&tx, user_id)?;
    if user.role == Role::Admin && user.is_active {
        guard_last_admin(&tx)?;
    }
    users_db_operations::delete_user(&tx, user_id)?;
    tx.commit()?;

    if let Some(avatar) = user.avatar.as_deref() {
        if let Err(e) = assets.delete(AssetKind::Avatar, avatar) {
            log::warn!("User {} deleted but avatar {} was not released: {}", user_id, avatar, e);
        }
    }
    Ok(())
}

pub fn update_profile(
    conn: &Connection,
    assets: &AssetStore,
    user_id: i64,
    changes: ProfileChanges,
    avatar: Option<IncomingFile>,
) -> Result<User, ApiError> {
    let existing = reload(conn, user_id)?;
    let mut record = UserRecord::from(&existing);
    if let Some(full_name) = changes.full_name {
        record.full_name = full_name;
    }
    if let Some(email) = changes.email {
        let email = checked_email(&email)?;
        if users_db_operations::email_taken(conn, &email, Some(user_id))? {
            return Err(ApiError::Conflict("Email already exists.".to_string()));
        }
        record.email = email;
    }
    if changes.phone_number.is_some() {
        record.phone_number = changes.phone_number;
    }
    if changes.position.is_some() {
        record.position = changes.position;
    }

    match avatar {
        Some(file) => assets.replace(AssetKind::Avatar, existing.avatar.as_deref(), &file, |key| {
            let tx = conn.unchecked_transaction()?;
            users_db_operations::update_user(&tx, user_id, &record)?;
            users_db_operations::set_avatar(&tx, user_id, Some(key))?;
            tx.commit()?;
            Ok::<_, ApiError>(())
        })?,
        None => {
            users_db_operations::update_user(conn, user_id, &record)?;
        }
    }
    reload(conn, user_id)
}

pub fn change_password(conn: &Connection, bcrypt_cost: u32, user_id: i64, req: ChangePasswordRequest) -> Result<(), ApiError> {
    let (current, new) = match (req.current_password, req.new_password) {
        (Some(c), Some(n)) if !c.is_empty() && !n.is_empty() => (c, n),
        _ => {
            return Err(ApiError::Validation(
                "Both the current password and a new password are required.".to_string(),
            ))
        }
    };
    let stored = users_db_operations::read_password_hash(conn, user_id)?
        .ok_or_else(|| ApiError::NotFound("User not found.".to_string()))?;
    if !verify_password(&current, &stored) {
        return Err(ApiError::Validation("The current password is incorrect.".to_string()));
    }
    let password_hash = hash_password(&new, bcrypt_cost)?;
    users_db_operations::update_password_hash(conn, user_id, &password_hash)?;
    Ok(())
}
