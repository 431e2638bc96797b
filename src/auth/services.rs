use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{
    dto::UpdateUserRequest,
    password::CredentialHasher,
    repo::UserStore,
    repo_types::{Role, User, UserChanges, STATUS_ACTIVE, STATUS_INACTIVE},
};
use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    let email = raw.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(AppError::invalid("Invalid email"));
    }
    Ok(email)
}

fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn check_status(status: &str) -> Result<(), AppError> {
    match status {
        STATUS_ACTIVE | STATUS_INACTIVE => Ok(()),
        other => Err(AppError::invalid(format!(
            "status must be \"active\" or \"inactive\", got {other:?}"
        ))),
    }
}

/// Registers a staff account. Admin only at the HTTP layer.
pub async fn create_user(
    users: &dyn UserStore,
    hasher: &dyn CredentialHasher,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User, AppError> {
    let email = normalize_email(email)?;
    check_password(password)?;
    if users.find_by_email(&email).await?.is_some() {
        return Err(AppError::conflict(format!("user {email} already exists")));
    }
    let hash = hasher.hash(password)?;
    let user = users.create(&email, &hash, role).await?;
    info!(user_id = %user.id, role = ?user.role, "user created");
    Ok(user)
}

pub async fn update_user(
    users: &dyn UserStore,
    hasher: &dyn CredentialHasher,
    id: Uuid,
    req: UpdateUserRequest,
) -> Result<User, AppError> {
    let email = req.email.as_deref().map(normalize_email).transpose()?;
    if let Some(status) = req.status.as_deref() {
        check_status(status)?;
    }
    let password_hash = match req.password.as_deref() {
        Some(p) => {
            check_password(p)?;
            Some(hasher.hash(p)?)
        }
        None => None,
    };

    let changes = UserChanges {
        email,
        role: req.role,
        status: req.status,
        password_hash,
    };
    let user = users
        .update(id, &changes)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {id} not found")))?;
    info!(user_id = %user.id, "user updated");
    Ok(user)
}

/// Self-service password change; the current password must match.
pub async fn change_password(
    users: &dyn UserStore,
    hasher: &dyn CredentialHasher,
    id: Uuid,
    current: &str,
    new: &str,
) -> Result<(), AppError> {
    let user = users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {id} not found")))?;
    if !hasher.verify(current, &user.password_hash)? {
        warn!(user_id = %id, "password change with wrong current password");
        return Err(AppError::Forbidden("Incorrect password".into()));
    }
    check_password(new)?;

    let changes = UserChanges {
        password_hash: Some(hasher.hash(new)?),
        ..Default::default()
    };
    users.update(id, &changes).await?;
    info!(user_id = %id, "password changed");
    Ok(())
}

pub async fn delete_user(users: &dyn UserStore, actor: Uuid, id: Uuid) -> Result<(), AppError> {
    if actor == id {
        return Err(AppError::invalid("cannot delete your own account"));
    }
    if !users.delete(id).await? {
        return Err(AppError::not_found(format!("user {id} not found")));
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}
