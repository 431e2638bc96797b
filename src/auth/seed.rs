use tracing::info;

use crate::auth::{password::CredentialHasher, repo::UserStore, repo_types::Role};
use crate::config::SeedAdmin;
use crate::error::AppError;

/// Creates the configured admin account unless one with that email already exists.
/// Returns whether a user was created.
pub async fn seed_admin(
    users: &dyn UserStore,
    hasher: &dyn CredentialHasher,
    seed: &SeedAdmin,
) -> Result<bool, AppError> {
    let email = seed.email.trim().to_lowercase();
    if users.find_by_email(&email).await?.is_some() {
        return Ok(false);
    }
    let hash = hasher.hash(&seed.password)?;
    let user = users.create(&email, &hash, Role::Admin).await?;
    info!(user_id = %user.id, email = %user.email, "seeded admin account");
    Ok(true)
}
