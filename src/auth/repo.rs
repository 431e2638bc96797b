use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{Role, User, UserChanges};
use crate::error::AppError;

const USER_COLUMNS: &str = "id, email, password_hash, role, status, created_at";

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn create(&self, email: &str, password_hash: &str, role: Role)
        -> Result<User, AppError>;
    /// All accounts, oldest first, optionally only those holding `role`.
    async fn list(&self, role: Option<Role>) -> Result<Vec<User>, AppError>;
    /// Applies `changes`; `None` when no such user. A taken email is `Conflict`.
    async fn update(&self, id: Uuid, changes: &UserChanges) -> Result<Option<User>, AppError>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    /// Find a user by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    /// Create a new active user with an already hashed password.
    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, role, status)
            VALUES ($1, $2, $3, $4, 'active')
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn list(&self, role: Option<Role>) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ($1::user_role IS NULL OR role = $1) ORDER BY created_at"
        ))
        .bind(role)
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn update(&self, id: Uuid, changes: &UserChanges) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                role = COALESCE($3, role),
                status = COALESCE($4, status),
                password_hash = COALESCE($5, password_hash)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.email.as_deref())
        .bind(changes.role)
        .bind(changes.status.as_deref())
        .bind(changes.password_hash.as_deref())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
pub use memory::MemoryUserStore;
