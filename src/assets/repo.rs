use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::repo_types::{AssetFilter, AssetPatch, AssetRecord, LifecycleState, ScanEntry};
use crate::error::AppError;

/// Persistence for both record sets and the scan log.
///
/// Implementations enforce identifier uniqueness across both sets and serial number
/// uniqueness within the active set; violations come back as [`AppError::Conflict`].
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn find_by_identifier(
        &self,
        set: LifecycleState,
        identifier: &str,
    ) -> Result<Option<AssetRecord>, AppError>;

    /// Looks only at the active set.
    async fn find_by_serial(&self, serialnumber: &str) -> Result<Option<AssetRecord>, AppError>;

    async fn create(&self, record: &AssetRecord) -> Result<AssetRecord, AppError>;

    /// Patches an active record. `Ok(None)` when there is none.
    async fn update(
        &self,
        identifier: &str,
        patch: &AssetPatch,
    ) -> Result<Option<AssetRecord>, AppError>;

    async fn delete(&self, set: LifecycleState, identifier: &str) -> Result<bool, AppError>;

    async fn find_by_end_year_range(
        &self,
        set: LifecycleState,
        from: Date,
        to_exclusive: Date,
    ) -> Result<Vec<AssetRecord>, AppError>;

    async fn find_many(
        &self,
        set: LifecycleState,
        filter: &AssetFilter,
    ) -> Result<Vec<AssetRecord>, AppError>;

    async fn count(&self, set: LifecycleState, filter: &AssetFilter) -> Result<i64, AppError>;

    /// Atomically moves one record between sets, clearing `status`.
    /// `Ok(None)` when `identifier` is not in `from`.
    async fn transfer(
        &self,
        identifier: &str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<Option<AssetRecord>, AppError>;

    /// Atomically moves every record of `from` whose `end_year` lies in `[start, end)`.
    /// Either all of them move or none do.
    async fn transfer_by_end_year(
        &self,
        from: LifecycleState,
        to: LifecycleState,
        start: Date,
        end: Date,
    ) -> Result<u64, AppError>;

    async fn latest_scan(&self, identifier: &str) -> Result<Option<ScanEntry>, AppError>;

    async fn insert_scan(&self, identifier: &str, at: OffsetDateTime)
        -> Result<ScanEntry, AppError>;

    /// Newest first.
    async fn recent_scans(&self, limit: i64) -> Result<Vec<ScanEntry>, AppError>;
}

const COLUMNS: &str = "id, identifier, firstname, lastname, brand, serialnumber, description, \
     gender, phonenumber, pcowner, end_year, image, barcode, status, state, created_at, updated_at";

#[derive(Clone)]
pub struct PgAssetStore {
    db: PgPool,
}

impl PgAssetStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, set: LifecycleState, filter: &AssetFilter) {
    qb.push(" WHERE state = ").push_bind(set);
    if let Some(d) = filter.description {
        qb.push(" AND description = ").push_bind(d);
    }
    if let Some(g) = filter.gender {
        qb.push(" AND gender = ").push_bind(g);
    }
    if let Some(o) = &filter.pcowner {
        qb.push(" AND pcowner = ").push_bind(o.clone());
    }
}

#[async_trait]
impl AssetStore for PgAssetStore {
    async fn find_by_identifier(
        &self,
        set: LifecycleState,
        identifier: &str,
    ) -> Result<Option<AssetRecord>, AppError> {
        let rec = sqlx::query_as::<_, AssetRecord>(&format!(
            "SELECT {COLUMNS} FROM pc_users WHERE identifier = $1 AND state = $2"
        ))
        .bind(identifier)
        .bind(set)
        .fetch_optional(&self.db)
        .await?;
        Ok(rec)
    }

    async fn find_by_serial(&self, serialnumber: &str) -> Result<Option<AssetRecord>, AppError> {
        let rec = sqlx::query_as::<_, AssetRecord>(&format!(
            "SELECT {COLUMNS} FROM pc_users WHERE serialnumber = $1 AND state = 'Active'"
        ))
        .bind(serialnumber)
        .fetch_optional(&self.db)
        .await?;
        Ok(rec)
    }

    async fn create(&self, r: &AssetRecord) -> Result<AssetRecord, AppError> {
        let rec = sqlx::query_as::<_, AssetRecord>(&format!(
            r#"
            INSERT INTO pc_users ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(r.id)
        .bind(&r.identifier)
        .bind(&r.firstname)
        .bind(&r.lastname)
        .bind(&r.brand)
        .bind(&r.serialnumber)
        .bind(r.description)
        .bind(r.gender)
        .bind(&r.phonenumber)
        .bind(&r.pcowner)
        .bind(r.end_year)
        .bind(&r.image)
        .bind(&r.barcode)
        .bind(&r.status)
        .bind(r.state)
        .bind(r.created_at)
        .bind(r.updated_at)
        .fetch_one(&self.db)
        .await?;
        Ok(rec)
    }

    async fn update(
        &self,
        identifier: &str,
        p: &AssetPatch,
    ) -> Result<Option<AssetRecord>, AppError> {
        let rec = sqlx::query_as::<_, AssetRecord>(&format!(
            r#"
            UPDATE pc_users SET
                firstname    = COALESCE($2, firstname),
                lastname     = COALESCE($3, lastname),
                brand        = COALESCE($4, brand),
                serialnumber = COALESCE($5, serialnumber),
                description  = COALESCE($6, description),
                gender       = COALESCE($7, gender),
                phonenumber  = COALESCE($8, phonenumber),
                pcowner      = COALESCE($9, pcowner),
                end_year     = COALESCE($10, end_year),
                status       = COALESCE($11, status),
                updated_at   = now()
            WHERE identifier = $1 AND state = 'Active'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(identifier)
        .bind(&p.firstname)
        .bind(&p.lastname)
        .bind(&p.brand)
        .bind(&p.serialnumber)
        .bind(p.description)
        .bind(p.gender)
        .bind(&p.phonenumber)
        .bind(&p.pcowner)
        .bind(p.end_year)
        .bind(&p.status)
        .fetch_optional(&self.db)
        .await?;
        Ok(rec)
    }

    async fn delete(&self, set: LifecycleState, identifier: &str) -> Result<bool, AppError> {
        let res = sqlx::query("DELETE FROM pc_users WHERE identifier = $1 AND state = $2")
            .bind(identifier)
            .bind(set)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_by_end_year_range(
        &self,
        set: LifecycleState,
        from: Date,
        to_exclusive: Date,
    ) -> Result<Vec<AssetRecord>, AppError> {
        let rows = sqlx::query_as::<_, AssetRecord>(&format!(
            r#"
            SELECT {COLUMNS} FROM pc_users
            WHERE state = $1 AND end_year >= $2 AND end_year < $3
            ORDER BY end_year, identifier
            "#
        ))
        .bind(set)
        .bind(from)
        .bind(to_exclusive)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find_many(
        &self,
        set: LifecycleState,
        filter: &AssetFilter,
    ) -> Result<Vec<AssetRecord>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM pc_users"));
        push_filter(&mut qb, set, filter);
        qb.push(" ORDER BY created_at DESC");
        let rows = qb
            .build_query_as::<AssetRecord>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn count(&self, set: LifecycleState, filter: &AssetFilter) -> Result<i64, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM pc_users");
        push_filter(&mut qb, set, filter);
        let n = qb.build_query_scalar::<i64>().fetch_one(&self.db).await?;
        Ok(n)
    }

    async fn transfer(
        &self,
        identifier: &str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<Option<AssetRecord>, AppError> {
        let rec = sqlx::query_as::<_, AssetRecord>(&format!(
            r#"
            UPDATE pc_users SET state = $3, status = NULL, updated_at = now()
            WHERE identifier = $1 AND state = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(identifier)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.db)
        .await?;
        Ok(rec)
    }

    async fn transfer_by_end_year(
        &self,
        from: LifecycleState,
        to: LifecycleState,
        start: Date,
        end: Date,
    ) -> Result<u64, AppError> {
        let res = sqlx::query(
            r#"
            UPDATE pc_users SET state = $2, status = NULL, updated_at = now()
            WHERE state = $1 AND end_year >= $3 AND end_year < $4
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(start)
        .bind(end)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected())
    }

    async fn latest_scan(&self, identifier: &str) -> Result<Option<ScanEntry>, AppError> {
        let row = sqlx::query_as::<_, ScanEntry>(
            r#"
            SELECT id, identifier, scanned_at
              FROM recent_scans
             WHERE identifier = $1
             ORDER BY scanned_at DESC
             LIMIT 1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert_scan(
        &self,
        identifier: &str,
        at: OffsetDateTime,
    ) -> Result<ScanEntry, AppError> {
        let row = sqlx::query_as::<_, ScanEntry>(
            r#"
            INSERT INTO recent_scans (id, identifier, scanned_at)
            VALUES ($1, $2, $3)
            RETURNING id, identifier, scanned_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(identifier)
        .bind(at)
        .fetch_one(&self.db)
        .await
        .context("insert scan entry")?;
        Ok(row)
    }

    async fn recent_scans(&self, limit: i64) -> Result<Vec<ScanEntry>, AppError> {
        let rows = sqlx::query_as::<_, ScanEntry>(
            r#"
            SELECT id, identifier, scanned_at
              FROM recent_scans
             ORDER BY scanned_at DESC
             LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
