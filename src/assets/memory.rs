use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::repo::AssetStore;
use super::repo_types::{AssetFilter, AssetPatch, AssetRecord, LifecycleState, ScanEntry};
use crate::error::AppError;

/// In-process store with the same uniqueness rules as the `pc_users` table.
#[derive(Default)]
pub struct MemoryAssetStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<String, AssetRecord>,
    scans: Vec<ScanEntry>,
    /// Number of successful mutations, used by tests to prove nothing was written.
    writes: usize,
}

impl Inner {
    fn serial_taken(&self, serial: &str, except: &str) -> bool {
        self.records.values().any(|r| {
            r.state == LifecycleState::Active && r.serialnumber == serial && r.identifier != except
        })
    }
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> usize {
        self.inner.lock().unwrap().writes
    }

    pub fn scan_count(&self, identifier: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .scans
            .iter()
            .filter(|s| s.identifier == identifier)
            .count()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn find_by_identifier(
        &self,
        set: LifecycleState,
        identifier: &str,
    ) -> Result<Option<AssetRecord>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .get(identifier)
            .filter(|r| r.state == set)
            .cloned())
    }

    async fn find_by_serial(&self, serialnumber: &str) -> Result<Option<AssetRecord>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .values()
            .find(|r| r.state == LifecycleState::Active && r.serialnumber == serialnumber)
            .cloned())
    }

    async fn create(&self, record: &AssetRecord) -> Result<AssetRecord, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.records.contains_key(&record.identifier) {
            return Err(AppError::conflict("unique constraint violated: identifier"));
        }
        if record.state == LifecycleState::Active
            && inner.serial_taken(&record.serialnumber, &record.identifier)
        {
            return Err(AppError::conflict("unique constraint violated: serialnumber"));
        }
        inner
            .records
            .insert(record.identifier.clone(), record.clone());
        inner.writes += 1;
        Ok(record.clone())
    }

    async fn update(
        &self,
        identifier: &str,
        patch: &AssetPatch,
    ) -> Result<Option<AssetRecord>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(mut rec) = inner
            .records
            .get(identifier)
            .filter(|r| r.state == LifecycleState::Active)
            .cloned()
        else {
            return Ok(None);
        };
        patch.apply_to(&mut rec);
        if inner.serial_taken(&rec.serialnumber, identifier) {
            return Err(AppError::conflict("unique constraint violated: serialnumber"));
        }
        rec.updated_at = OffsetDateTime::now_utc();
        inner.records.insert(identifier.to_string(), rec.clone());
        inner.writes += 1;
        Ok(Some(rec))
    }

    async fn delete(&self, set: LifecycleState, identifier: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let hit = inner
            .records
            .get(identifier)
            .is_some_and(|r| r.state == set);
        if hit {
            inner.records.remove(identifier);
            inner.writes += 1;
        }
        Ok(hit)
    }

    async fn find_by_end_year_range(
        &self,
        set: LifecycleState,
        from: Date,
        to_exclusive: Date,
    ) -> Result<Vec<AssetRecord>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .values()
            .filter(|r| r.state == set && r.end_year >= from && r.end_year < to_exclusive)
            .cloned()
            .collect())
    }

    async fn find_many(
        &self,
        set: LifecycleState,
        filter: &AssetFilter,
    ) -> Result<Vec<AssetRecord>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .values()
            .filter(|r| r.state == set && filter.matches(r))
            .cloned()
            .collect())
    }

    async fn count(&self, set: LifecycleState, filter: &AssetFilter) -> Result<i64, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .values()
            .filter(|r| r.state == set && filter.matches(r))
            .count() as i64)
    }

    async fn transfer(
        &self,
        identifier: &str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<Option<AssetRecord>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(mut rec) = inner
            .records
            .get(identifier)
            .filter(|r| r.state == from)
            .cloned()
        else {
            return Ok(None);
        };
        if to == LifecycleState::Active && inner.serial_taken(&rec.serialnumber, identifier) {
            return Err(AppError::conflict("unique constraint violated: serialnumber"));
        }
        rec.state = to;
        rec.status = None;
        rec.updated_at = OffsetDateTime::now_utc();
        inner.records.insert(identifier.to_string(), rec.clone());
        inner.writes += 1;
        Ok(Some(rec))
    }

    async fn transfer_by_end_year(
        &self,
        from: LifecycleState,
        to: LifecycleState,
        start: Date,
        end: Date,
    ) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let selected: Vec<String> = inner
            .records
            .values()
            .filter(|r| r.state == from && r.end_year >= start && r.end_year < end)
            .map(|r| r.identifier.clone())
            .collect();

        // Validate the whole batch before touching anything.
        if to == LifecycleState::Active {
            let mut serials: Vec<&str> = inner
                .records
                .values()
                .filter(|r| r.state == LifecycleState::Active)
                .map(|r| r.serialnumber.as_str())
                .collect();
            for id in &selected {
                let serial = inner.records[id].serialnumber.as_str();
                if serials.contains(&serial) {
                    return Err(AppError::conflict("unique constraint violated: serialnumber"));
                }
                serials.push(serial);
            }
        }

        let now = OffsetDateTime::now_utc();
        for id in &selected {
            if let Some(rec) = inner.records.get_mut(id) {
                rec.state = to;
                rec.status = None;
                rec.updated_at = now;
            }
        }
        if !selected.is_empty() {
            inner.writes += 1;
        }
        Ok(selected.len() as u64)
    }

    async fn latest_scan(&self, identifier: &str) -> Result<Option<ScanEntry>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .scans
            .iter()
            .filter(|s| s.identifier == identifier)
            .max_by_key(|s| s.scanned_at)
            .cloned())
    }

    async fn insert_scan(
        &self,
        identifier: &str,
        at: OffsetDateTime,
    ) -> Result<ScanEntry, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = ScanEntry {
            id: Uuid::new_v4(),
            identifier: identifier.to_string(),
            scanned_at: at,
        };
        inner.scans.push(entry.clone());
        inner.writes += 1;
        Ok(entry)
    }

    async fn recent_scans(&self, limit: i64) -> Result<Vec<ScanEntry>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut out = inner.scans.clone();
        out.sort_by(|a, b| b.scanned_at.cmp(&a.scanned_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }
}
