use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::repo::AssetStore;
use super::repo_types::{
    AssetFilter, AssetPatch, AssetRecord, LifecycleState, NewAsset, ScanEntry, YearWindow,
};
use crate::barcodes::BarcodeIssuer;
use crate::config::LifecycleSettings;
use crate::error::AppError;

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Owns every transition between the active and inactive record sets.
pub struct LifecycleEngine {
    store: Arc<dyn AssetStore>,
    barcodes: BarcodeIssuer,
    clock: Arc<dyn Clock>,
    scan_window: Duration,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn AssetStore>,
        barcodes: BarcodeIssuer,
        clock: Arc<dyn Clock>,
        settings: &LifecycleSettings,
    ) -> Self {
        Self {
            store,
            barcodes,
            clock,
            scan_window: Duration::seconds(settings.scan_dedupe_seconds),
        }
    }

    pub fn store(&self) -> &dyn AssetStore {
        self.store.as_ref()
    }

    /// Rejects a registration that would collide with an existing identifier or serial.
    /// Early exit only; the storage constraints decide races.
    pub async fn ensure_available(&self, new: &NewAsset) -> Result<(), AppError> {
        new.validate()?;

        if self
            .store
            .find_by_identifier(LifecycleState::Active, &new.identifier)
            .await?
            .is_some()
        {
            warn!(identifier = %new.identifier, "identifier already active");
            return Err(AppError::conflict(format!(
                "asset {} already exists",
                new.identifier
            )));
        }
        if self
            .store
            .find_by_identifier(LifecycleState::Inactive, &new.identifier)
            .await?
            .is_some()
        {
            warn!(identifier = %new.identifier, "identifier held by an archived asset");
            return Err(AppError::conflict(format!(
                "asset {} is archived; restore it instead",
                new.identifier
            )));
        }
        if self.store.find_by_serial(&new.serialnumber).await?.is_some() {
            warn!(serial = %new.serialnumber, "serial number already active");
            return Err(AppError::conflict(format!(
                "serial number {} already registered",
                new.serialnumber
            )));
        }
        Ok(())
    }

    /// Registers a new active asset. `image` is the reference of an already stored upload.
    #[instrument(skip(self, new), fields(identifier = %new.identifier))]
    pub async fn create(&self, new: NewAsset, image: String) -> Result<AssetRecord, AppError> {
        self.ensure_available(&new).await?;

        // Not rolled back if the insert below loses a race: the winner owns the same file.
        let barcode = self.barcodes.issue(&new.identifier).await?;

        let now = self.clock.now();
        let record = AssetRecord {
            id: Uuid::new_v4(),
            identifier: new.identifier,
            firstname: new.firstname,
            lastname: new.lastname,
            brand: new.brand,
            serialnumber: new.serialnumber,
            description: new.description,
            gender: new.gender,
            phonenumber: new.phonenumber,
            pcowner: new.pcowner,
            end_year: new.end_year,
            image,
            barcode,
            status: new.status,
            state: LifecycleState::Active,
            created_at: now,
            updated_at: now,
        };
        let created = self.store.create(&record).await?;
        info!(id = %created.id, barcode = %created.barcode, "asset created");
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, identifier: &str, patch: AssetPatch) -> Result<(), AppError> {
        let current = self
            .store
            .find_by_identifier(LifecycleState::Active, identifier)
            .await?
            .ok_or_else(|| AppError::not_found(format!("asset {identifier} not found")))?;

        if let Some(serial) = patch.serialnumber.as_deref() {
            if serial.trim().is_empty() {
                return Err(AppError::invalid("serialnumber must not be empty"));
            }
            if serial != current.serialnumber {
                if let Some(other) = self.store.find_by_serial(serial).await? {
                    if other.identifier != current.identifier {
                        return Err(AppError::conflict(format!(
                            "serial number {serial} already registered"
                        )));
                    }
                }
            }
        }

        self.store
            .update(identifier, &patch)
            .await?
            .ok_or_else(|| AppError::not_found(format!("asset {identifier} not found")))?;
        info!("asset updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, identifier: &str) -> Result<(), AppError> {
        if !self.store.delete(LifecycleState::Active, identifier).await? {
            return Err(AppError::not_found(format!("asset {identifier} not found")));
        }
        info!("asset deleted");
        Ok(())
    }

    pub async fn archive_one(&self, identifier: &str) -> Result<(), AppError> {
        self.move_one(identifier, LifecycleState::Active, LifecycleState::Inactive)
            .await
    }

    pub async fn restore_one(&self, identifier: &str) -> Result<(), AppError> {
        self.move_one(identifier, LifecycleState::Inactive, LifecycleState::Active)
            .await
    }

    /// Archives every active asset whose end-of-service date falls in `year`.
    /// All-or-nothing; returns how many moved.
    pub async fn archive_by_year(&self, year: i32) -> Result<u64, AppError> {
        self.move_by_year(year, LifecycleState::Active, LifecycleState::Inactive)
            .await
    }

    pub async fn restore_by_year(&self, year: i32) -> Result<u64, AppError> {
        self.move_by_year(year, LifecycleState::Inactive, LifecycleState::Active)
            .await
    }

    #[instrument(skip(self))]
    async fn move_one(
        &self,
        identifier: &str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), AppError> {
        let moved = self.store.transfer(identifier, from, to).await?;
        match moved {
            Some(rec) => {
                info!(id = %rec.id, "asset moved");
                Ok(())
            }
            None => Err(AppError::not_found(format!(
                "asset {identifier} not found among {} assets",
                set_name(from)
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn move_by_year(
        &self,
        year: i32,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<u64, AppError> {
        let window = YearWindow::for_year(year)?;
        let moved = self
            .store
            .transfer_by_end_year(from, to, window.start, window.end)
            .await?;
        info!(moved, "bulk move finished");
        Ok(moved)
    }

    /// Logs a barcode scan unless the same asset was scanned within the dedupe window,
    /// and returns the active record either way.
    #[instrument(skip(self))]
    pub async fn record_scan(&self, identifier: &str) -> Result<AssetRecord, AppError> {
        let record = self
            .store
            .find_by_identifier(LifecycleState::Active, identifier)
            .await?
            .ok_or_else(|| AppError::not_found(format!("asset {identifier} not found")))?;

        let now = self.clock.now();
        let recent = self
            .store
            .latest_scan(identifier)
            .await?
            .filter(|last| last.scanned_at >= now - self.scan_window);

        match recent {
            Some(last) => debug!(last = %last.scanned_at, "scan deduplicated"),
            None => {
                self.store.insert_scan(identifier, now).await?;
                debug!("scan logged");
            }
        }
        Ok(record)
    }

    pub async fn get(&self, identifier: &str) -> Result<AssetRecord, AppError> {
        self.store
            .find_by_identifier(LifecycleState::Active, identifier)
            .await?
            .ok_or_else(|| AppError::not_found(format!("asset {identifier} not found")))
    }

    pub async fn list(&self, set: LifecycleState) -> Result<Vec<AssetRecord>, AppError> {
        self.store.find_many(set, &AssetFilter::default()).await
    }

    pub async fn list_by_year(
        &self,
        set: LifecycleState,
        year: i32,
    ) -> Result<Vec<AssetRecord>, AppError> {
        let window = YearWindow::for_year(year)?;
        self.store
            .find_by_end_year_range(set, window.start, window.end)
            .await
    }

    pub async fn recent_scans(&self, limit: i64) -> Result<Vec<ScanEntry>, AppError> {
        self.store.recent_scans(limit.clamp(1, 500)).await
    }
}

fn set_name(set: LifecycleState) -> &'static str {
    match set {
        LifecycleState::Active => "active",
        LifecycleState::Inactive => "inactive",
    }
}
