use std::collections::BTreeMap;

use serde::Serialize;

use super::repo::AssetStore;
use super::repo_types::{AssetFilter, Category, Gender, LifecycleState};
use crate::error::AppError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenderCounts {
    pub total: i64,
    pub male: i64,
    pub female: i64,
}

#[derive(Debug, Serialize)]
pub struct InactiveCounts {
    pub total: i64,
    pub students: i64,
    pub staff: i64,
    pub guests: i64,
}

#[derive(Debug, Serialize)]
pub struct FleetSummary {
    pub total_active: i64,
    pub students: GenderCounts,
    pub staff: GenderCounts,
    pub guests: GenderCounts,
    /// Staff split by ownership tag (e.g. institution-owned vs personal).
    pub staff_by_owner: BTreeMap<String, GenderCounts>,
    pub inactive: InactiveCounts,
}

async fn category_counts(
    store: &dyn AssetStore,
    category: Category,
) -> Result<GenderCounts, AppError> {
    let by = |gender| AssetFilter {
        description: Some(category),
        gender,
        pcowner: None,
    };
    Ok(GenderCounts {
        total: store.count(LifecycleState::Active, &by(None)).await?,
        male: store
            .count(LifecycleState::Active, &by(Some(Gender::Male)))
            .await?,
        female: store
            .count(LifecycleState::Active, &by(Some(Gender::Female)))
            .await?,
    })
}

pub async fn summarize(store: &dyn AssetStore) -> Result<FleetSummary, AppError> {
    let total_active = store
        .count(LifecycleState::Active, &AssetFilter::default())
        .await?;

    let staff_filter = AssetFilter {
        description: Some(Category::Staff),
        ..Default::default()
    };
    let mut staff_by_owner: BTreeMap<String, GenderCounts> = BTreeMap::new();
    for rec in store.find_many(LifecycleState::Active, &staff_filter).await? {
        let entry = staff_by_owner.entry(rec.pcowner).or_default();
        entry.total += 1;
        match rec.gender {
            Gender::Male => entry.male += 1,
            Gender::Female => entry.female += 1,
        }
    }

    let inactive_of = |category| AssetFilter {
        description: category,
        ..Default::default()
    };
    let inactive = InactiveCounts {
        total: store
            .count(LifecycleState::Inactive, &inactive_of(None))
            .await?,
        students: store
            .count(LifecycleState::Inactive, &inactive_of(Some(Category::Student)))
            .await?,
        staff: store
            .count(LifecycleState::Inactive, &inactive_of(Some(Category::Staff)))
            .await?,
        guests: store
            .count(LifecycleState::Inactive, &inactive_of(Some(Category::Guest)))
            .await?,
    };

    Ok(FleetSummary {
        total_active,
        students: category_counts(store, Category::Student).await?,
        staff: category_counts(store, Category::Staff).await?,
        guests: category_counts(store, Category::Guest).await?,
        staff_by_owner,
        inactive,
    })
}
