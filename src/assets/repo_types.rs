use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, Month, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;

/// Which record set an asset currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "asset_state")]
pub enum LifecycleState {
    Active,
    Inactive,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "asset_category")]
pub enum Category {
    Student,
    Staff,
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "asset_gender")]
pub enum Gender {
    Male,
    Female,
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Category::Student),
            "staff" => Ok(Category::Staff),
            "guest" => Ok(Category::Guest),
            other => Err(AppError::invalid(format!("unknown description {other:?}"))),
        }
    }
}

impl FromStr for Gender {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(AppError::invalid(format!("unknown gender {other:?}"))),
        }
    }
}

/// A tracked device and its owner. Active and inactive records share this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AssetRecord {
    pub id: Uuid,
    pub identifier: String,
    pub firstname: String,
    pub lastname: String,
    pub brand: String,
    pub serialnumber: String,
    pub description: Category,
    pub gender: Gender,
    pub phonenumber: String,
    pub pcowner: String,
    pub end_year: Date,
    pub image: String,
    pub barcode: String,
    pub status: Option<String>,
    pub state: LifecycleState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Caller-supplied fields of a new asset; image and barcode are filled in on creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAsset {
    pub identifier: String,
    pub firstname: String,
    pub lastname: String,
    pub brand: String,
    pub serialnumber: String,
    pub description: Category,
    pub gender: Gender,
    pub phonenumber: String,
    pub pcowner: String,
    pub end_year: Date,
    pub status: Option<String>,
}

impl NewAsset {
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            ("identifier", &self.identifier),
            ("firstname", &self.firstname),
            ("lastname", &self.lastname),
            ("brand", &self.brand),
            ("serialnumber", &self.serialnumber),
            ("phonenumber", &self.phonenumber),
            ("pcowner", &self.pcowner),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::invalid(format!("{name} is required")));
            }
        }
        Ok(())
    }
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetPatch {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub brand: Option<String>,
    pub serialnumber: Option<String>,
    pub description: Option<Category>,
    pub gender: Option<Gender>,
    pub phonenumber: Option<String>,
    pub pcowner: Option<String>,
    pub end_year: Option<Date>,
    pub status: Option<String>,
}

impl AssetPatch {
    pub fn apply_to(&self, rec: &mut AssetRecord) {
        if let Some(v) = &self.firstname {
            rec.firstname = v.clone();
        }
        if let Some(v) = &self.lastname {
            rec.lastname = v.clone();
        }
        if let Some(v) = &self.brand {
            rec.brand = v.clone();
        }
        if let Some(v) = &self.serialnumber {
            rec.serialnumber = v.clone();
        }
        if let Some(v) = self.description {
            rec.description = v;
        }
        if let Some(v) = self.gender {
            rec.gender = v;
        }
        if let Some(v) = &self.phonenumber {
            rec.phonenumber = v.clone();
        }
        if let Some(v) = &self.pcowner {
            rec.pcowner = v.clone();
        }
        if let Some(v) = self.end_year {
            rec.end_year = v;
        }
        if let Some(v) = &self.status {
            rec.status = Some(v.clone());
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    pub description: Option<Category>,
    pub gender: Option<Gender>,
    pub pcowner: Option<String>,
}

impl AssetFilter {
    pub fn matches(&self, rec: &AssetRecord) -> bool {
        self.description.map_or(true, |d| rec.description == d)
            && self.gender.map_or(true, |g| rec.gender == g)
            && self.pcowner.as_deref().map_or(true, |o| rec.pcowner == o)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ScanEntry {
    pub id: Uuid,
    pub identifier: String,
    #[serde(with = "time::serde::rfc3339")]
    pub scanned_at: OffsetDateTime,
}

/// Half-open `[Jan 1 of year, Jan 1 of year + 1)` window over `end_year`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    pub start: Date,
    pub end: Date,
}

impl YearWindow {
    pub fn for_year(year: i32) -> Result<Self, AppError> {
        let bad = |_| AppError::invalid(format!("year {year} is out of range"));
        let start = Date::from_calendar_date(year, Month::January, 1).map_err(bad)?;
        let end = Date::from_calendar_date(year + 1, Month::January, 1).map_err(bad)?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, d: Date) -> bool {
        self.start <= d && d < self.end
    }
}
