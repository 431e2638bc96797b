use axum::extract::Multipart;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
};

use crate::assets::repo_types::{Category, Gender, NewAsset};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct IdentifierQuery {
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub msg: String,
}

impl Ack {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct Moved {
    pub msg: String,
    pub moved: u64,
}

/// Uploaded photo carried by the create form.
pub struct ImageUpload {
    pub filename: String,
    pub body: Bytes,
}

/// Parsed `POST /pcuser` form.
pub struct CreateForm {
    pub asset: NewAsset,
    pub image: ImageUpload,
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_end_year(raw: &str) -> Result<Date, AppError> {
    let raw = raw.trim();
    if let Ok(d) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Ok(d);
    }
    OffsetDateTime::parse(raw, &Rfc3339)
        .map(|t| t.date())
        .map_err(|_| AppError::invalid(format!("endYear '{raw}' is not a date")))
}

impl CreateForm {
    pub async fn from_multipart(mut mp: Multipart) -> Result<Self, AppError> {
        let mut text = std::collections::HashMap::<String, String>::new();
        let mut image = None;

        while let Some(field) = mp
            .next_field()
            .await
            .map_err(|e| AppError::invalid(format!("malformed form: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == "image" {
                let filename = field.file_name().unwrap_or_default().to_string();
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::invalid(format!("image upload failed: {e}")))?;
                image = Some(ImageUpload { filename, body });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::invalid(format!("field {name}: {e}")))?;
                text.insert(name, value);
            }
        }

        let image = image.ok_or_else(|| AppError::invalid("image is required"))?;
        let asset = NewAsset::from_fields(&text)?;
        Ok(Self { asset, image })
    }
}

impl NewAsset {
    /// Builds a record from form fields. Both camelCase (`endYear`) and lowercase keys are read.
    pub fn from_fields(
        fields: &std::collections::HashMap<String, String>,
    ) -> Result<Self, AppError> {
        let get = |keys: &[&str]| -> String {
            keys.iter()
                .find_map(|k| fields.get(*k))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        let required = |keys: &[&str]| -> Result<String, AppError> {
            let v = get(keys);
            if v.is_empty() {
                Err(AppError::invalid(format!("{} is required", keys[0])))
            } else {
                Ok(v)
            }
        };

        let description: Category = required(&["description"])?.parse()?;
        let gender: Gender = required(&["gender"])?.parse()?;
        let end_year = parse_end_year(&required(&["endYear", "endyear", "end_year"])?)?;
        let status = Some(get(&["status"])).filter(|s| !s.is_empty());

        let asset = NewAsset {
            identifier: required(&["userId", "identifier"])?,
            firstname: required(&["firstname"])?,
            lastname: required(&["lastname"])?,
            brand: required(&["brand"])?,
            serialnumber: required(&["serialnumber"])?,
            description,
            gender,
            phonenumber: required(&["phonenumber"])?,
            pcowner: required(&["pcowner"])?,
            end_year,
            status,
        };
        asset.validate()?;
        Ok(asset)
    }
}
