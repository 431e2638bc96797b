use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Where uploaded images and rendered barcodes live.
#[derive(Debug, Clone, Deserialize)]
pub enum StorageConfig {
    Local {
        root: String,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleSettings {
    /// Scans of the same identifier closer together than this are not logged twice.
    pub scan_dedupe_seconds: i64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            scan_dedupe_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub lifecycle: LifecycleSettings,
    pub seed_admin: Option<SeedAdmin>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "pctrack".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "pctrack-staff".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(100),
        };

        let storage = match std::env::var("STORAGE_BACKEND").as_deref() {
            Ok("s3") => StorageConfig::S3 {
                endpoint: std::env::var("MINIO_ENDPOINT")?,
                bucket: std::env::var("MINIO_BUCKET")?,
                access_key: std::env::var("MINIO_ACCESS_KEY")?,
                secret_key: std::env::var("MINIO_SECRET_KEY")?,
                region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
            },
            Ok("local") | Err(_) => StorageConfig::Local {
                root: std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./content".into()),
            },
            Ok(other) => anyhow::bail!("unknown STORAGE_BACKEND {other:?}"),
        };

        let lifecycle = LifecycleSettings {
            scan_dedupe_seconds: parse_dedupe_seconds(std::env::var("SCAN_DEDUPE_SECONDS").ok())?,
        };

        let seed_admin = match (
            std::env::var("SEED_ADMIN_EMAIL"),
            std::env::var("SEED_ADMIN_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) => Some(SeedAdmin { email, password }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt,
            storage,
            lifecycle,
            seed_admin,
        })
    }
}

fn parse_dedupe_seconds(raw: Option<String>) -> anyhow::Result<i64> {
    let Some(raw) = raw else {
        return Ok(LifecycleSettings::default().scan_dedupe_seconds);
    };
    let secs = raw
        .trim()
        .parse::<i64>()
        .with_context(|| format!("SCAN_DEDUPE_SECONDS {raw:?} is not a whole number"))?;
    anyhow::ensure!(secs >= 1, "SCAN_DEDUPE_SECONDS must be at least 1, got {secs}");
    Ok(secs)
}
