use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for reading and seeding venue mappings.
    pub fn venue_mappings(&self) -> VenueMappingRepository {
        VenueMappingRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Mapping from a Tripleseat location to its Revel establishment,
/// timezone, and optional supply-system location.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueMapping {
    pub site_id: i64,
    pub establishment_id: i64,
    pub timezone: String,
    pub supply_location_code: Option<String>,
    pub enabled: bool,
}

/// Parameters required to seed or update a venue mapping.
pub struct NewVenueMapping<'a> {
    pub site_id: i64,
    pub establishment_id: i64,
    pub timezone: &'a str,
    pub supply_location_code: Option<&'a str>,
    pub enabled: bool,
}

/// Repository over the `venue_mappings` table. The pipeline treats it as
/// read-only; `upsert` exists for operational seeding and tests.
#[derive(Clone)]
pub struct VenueMappingRepository {
    pool: SqlitePool,
}

impl VenueMappingRepository {
    /// Loads the mapping for the provided Tripleseat location, if any.
    pub async fn fetch_by_site(
        &self,
        site_id: i64,
    ) -> Result<Option<VenueMapping>, VenueMappingError> {
        let row = sqlx::query_as::<_, VenueMappingRow>(
            "SELECT site_id, establishment_id, timezone, supply_location_code, enabled \
             FROM venue_mappings WHERE site_id = ?",
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(VenueMappingRow::into_domain))
    }

    /// Inserts the mapping, replacing any existing row for the same site.
    pub async fn upsert(
        &self,
        mapping: &NewVenueMapping<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), VenueMappingError> {
        let enabled = if mapping.enabled { 1 } else { 0 };
        let stamp = to_rfc3339(now);
        sqlx::query(
            "INSERT INTO venue_mappings \
             (site_id, establishment_id, timezone, supply_location_code, enabled, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(site_id) DO UPDATE \
             SET establishment_id = excluded.establishment_id, \
                 timezone = excluded.timezone, \
                 supply_location_code = excluded.supply_location_code, \
                 enabled = excluded.enabled, \
                 updated_at = excluded.updated_at",
        )
        .bind(mapping.site_id)
        .bind(mapping.establishment_id)
        .bind(mapping.timezone)
        .bind(mapping.supply_location_code)
        .bind(enabled)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists the mappings the bridge is currently allowed to serve.
    pub async fn list_enabled(&self) -> Result<Vec<VenueMapping>, VenueMappingError> {
        let rows = sqlx::query_as::<_, VenueMappingRow>(
            "SELECT site_id, establishment_id, timezone, supply_location_code, enabled \
             FROM venue_mappings WHERE enabled = 1 ORDER BY site_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(VenueMappingRow::into_domain).collect())
    }
}

/// Raw row shape for `venue_mappings`.
#[derive(Debug, sqlx::FromRow)]
struct VenueMappingRow {
    site_id: i64,
    establishment_id: i64,
    timezone: String,
    supply_location_code: Option<String>,
    enabled: i64,
}

impl VenueMappingRow {
    fn into_domain(self) -> VenueMapping {
        VenueMapping {
            site_id: self.site_id,
            establishment_id: self.establishment_id,
            timezone: self.timezone,
            supply_location_code: self.supply_location_code,
            enabled: self.enabled != 0,
        }
    }
}

/// Errors that can occur while reading or seeding venue mappings.
#[derive(Debug, Error)]
pub enum VenueMappingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> Database {
        let db = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    fn mapping(site_id: i64, enabled: bool) -> NewVenueMapping<'static> {
        NewVenueMapping {
            site_id,
            establishment_id: site_id * 10,
            timezone: "America/Chicago",
            supply_location_code: None,
            enabled,
        }
    }

    #[tokio::test]
    async fn migrations_apply() {
        let db = setup_db().await;
        let tables: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'venue_mappings'",
        )
        .fetch_one(db.pool())
        .await
        .expect("fetch tables");
        assert_eq!(tables.0, 1);
    }

    #[tokio::test]
    async fn fetch_by_site_round_trips() {
        let db = setup_db().await;
        let repo = db.venue_mappings();
        repo.upsert(
            &NewVenueMapping {
                site_id: 207,
                establishment_id: 4,
                timezone: "America/Chicago",
                supply_location_code: Some("CHI-01"),
                enabled: true,
            },
            Utc::now(),
        )
        .await
        .expect("upsert");

        let loaded = repo.fetch_by_site(207).await.expect("fetch").expect("row");
        assert_eq!(loaded.establishment_id, 4);
        assert_eq!(loaded.timezone, "America/Chicago");
        assert_eq!(loaded.supply_location_code.as_deref(), Some("CHI-01"));
        assert!(loaded.enabled);

        assert!(repo.fetch_by_site(999).await.expect("fetch").is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_mapping() {
        let db = setup_db().await;
        let repo = db.venue_mappings();
        repo.upsert(&mapping(10, true), Utc::now())
            .await
            .expect("insert");
        repo.upsert(
            &NewVenueMapping {
                site_id: 10,
                establishment_id: 77,
                timezone: "America/New_York",
                supply_location_code: None,
                enabled: false,
            },
            Utc::now(),
        )
        .await
        .expect("update");

        let loaded = repo.fetch_by_site(10).await.expect("fetch").expect("row");
        assert_eq!(loaded.establishment_id, 77);
        assert_eq!(loaded.timezone, "America/New_York");
        assert!(!loaded.enabled);
    }

    #[tokio::test]
    async fn list_enabled_skips_disabled_rows() {
        let db = setup_db().await;
        let repo = db.venue_mappings();
        repo.upsert(&mapping(1, true), Utc::now())
            .await
            .expect("upsert");
        repo.upsert(&mapping(2, false), Utc::now())
            .await
            .expect("upsert");
        repo.upsert(&mapping(3, true), Utc::now())
            .await
            .expect("upsert");

        let enabled = repo.list_enabled().await.expect("list");
        let sites: Vec<i64> = enabled.iter().map(|m| m.site_id).collect();
        assert_eq!(sites, vec![1, 3]);
    }
}
