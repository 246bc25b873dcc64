//! SQLite-backed results store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lvb_common::roll::ImageEntry;
use lvb_common::DeviceKind;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{ResultsGateway, StoredResult};
use crate::{Error, Result};

/// Results store on a single `results` table keyed by
/// (device, image_roll_uid, source_image_uid, run_uid).
pub struct SqliteResultsStore {
    pool: SqlitePool,
}

impl SqliteResultsStore {
    /// Open (or create) a store at the given sqlx database URL.
    pub async fn connect(url: &str) -> Result<Self> {
        // SQLite is single-writer; one connection also keeps in-memory
        // databases coherent across calls.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool; the schema is created if missing.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS results (
                device TEXT NOT NULL,
                image_roll_uid TEXT NOT NULL,
                source_image_uid TEXT NOT NULL,
                run_uid TEXT NOT NULL,
                template TEXT NOT NULL,
                report TEXT NOT NULL,
                image BLOB,
                image_uid TEXT,
                image_dpi INTEGER,
                created_at TEXT NOT NULL,
                PRIMARY KEY (device, image_roll_uid, source_image_uid, run_uid)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ResultsGateway for SqliteResultsStore {
    async fn select_result(
        &self,
        device: DeviceKind,
        image_roll_uid: Uuid,
        source_image_uid: Uuid,
        run_uid: Uuid,
    ) -> Result<Option<StoredResult>> {
        let row = sqlx::query_as::<
            _,
            (
                String,
                String,
                Option<Vec<u8>>,
                Option<String>,
                Option<i64>,
                String,
            ),
        >(
            "SELECT template, report, image, image_uid, image_dpi, created_at
             FROM results
             WHERE device = ? AND image_roll_uid = ? AND source_image_uid = ? AND run_uid = ?",
        )
        .bind(device.as_str())
        .bind(image_roll_uid.to_string())
        .bind(source_image_uid.to_string())
        .bind(run_uid.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some((template, report, image, image_uid, image_dpi, created_at)) = row else {
            return Ok(None);
        };

        let stored_image = match (image, image_uid) {
            (Some(bytes), Some(uid)) => {
                let uid = Uuid::parse_str(&uid)
                    .map_err(|e| Error::Internal(format!("bad image uid in results row: {e}")))?;
                Some(ImageEntry::new(
                    uid,
                    bytes,
                    image_dpi.unwrap_or(0).max(0) as u32,
                ))
            }
            _ => None,
        };

        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::Internal(format!("bad timestamp in results row: {e}")))?
            .with_timezone(&Utc);

        Ok(Some(StoredResult {
            device,
            image_roll_uid,
            source_image_uid,
            run_uid,
            template: serde_json::from_str(&template)?,
            report: serde_json::from_str(&report)?,
            stored_image,
            created_at,
        }))
    }

    async fn insert_or_replace_result(
        &self,
        result: &StoredResult,
    ) -> Result<Option<StoredResult>> {
        let template = serde_json::to_string(&result.template)?;
        let report = serde_json::to_string(&result.report)?;
        let (image, image_uid, image_dpi) = match &result.stored_image {
            Some(entry) => (
                Some(entry.bytes.clone()),
                Some(entry.uid.to_string()),
                Some(i64::from(entry.dpi)),
            ),
            None => (None, None, None),
        };

        sqlx::query(
            "INSERT OR REPLACE INTO results
             (device, image_roll_uid, source_image_uid, run_uid,
              template, report, image, image_uid, image_dpi, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(result.device.as_str())
        .bind(result.image_roll_uid.to_string())
        .bind(result.source_image_uid.to_string())
        .bind(result.run_uid.to_string())
        .bind(template)
        .bind(report)
        .bind(image)
        .bind(image_uid)
        .bind(image_dpi)
        .bind(result.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Some(result.clone()))
    }

    async fn delete_result(
        &self,
        device: DeviceKind,
        image_roll_uid: Uuid,
        source_image_uid: Uuid,
        run_uid: Uuid,
    ) -> Result<bool> {
        let outcome = sqlx::query(
            "DELETE FROM results
             WHERE device = ? AND image_roll_uid = ? AND source_image_uid = ? AND run_uid = ?",
        )
        .bind(device.as_str())
        .bind(image_roll_uid.to_string())
        .bind(source_image_uid.to_string())
        .bind(run_uid.to_string())
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> SqliteResultsStore {
        SqliteResultsStore::connect("sqlite::memory:").await.unwrap()
    }

    fn result(device: DeviceKind, roll: Uuid, image: Uuid) -> StoredResult {
        StoredResult {
            device,
            image_roll_uid: roll,
            source_image_uid: image,
            run_uid: roll,
            template: json!({"sectors": []}),
            report: json!({"inspectLabel": {"inspectSector": []}}),
            stored_image: Some(ImageEntry::new(Uuid::new_v4(), vec![1, 2, 3], 600)),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = store().await;
        let roll = Uuid::new_v4();
        let image = Uuid::new_v4();

        let inserted = store
            .insert_or_replace_result(&result(DeviceKind::Vision, roll, image))
            .await
            .unwrap();
        assert!(inserted.is_some());

        let row = store
            .select_result(DeviceKind::Vision, roll, image, roll)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.template, json!({"sectors": []}));
        assert_eq!(row.stored_image.as_ref().unwrap().dpi, 600);

        // A different device key misses.
        let miss = store
            .select_result(DeviceKind::Scanner, roll, image, roll)
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_replace_overwrites() {
        let store = store().await;
        let roll = Uuid::new_v4();
        let image = Uuid::new_v4();

        let mut first = result(DeviceKind::Scanner, roll, image);
        first.report = json!({"run": 1});
        store.insert_or_replace_result(&first).await.unwrap();

        let mut second = result(DeviceKind::Scanner, roll, image);
        second.report = json!({"run": 2});
        store.insert_or_replace_result(&second).await.unwrap();

        let row = store
            .select_result(DeviceKind::Scanner, roll, image, roll)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.report, json!({"run": 2}));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store().await;
        let roll = Uuid::new_v4();
        let image = Uuid::new_v4();

        store
            .insert_or_replace_result(&result(DeviceKind::Handheld, roll, image))
            .await
            .unwrap();
        assert!(store
            .delete_result(DeviceKind::Handheld, roll, image, roll)
            .await
            .unwrap());
        assert!(!store
            .delete_result(DeviceKind::Handheld, roll, image, roll)
            .await
            .unwrap());
        assert!(store
            .select_result(DeviceKind::Handheld, roll, image, roll)
            .await
            .unwrap()
            .is_none());
    }
}
