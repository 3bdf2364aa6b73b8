//! PostgreSQL-backed [`AssetRegistry`] over the `raster_data` table.

use async_trait::async_trait;
use raster_blob::BlobRef;
use raster_core::{RasterError, RasterResult};
use tokio_postgres::{Client, NoTls, Row};
use tracing::error;

use crate::errors::asset_not_found;
use crate::{AssetId, AssetPatch, AssetRecord, AssetRegistry, AssetType, NewAsset};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS raster_data (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    file_size   BIGINT NOT NULL,
    raster_type TEXT NOT NULL DEFAULT '',
    resolution  DOUBLE PRECISION,
    bands       INTEGER,
    blob_ref    TEXT,
    thumbnail   BYTEA,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const COLUMNS: &str = "id, name, description, file_size, raster_type, resolution, bands, \
                       blob_ref, thumbnail, created_at, updated_at";

pub struct PgAssetRegistry {
    client: Client,
}

fn db_failure(err: tokio_postgres::Error) -> RasterError {
    RasterError::io_failure(format!("registry query failed: {err}")).with_source(err)
}

fn from_row(row: &Row) -> RasterResult<AssetRecord> {
    let file_size: i64 = row.try_get("file_size").map_err(db_failure)?;
    let raster_type: String = row.try_get("raster_type").map_err(db_failure)?;
    let blob_ref: Option<String> = row.try_get("blob_ref").map_err(db_failure)?;
    Ok(AssetRecord {
        id: AssetId(row.try_get("id").map_err(db_failure)?),
        name: row.try_get("name").map_err(db_failure)?,
        description: row.try_get("description").map_err(db_failure)?,
        byte_size: u64::try_from(file_size).unwrap_or_default(),
        asset_type: AssetType::parse(&raster_type),
        resolution: row.try_get("resolution").map_err(db_failure)?,
        band_count: row.try_get("bands").map_err(db_failure)?,
        blob_ref: blob_ref.map(BlobRef),
        thumbnail: row.try_get("thumbnail").map_err(db_failure)?,
        created_at: row.try_get("created_at").map_err(db_failure)?,
        updated_at: row.try_get("updated_at").map_err(db_failure)?,
    })
}

impl PgAssetRegistry {
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(conn_str: &str) -> RasterResult<Self> {
        let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
            .await
            .map_err(db_failure)?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "registry connection closed with error");
            }
        });
        Ok(Self::from_client(client))
    }

    /// Create `raster_data` if it does not exist.
    pub async fn ensure_schema(&self) -> RasterResult<()> {
        self.client.batch_execute(SCHEMA).await.map_err(db_failure)
    }
}

#[async_trait]
impl AssetRegistry for PgAssetRegistry {
    async fn create(&self, data: NewAsset) -> RasterResult<AssetRecord> {
        let size = i64::try_from(data.byte_size)
            .map_err(|_| RasterError::invalid_input("byte size does not fit the registry column"))?;
        let sql = format!(
            "INSERT INTO raster_data (name, description, file_size, raster_type, blob_ref) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        );
        let row = self
            .client
            .query_one(
                &sql,
                &[
                    &data.name,
                    &data.description,
                    &size,
                    &data.asset_type.as_str(),
                    &data.blob_ref.as_str(),
                ],
            )
            .await
            .map_err(db_failure)?;
        from_row(&row)
    }

    async fn get(&self, id: AssetId) -> RasterResult<Option<AssetRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM raster_data WHERE id = $1");
        let row = self
            .client
            .query_opt(&sql, &[&id.get()])
            .await
            .map_err(db_failure)?;
        row.as_ref().map(from_row).transpose()
    }

    async fn find(&self) -> RasterResult<Vec<AssetRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM raster_data ORDER BY id");
        let rows = self.client.query(&sql, &[]).await.map_err(db_failure)?;
        rows.iter().map(from_row).collect()
    }

    async fn patch(&self, id: AssetId, patch: AssetPatch) -> RasterResult<AssetRecord> {
        let set_description = patch.description.is_some();
        let description = patch.description.flatten();
        let sql = format!(
            "UPDATE raster_data SET \
                 description = CASE WHEN $2 THEN $3 ELSE description END, \
                 thumbnail = COALESCE($4, thumbnail), \
                 updated_at = now() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        let row = self
            .client
            .query_opt(&sql, &[&id.get(), &set_description, &description, &patch.thumbnail])
            .await
            .map_err(db_failure)?;
        match row {
            Some(row) => from_row(&row),
            None => Err(asset_not_found(id)),
        }
    }

    async fn remove(&self, id: AssetId) -> RasterResult<AssetRecord> {
        let sql = format!("DELETE FROM raster_data WHERE id = $1 RETURNING {COLUMNS}");
        let row = self
            .client
            .query_opt(&sql, &[&id.get()])
            .await
            .map_err(db_failure)?;
        match row {
            Some(row) => from_row(&row),
            None => Err(asset_not_found(id)),
        }
    }
}
