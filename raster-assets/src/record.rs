use chrono::{DateTime, Utc};
use raster_blob::BlobRef;
use serde::{Deserialize, Serialize};

/// Surrogate key of an asset, assigned by the registry on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub i64);

impl AssetId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AssetId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Raster format, decided once from the filename extension at import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    #[serde(rename = "TIFF")]
    Tiff,
    #[serde(rename = "JPEG")]
    Jpeg,
    #[serde(rename = "PNG")]
    Png,
    #[serde(rename = "")]
    Unknown,
}

impl AssetType {
    /// `a.TIFF` → Tiff, `a.bin` → Unknown, `noext` → Unknown.
    pub fn from_filename(name: &str) -> Self {
        let Some((_, ext)) = name.rsplit_once('.') else {
            return AssetType::Unknown;
        };
        match ext.to_ascii_lowercase().as_str() {
            "tif" | "tiff" => AssetType::Tiff,
            "jpg" | "jpeg" => AssetType::Jpeg,
            "png" => AssetType::Png,
            _ => AssetType::Unknown,
        }
    }

    /// Stored marker; `Unknown` is the empty string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Tiff => "TIFF",
            AssetType::Jpeg => "JPEG",
            AssetType::Png => "PNG",
            AssetType::Unknown => "",
        }
    }

    pub fn parse(marker: &str) -> Self {
        match marker {
            "TIFF" => AssetType::Tiff,
            "JPEG" => AssetType::Jpeg,
            "PNG" => AssetType::Png,
            _ => AssetType::Unknown,
        }
    }
}

/// Metadata row describing one imported raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub name: String,
    pub description: Option<String>,
    pub byte_size: u64,
    pub asset_type: AssetType,
    /// Reserved; not populated by import.
    pub resolution: Option<f64>,
    /// Reserved; not populated by import.
    pub band_count: Option<i32>,
    /// `None` means the record has no backing blob.
    pub blob_ref: Option<BlobRef>,
    /// Served separately through `RasterVault::thumbnail`.
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssetRecord {
    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// Fields supplied by import when a record is created.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub name: String,
    pub description: Option<String>,
    pub byte_size: u64,
    pub asset_type: AssetType,
    pub blob_ref: BlobRef,
}

impl NewAsset {
    pub fn into_record(self, id: AssetId, now: DateTime<Utc>) -> AssetRecord {
        AssetRecord {
            id,
            name: self.name,
            description: self.description,
            byte_size: self.byte_size,
            asset_type: self.asset_type,
            resolution: None,
            band_count: None,
            blob_ref: Some(self.blob_ref),
            thumbnail: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. `None` fields are left untouched; `description:
/// Some(None)` clears the description.
#[derive(Debug, Clone, Default)]
pub struct AssetPatch {
    pub description: Option<Option<String>>,
    pub thumbnail: Option<Vec<u8>>,
}

impl AssetPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Vec<u8>) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.thumbnail.is_none()
    }

    /// Apply to `record` and refresh `updated_at`.
    pub fn apply(self, record: &mut AssetRecord, now: DateTime<Utc>) {
        if let Some(description) = self.description {
            record.description = description;
        }
        if let Some(thumbnail) = self.thumbnail {
            record.thumbnail = Some(thumbnail);
        }
        record.updated_at = now;
    }
}

/// Stored size of an asset, with a human readable rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetSize {
    pub id: AssetId,
    pub name: String,
    pub byte_size: u64,
    pub formatted: String,
}

impl AssetSize {
    pub fn of(record: &AssetRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            byte_size: record.byte_size,
            formatted: format_size(record.byte_size),
        }
    }
}

const KIB: f64 = 1024.0;

/// "512 B", "1.50 KB", "2.00 MB", "1.25 GB".
pub fn format_size(bytes: u64) -> String {
    let b = bytes as f64;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.2} KB", b / KIB)
    } else if b < KIB * KIB * KIB {
        format!("{:.2} MB", b / (KIB * KIB))
    } else {
        format!("{:.2} GB", b / (KIB * KIB * KIB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_total() {
        let cases = [
            ("a.tif", AssetType::Tiff),
            ("a.TIFF", AssetType::Tiff),
            ("a.jpg", AssetType::Jpeg),
            ("photo.JPEG", AssetType::Jpeg),
            ("a.png", AssetType::Png),
            ("a.bin", AssetType::Unknown),
            ("noext", AssetType::Unknown),
            ("archive.tif.gz", AssetType::Unknown),
            ("trailing.", AssetType::Unknown),
        ];
        for (name, expected) in cases {
            assert_eq!(AssetType::from_filename(name), expected, "{name}");
        }
    }

    #[test]
    fn unknown_marker_is_empty() {
        assert_eq!(AssetType::Unknown.as_str(), "");
        assert_eq!(AssetType::parse(""), AssetType::Unknown);
        assert_eq!(AssetType::parse("TIFF"), AssetType::Tiff);
        assert_eq!(serde_json::to_value(AssetType::Png).unwrap(), "PNG");
    }

    #[test]
    fn sizes_format_like_the_listing() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(2 * 1024 * 1024), "2.00 MB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024 / 4), "1.25 GB");
    }

    #[test]
    fn patch_clears_description_and_touches_timestamp() {
        let created = Utc::now();
        let mut record = NewAsset {
            name: "scan.tif".into(),
            description: Some("field survey".into()),
            byte_size: 10,
            asset_type: AssetType::Tiff,
            blob_ref: BlobRef::from("mem-1"),
        }
        .into_record(AssetId(1), created);

        let later = created + chrono::Duration::seconds(5);
        AssetPatch::new().with_description(None).apply(&mut record, later);
        assert_eq!(record.description, None);
        assert_eq!(record.updated_at, later);
        assert_eq!(record.created_at, created);
    }
}
