use raster_core::{Event, EventHub, EventKind};
use serde::Serialize;

use crate::AssetId;

/// Notifications published by the vault. Each carries only the asset id;
/// subscribers look the record up themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "id", rename_all = "lowercase")]
pub enum AssetEvent {
    /// Blob committed and record created.
    Imported(AssetId),
    /// Description or thumbnail changed.
    Updated(AssetId),
    /// Record and blob removed.
    Removed(AssetId),
}

impl AssetEvent {
    pub fn asset_id(&self) -> AssetId {
        match self {
            AssetEvent::Imported(id) | AssetEvent::Updated(id) | AssetEvent::Removed(id) => *id,
        }
    }
}

impl Event for AssetEvent {
    fn kind(&self) -> EventKind {
        match self {
            AssetEvent::Imported(_) => EventKind::Imported,
            AssetEvent::Updated(_) => EventKind::Updated,
            AssetEvent::Removed(_) => EventKind::Removed,
        }
    }
}

pub type AssetEvents = EventHub<AssetEvent>;
