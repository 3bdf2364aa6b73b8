//! raster-core: error taxonomy, event hub and configuration shared by the
//! raster vault crates.

pub mod config;
pub mod errors;
pub mod events;
pub mod telemetry;

pub use config::{ConfigSnapshot, RasterConfig, ENV_PREFIX};
pub use errors::{ErrorKind, RasterError, RasterResult};
pub use events::{Delivery, Dispatch, Event, EventHub, EventKind, EventListener, EventPat, ListenerId};
pub use telemetry::init_tracing;
