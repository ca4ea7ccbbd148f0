//! basinscope: multi-epoch, multi-sensor river basin compositing
//!
//! Builds cloud-masked optical mosaics, spectral indices (MNDWI, NDVI, BSI),
//! per-pixel flood-peak quality mosaics and Sentinel-1 backscatter composites
//! for a region of interest, then reports region statistics and exports the
//! results as GeoTIFFs.

pub mod config;
pub mod core;
pub mod io;
pub mod render;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use config::{BasinConfig, EpochSpec, ExportConfig};
pub use core::{AnalysisPlan, AnalysisRun, Pipeline, Region, Sensor};
pub use io::{DemReader, DirectoryCatalog, ExportQueue, MemoryCatalog, SceneCatalog};
pub use types::{
    AcquisitionMode, BandStack, BasinError, BasinResult, BoundingBox, CoordinateSystem, DateRange,
    GeoTransform, Polarization, Scene,
};
