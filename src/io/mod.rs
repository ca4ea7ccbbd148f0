//! Input/output: rasters, regions, scene catalogs, elevation tiles and exports

pub mod catalog;
pub mod dem;
pub mod export;
pub mod geotiff;
pub mod region;

pub use catalog::{DirectoryCatalog, MemoryCatalog, SceneCatalog, SceneQuery};
pub use dem::{DemReader, SrtmTile};
pub use export::{ExportQueue, ExportRequest, ExportSink, ExportStatus, GeoTiffSink};
pub use geotiff::{read_band, write_band, write_band_with_nodata, GeoBand};
pub use region::{parse_region, read_region};
