//! Core compositing modules

pub mod band_profile;
pub mod indices;
pub mod median_composite;
pub mod peak_detector;
pub mod pipeline;
pub mod quality_mask;
pub mod reducers;
pub mod region;
pub mod report;
pub mod sar_composite;
pub mod speckle_filter;
pub mod statistics;

// Re-export main types
pub use band_profile::{BandProfile, BandRole, Sensor, SensorFamily, SAR_COLLECTION};
pub use indices::{IndexEngine, BSI, INDEX_BANDS, MNDWI, MONTH, NDVI};
pub use median_composite::{MedianCompositor, OpticalComposite};
pub use peak_detector::{quality_mosaic, EpochComposite, EpochSummary, PeakDetectorParams, YearlyPeakDetector};
pub use pipeline::{AnalysisPlan, AnalysisRun, EpochOutcome, Pipeline};
pub use quality_mask::{QaMask, Rescale};
pub use region::{Polygon, Region};
pub use report::{ComparativeChart, EpochMetadata, EpochReport};
pub use sar_composite::{SarComposite, SarCompositeBuilder, SarFilterParams};
pub use speckle_filter::{KernelShape, SpeckleFilter, SpeckleFilterParams};
pub use statistics::RegionStatistics;
