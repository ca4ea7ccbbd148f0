use chrono::{DateTime, Datelike, NaiveDate, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Real-valued band data. No-data pixels are `NaN`.
pub type Band = Array2<f32>;

/// Per-pixel validity flags
pub type BandMask = Array2<bool>;

/// Meters per degree of latitude (and of longitude at the equator)
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Coordinate system of a raster grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates (longitude, latitude in degrees)
    Geographic,
    /// Projected coordinates in meters (e.g., UTM)
    Projected { epsg: u32 },
}

impl CoordinateSystem {
    pub fn is_geographic(&self) -> bool {
        matches!(self, CoordinateSystem::Geographic)
    }

    /// Convert a ground distance in meters to map units (x, y) around `latitude`
    pub fn meters_to_map_units(&self, meters: f64, latitude: f64) -> (f64, f64) {
        match self {
            CoordinateSystem::Projected { .. } => (meters, meters),
            CoordinateSystem::Geographic => {
                let cos_lat = latitude.to_radians().cos().abs().max(1e-6);
                (
                    meters / (METERS_PER_DEGREE * cos_lat),
                    meters / METERS_PER_DEGREE,
                )
            }
        }
    }
}

/// Polarization modes for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

impl FromStr for Polarization {
    type Err = BasinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            _ => Err(BasinError::InvalidFormat(format!("Invalid polarization: {}", s))),
        }
    }
}

/// Sentinel-1 acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    IW, // Interferometric Wide swath
    EW, // Extra Wide swath
    SM, // StripMap
    WV, // Wave
}

impl FromStr for AcquisitionMode {
    type Err = BasinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IW" => Ok(AcquisitionMode::IW),
            "EW" => Ok(AcquisitionMode::EW),
            "SM" => Ok(AcquisitionMode::SM),
            "WV" => Ok(AcquisitionMode::WV),
            _ => Err(BasinError::InvalidFormat(format!("Invalid acquisition mode: {}", s))),
        }
    }
}

/// Axis-aligned bounding box in map units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform; `pixel_height` is given as a positive size
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map coordinates of the center of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }

    /// Pixel (row, col) containing map coordinate (x, y), if inside a `shape` grid.
    /// Rotated transforms are not supported here.
    pub fn world_to_pixel(&self, x: f64, y: f64, shape: (usize, usize)) -> Option<(usize, usize)> {
        let col = ((x - self.top_left_x) / self.pixel_width).floor();
        let row = ((y - self.top_left_y) / self.pixel_height).floor();
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        if row < shape.0 && col < shape.1 {
            Some((row, col))
        } else {
            None
        }
    }

    /// Footprint of a `rows x cols` grid
    pub fn footprint(&self, rows: usize, cols: usize) -> BoundingBox {
        let x0 = self.top_left_x;
        let x1 = self.top_left_x + cols as f64 * self.pixel_width;
        let y0 = self.top_left_y;
        let y1 = self.top_left_y + rows as f64 * self.pixel_height;
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// Half-open date range `[start, end)`, matching catalog date filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> BasinResult<Self> {
        if end <= start {
            return Err(BasinError::Config(format!(
                "Date range end {} must be after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `YYYY-MM-DD` bounds
    pub fn parse(start: &str, end: &str) -> BasinResult<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| BasinError::Config(format!("Invalid date '{}': {}", s, e)))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    /// January 1st of `year` up to (excluding) January 1st of the next year
    pub fn calendar_year(year: i32) -> BasinResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| BasinError::Config(format!("Invalid year: {}", year)))?;
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
            .ok_or_else(|| BasinError::Config(format!("Invalid year: {}", year + 1)))?;
        Self::new(start, end)
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        let date = time.date_naive();
        date >= self.start && date < self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Named, equally-shaped bands on a common grid
#[derive(Debug, Clone, PartialEq)]
pub struct BandStack {
    shape: (usize, usize),
    pub transform: GeoTransform,
    pub crs: CoordinateSystem,
    bands: BTreeMap<String, Band>,
}

impl BandStack {
    pub fn new(shape: (usize, usize), transform: GeoTransform, crs: CoordinateSystem) -> Self {
        Self {
            shape,
            transform,
            crs,
            bands: BTreeMap::new(),
        }
    }

    /// Empty stack on the same grid as `self`
    pub fn empty_like(&self) -> Self {
        Self::new(self.shape, self.transform, self.crs)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn insert(&mut self, name: impl Into<String>, band: Band) -> BasinResult<()> {
        let name = name.into();
        if band.dim() != self.shape {
            return Err(BasinError::InvalidFormat(format!(
                "Band {} has shape {:?}, expected {:?}",
                name,
                band.dim(),
                self.shape
            )));
        }
        self.bands.insert(name, band);
        Ok(())
    }

    pub fn with_band(mut self, name: impl Into<String>, band: Band) -> BasinResult<Self> {
        self.insert(name, band)?;
        Ok(self)
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.get(name)
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(|k| k.as_str())
    }

    pub fn bands(&self) -> impl Iterator<Item = (&str, &Band)> {
        self.bands.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// New stack with only the named bands
    pub fn select(&self, names: &[&str]) -> BasinResult<BandStack> {
        let mut out = self.empty_like();
        for name in names {
            let band = self.bands.get(*name).ok_or_else(|| BasinError::BandResolution {
                scene: "band stack".to_string(),
                band: name.to_string(),
            })?;
            out.bands.insert(name.to_string(), band.clone());
        }
        Ok(out)
    }

    pub fn footprint(&self) -> BoundingBox {
        self.transform.footprint(self.shape.0, self.shape.1)
    }

    /// Whether `other` is on exactly the same grid
    pub fn same_grid(&self, other: &BandStack) -> bool {
        self.shape == other.shape && self.transform == other.transform && self.crs == other.crs
    }

    /// Ground pixel size in meters (mean of x and y)
    pub fn pixel_size_m(&self) -> f64 {
        let px = self.transform.pixel_width.abs();
        let py = self.transform.pixel_height.abs();
        match self.crs {
            CoordinateSystem::Projected { .. } => (px + py) / 2.0,
            CoordinateSystem::Geographic => {
                let (_, lat) = self.footprint().center();
                let cos_lat = lat.to_radians().cos().abs();
                (px * METERS_PER_DEGREE * cos_lat + py * METERS_PER_DEGREE) / 2.0
            }
        }
    }
}

/// Radiometric state of a scene's reflectance bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Radiometry {
    /// Raw digital numbers as delivered by the catalog
    Raw,
    /// Rescaled to physical surface reflectance
    Reflectance,
}

/// Catalog properties attached to a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneProperties {
    pub polarizations: Vec<Polarization>,
    pub instrument_mode: Option<AcquisitionMode>,
    pub radiometry: Radiometry,
}

impl Default for SceneProperties {
    fn default() -> Self {
        Self {
            polarizations: Vec::new(),
            instrument_mode: None,
            radiometry: Radiometry::Raw,
        }
    }
}

/// A single timestamped raster from a catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub stack: BandStack,
    pub properties: SceneProperties,
}

impl Scene {
    pub fn new(id: impl Into<String>, acquired: DateTime<Utc>, stack: BandStack) -> Self {
        Self {
            id: id.into(),
            acquired,
            stack,
            properties: SceneProperties::default(),
        }
    }

    pub fn with_properties(mut self, properties: SceneProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Calendar month (1-12) of acquisition
    pub fn month(&self) -> u32 {
        self.acquired.month()
    }

    pub fn year(&self) -> i32 {
        self.acquired.year()
    }

    pub fn footprint(&self) -> BoundingBox {
        self.stack.footprint()
    }

    pub fn band(&self, name: &str) -> BasinResult<&Band> {
        self.stack.band(name).ok_or_else(|| BasinError::BandResolution {
            scene: self.id.clone(),
            band: name.to_string(),
        })
    }
}

/// Error types for basin processing
#[derive(Debug, thiserror::Error)]
pub enum BasinError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No scenes available in {collection} for {range}")]
    EmptyCollection { collection: String, range: String },

    #[error("Band '{band}' not available in scene {scene}")]
    BandResolution { scene: String, band: String },

    #[error("Export '{name}' failed: {reason}")]
    Export { name: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("GDAL error: {0}")]
    Gdal(String),
}

/// Result type for basin operations
pub type BasinResult<T> = Result<T, BasinError>;
