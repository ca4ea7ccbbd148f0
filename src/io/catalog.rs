//! Scene catalogs
//!
//! A catalog answers collection/bounds/date queries with fully loaded scenes.
//! [`MemoryCatalog`] holds scenes in memory; [`DirectoryCatalog`] reads them from
//! a tree of single-band GeoTIFFs:
//!
//! ```text
//! <root>/<collection id>/<scene id>/<BAND>.tif
//! <root>/<collection id>/<scene id>/metadata.json   (optional)
//! ```

use crate::io::geotiff::read_band;
use crate::types::{
    AcquisitionMode, BandStack, BasinError, BasinResult, BoundingBox, DateRange, Polarization, Radiometry,
    Scene, SceneProperties,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Collection, spatial and temporal filter
#[derive(Debug, Clone, PartialEq)]
pub struct SceneQuery {
    pub collection: String,
    pub bounds: BoundingBox,
    pub range: DateRange,
}

impl SceneQuery {
    pub fn new(collection: impl Into<String>, bounds: BoundingBox, range: DateRange) -> Self {
        Self {
            collection: collection.into(),
            bounds,
            range,
        }
    }

    pub fn matches(&self, collection: &str, scene: &Scene) -> bool {
        collection == self.collection
            && self.range.contains(&scene.acquired)
            && scene.footprint().intersects(&self.bounds)
    }
}

/// Source of scenes for the pipeline
pub trait SceneCatalog: Send + Sync {
    /// Scenes matching `query`, ordered by acquisition time
    fn scenes(&self, query: &SceneQuery) -> BasinResult<Vec<Scene>>;
}

/// Catalog backed by scenes held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    collections: BTreeMap<String, Vec<Scene>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: &str, scene: Scene) {
        self.collections.entry(collection.to_string()).or_default().push(scene);
    }

    pub fn with_scenes(mut self, collection: &str, scenes: impl IntoIterator<Item = Scene>) -> Self {
        for scene in scenes {
            self.insert(collection, scene);
        }
        self
    }
}

impl SceneCatalog for MemoryCatalog {
    fn scenes(&self, query: &SceneQuery) -> BasinResult<Vec<Scene>> {
        let mut found: Vec<Scene> = self
            .collections
            .get(&query.collection)
            .map(|scenes| {
                scenes
                    .iter()
                    .filter(|s| query.matches(&query.collection, s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by_key(|s| s.acquired);
        Ok(found)
    }
}

/// Optional per-scene metadata file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneMetadata {
    pub acquired: Option<DateTime<Utc>>,
    pub polarizations: Vec<Polarization>,
    pub instrument_mode: Option<AcquisitionMode>,
}

const METADATA_FILE: &str = "metadata.json";

fn scene_date_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?:^|[_-])(\d{8})(?:T(\d{6}))?(?:$|[_-])").ok())
        .as_ref()
}

/// Acquisition time embedded in a scene id (`YYYYMMDD` with optional `THHMMSS`)
pub fn parse_acquisition_time(scene_id: &str) -> Option<DateTime<Utc>> {
    scene_date_pattern()?.captures_iter(scene_id).find_map(|caps| {
        let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y%m%d").ok()?;
        let time = match caps.get(2) {
            Some(t) => NaiveTime::parse_from_str(t.as_str(), "%H%M%S").ok()?,
            None => NaiveTime::from_hms_opt(0, 0, 0)?,
        };
        Some(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
    })
}

/// Catalog reading a directory tree of GeoTIFF bands
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new<P: AsRef<Path>>(root: P) -> BasinResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(BasinError::Config(format!(
                "Catalog root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a collection: its id segments below the root
    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        collection
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |dir, segment| dir.join(segment))
    }

    fn read_metadata(dir: &Path) -> BasinResult<SceneMetadata> {
        let path = dir.join(METADATA_FILE);
        if !path.exists() {
            return Ok(SceneMetadata::default());
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// Load one scene directory; `Ok(None)` when its acquisition time is unknown
    pub fn load_scene(dir: &Path) -> BasinResult<Option<Scene>> {
        let id = dir
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| BasinError::InvalidFormat(format!("Bad scene path {}", dir.display())))?
            .to_string();

        let metadata = Self::read_metadata(dir)?;
        let acquired = match metadata.acquired.or_else(|| parse_acquisition_time(&id)) {
            Some(t) => t,
            None => {
                log::warn!("Skipping scene {}: no acquisition time", id);
                return Ok(None);
            }
        };

        let mut band_files: Vec<(String, PathBuf)> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
            })
            .filter_map(|p| Some((p.file_stem()?.to_str()?.to_string(), p)))
            .collect();
        band_files.sort();

        let mut stack: Option<BandStack> = None;
        for (name, path) in band_files {
            let band = read_band(&path)?;
            let target = stack.get_or_insert_with(|| BandStack::new(band.data.dim(), band.transform, band.crs));
            if target.transform != band.transform || target.crs != band.crs {
                return Err(BasinError::InvalidFormat(format!(
                    "Band {} of scene {} is on a different grid",
                    name, id
                )));
            }
            target.insert(name, band.data)?;
        }

        let stack = match stack {
            Some(s) => s,
            None => {
                log::warn!("Skipping scene {}: no bands", id);
                return Ok(None);
            }
        };

        let properties = SceneProperties {
            polarizations: metadata.polarizations,
            instrument_mode: metadata.instrument_mode,
            radiometry: Radiometry::Raw,
        };
        Ok(Some(Scene::new(id, acquired, stack).with_properties(properties)))
    }
}

impl SceneCatalog for DirectoryCatalog {
    fn scenes(&self, query: &SceneQuery) -> BasinResult<Vec<Scene>> {
        let dir = self.collection_dir(&query.collection);
        if !dir.is_dir() {
            log::warn!("Collection {} not found under {}", query.collection, self.root.display());
            return Ok(Vec::new());
        }

        let mut scene_dirs: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        scene_dirs.sort();

        let mut found = Vec::new();
        for scene_dir in scene_dirs {
            // cheap date filter before reading any raster
            let id = scene_dir.file_name().and_then(|s| s.to_str()).unwrap_or_default();
            if !scene_dir.join(METADATA_FILE).exists() {
                if let Some(t) = parse_acquisition_time(id) {
                    if !query.range.contains(&t) {
                        continue;
                    }
                }
            }
            if let Some(scene) = Self::load_scene(&scene_dir)? {
                if query.matches(&query.collection, &scene) {
                    found.push(scene);
                }
            }
        }
        found.sort_by_key(|s| s.acquired);
        log::info!(
            "Catalog {}: {} scenes in {} over {:?}",
            query.collection,
            found.len(),
            query.range,
            query.bounds
        );
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordinateSystem, GeoTransform};
    use chrono::{Datelike, Timelike};
    use ndarray::Array2;

    #[test]
    fn test_parse_acquisition_time() {
        let t = parse_acquisition_time("LT05_L2SP_173049_19950714_20200912_02_T1").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (1995, 7, 14));

        let t = parse_acquisition_time("S1A_IW_GRDH_1SDV_20150312T154523_20150312T154548_005023").unwrap();
        assert_eq!((t.day(), t.hour(), t.minute()), (12, 15, 45));

        let t = parse_acquisition_time("20250801T081609_20250801T083745_T36PXB").unwrap();
        assert_eq!(t.month(), 8);

        assert!(parse_acquisition_time("scene_without_date").is_none());
        assert!(parse_acquisition_time("LC08_99999999_x").is_none());
    }

    #[test]
    fn test_memory_catalog_query() {
        let stack = BandStack::new(
            (1, 1),
            GeoTransform::north_up(0.0, 30.0, 30.0, 30.0),
            CoordinateSystem::Projected { epsg: 32636 },
        )
        .with_band("B", Array2::zeros((1, 1)))
        .unwrap();
        let at = |m| Utc.with_ymd_and_hms(2015, m, 1, 0, 0, 0).unwrap();
        let catalog = MemoryCatalog::new().with_scenes(
            "C",
            vec![
                Scene::new("late", at(9), stack.clone()),
                Scene::new("early", at(2), stack.clone()),
                Scene::new("outside", Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap(), stack),
            ],
        );

        let query = SceneQuery::new(
            "C",
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            DateRange::calendar_year(2015).unwrap(),
        );
        let ids: Vec<_> = catalog.scenes(&query).unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["early", "late"]);

        let other = SceneQuery::new("D", query.bounds, query.range);
        assert!(catalog.scenes(&other).unwrap().is_empty());

        let far = SceneQuery::new("C", BoundingBox::new(100.0, 100.0, 200.0, 200.0), query.range);
        assert!(catalog.scenes(&far).unwrap().is_empty());
    }

    #[test]
    fn test_collection_dir() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = DirectoryCatalog::new(dir.path()).unwrap();
        assert_eq!(
            catalog.collection_dir("LANDSAT/LT05/C02/T1_L2"),
            dir.path().join("LANDSAT").join("LT05").join("C02").join("T1_L2")
        );
        assert!(DirectoryCatalog::new(dir.path().join("missing")).is_err());
    }
}
