//! Asynchronous raster exports
//!
//! Each [`ExportRequest`] runs as its own tokio task, keyed by its description.
//! Tasks can be cancelled and retried independently; a failing export never
//! affects its siblings.

use crate::io::geotiff::write_band;
use crate::types::{BandStack, BasinError, BasinResult, BoundingBox, GeoTransform};
use ndarray::Array2;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// One image export
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Output name, also the task key
    pub description: String,
    pub folder: String,
    pub image: BandStack,
    /// Output extent in the image CRS
    pub region: BoundingBox,
    /// Output pixel size in meters
    pub scale: f64,
    pub max_pixels: f64,
}

impl ExportRequest {
    /// Output grid shape and transform over the region at the requested scale
    pub fn output_grid(&self) -> BasinResult<((usize, usize), GeoTransform)> {
        if self.scale.is_nan() || self.scale <= 0.0 {
            return Err(self.error(format!("invalid scale {}", self.scale)));
        }
        let (_, lat) = self.region.center();
        let (dx, dy) = self.image.crs.meters_to_map_units(self.scale, lat);
        let cols = ((self.region.width() / dx).ceil() as usize).max(1);
        let rows = ((self.region.height() / dy).ceil() as usize).max(1);
        if rows as f64 * cols as f64 > self.max_pixels {
            return Err(self.error(format!(
                "{} x {} pixels exceeds maxPixels {:e}",
                rows, cols, self.max_pixels
            )));
        }
        let transform = GeoTransform::north_up(self.region.min_x, self.region.max_y, dx, dy);
        Ok(((rows, cols), transform))
    }

    fn error(&self, reason: impl Into<String>) -> BasinError {
        BasinError::Export {
            name: self.description.clone(),
            reason: reason.into(),
        }
    }
}

/// Nearest-neighbour resample of every band onto a new grid
pub fn resample_nearest(image: &BandStack, shape: (usize, usize), transform: GeoTransform) -> BasinResult<BandStack> {
    let source = image.transform;
    let source_shape = image.shape();
    let lookup: Array2<Option<(usize, usize)>> = Array2::from_shape_fn(shape, |(r, c)| {
        let (x, y) = transform.pixel_center(r, c);
        source.world_to_pixel(x, y, source_shape)
    });

    let mut out = BandStack::new(shape, transform, image.crs);
    for (name, band) in image.bands() {
        out.insert(name, lookup.mapv(|p| p.map_or(f32::NAN, |p| band[p])))?;
    }
    Ok(out)
}

/// Destination of export tasks
pub trait ExportSink: Send + Sync {
    /// Write the request, returning the files produced
    fn write(&self, request: &ExportRequest) -> BasinResult<Vec<PathBuf>>;
}

/// Writes one single-band float GeoTIFF per band: `<root>/<folder>/<description>_<band>.tif`
#[derive(Debug, Clone)]
pub struct GeoTiffSink {
    root: PathBuf,
}

impl GeoTiffSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ExportSink for GeoTiffSink {
    fn write(&self, request: &ExportRequest) -> BasinResult<Vec<PathBuf>> {
        let (shape, transform) = request.output_grid()?;
        let resampled = resample_nearest(&request.image, shape, transform)?;

        let dir = self.root.join(&request.folder);
        std::fs::create_dir_all(&dir)?;
        let mut files = Vec::with_capacity(resampled.len());
        for (name, band) in resampled.bands() {
            let path = dir.join(format!("{}_{}.tif", request.description, name));
            write_band(&path, band, &resampled.transform, resampled.crs)?;
            files.push(path);
        }
        log::info!(
            "Export {} wrote {} band(s) at {} m to {}",
            request.description,
            files.len(),
            request.scale,
            dir.display()
        );
        Ok(files)
    }
}

/// State of an export task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Queued,
    Running,
    Completed(Vec<PathBuf>),
    Failed(String),
    Cancelled,
}

impl ExportStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ExportStatus::Queued | ExportStatus::Running)
    }
}

struct ExportTask {
    request: Arc<ExportRequest>,
    status: Arc<Mutex<ExportStatus>>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Fire-and-forget export task queue
pub struct ExportQueue {
    runtime: Runtime,
    sink: Arc<dyn ExportSink>,
    tasks: HashMap<String, ExportTask>,
}

impl ExportQueue {
    pub fn new(sink: Arc<dyn ExportSink>) -> BasinResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("basinscope-export")
            .build()?;
        Ok(Self {
            runtime,
            sink,
            tasks: HashMap::new(),
        })
    }

    /// Queue a request. Fails if a task with the same name is still pending.
    pub fn submit(&mut self, request: ExportRequest) -> BasinResult<()> {
        if let Some(task) = self.tasks.get(&request.description) {
            if !task.status.lock().is_finished() {
                return Err(BasinError::Export {
                    name: request.description,
                    reason: "a task with this name is already pending".to_string(),
                });
            }
        }
        log::info!("Queueing export {}", request.description);
        let name = request.description.clone();
        let task = self.spawn(Arc::new(request));
        self.tasks.insert(name, task);
        Ok(())
    }

    fn spawn(&self, request: Arc<ExportRequest>) -> ExportTask {
        let status = Arc::new(Mutex::new(ExportStatus::Queued));
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = self.runtime.spawn({
            let (request, status, cancel) = (request.clone(), status.clone(), cancel.clone());
            let sink = self.sink.clone();
            async move {
                {
                    let mut s = status.lock();
                    if cancel.load(Ordering::SeqCst) {
                        *s = ExportStatus::Cancelled;
                        return;
                    }
                    *s = ExportStatus::Running;
                }
                let job = request.clone();
                let result = tokio::task::spawn_blocking(move || sink.write(&job)).await;

                let mut s = status.lock();
                *s = if cancel.load(Ordering::SeqCst) {
                    ExportStatus::Cancelled
                } else {
                    match result {
                        Ok(Ok(files)) => ExportStatus::Completed(files),
                        Ok(Err(e)) => {
                            log::warn!("Export {} failed: {}", request.description, e);
                            ExportStatus::Failed(e.to_string())
                        }
                        Err(e) => {
                            log::warn!("Export {} panicked: {}", request.description, e);
                            ExportStatus::Failed(format!("export task panicked: {}", e))
                        }
                    }
                };
            }
        });
        ExportTask {
            request,
            status,
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancel a pending task. Returns false if unknown or already finished.
    pub fn cancel(&mut self, name: &str) -> bool {
        let task = match self.tasks.get_mut(name) {
            Some(task) => task,
            None => return false,
        };
        let mut status = task.status.lock();
        if status.is_finished() {
            return false;
        }
        task.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = &task.handle {
            handle.abort();
        }
        *status = ExportStatus::Cancelled;
        log::info!("Cancelled export {}", name);
        true
    }

    /// Re-run a failed or cancelled task with its original request
    pub fn retry(&mut self, name: &str) -> BasinResult<()> {
        let request = match self.tasks.get(name) {
            Some(task) => {
                let status = task.status.lock().clone();
                match status {
                    ExportStatus::Failed(_) | ExportStatus::Cancelled => task.request.clone(),
                    other => {
                        return Err(BasinError::Export {
                            name: name.to_string(),
                            reason: format!("cannot retry a task in state {:?}", other),
                        })
                    }
                }
            }
            None => {
                return Err(BasinError::Export {
                    name: name.to_string(),
                    reason: "unknown export".to_string(),
                })
            }
        };
        log::info!("Retrying export {}", name);
        let task = self.spawn(request);
        self.tasks.insert(name.to_string(), task);
        Ok(())
    }

    pub fn status(&self, name: &str) -> Option<ExportStatus> {
        self.tasks.get(name).map(|t| t.status.lock().clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Block until every task has finished and return the final states
    pub fn wait_all(&mut self) -> BTreeMap<String, ExportStatus> {
        let handles: Vec<JoinHandle<()>> = self.tasks.values_mut().filter_map(|t| t.handle.take()).collect();
        self.runtime.block_on(async {
            for handle in handles {
                // aborted tasks report a JoinError; their status is already set
                let _ = handle.await;
            }
        });
        self.tasks
            .iter()
            .map(|(name, task)| (name.clone(), task.status.lock().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoordinateSystem;

    fn image() -> BandStack {
        BandStack::new(
            (2, 2),
            GeoTransform::north_up(0.0, 60.0, 30.0, 30.0),
            CoordinateSystem::Projected { epsg: 32636 },
        )
        .with_band("MNDWI", ndarray::arr2(&[[1.0, 2.0], [3.0, 4.0]]))
        .unwrap()
    }

    fn request(name: &str, scale: f64) -> ExportRequest {
        ExportRequest {
            description: name.to_string(),
            folder: "out".to_string(),
            image: image(),
            region: BoundingBox::new(0.0, 0.0, 60.0, 60.0),
            scale,
            max_pixels: 1e9,
        }
    }

    #[test]
    fn test_output_grid_and_resample() {
        let req = request("a", 10.0);
        let (shape, transform) = req.output_grid().unwrap();
        assert_eq!(shape, (6, 6));
        let out = resample_nearest(&req.image, shape, transform).unwrap();
        let band = out.band("MNDWI").unwrap();
        assert_eq!(band[[0, 0]], 1.0);
        assert_eq!(band[[5, 5]], 4.0);
        assert_eq!(band[[2, 3]], 2.0);
    }

    #[test]
    fn test_max_pixels() {
        let mut req = request("big", 1.0);
        req.max_pixels = 100.0;
        assert!(matches!(req.output_grid(), Err(BasinError::Export { .. })));
    }

    #[test]
    fn test_geotiff_sink_writes_bands() {
        let dir = tempfile::tempdir().unwrap();
        let sink = GeoTiffSink::new(dir.path());
        let files = sink.write(&request("AlGash_SAR_2015", 30.0)).unwrap();
        assert_eq!(files, vec![dir.path().join("out").join("AlGash_SAR_2015_MNDWI.tif")]);
        assert!(files[0].exists());
    }
}
