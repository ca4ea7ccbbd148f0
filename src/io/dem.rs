//! SRTM 1 arc-second elevation tiles
//!
//! Tiles are 1x1 degree `.hgt` grids of big-endian `i16` meters, named after
//! their south-west corner (e.g. `N15E036`). They are fetched gzipped from the
//! AWS skadi mirror and cached on disk.

use crate::core::region::Region;
use crate::types::{Band, BandStack, BasinError, BasinResult, BoundingBox, CoordinateSystem, GeoTransform};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Void marker in `.hgt` files
pub const SRTM_VOID: i16 = -32768;

/// Band name of the elevation raster
pub const ELEVATION_BAND: &str = "elevation";

const SKADI_URL: &str = "https://s3.amazonaws.com/elevation-tiles-prod/skadi";

/// A 1x1 degree SRTM tile identified by its south-west corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SrtmTile {
    pub lat: i32,
    pub lon: i32,
}

impl SrtmTile {
    pub fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// `N15E036` style name
    pub fn name(&self) -> String {
        let lat_prefix = if self.lat >= 0 { "N" } else { "S" };
        let lon_prefix = if self.lon >= 0 { "E" } else { "W" };
        format!("{}{:02}{}{:03}", lat_prefix, self.lat.abs(), lon_prefix, self.lon.abs())
    }

    /// Parse a tile name, ignoring case and any extension
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_uppercase();
        let bytes = name.as_bytes();
        if bytes.len() < 7 {
            return None;
        }
        let lat_sign = match bytes[0] {
            b'N' => 1,
            b'S' => -1,
            _ => return None,
        };
        let lon_sign = match bytes[3] {
            b'E' => 1,
            b'W' => -1,
            _ => return None,
        };
        let lat: i32 = name.get(1..3)?.parse().ok()?;
        let lon: i32 = name.get(4..7)?.parse().ok()?;
        Some(Self::new(lat_sign * lat, lon_sign * lon))
    }

    /// AWS skadi layout: `/N15/N15E036.hgt.gz`
    pub fn skadi_url(&self) -> String {
        let name = self.name();
        format!("{}/{}/{}.hgt.gz", SKADI_URL, &name[0..3], name)
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.lon as f64,
            self.lat as f64,
            self.lon as f64 + 1.0,
            self.lat as f64 + 1.0,
        )
    }
}

/// Digital elevation model reader for SRTM tiles
pub struct DemReader;

impl DemReader {
    /// Tiles covering a geographic bounding box
    pub fn calculate_srtm_tiles(bbox: &BoundingBox) -> Vec<SrtmTile> {
        let min_lat = bbox.min_y.floor() as i32;
        let max_lat = (bbox.max_y.ceil() as i32).max(min_lat + 1);
        let min_lon = bbox.min_x.floor() as i32;
        let max_lon = (bbox.max_x.ceil() as i32).max(min_lon + 1);

        let mut tiles = Vec::new();
        for lat in min_lat..max_lat {
            for lon in min_lon..max_lon {
                tiles.push(SrtmTile::new(lat, lon));
            }
        }
        log::debug!(
            "Required SRTM tiles: {:?}",
            tiles.iter().map(SrtmTile::name).collect::<Vec<_>>()
        );
        tiles
    }

    /// Platform cache directory for downloaded tiles
    pub fn default_cache_dir() -> BasinResult<PathBuf> {
        dirs::cache_dir()
            .map(|d| d.join("basinscope").join("srtm"))
            .ok_or_else(|| BasinError::Config("No platform cache directory available".to_string()))
    }

    /// Download the tiles covering `bbox` into `cache_dir`, reusing cached files
    pub fn download_srtm_tiles(bbox: &BoundingBox, cache_dir: &Path) -> BasinResult<Vec<PathBuf>> {
        log::info!("Fetching SRTM tiles for bounding box: {:?}", bbox);
        std::fs::create_dir_all(cache_dir)?;

        let mut files = Vec::new();
        for tile in Self::calculate_srtm_tiles(bbox) {
            let output_path = cache_dir.join(format!("{}.hgt", tile.name()));
            if output_path.exists() {
                log::debug!("SRTM tile {} cached, skipping download", tile.name());
                files.push(output_path);
                continue;
            }
            match Self::download_and_extract_srtm_tile(&tile.skadi_url(), &output_path) {
                Ok(()) => files.push(output_path),
                // ocean tiles do not exist on the mirror
                Err(e) => log::warn!("SRTM tile {} unavailable: {}", tile.name(), e),
            }
        }

        if files.is_empty() {
            return Err(BasinError::Processing(
                "Failed to obtain any SRTM tile for the region".to_string(),
            ));
        }
        Ok(files)
    }

    /// Download a tile with retries
    fn download_and_extract_srtm_tile(url: &str, output_path: &Path) -> BasinResult<()> {
        log::info!("Downloading SRTM tile from: {}", url);

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .user_agent(concat!("basinscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BasinError::Http(format!("Failed to create HTTP client: {}", e)))?;

        let max_retries = 3;
        let mut last_error = None;
        for attempt in 1..=max_retries {
            match Self::try_download_once(&client, url, output_path) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!("Download attempt {} of {} failed: {}", attempt, max_retries, e);
                    last_error = Some(e);
                    if attempt < max_retries {
                        std::thread::sleep(std::time::Duration::from_secs(2));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BasinError::Http("Download failed after all retries".to_string())))
    }

    fn try_download_once(client: &reqwest::blocking::Client, url: &str, output_path: &Path) -> BasinResult<()> {
        let response = client
            .get(url)
            .send()
            .map_err(|e| BasinError::Http(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(BasinError::Http(format!(
                "HTTP {}: {}",
                response.status().as_u16(),
                url
            )));
        }

        let content = response
            .bytes()
            .map_err(|e| BasinError::Http(format!("Failed to read response body: {}", e)))?;

        // Anything this small is an error page
        if content.len() < 1024 {
            return Err(BasinError::Http(format!(
                "Downloaded file too small ({} bytes)",
                content.len()
            )));
        }

        let hgt = Self::decompress(&content)?;
        std::fs::write(output_path, hgt)?;
        log::debug!("Wrote {}", output_path.display());
        Ok(())
    }

    /// Raw `.hgt` bytes from gzip, zip or plain content
    pub fn decompress(content: &[u8]) -> BasinResult<Vec<u8>> {
        if Self::is_gzip_content(content) {
            Self::extract_gzipped_hgt(content)
        } else if Self::is_zip_content(content) {
            Self::extract_srtm_zip(content)
        } else {
            Ok(content.to_vec())
        }
    }

    fn is_gzip_content(content: &[u8]) -> bool {
        content.len() >= 2 && content[0] == 0x1F && content[1] == 0x8B
    }

    fn is_zip_content(content: &[u8]) -> bool {
        content.len() >= 4 && content[0..4] == [0x50, 0x4B, 0x03, 0x04]
    }

    fn extract_srtm_zip(zip_data: &[u8]) -> BasinResult<Vec<u8>> {
        use std::io::{Cursor, Read};
        use zip::ZipArchive;

        let mut archive = ZipArchive::new(Cursor::new(zip_data))
            .map_err(|e| BasinError::InvalidFormat(format!("Failed to open ZIP archive: {}", e)))?;

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| BasinError::InvalidFormat(format!("Failed to read ZIP entry {}: {}", i, e)))?;
            if file.name().to_lowercase().ends_with(".hgt") {
                log::debug!("Extracting HGT file: {}", file.name());
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer)?;
                return Ok(buffer);
            }
        }

        Err(BasinError::InvalidFormat("No HGT file found in ZIP archive".to_string()))
    }

    fn extract_gzipped_hgt(gzip_data: &[u8]) -> BasinResult<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut decoder = GzDecoder::new(gzip_data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        if decompressed.is_empty() {
            return Err(BasinError::InvalidFormat("Decompressed HGT file is empty".to_string()));
        }
        Ok(decompressed)
    }

    /// Decode `.hgt` bytes of `tile`. Voids become no-data.
    pub fn decode_hgt(bytes: &[u8], tile: SrtmTile) -> BasinResult<(Band, GeoTransform)> {
        let samples = bytes.len() / 2;
        let side = (samples as f64).sqrt().round() as usize;
        if bytes.len() % 2 != 0 || side < 2 || side * side != samples {
            return Err(BasinError::InvalidFormat(format!(
                "{} bytes is not a square HGT grid",
                bytes.len()
            )));
        }

        let values: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|c| match i16::from_be_bytes([c[0], c[1]]) {
                SRTM_VOID => f32::NAN,
                v => v as f32,
            })
            .collect();
        let dem = Array2::from_shape_vec((side, side), values)
            .map_err(|e| BasinError::Processing(format!("Failed to reshape HGT data: {}", e)))?;

        // samples sit on the integer degree lines, so pixel centres straddle the tile edge
        let step = 1.0 / (side - 1) as f64;
        let transform = GeoTransform::north_up(
            tile.lon as f64 - step / 2.0,
            tile.lat as f64 + 1.0 + step / 2.0,
            step,
            step,
        );
        Ok((dem, transform))
    }

    /// Read a cached `.hgt` file; the tile is taken from the file name
    pub fn read_hgt(path: &Path) -> BasinResult<(SrtmTile, Band, GeoTransform)> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| BasinError::InvalidFormat(format!("Bad HGT path {}", path.display())))?;
        let tile = SrtmTile::parse(stem)
            .ok_or_else(|| BasinError::InvalidFormat(format!("{} is not an SRTM tile name", stem)))?;
        let bytes = std::fs::read(path)?;
        let (dem, transform) = Self::decode_hgt(&bytes, tile)?;
        Ok((tile, dem, transform))
    }

    /// Nearest-neighbour mosaic of tiles onto a geographic grid over `bbox`
    pub fn create_dem_mosaic(
        tiles: &[(Band, GeoTransform)],
        bbox: &BoundingBox,
        resolution_deg: (f64, f64),
    ) -> BasinResult<BandStack> {
        let (dx, dy) = resolution_deg;
        if dx <= 0.0 || dy <= 0.0 {
            return Err(BasinError::Config("DEM resolution must be positive".to_string()));
        }
        let cols = ((bbox.width() / dx).ceil() as usize).max(1);
        let rows = ((bbox.height() / dy).ceil() as usize).max(1);
        let transform = GeoTransform::north_up(bbox.min_x, bbox.max_y, dx, dy);
        log::info!("Creating DEM mosaic from {} tiles: {}x{} grid", tiles.len(), rows, cols);

        let dem = Array2::from_shape_fn((rows, cols), |(r, c)| {
            let (x, y) = transform.pixel_center(r, c);
            tiles
                .iter()
                .find_map(|(band, t)| {
                    t.world_to_pixel(x, y, band.dim())
                        .map(|p| band[p])
                        .filter(|v| v.is_finite())
                })
                .unwrap_or(f32::NAN)
        });

        BandStack::new((rows, cols), transform, CoordinateSystem::Geographic)
            .with_band(ELEVATION_BAND, dem)
    }

    /// Elevation over a geographic region at roughly `resolution_m`, clipped to the region
    pub fn elevation_for_region(region: &Region, cache_dir: &Path, resolution_m: f64) -> BasinResult<BandStack> {
        let bbox = region.bounds();
        let files = Self::download_srtm_tiles(&bbox, cache_dir)?;
        let tiles = files
            .iter()
            .map(|f| Self::read_hgt(f).map(|(_, dem, t)| (dem, t)))
            .collect::<BasinResult<Vec<_>>>()?;

        let (_, lat) = bbox.center();
        let resolution = CoordinateSystem::Geographic.meters_to_map_units(resolution_m, lat);
        let mosaic = Self::create_dem_mosaic(&tiles, &bbox, resolution)?;
        region.clip(&mosaic)
    }
}
