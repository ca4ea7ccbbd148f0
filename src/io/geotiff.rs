//! Single-band float GeoTIFF reading and writing
//!
//! The native path uses the `tiff` crate and understands the pixel scale,
//! tiepoint and GeoKey directory tags. The `gdal` feature adds a GDAL writer.

use crate::types::{Band, BasinError, BasinResult, CoordinateSystem, GeoTransform};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u32 = 1024;
const GT_RASTER_TYPE_KEY: u32 = 1025;
const GEOGRAPHIC_TYPE_KEY: u32 = 2048;
const PROJECTED_CS_TYPE_KEY: u32 = 3072;

const MODEL_TYPE_PROJECTED: u32 = 1;
const MODEL_TYPE_GEOGRAPHIC: u32 = 2;
const WGS84: u32 = 4326;

/// `tiff` decodes well-known codes into named tags, so look them up by code
fn geotiff_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// A georeferenced band read from disk
#[derive(Debug, Clone)]
pub struct GeoBand {
    pub data: Band,
    pub transform: GeoTransform,
    pub crs: CoordinateSystem,
}

/// Read the first image of a GeoTIFF as `f32`
pub fn read_band<P: AsRef<Path>>(path: P) -> BasinResult<GeoBand> {
    let path = path.as_ref();
    log::debug!("Reading GeoTIFF band {}", path.display());
    let file = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(file)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let nodata = read_nodata(&mut decoder);
    let (rows, cols) = (height as usize, width as usize);

    let data: Vec<f32> = match decoder.read_image()? {
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        _ => {
            return Err(BasinError::InvalidFormat(format!(
                "{}: unsupported TIFF sample format",
                path.display()
            )))
        }
    };

    let data: Vec<f32> = match nodata {
        Some(fill) => data
            .into_iter()
            .map(|v| if f64::from(v) == fill { f32::NAN } else { v })
            .collect(),
        None => data,
    };

    let data = Array2::from_shape_vec((rows, cols), data).map_err(|e| {
        BasinError::InvalidFormat(format!("{}: {} x {} image: {}", path.display(), rows, cols, e))
    })?;

    let transform = read_geotransform(&mut decoder).ok_or_else(|| {
        BasinError::InvalidFormat(format!("{} has no georeferencing tags", path.display()))
    })?;
    let crs = read_crs(&mut decoder);

    Ok(GeoBand { data, transform, crs })
}

/// Finite GDAL no-data value, if any. A NaN no-data needs no mapping.
fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(geotiff_tag(GDAL_NODATA)).ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    value.is_finite().then_some(value)
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(geotiff_tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(geotiff_tag(MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::north_up(origin_x, origin_y, scale[0], scale[1]))
}

/// CRS from the GeoKey directory; defaults to geographic when absent
fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> CoordinateSystem {
    let keys = match decoder.get_tag_u32_vec(geotiff_tag(GEO_KEY_DIRECTORY)) {
        Ok(keys) if keys.len() >= 4 => keys,
        _ => return CoordinateSystem::Geographic,
    };
    let lookup = |id: u32| {
        keys[4..]
            .chunks_exact(4)
            .find(|entry| entry[0] == id && entry[1] == 0)
            .map(|entry| entry[3])
    };
    match (lookup(GT_MODEL_TYPE_KEY), lookup(PROJECTED_CS_TYPE_KEY)) {
        (Some(MODEL_TYPE_PROJECTED), Some(epsg)) => CoordinateSystem::Projected { epsg },
        (Some(MODEL_TYPE_GEOGRAPHIC), _) | (None, _) => CoordinateSystem::Geographic,
        (Some(model), epsg) => {
            log::warn!("Unsupported GeoTIFF model type {} (EPSG {:?}), assuming geographic", model, epsg);
            CoordinateSystem::Geographic
        }
    }
}

fn geokeys(crs: CoordinateSystem) -> Vec<u16> {
    let (model, key, code) = match crs {
        CoordinateSystem::Projected { epsg } => (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_KEY, epsg),
        CoordinateSystem::Geographic => (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_KEY, WGS84),
    };
    [
        [1, 1, 0, 3], // version 1.1.0, 3 keys
        [GT_MODEL_TYPE_KEY, 0, 1, model],
        [GT_RASTER_TYPE_KEY, 0, 1, 1], // pixel is area
        [key, 0, 1, code],
    ]
    .iter()
    .flatten()
    .map(|&v| v as u16)
    .collect()
}

/// Write a band as a single-band `f32` GeoTIFF with `NaN` no-data
pub fn write_band<P: AsRef<Path>>(
    path: P,
    band: &Band,
    transform: &GeoTransform,
    crs: CoordinateSystem,
) -> BasinResult<()> {
    write_band_with_nodata(path, band, transform, crs, f64::NAN)
}

/// Write a band, declaring `nodata` as its GDAL no-data value
pub fn write_band_with_nodata<P: AsRef<Path>>(
    path: P,
    band: &Band,
    transform: &GeoTransform,
    crs: CoordinateSystem,
    nodata: f64,
) -> BasinResult<()> {
    let path = path.as_ref();
    if transform.rotation_x != 0.0 || transform.rotation_y != 0.0 {
        return Err(BasinError::InvalidFormat(
            "Rotated transforms cannot be written as GeoTIFF tiepoints".to_string(),
        ));
    }
    log::debug!("Writing GeoTIFF {}", path.display());

    let (rows, cols) = band.dim();
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;

    let scale = [transform.pixel_width, transform.pixel_height.abs(), 0.0];
    image.encoder().write_tag(geotiff_tag(MODEL_PIXEL_SCALE), &scale[..])?;
    let tiepoint = [0.0, 0.0, 0.0, transform.top_left_x, transform.top_left_y, 0.0];
    image.encoder().write_tag(geotiff_tag(MODEL_TIEPOINT), &tiepoint[..])?;
    image.encoder().write_tag(geotiff_tag(GEO_KEY_DIRECTORY), geokeys(crs).as_slice())?;
    let nodata = if nodata.is_nan() { "nan".to_string() } else { nodata.to_string() };
    image.encoder().write_tag(geotiff_tag(GDAL_NODATA), nodata.as_str())?;

    let data: Vec<f32> = band.iter().copied().collect();
    image.write_data(&data)?;
    Ok(())
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for BasinError {
    fn from(err: gdal::errors::GdalError) -> Self {
        BasinError::Gdal(err.to_string())
    }
}

/// Write a band through GDAL's GTiff driver
#[cfg(feature = "gdal")]
pub fn write_band_gdal<P: AsRef<Path>>(
    path: P,
    band: &Band,
    transform: &GeoTransform,
    crs: CoordinateSystem,
    compression: Option<&str>,
) -> BasinResult<()> {
    use gdal::raster::Buffer;
    use gdal::spatial_ref::SpatialRef;
    use gdal::DriverManager;

    log::info!("Saving GeoTIFF with GDAL: {}", path.as_ref().display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = band.dim();
    let mut dataset =
        driver.create_with_band_type::<f32, _>(path.as_ref(), width as isize, height as isize, 1)?;

    dataset.set_geo_transform(&transform.to_gdal())?;
    let epsg = match crs {
        CoordinateSystem::Projected { epsg } => epsg,
        CoordinateSystem::Geographic => WGS84,
    };
    dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;

    let mut rasterband = dataset.rasterband(1)?;
    let buffer = Buffer::new((width, height), band.iter().copied().collect());
    rasterband.write((0, 0), (width, height), &buffer)?;
    rasterband.set_no_data_value(Some(f64::NAN))?;

    if let Some(compression_type) = compression {
        dataset.set_metadata_item("COMPRESS", compression_type, "")?;
    }
    Ok(())
}
