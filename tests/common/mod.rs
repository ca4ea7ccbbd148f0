#![allow(dead_code)]

use basinscope::core::band_profile::Sensor;
use basinscope::core::region::Region;
use basinscope::types::{
    AcquisitionMode, BandStack, BoundingBox, CoordinateSystem, GeoTransform, Polarization, Radiometry, Scene,
    SceneProperties,
};
use chrono::{DateTime, TimeZone, Utc};
use ndarray::Array2;

pub const SHAPE: (usize, usize) = (3, 3);
pub const UTM_36N: CoordinateSystem = CoordinateSystem::Projected { epsg: 32636 };

/// 3 x 3 grid of 30 m pixels over [0, 90] x [0, 90]
pub fn grid() -> BandStack {
    BandStack::new(SHAPE, GeoTransform::north_up(0.0, 90.0, 30.0, 30.0), UTM_36N)
}

pub fn region() -> Region {
    Region::from_bounds("gash", BoundingBox::new(0.0, 0.0, 90.0, 90.0)).expect("valid region")
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 8, 0, 0).unwrap()
}

/// Surface reflectances (blue, green, red, nir, swir1) producing the given indices
pub fn reflectances(mndwi: f64, ndvi: f64, bsi: f64) -> [f64; 5] {
    let red = 0.065;
    let blue = 0.085;
    let nir = red * (1.0 + ndvi) / (1.0 - ndvi);
    let soil = (nir + blue) * (1.0 + bsi) / (1.0 - bsi);
    let swir1 = soil - red;
    let green = swir1 * (1.0 + mndwi) / (1.0 - mndwi);
    [blue, green, red, nir, swir1]
}

/// Digital number that rescales to `reflectance`
pub fn landsat_dn(reflectance: f64) -> f32 {
    ((reflectance + 0.2) / 0.0000275) as f32
}

pub fn sentinel2_dn(reflectance: f64) -> f32 {
    (reflectance * 10_000.0) as f32
}

/// Uniform optical scene with raw digital numbers and a QA band
pub fn optical_scene(sensor: Sensor, id: &str, acquired: DateTime<Utc>, indices: (f64, f64, f64), qa: u16) -> Scene {
    let profile = sensor.profile();
    let values = reflectances(indices.0, indices.1, indices.2);
    let names = [&profile.blue, &profile.green, &profile.red, &profile.nir, &profile.swir1];

    let mut stack = grid();
    for (name, value) in names.iter().zip(values) {
        let dn = match sensor {
            Sensor::Sentinel2Msi => sentinel2_dn(value),
            _ => landsat_dn(value),
        };
        stack.insert(name.as_str(), Array2::from_elem(SHAPE, dn)).unwrap();
    }
    stack
        .insert(sensor.qa_band(), Array2::from_elem(SHAPE, qa as f32))
        .unwrap();
    Scene::new(id, acquired, stack)
}

/// Uniform Sentinel-1 VV scene in dB
pub fn sar_scene(id: &str, acquired: DateTime<Utc>, vv_db: f32, mode: AcquisitionMode) -> Scene {
    let stack = grid()
        .with_band("VV", Array2::from_elem(SHAPE, vv_db))
        .unwrap()
        .with_band("VH", Array2::from_elem(SHAPE, vv_db - 7.0))
        .unwrap();
    Scene::new(id, acquired, stack).with_properties(SceneProperties {
        polarizations: vec![Polarization::VV, Polarization::VH],
        instrument_mode: Some(mode),
        radiometry: Radiometry::Raw,
    })
}
