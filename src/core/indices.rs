//! Spectral indices computed per pixel from a scene's band profile
//!
//! - MNDWI (modified normalized difference water index): `(green - swir1) / (green + swir1)`
//! - NDVI: `(nir - red) / (nir + red)`
//! - BSI (bare soil index): `((swir1 + red) - (nir + blue)) / ((swir1 + red) + (nir + blue))`
//!
//! A zero denominator or a no-data input gives no-data (`NaN`), never an error.

use crate::core::band_profile::{BandProfile, Sensor};
use crate::types::{Band, BasinError, BasinResult, Scene};
use ndarray::{Array2, Zip};

pub const MNDWI: &str = "MNDWI";
pub const NDVI: &str = "NDVI";
pub const BSI: &str = "BSI";
pub const MONTH: &str = "month";

/// Names of the bands added by [`IndexEngine::augment`]
pub const INDEX_BANDS: [&str; 4] = [MNDWI, NDVI, BSI, MONTH];

#[inline]
fn ratio(num: f32, den: f32) -> f32 {
    if !num.is_finite() || !den.is_finite() || den == 0.0 {
        f32::NAN
    } else {
        num / den
    }
}

fn check_shapes(bands: &[&Band]) -> BasinResult<()> {
    let shape = bands[0].dim();
    match bands.iter().find(|b| b.dim() != shape) {
        Some(b) => Err(BasinError::InvalidFormat(format!(
            "Index inputs differ in shape: {:?} vs {:?}",
            b.dim(),
            shape
        ))),
        None => Ok(()),
    }
}

fn map2(a: &Band, b: &Band, f: impl Fn(f32, f32) -> f32 + Sync + Send) -> BasinResult<Band> {
    check_shapes(&[a, b])?;
    let mut out = Array2::<f32>::zeros(a.dim());
    let zip = Zip::from(&mut out).and(a).and(b);
    #[cfg(feature = "parallel")]
    zip.par_for_each(|o, &x, &y| *o = f(x, y));
    #[cfg(not(feature = "parallel"))]
    zip.for_each(|o, &x, &y| *o = f(x, y));
    Ok(out)
}

fn map4(
    a: &Band,
    b: &Band,
    c: &Band,
    d: &Band,
    f: impl Fn(f32, f32, f32, f32) -> f32 + Sync + Send,
) -> BasinResult<Band> {
    check_shapes(&[a, b, c, d])?;
    let mut out = Array2::<f32>::zeros(a.dim());
    let zip = Zip::from(&mut out).and(a).and(b).and(c).and(d);
    #[cfg(feature = "parallel")]
    zip.par_for_each(|o, &w, &x, &y, &z| *o = f(w, x, y, z));
    #[cfg(not(feature = "parallel"))]
    zip.for_each(|o, &w, &x, &y, &z| *o = f(w, x, y, z));
    Ok(out)
}

/// `(a - b) / (a + b)`
pub fn normalized_difference(a: &Band, b: &Band) -> BasinResult<Band> {
    map2(a, b, |x, y| ratio(x - y, x + y))
}

pub fn mndwi(green: &Band, swir1: &Band) -> BasinResult<Band> {
    normalized_difference(green, swir1)
}

pub fn ndvi(nir: &Band, red: &Band) -> BasinResult<Band> {
    normalized_difference(nir, red)
}

pub fn bsi(blue: &Band, red: &Band, nir: &Band, swir1: &Band) -> BasinResult<Band> {
    map4(blue, red, nir, swir1, |b, r, n, s| {
        let soil = s + r;
        let veg = n + b;
        ratio(soil - veg, soil + veg)
    })
}

/// Constant band holding the acquisition month
pub fn month_band(shape: (usize, usize), month: u32) -> Band {
    Array2::from_elem(shape, month as f32)
}

/// Adds MNDWI, NDVI, BSI and month bands to a scene
#[derive(Debug, Clone)]
pub struct IndexEngine {
    profile: BandProfile,
}

impl IndexEngine {
    pub fn new(profile: BandProfile) -> Self {
        Self { profile }
    }

    pub fn for_sensor(sensor: Sensor) -> Self {
        Self::new(sensor.profile())
    }

    pub fn profile(&self) -> &BandProfile {
        &self.profile
    }

    /// New scene with the input bands plus the four index bands
    pub fn augment(&self, scene: &Scene) -> BasinResult<Scene> {
        self.profile.validate(scene)?;
        let p = &self.profile;
        let blue = scene.band(&p.blue)?;
        let green = scene.band(&p.green)?;
        let red = scene.band(&p.red)?;
        let nir = scene.band(&p.nir)?;
        let swir1 = scene.band(&p.swir1)?;

        let mut out = scene.clone();
        out.stack.insert(MNDWI, mndwi(green, swir1)?)?;
        out.stack.insert(NDVI, ndvi(nir, red)?)?;
        out.stack.insert(BSI, bsi(blue, red, nir, swir1)?)?;
        out.stack
            .insert(MONTH, month_band(scene.stack.shape(), scene.month()))?;

        log::debug!("Scene {}: added index bands {:?}", scene.id, INDEX_BANDS);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BandStack, CoordinateSystem, GeoTransform};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::arr2;

    #[test]
    fn test_mndwi_values() {
        let green = arr2(&[[0.3, 0.1]]);
        let swir = arr2(&[[0.1, 0.3]]);
        let out = mndwi(&green, &swir).unwrap();
        assert_relative_eq!(out[[0, 0]], 0.5, epsilon = 1e-6);
        assert_relative_eq!(out[[0, 1]], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_denominator_is_nodata() {
        let a = arr2(&[[0.0, 0.2, f32::NAN]]);
        let b = arr2(&[[0.0, -0.2, 0.1]]);
        let out = normalized_difference(&a, &b).unwrap();
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_bsi_formula() {
        let out = bsi(
            &arr2(&[[0.1]]),
            &arr2(&[[0.2]]),
            &arr2(&[[0.3]]),
            &arr2(&[[0.4]]),
        )
        .unwrap();
        // ((0.4 + 0.2) - (0.3 + 0.1)) / 1.0
        assert_relative_eq!(out[[0, 0]], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_indices_stay_within_unit_range() {
        let levels = [0.001f32, 0.01, 0.05, 0.1, 0.2, 0.35, 0.5, 0.75, 1.0];
        let n = levels.len();
        let count = n.pow(5);
        // every (blue, green, red, nir, swir1) combination, one per column
        let band = |k: u32| Array2::from_shape_fn((1, count), |(_, i)| levels[(i / n.pow(k)) % n]);
        let (blue, green, red, nir, swir1) = (band(0), band(1), band(2), band(3), band(4));

        let outputs = [
            mndwi(&green, &swir1).unwrap(),
            ndvi(&nir, &red).unwrap(),
            bsi(&blue, &red, &nir, &swir1).unwrap(),
        ];
        for out in &outputs {
            for &v in out.iter() {
                assert!(v.is_finite() && (-1.0..=1.0).contains(&v), "index {} out of range", v);
            }
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array2::<f32>::zeros((2, 2));
        let b = Array2::<f32>::zeros((2, 3));
        assert!(ndvi(&a, &b).is_err());
    }

    #[test]
    fn test_augment_adds_bands() {
        let profile = Sensor::Sentinel2Msi.profile();
        let mut stack = BandStack::new(
            (1, 2),
            GeoTransform::north_up(0.0, 10.0, 10.0, 10.0),
            CoordinateSystem::Projected { epsg: 32636 },
        );
        for name in ["B2", "B3", "B4", "B8", "B11"] {
            stack.insert(name, Array2::from_elem((1, 2), 0.2)).unwrap();
        }
        let scene = Scene::new("S2_20250815", Utc.with_ymd_and_hms(2025, 8, 15, 8, 0, 0).unwrap(), stack);

        let out = IndexEngine::new(profile).augment(&scene).unwrap();
        for name in INDEX_BANDS {
            assert!(out.stack.band(name).is_some(), "missing {}", name);
        }
        assert_eq!(out.band(MONTH).unwrap()[[0, 1]], 8.0);
        assert_relative_eq!(out.band(MNDWI).unwrap()[[0, 0]], 0.0);
        // input scene is untouched
        assert_eq!(scene.stack.len(), 5);
    }
}
