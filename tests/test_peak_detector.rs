mod common;

use approx::assert_relative_eq;
use basinscope::core::band_profile::Sensor;
use basinscope::core::indices::{BSI, MNDWI, MONTH, NDVI};
use basinscope::core::peak_detector::YearlyPeakDetector;
use basinscope::types::BasinError;
use common::{at, landsat_dn, optical_scene, region, SHAPE};
use ndarray::Array2;

const CLOUD_BIT: u16 = 1 << 3;

#[test]
fn test_flood_peak_1995() {
    let _ = env_logger::builder().is_test(true).try_init();

    let scenes = vec![
        optical_scene(Sensor::Landsat5Tm, "LT05_19940812", at(1994, 8, 12), (0.90, 0.1, 0.0), 0),
        optical_scene(Sensor::Landsat5Tm, "LT05_19950310", at(1995, 3, 10), (0.05, 0.20, 0.05), 0),
        optical_scene(Sensor::Landsat5Tm, "LT05_19950714", at(1995, 7, 14), (0.42, 0.35, -0.10), 0),
        optical_scene(Sensor::Landsat5Tm, "LT05_19950815", at(1995, 8, 15), (0.80, 0.50, -0.30), CLOUD_BIT),
        optical_scene(Sensor::Landsat5Tm, "LT05_19951002", at(1995, 10, 2), (0.18, 0.25, 0.00), 0),
    ];

    let composite = YearlyPeakDetector::new()
        .detect("1995", 1995, Sensor::Landsat5Tm, &scenes, &region())
        .expect("peak composite");

    // the 1994 scene lies outside the calendar year
    assert_eq!(composite.scene_count, 4);
    assert_eq!(composite.start.to_rfc3339(), "1995-01-01T00:00:00+00:00");

    let mndwi = composite.stack.band(MNDWI).expect("MNDWI band");
    let month = composite.stack.band(MONTH).expect("month band");
    for (&m, &mo) in mndwi.iter().zip(month.iter()) {
        assert_relative_eq!(m, 0.42, epsilon = 1e-3);
        assert_eq!(mo, 7.0);
    }
    assert_relative_eq!(composite.stack.band(NDVI).unwrap()[[1, 1]], 0.35, epsilon = 1e-3);
    assert_relative_eq!(composite.stack.band(BSI).unwrap()[[2, 0]], -0.10, epsilon = 1e-3);

    let report = composite.report();
    assert_eq!(report.year, 1995);
    assert_eq!(report.peak_month, Some(7));
    assert_relative_eq!(report.mndwi_value.unwrap(), 0.42, epsilon = 1e-3);
    assert_relative_eq!(report.ndvi_value.unwrap(), 0.35, epsilon = 1e-3);
    assert_relative_eq!(report.bsi_value.unwrap(), -0.10, epsilon = 1e-3);

    let lines = report.console_lines();
    assert_eq!(lines[0], "--- Yearly Analysis: 1995 ---");
    assert_eq!(lines[1], "Peak Water Value (MNDWI): 0.4200");
    assert_eq!(lines[2], "Peak Occurrence Month: 7");
    assert_eq!(lines[3], "Vegetation at Peak (NDVI): 0.3500");
}

#[test]
fn test_tie_goes_to_earliest_scene() {
    let first = optical_scene(Sensor::Landsat8Oli, "LC08_20150405", at(2015, 4, 5), (0.30, 0.10, 0.0), 0);
    // same green and swir1, so the same MNDWI, but a different nir
    let mut second = first.clone();
    second.id = "LC08_20150923".to_string();
    second.acquired = at(2015, 9, 23);
    second
        .stack
        .insert("SR_B5", Array2::from_elem(SHAPE, landsat_dn(0.2)))
        .unwrap();
    let scenes = vec![first, second];
    let composite = YearlyPeakDetector::new()
        .detect("2015", 2015, Sensor::Landsat8Oli, &scenes, &region())
        .expect("peak composite");

    assert_eq!(composite.summary.peak_month, Some(4));
    assert_relative_eq!(composite.summary.ndvi.unwrap(), 0.10, epsilon = 1e-3);
}

#[test]
fn test_sentinel2_scaling() {
    let scenes = vec![optical_scene(
        Sensor::Sentinel2Msi,
        "20250801T081609_20250801T083745_T36PXB",
        at(2025, 8, 1),
        (0.25, 0.30, -0.05),
        0,
    )];
    let composite = YearlyPeakDetector::new()
        .detect("2025", 2025, Sensor::Sentinel2Msi, &scenes, &region())
        .expect("peak composite");
    assert_relative_eq!(composite.summary.mndwi.unwrap(), 0.25, epsilon = 1e-3);
    assert_eq!(composite.summary.peak_month, Some(8));
}

#[test]
fn test_fully_clouded_year_has_no_values() {
    let scenes = vec![optical_scene(
        Sensor::Landsat7Etm,
        "LE07_20050607",
        at(2005, 6, 7),
        (0.3, 0.3, 0.0),
        CLOUD_BIT | 1 << 4,
    )];
    let composite = YearlyPeakDetector::new()
        .detect("2005", 2005, Sensor::Landsat7Etm, &scenes, &region())
        .expect("peak composite");
    assert!(composite.stack.band(MNDWI).unwrap().iter().all(|v| v.is_nan()));
    assert_eq!(composite.summary.mndwi, None);
    assert_eq!(composite.summary.peak_month, None);
    assert_eq!(composite.report().console_lines()[1], "Peak Water Value (MNDWI): null");
}

#[test]
fn test_empty_year_is_an_error() {
    let scenes = vec![optical_scene(Sensor::Landsat5Tm, "LT05_19850101", at(1985, 1, 1), (0.1, 0.1, 0.1), 0)];
    match YearlyPeakDetector::new().detect("1995", 1995, Sensor::Landsat5Tm, &scenes, &region()) {
        Err(BasinError::EmptyCollection { collection, range }) => {
            assert_eq!(collection, "LANDSAT/LT05/C02/T1_L2");
            assert_eq!(range, "1995-01-01..1996-01-01");
        }
        other => panic!("expected EmptyCollection, got {:?}", other.map(|c| c.scene_count)),
    }
}
