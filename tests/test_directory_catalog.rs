mod common;

use approx::assert_relative_eq;
use basinscope::core::band_profile::{Sensor, SAR_COLLECTION};
use basinscope::core::peak_detector::YearlyPeakDetector;
use basinscope::core::sar_composite::SarCompositeBuilder;
use basinscope::io::catalog::{DirectoryCatalog, SceneCatalog, SceneQuery};
use basinscope::io::geotiff::{write_band, write_band_with_nodata};
use basinscope::types::{AcquisitionMode, BoundingBox, DateRange, Polarization, Scene};
use common::{at, optical_scene, region, sar_scene, SHAPE};
use ndarray::Array2;
use std::path::Path;

fn collection_scene_dir(root: &Path, collection: &str, dir_name: &str) -> std::path::PathBuf {
    let dir = collection
        .split('/')
        .fold(root.to_path_buf(), |d, s| d.join(s))
        .join(dir_name);
    std::fs::create_dir_all(&dir).expect("scene dir");
    dir
}

/// Write every band of `scene` below `<root>/<collection>/<dir_name>/`
fn write_scene(root: &Path, collection: &str, dir_name: &str, scene: &Scene) -> std::path::PathBuf {
    let dir = collection_scene_dir(root, collection, dir_name);
    for (name, band) in scene.stack.bands() {
        write_band(dir.join(format!("{}.tif", name)), band, &scene.stack.transform, scene.stack.crs)
            .expect("write band");
    }
    dir
}

#[test]
fn test_landsat_scenes_from_disk() {
    let _ = env_logger::builder().is_test(true).try_init();
    let root = tempfile::tempdir().expect("tempdir");
    let l5 = Sensor::Landsat5Tm;

    for (id, when, mndwi) in [
        ("LT05_L2SP_173049_19950714_20200912_02_T1", at(1995, 7, 14), 0.42),
        ("LT05_L2SP_173049_19950402_20200912_02_T1", at(1995, 4, 2), 0.12),
        ("LT05_L2SP_173049_19960110_20200912_02_T1", at(1996, 1, 10), 0.60),
    ] {
        let scene = optical_scene(l5, id, when, (mndwi, 0.3, 0.0), 0);
        write_scene(root.path(), l5.collection_id(), id, &scene);
    }
    // no date in the name and no metadata: skipped
    let undated = optical_scene(l5, "undated", at(1995, 5, 5), (0.9, 0.3, 0.0), 0);
    write_scene(root.path(), l5.collection_id(), "undated_scene", &undated);

    let catalog = DirectoryCatalog::new(root.path()).expect("catalog");
    let query = SceneQuery::new(
        l5.collection_id(),
        region().bounds(),
        DateRange::calendar_year(1995).unwrap(),
    );
    let scenes = catalog.scenes(&query).expect("scenes");
    let ids: Vec<&str> = scenes.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "LT05_L2SP_173049_19950402_20200912_02_T1",
            "LT05_L2SP_173049_19950714_20200912_02_T1"
        ]
    );
    assert_eq!(scenes[0].stack.len(), 6);
    assert!(scenes[0].stack.crs == common::UTM_36N);

    let composite = YearlyPeakDetector::new()
        .detect("1995", 1995, l5, &scenes, &region())
        .expect("peak composite");
    assert_eq!(composite.summary.peak_month, Some(7));
    assert_relative_eq!(composite.summary.mndwi.unwrap(), 0.42, epsilon = 1e-3);

    let elsewhere = SceneQuery::new(
        l5.collection_id(),
        BoundingBox::new(1000.0, 1000.0, 2000.0, 2000.0),
        query.range,
    );
    assert!(catalog.scenes(&elsewhere).expect("scenes").is_empty());

    let missing = SceneQuery::new("LANDSAT/LC09/C02/T1_L2", query.bounds, query.range);
    assert!(catalog.scenes(&missing).expect("scenes").is_empty());
}

#[test]
fn test_sar_metadata_file() {
    let root = tempfile::tempdir().expect("tempdir");
    let scene = sar_scene("s1_a", at(2015, 3, 12), -14.0, AcquisitionMode::IW);
    let dir = write_scene(root.path(), SAR_COLLECTION, "s1_a", &scene);
    std::fs::write(
        dir.join("metadata.json"),
        r#"{"acquired": "2015-03-12T15:45:23Z", "polarizations": ["VV", "VH"], "instrument_mode": "IW"}"#,
    )
    .expect("metadata");

    let catalog = DirectoryCatalog::new(root.path()).expect("catalog");
    let range = DateRange::parse("2014-10-01", "2016-12-31").unwrap();
    let scenes = catalog
        .scenes(&SceneQuery::new(SAR_COLLECTION, region().bounds(), range))
        .expect("scenes");
    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0].properties.polarizations, vec![Polarization::VV, Polarization::VH]);
    assert_eq!(scenes[0].properties.instrument_mode, Some(AcquisitionMode::IW));

    let sar = SarCompositeBuilder::new()
        .build("2015", &range, &scenes, &region())
        .expect("SAR composite");
    assert_eq!(sar.band_name(), Some("VV"));
    assert_relative_eq!(sar.stack.band("VV").unwrap()[[0, 0]], -14.0);
}

#[test]
fn test_fill_pixels_never_win_the_peak() {
    let root = tempfile::tempdir().expect("tempdir");
    let l8 = Sensor::Landsat8Oli;
    let qa = l8.qa_band();

    // fill scene: every reflectance band is DN 0 and flagged as no-data 0, QA is clear
    let mut fill = optical_scene(l8, "LC08_L2SP_173049_20150310_20200908_02_T1", at(2015, 3, 10), (0.0, 0.0, 0.0), 0);
    let names: Vec<String> = fill.stack.band_names().filter(|n| *n != qa).map(String::from).collect();
    for name in &names {
        fill.stack.insert(name.as_str(), Array2::zeros(SHAPE)).unwrap();
    }
    let dir = collection_scene_dir(root.path(), l8.collection_id(), &fill.id);
    for (name, band) in fill.stack.bands() {
        let nodata = if name == qa { f64::NAN } else { 0.0 };
        write_band_with_nodata(dir.join(format!("{}.tif", name)), band, &fill.stack.transform, fill.stack.crs, nodata)
            .expect("write band");
    }

    let land = optical_scene(l8, "LC08_L2SP_173049_20150722_20200908_02_T1", at(2015, 7, 22), (-0.3, 0.2, 0.1), 0);
    write_scene(root.path(), l8.collection_id(), &land.id, &land);

    let catalog = DirectoryCatalog::new(root.path()).expect("catalog");
    let query = SceneQuery::new(l8.collection_id(), region().bounds(), DateRange::calendar_year(2015).unwrap());
    let scenes = catalog.scenes(&query).expect("scenes");
    assert_eq!(scenes.len(), 2);
    assert!(scenes[0].stack.band("SR_B3").unwrap().iter().all(|v| v.is_nan()));

    let composite = YearlyPeakDetector::new()
        .detect("2015", 2015, l8, &scenes, &region())
        .expect("peak composite");
    assert_eq!(composite.summary.peak_month, Some(7));
    assert_relative_eq!(composite.summary.mndwi.unwrap(), -0.3, epsilon = 1e-3);
}
