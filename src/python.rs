//! Python bindings

use crate::config::BasinConfig;
use crate::core::band_profile::Sensor;
use crate::core::indices;
use crate::core::peak_detector::quality_mosaic;
use crate::core::pipeline::{AnalysisPlan, Pipeline};
use crate::core::quality_mask::QaMask;
use crate::io::catalog::DirectoryCatalog;
use crate::io::region::read_region;
use crate::types::{BandStack, BasinError, BasinResult, CoordinateSystem, GeoTransform};
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::prelude::*;

fn to_py_err(err: BasinError) -> PyErr {
    match err {
        BasinError::Config(_) | BasinError::InvalidFormat(_) | BasinError::BandResolution { .. } => {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(err.to_string())
        }
        other => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(other.to_string()),
    }
}

fn parse_sensor(name: &str) -> PyResult<Sensor> {
    match name.to_uppercase().as_str() {
        "L5" | "LANDSAT5" => Ok(Sensor::Landsat5Tm),
        "L7" | "LANDSAT7" => Ok(Sensor::Landsat7Etm),
        "L8" | "LANDSAT8" => Ok(Sensor::Landsat8Oli),
        "S2" | "SENTINEL2" => Ok(Sensor::Sentinel2Msi),
        _ => Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
            "Invalid sensor: {}",
            name
        ))),
    }
}

/// Modified normalized difference water index
#[pyfunction]
fn mndwi<'py>(
    py: Python<'py>,
    green: PyReadonlyArray2<f32>,
    swir1: PyReadonlyArray2<f32>,
) -> PyResult<&'py PyArray2<f32>> {
    let out = indices::mndwi(&green.as_array().to_owned(), &swir1.as_array().to_owned()).map_err(to_py_err)?;
    Ok(out.into_pyarray(py))
}

/// Normalized difference vegetation index
#[pyfunction]
fn ndvi<'py>(py: Python<'py>, nir: PyReadonlyArray2<f32>, red: PyReadonlyArray2<f32>) -> PyResult<&'py PyArray2<f32>> {
    let out = indices::ndvi(&nir.as_array().to_owned(), &red.as_array().to_owned()).map_err(to_py_err)?;
    Ok(out.into_pyarray(py))
}

/// Bare soil index
#[pyfunction]
fn bsi<'py>(
    py: Python<'py>,
    blue: PyReadonlyArray2<f32>,
    red: PyReadonlyArray2<f32>,
    nir: PyReadonlyArray2<f32>,
    swir1: PyReadonlyArray2<f32>,
) -> PyResult<&'py PyArray2<f32>> {
    let out = indices::bsi(
        &blue.as_array().to_owned(),
        &red.as_array().to_owned(),
        &nir.as_array().to_owned(),
        &swir1.as_array().to_owned(),
    )
    .map_err(to_py_err)?;
    Ok(out.into_pyarray(py))
}

/// Clear-sky mask of a QA band for sensor "L5", "L7", "L8" or "S2"
#[pyfunction]
fn qa_validity<'py>(py: Python<'py>, qa: PyReadonlyArray2<f32>, sensor: &str) -> PyResult<&'py PyArray2<bool>> {
    let mask = QaMask::for_sensor(parse_sensor(sensor)?);
    Ok(mask.validity(&qa.as_array().to_owned()).into_pyarray(py))
}

/// Per-pixel maximum of `criteria` with `payloads` carried from the winning layer
#[pyfunction]
fn peak_mosaic<'py>(
    py: Python<'py>,
    criteria: Vec<PyReadonlyArray2<f32>>,
    payloads: Vec<PyReadonlyArray2<f32>>,
) -> PyResult<(&'py PyArray2<f32>, &'py PyArray2<f32>)> {
    if criteria.len() != payloads.len() {
        return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(
            "criteria and payloads must have the same length",
        ));
    }
    let stacks = criteria
        .iter()
        .zip(&payloads)
        .map(|(c, p)| {
            let c = c.as_array().to_owned();
            BandStack::new(
                c.dim(),
                GeoTransform::north_up(0.0, 0.0, 1.0, 1.0),
                CoordinateSystem::Geographic,
            )
            .with_band("criterion", c)?
            .with_band("payload", p.as_array().to_owned())
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_py_err)?;
    let refs: Vec<&BandStack> = stacks.iter().collect();
    let mosaic = quality_mosaic(&refs, "criterion", &["payload"]).map_err(to_py_err)?;

    let take = |name: &str| {
        mosaic
            .band(name)
            .cloned()
            .ok_or_else(|| PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("missing band {}", name)))
    };
    Ok((take("criterion")?.into_pyarray(py), take("payload")?.into_pyarray(py)))
}

/// Run every epoch against a catalog directory and return the epoch reports as JSON
#[pyfunction]
#[pyo3(signature = (catalog_dir, roi_path, config_path=None))]
fn analyze(py: Python<'_>, catalog_dir: String, roi_path: String, config_path: Option<String>) -> PyResult<String> {
    py.allow_threads(|| -> BasinResult<String> {
        let config = match config_path {
            Some(path) => BasinConfig::load(path)?,
            None => BasinConfig::default(),
        };
        let plan = AnalysisPlan::new(read_region(roi_path)?, config)?;
        let catalog = DirectoryCatalog::new(catalog_dir)?;
        let run = Pipeline::new(&catalog).execute(&plan);
        Ok(serde_json::to_string_pretty(&run.reports())?)
    })
    .map_err(to_py_err)
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(mndwi, m)?)?;
    m.add_function(wrap_pyfunction!(ndvi, m)?)?;
    m.add_function(wrap_pyfunction!(bsi, m)?)?;
    m.add_function(wrap_pyfunction!(qa_validity, m)?)?;
    m.add_function(wrap_pyfunction!(peak_mosaic, m)?)?;
    m.add_function(wrap_pyfunction!(analyze, m)?)?;
    Ok(())
}
