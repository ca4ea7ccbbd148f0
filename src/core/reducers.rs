//! Median reductions shared by the compositors and region statistics

use crate::types::{Band, BasinError, BasinResult};
use ndarray::{Array2, Zip};
use num_traits::Float;

/// Median of `values`, ignoring non-finite entries.
///
/// Even counts take the mean of the two middle values. Returns `None` when no
/// finite value is present.
pub fn median<T: Float>(values: &mut Vec<T>) -> Option<T> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        let two = T::one() + T::one();
        Some((values[mid - 1] + values[mid]) / two)
    }
}

/// Pixel-wise median across aligned layers; pixels with no valid value stay no-data
pub fn temporal_median(layers: &[&Band]) -> BasinResult<Band> {
    let first = layers.first().ok_or_else(|| {
        BasinError::Processing("Temporal median requires at least one layer".to_string())
    })?;
    let shape = first.dim();
    if let Some(bad) = layers.iter().find(|l| l.dim() != shape) {
        return Err(BasinError::InvalidFormat(format!(
            "Layer shape {:?} does not match {:?}",
            bad.dim(),
            shape
        )));
    }

    let mut out = Array2::<f32>::from_elem(shape, f32::NAN);
    let reduce = |(row, col): (usize, usize), o: &mut f32| {
        let mut values: Vec<f32> = layers.iter().map(|l| l[[row, col]]).collect();
        *o = median(&mut values).unwrap_or(f32::NAN);
    };

    #[cfg(feature = "parallel")]
    Zip::indexed(&mut out).par_for_each(reduce);
    #[cfg(not(feature = "parallel"))]
    Zip::indexed(&mut out).for_each(reduce);

    Ok(out)
}
