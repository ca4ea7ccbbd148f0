use crate::core::band_profile::Sensor;
use crate::core::quality_mask::QaMask;
use crate::core::reducers::temporal_median;
use crate::core::region::Region;
use crate::types::{BandStack, BasinError, BasinResult, DateRange, Scene};

/// Masked multi-year median mosaic of the reflectance bands
#[derive(Debug, Clone)]
pub struct OpticalComposite {
    pub label: String,
    pub sensor: Sensor,
    pub range: DateRange,
    pub stack: BandStack,
    pub scene_count: usize,
}

impl OpticalComposite {
    /// (red, green, blue) stack for natural colour display
    pub fn true_color(&self) -> BasinResult<BandStack> {
        let [r, g, b] = self.sensor.true_color_bands();
        self.stack.select(&[r.as_str(), g.as_str(), b.as_str()])
    }

    /// (nir, red, green) stack for vegetation false colour display
    pub fn false_color(&self) -> BasinResult<BandStack> {
        let [n, r, g] = self.sensor.false_color_bands();
        self.stack.select(&[n.as_str(), r.as_str(), g.as_str()])
    }
}

#[derive(Debug, Clone, Default)]
pub struct MedianCompositor;

impl MedianCompositor {
    pub fn new() -> Self {
        Self
    }

    /// Per-band temporal median of every masked scene in `range`. The QA band is dropped.
    pub fn build(
        &self,
        label: &str,
        sensor: Sensor,
        range: &DateRange,
        scenes: &[Scene],
        region: &Region,
    ) -> BasinResult<OpticalComposite> {
        let mask = QaMask::for_sensor(sensor);
        let selected: Vec<&Scene> = scenes
            .iter()
            .filter(|s| range.contains(&s.acquired) && s.footprint().intersects(&region.bounds()))
            .collect();

        log::info!(
            "Optical mosaic {} ({}): {} scenes in {}",
            label,
            sensor.short_label(),
            selected.len(),
            range
        );

        if selected.is_empty() {
            return Err(BasinError::EmptyCollection {
                collection: sensor.collection_id().to_string(),
                range: range.to_string(),
            });
        }

        let masked = selected
            .iter()
            .map(|s| mask.apply(s, region))
            .collect::<BasinResult<Vec<_>>>()?;

        let reference = &masked[0].stack;
        if let Some(bad) = masked.iter().find(|s| !s.stack.same_grid(reference)) {
            return Err(BasinError::InvalidFormat(format!(
                "Scene {} is not on the grid of {}",
                bad.id, masked[0].id
            )));
        }

        let profile = sensor.profile();
        let mut stack = reference.empty_like();
        for name in reference.band_names().filter(|n| *n != mask.qa_band) {
            // bands missing from some scenes are reduced over the scenes that have them
            let layers: Vec<_> = masked.iter().filter_map(|s| s.stack.band(name)).collect();
            stack.insert(name, temporal_median(&layers)?)?;
        }

        for name in [&profile.blue, &profile.green, &profile.red, &profile.nir, &profile.swir1] {
            if stack.band(name).is_none() {
                return Err(BasinError::BandResolution {
                    scene: masked[0].id.clone(),
                    band: name.clone(),
                });
            }
        }

        Ok(OpticalComposite {
            label: label.to_string(),
            sensor,
            range: *range,
            stack,
            scene_count: masked.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, CoordinateSystem, GeoTransform};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn l8_scene(day: u32, dn: f32, qa: f32) -> Scene {
        let mut stack = BandStack::new(
            (2, 2),
            GeoTransform::north_up(0.0, 60.0, 30.0, 30.0),
            CoordinateSystem::Projected { epsg: 32636 },
        );
        for name in ["SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6"] {
            stack.insert(name, Array2::from_elem((2, 2), dn)).unwrap();
        }
        stack.insert("QA_PIXEL", Array2::from_elem((2, 2), qa)).unwrap();
        Scene::new(
            format!("LC08_20150{}", day),
            Utc.with_ymd_and_hms(2015, 6, day, 8, 0, 0).unwrap(),
            stack,
        )
    }

    #[test]
    fn test_median_of_clear_scenes() {
        let scenes = vec![
            l8_scene(1, 10000.0, 0.0),
            l8_scene(2, 12000.0, 0.0),
            l8_scene(3, 60000.0, 8.0), // cloud
            l8_scene(4, 14000.0, 0.0),
        ];
        let region = Region::from_bounds("roi", BoundingBox::new(0.0, 0.0, 60.0, 60.0)).unwrap();
        let range = DateRange::parse("2014-01-01", "2016-12-31").unwrap();
        let out = MedianCompositor::new()
            .build("2015", Sensor::Landsat8Oli, &range, &scenes, &region)
            .unwrap();

        assert_eq!(out.scene_count, 4);
        assert!(out.stack.band("QA_PIXEL").is_none());
        let expected = 12000.0 * 0.0000275 - 0.2;
        assert_relative_eq!(out.stack.band("SR_B4").unwrap()[[0, 0]], expected, epsilon = 1e-6);

        let tc = out.true_color().unwrap();
        assert_eq!(tc.len(), 3);
    }

    #[test]
    fn test_empty_range() {
        let region = Region::from_bounds("roi", BoundingBox::new(0.0, 0.0, 60.0, 60.0)).unwrap();
        let range = DateRange::parse("1984-01-01", "1987-12-31").unwrap();
        let err = MedianCompositor::new()
            .build("1985", Sensor::Landsat5Tm, &range, &[l8_scene(1, 1.0, 0.0)], &region)
            .unwrap_err();
        assert!(matches!(err, BasinError::EmptyCollection { .. }));
    }
}
