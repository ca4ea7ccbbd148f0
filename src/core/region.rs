use crate::types::{BandMask, BandStack, BasinError, BasinResult, BoundingBox};
use ndarray::{Array2, Zip};

/// A polygon ring list: exterior ring first, then holes. Rings need not be closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<[f64; 2]>,
    pub holes: Vec<Vec<[f64; 2]>>,
}

impl Polygon {
    pub fn new(exterior: Vec<[f64; 2]>, holes: Vec<Vec<[f64; 2]>>) -> Self {
        Self { exterior, holes }
    }

    /// Axis-aligned rectangle covering `bbox`
    pub fn rectangle(bbox: &BoundingBox) -> Self {
        Self::new(
            vec![
                [bbox.min_x, bbox.min_y],
                [bbox.max_x, bbox.min_y],
                [bbox.max_x, bbox.max_y],
                [bbox.min_x, bbox.max_y],
            ],
            Vec::new(),
        )
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        ring_contains(&self.exterior, x, y) && !self.holes.iter().any(|h| ring_contains(h, x, y))
    }

    fn bounds(&self) -> BoundingBox {
        let mut bbox = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for p in &self.exterior {
            bbox.min_x = bbox.min_x.min(p[0]);
            bbox.min_y = bbox.min_y.min(p[1]);
            bbox.max_x = bbox.max_x.max(p[0]);
            bbox.max_y = bbox.max_y.max(p[1]);
        }
        bbox
    }
}

/// Even-odd ray casting
fn ring_contains(ring: &[[f64; 2]], x: f64, y: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Region of interest: an immutable (multi)polygon with its bounding box.
///
/// Coordinates are expected in the same coordinate system as the rasters
/// the region is applied to.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    name: String,
    polygons: Vec<Polygon>,
    bounds: BoundingBox,
}

impl Region {
    pub fn new(name: impl Into<String>, polygons: Vec<Polygon>) -> BasinResult<Self> {
        let name = name.into();
        if polygons.is_empty() {
            return Err(BasinError::InvalidFormat(format!(
                "Region {} has no polygons",
                name
            )));
        }
        if let Some(p) = polygons.iter().find(|p| p.exterior.len() < 3) {
            return Err(BasinError::InvalidFormat(format!(
                "Region {} has a degenerate ring with {} vertices",
                name,
                p.exterior.len()
            )));
        }

        let bounds = polygons
            .iter()
            .map(Polygon::bounds)
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| BasinError::InvalidFormat("Empty region".to_string()))?;

        Ok(Self { name, polygons, bounds })
    }

    /// Rectangular region
    pub fn from_bounds(name: impl Into<String>, bbox: BoundingBox) -> BasinResult<Self> {
        Self::new(name, vec![Polygon::rectangle(&bbox)])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.bounds.contains(x, y) && self.polygons.iter().any(|p| p.contains(x, y))
    }

    /// Pixel-center membership mask for the grid of `stack`
    pub fn mask_for(&self, stack: &BandStack) -> BandMask {
        let transform = stack.transform;
        Array2::from_shape_fn(stack.shape(), |(row, col)| {
            let (x, y) = transform.pixel_center(row, col);
            self.contains(x, y)
        })
    }

    /// Copy of `stack` with every pixel outside the region set to no-data
    pub fn clip(&self, stack: &BandStack) -> BasinResult<BandStack> {
        let mask = self.mask_for(stack);
        let mut out = stack.empty_like();
        for (name, band) in stack.bands() {
            let mut clipped = band.clone();
            Zip::from(&mut clipped).and(&mask).for_each(|v, &inside| {
                if !inside {
                    *v = f32::NAN;
                }
            });
            out.insert(name, clipped)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordinateSystem, GeoTransform};

    fn triangle() -> Region {
        Region::new(
            "tri",
            vec![Polygon::new(
                vec![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]],
                Vec::new(),
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_contains_and_bounds() {
        let region = triangle();
        assert!(region.contains(1.0, 1.0));
        assert!(!region.contains(9.0, 9.0));
        assert_eq!(region.bounds(), BoundingBox::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_hole_excluded() {
        let outer = vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let hole = vec![[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0]];
        let region = Region::new("donut", vec![Polygon::new(outer, vec![hole])]).unwrap();
        assert!(region.contains(1.0, 1.0));
        assert!(!region.contains(5.0, 5.0));
    }

    #[test]
    fn test_empty_region_rejected() {
        assert!(Region::new("none", Vec::new()).is_err());
        let degenerate = Polygon::new(vec![[0.0, 0.0], [1.0, 1.0]], Vec::new());
        assert!(Region::new("line", vec![degenerate]).is_err());
    }

    #[test]
    fn test_clip_sets_outside_to_nodata() {
        let region = triangle();
        // 2x2 grid of 5-unit pixels covering [0,10]x[0,10]
        let transform = GeoTransform::north_up(0.0, 10.0, 5.0, 5.0);
        let stack = BandStack::new((2, 2), transform, CoordinateSystem::Projected { epsg: 32636 })
            .with_band("B1", Array2::from_elem((2, 2), 1.0))
            .unwrap();

        let clipped = region.clip(&stack).unwrap();
        let band = clipped.band("B1").unwrap();
        // bottom-left pixel center (2.5, 2.5) is inside, top-right (7.5, 7.5) is not
        assert_eq!(band[[1, 0]], 1.0);
        assert!(band[[0, 1]].is_nan());
    }
}
