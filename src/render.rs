//! Map layer and legend descriptions
//!
//! Layers are described as data (raster, style, name, visibility) and handed to a
//! [`LayerSink`]. [`RgbaLayerSink`] turns them into RGBA buffers with the
//! style's palette; drawing them on a map is left to the front-end.

use crate::core::indices::{BSI, MNDWI, NDVI};
use crate::core::median_composite::OpticalComposite;
use crate::core::peak_detector::EpochComposite;
use crate::core::region::Region;
use crate::core::sar_composite::SarComposite;
use crate::io::dem::ELEVATION_BAND;
use crate::types::{Band, BandStack, BasinError, BasinResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Peak water colour of each epoch, in epoch order
pub const EPOCH_COLORS: [&str; 5] = ["#FF0000", "#FFA500", "#FFFF00", "#00FF00", "#00FFFF"];
pub const VEGETATION_PALETTE: [&str; 4] = ["#edf8e9", "#bae4b3", "#74c476", "#238b45"];
pub const SOIL_PALETTE: [&str; 4] = ["#fee391", "#fec44f", "#fe9929", "#cc4c02"];
pub const ELEVATION_PALETTE: [&str; 6] = ["#1a9850", "#91cf60", "#d9ef8b", "#fee08b", "#fc8d59", "#d73027"];
pub const ROI_COLOR: &str = "#FF0000";

pub const WATER_THRESHOLD: f32 = 0.2;
pub const VEGETATION_THRESHOLD: f32 = 0.3;
pub const SOIL_THRESHOLD: f32 = 0.1;

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`
    pub fn parse_hex(hex: &str) -> BasinResult<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        let channel = |i: usize| {
            digits
                .get(i..i + 2)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| BasinError::InvalidFormat(format!("Invalid colour '{}'", hex)))
        };
        if digits.len() != 6 {
            return Err(BasinError::InvalidFormat(format!("Invalid colour '{}'", hex)));
        }
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// Evenly spaced multi-stop interpolation, `t` clamped to [0, 1]
fn interpolate(stops: &[Rgb], t: f64) -> Rgb {
    match stops.len() {
        0 => {
            let v = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgb::new(v, v, v)
        }
        1 => stops[0],
        n => {
            let pos = t.clamp(0.0, 1.0) * (n - 1) as f64;
            let i = (pos.floor() as usize).min(n - 2);
            let f = pos - i as f64;
            let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
            let (a, b) = (stops[i], stops[i + 1]);
            Rgb::new(lerp(a.r, b.r), lerp(a.g, b.g), lerp(a.b, b.b))
        }
    }
}

/// Visualization parameters of a layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStyle {
    /// One band (palette) or three bands (red, green, blue)
    pub bands: Vec<String>,
    pub min: f64,
    pub max: f64,
    pub palette: Vec<String>,
    /// Pixels at or below this value are hidden
    pub threshold: Option<f32>,
}

impl LayerStyle {
    pub fn ramp(band: &str, min: f64, max: f64, palette: &[&str]) -> Self {
        Self {
            bands: vec![band.to_string()],
            min,
            max,
            palette: palette.iter().map(|c| c.to_string()).collect(),
            threshold: None,
        }
    }

    pub fn rgb(bands: [String; 3], min: f64, max: f64) -> Self {
        Self {
            bands: bands.to_vec(),
            min,
            max,
            palette: Vec::new(),
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Name, style and initial visibility of a layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub style: LayerStyle,
    pub visible: bool,
}

/// A raster ready to be displayed
#[derive(Debug, Clone)]
pub struct Layer {
    pub raster: BandStack,
    pub spec: LayerSpec,
}

impl Layer {
    fn new(raster: BandStack, name: String, style: LayerStyle, visible: bool) -> Self {
        Self {
            raster,
            spec: LayerSpec { name, style, visible },
        }
    }
}

/// Receiver of display layers
pub trait LayerSink {
    fn render(&mut self, raster: &BandStack, style: &LayerStyle, name: &str, visible: bool) -> BasinResult<()>;
}

/// Send every layer to `sink` in order
pub fn render_layers(sink: &mut dyn LayerSink, layers: &[Layer]) -> BasinResult<()> {
    for layer in layers {
        let spec = &layer.spec;
        sink.render(&layer.raster, &spec.style, &spec.name, spec.visible)?;
    }
    Ok(())
}

/// Records layer descriptions and logs them
#[derive(Debug, Default)]
pub struct LogLayerSink {
    pub layers: Vec<LayerSpec>,
}

impl LayerSink for LogLayerSink {
    fn render(&mut self, raster: &BandStack, style: &LayerStyle, name: &str, visible: bool) -> BasinResult<()> {
        log::info!(
            "Layer '{}' ({}): bands {:?}, range {}..{}, {:?} grid",
            name,
            if visible { "shown" } else { "hidden" },
            style.bands,
            style.min,
            style.max,
            raster.shape()
        );
        self.layers.push(LayerSpec {
            name: name.to_string(),
            style: style.clone(),
            visible,
        });
        Ok(())
    }
}

/// Rendered RGBA image of a layer
#[derive(Debug, Clone)]
pub struct RgbaImage {
    pub name: String,
    pub visible: bool,
    /// (rows, cols)
    pub shape: (usize, usize),
    /// Row-major RGBA, 4 bytes per pixel
    pub pixels: Vec<u8>,
}

/// Renders every layer to an RGBA buffer
#[derive(Debug, Default)]
pub struct RgbaLayerSink {
    pub images: Vec<RgbaImage>,
}

impl LayerSink for RgbaLayerSink {
    fn render(&mut self, raster: &BandStack, style: &LayerStyle, name: &str, visible: bool) -> BasinResult<()> {
        let pixels = to_rgba(raster, style)?;
        self.images.push(RgbaImage {
            name: name.to_string(),
            visible,
            shape: raster.shape(),
            pixels,
        });
        Ok(())
    }
}

/// Convert a layer to RGBA. No-data and thresholded pixels are transparent.
pub fn to_rgba(raster: &BandStack, style: &LayerStyle) -> BasinResult<Vec<u8>> {
    let bands = style
        .bands
        .iter()
        .map(|name| {
            raster.band(name).ok_or_else(|| BasinError::BandResolution {
                scene: "layer".to_string(),
                band: name.clone(),
            })
        })
        .collect::<BasinResult<Vec<&Band>>>()?;

    let range = style.max - style.min;
    let inv_range = if range.abs() > f64::EPSILON { 1.0 / range } else { 1.0 };
    let scale = |v: f32| (v as f64 - style.min) * inv_range;
    let hidden = |v: f32| !v.is_finite() || style.threshold.map_or(false, |t| v <= t);

    let (rows, cols) = raster.shape();
    let mut rgba = vec![0u8; rows * cols * 4];

    match bands.as_slice() {
        [band] => {
            let stops = style
                .palette
                .iter()
                .map(|c| Rgb::parse_hex(c))
                .collect::<BasinResult<Vec<_>>>()?;
            for (px, &v) in rgba.chunks_exact_mut(4).zip(band.iter()) {
                if hidden(v) {
                    continue;
                }
                let Rgb { r, g, b } = interpolate(&stops, scale(v));
                px.copy_from_slice(&[r, g, b, 255]);
            }
        }
        [red, green, blue] => {
            let channel = |v: f32| (scale(v).clamp(0.0, 1.0) * 255.0).round() as u8;
            for (i, px) in rgba.chunks_exact_mut(4).enumerate() {
                let idx = (i / cols, i % cols);
                let (r, g, b) = (red[idx], green[idx], blue[idx]);
                if hidden(r) || hidden(g) || hidden(b) {
                    continue;
                }
                px.copy_from_slice(&[channel(r), channel(g), channel(b), 255]);
            }
        }
        other => {
            return Err(BasinError::InvalidFormat(format!(
                "A layer needs one or three bands, got {}",
                other.len()
            )))
        }
    }
    Ok(rgba)
}

/// Keep values above `threshold`; everything else becomes no-data
pub fn threshold_mask(band: &Band, threshold: f32) -> Band {
    band.mapv(|v| if v > threshold { v } else { f32::NAN })
}

/// Colour of the epoch at `index`, cycling through [`EPOCH_COLORS`]
pub fn epoch_color(index: usize) -> &'static str {
    EPOCH_COLORS[index % EPOCH_COLORS.len()]
}

/// Peak water, vegetation and soil layers of one epoch
pub fn peak_layers(composite: &EpochComposite, index: usize) -> BasinResult<Vec<Layer>> {
    let layer = |band: &str, threshold: f32, palette: &[&str], name: String, visible: bool| -> BasinResult<Layer> {
        let data = composite.stack.band(band).ok_or_else(|| BasinError::BandResolution {
            scene: composite.label.clone(),
            band: band.to_string(),
        })?;
        let raster = composite
            .stack
            .empty_like()
            .with_band(band, threshold_mask(data, threshold))?;
        let style = LayerStyle::ramp(band, 0.0, 1.0, palette).with_threshold(threshold);
        Ok(Layer::new(raster, name, style, visible))
    };

    Ok(vec![
        layer(
            MNDWI,
            WATER_THRESHOLD,
            &[epoch_color(index)],
            format!("Peak Water {}", composite.label),
            true,
        )?,
        layer(
            NDVI,
            VEGETATION_THRESHOLD,
            &VEGETATION_PALETTE[..],
            format!("Vegetation {}", composite.label),
            false,
        )?,
        layer(
            BSI,
            SOIL_THRESHOLD,
            &SOIL_PALETTE[..],
            format!("Soil Index {}", composite.label),
            false,
        )?,
    ])
}

/// Natural colour layer of an optical mosaic
pub fn optical_layer(mosaic: &OpticalComposite, visible: bool) -> BasinResult<Layer> {
    Ok(Layer::new(
        mosaic.true_color()?,
        format!("Optical {} ({})", mosaic.label, mosaic.sensor.short_label()),
        LayerStyle::rgb(mosaic.sensor.true_color_bands(), 0.0, 0.3),
        visible,
    ))
}

/// Near-infrared false colour layer of an optical mosaic
pub fn false_color_layer(mosaic: &OpticalComposite) -> BasinResult<Layer> {
    Ok(Layer::new(
        mosaic.false_color()?,
        format!("False Color {} (Veg Focus)", mosaic.label),
        LayerStyle::rgb(mosaic.sensor.false_color_bands(), 0.0, 0.4),
        false,
    ))
}

pub fn sar_layer(sar: &SarComposite, visible: bool) -> BasinResult<Layer> {
    let band = sar
        .band_name()
        .ok_or_else(|| BasinError::Processing(format!("SAR composite {} has no band", sar.label)))?;
    let style = LayerStyle::ramp(band, -25.0, 0.0, &[]);
    Ok(Layer::new(sar.stack.clone(), format!("SAR {} (S1)", sar.label), style, visible))
}

pub fn topography_layer(dem: &BandStack) -> BasinResult<Layer> {
    let raster = dem.select(&[ELEVATION_BAND])?;
    let style = LayerStyle::ramp(ELEVATION_BAND, 400.0, 1200.0, &ELEVATION_PALETTE);
    Ok(Layer::new(raster, "Topography (SRTM)".to_string(), style, false))
}

/// Outline of the region on the grid of `grid`: inside pixels with an outside 4-neighbour
pub fn roi_boundary_layer(region: &Region, grid: &BandStack) -> BasinResult<Layer> {
    let inside = region.mask_for(grid);
    let (rows, cols) = inside.dim();
    let outside = |r: isize, c: isize| {
        r < 0 || c < 0 || r >= rows as isize || c >= cols as isize || !inside[[r as usize, c as usize]]
    };
    let boundary: Band = Array2::from_shape_fn((rows, cols), |(r, c)| {
        let (ri, ci) = (r as isize, c as isize);
        let edge = inside[[r, c]]
            && (outside(ri - 1, ci) || outside(ri + 1, ci) || outside(ri, ci - 1) || outside(ri, ci + 1));
        if edge {
            1.0
        } else {
            f32::NAN
        }
    });
    let raster = grid.empty_like().with_band("boundary", boundary)?;
    let style = LayerStyle::ramp("boundary", 0.0, 1.0, &[ROI_COLOR]);
    Ok(Layer::new(raster, "ROI Boundary".to_string(), style, true))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub color: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub title: String,
    pub entries: Vec<LegendEntry>,
}

impl Legend {
    fn new(title: &str, entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            title: title.to_string(),
            entries: entries
                .into_iter()
                .map(|(color, label)| LegendEntry { color, label })
                .collect(),
        }
    }
}

/// One row per epoch in its peak water colour
pub fn peak_legend<S: AsRef<str>>(labels: &[S]) -> Legend {
    Legend::new(
        "Peak Water Years",
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| (epoch_color(i).to_string(), label.as_ref().to_string())),
    )
}

pub fn elevation_legend() -> Legend {
    let ranges = ["400 - 500", "500 - 650", "650 - 800", "800 - 950", "950 - 1100", "> 1100"];
    Legend::new(
        "Elevation (m)",
        ELEVATION_PALETTE
            .iter()
            .zip(ranges)
            .map(|(color, range)| (color.to_string(), range.to_string())),
    )
}
