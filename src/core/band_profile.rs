use crate::types::{BasinError, BasinResult, Scene};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog id of the Sentinel-1 GRD collection
pub const SAR_COLLECTION: &str = "COPERNICUS/S1_GRD";

/// Semantic spectral role of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandRole {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
}

impl BandRole {
    pub const ALL: [BandRole; 5] = [
        BandRole::Blue,
        BandRole::Green,
        BandRole::Red,
        BandRole::Nir,
        BandRole::Swir1,
    ];
}

impl fmt::Display for BandRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BandRole::Blue => "blue",
            BandRole::Green => "green",
            BandRole::Red => "red",
            BandRole::Nir => "nir",
            BandRole::Swir1 => "swir1",
        };
        write!(f, "{}", name)
    }
}

/// Mapping from spectral role to sensor-specific band name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandProfile {
    pub blue: String,
    pub green: String,
    pub red: String,
    pub nir: String,
    pub swir1: String,
}

impl BandProfile {
    pub fn new(blue: &str, green: &str, red: &str, nir: &str, swir1: &str) -> Self {
        Self {
            blue: blue.to_string(),
            green: green.to_string(),
            red: red.to_string(),
            nir: nir.to_string(),
            swir1: swir1.to_string(),
        }
    }

    pub fn band_for(&self, role: BandRole) -> &str {
        match role {
            BandRole::Blue => &self.blue,
            BandRole::Green => &self.green,
            BandRole::Red => &self.red,
            BandRole::Nir => &self.nir,
            BandRole::Swir1 => &self.swir1,
        }
    }

    /// Check that every role resolves to a band present in `scene`
    pub fn validate(&self, scene: &Scene) -> BasinResult<()> {
        for role in BandRole::ALL {
            let name = self.band_for(role);
            if scene.stack.band(name).is_none() {
                log::debug!("Scene {} lacks {} band {}", scene.id, role, name);
                return Err(BasinError::BandResolution {
                    scene: scene.id.clone(),
                    band: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Optical sensor generations used across the epochs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    Landsat5Tm,
    Landsat7Etm,
    Landsat8Oli,
    Sentinel2Msi,
}

/// QA decoding family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFamily {
    Landsat,
    Sentinel2,
}

impl Sensor {
    pub fn family(&self) -> SensorFamily {
        match self {
            Sensor::Landsat5Tm | Sensor::Landsat7Etm | Sensor::Landsat8Oli => SensorFamily::Landsat,
            Sensor::Sentinel2Msi => SensorFamily::Sentinel2,
        }
    }

    pub fn profile(&self) -> BandProfile {
        match self {
            // TM and ETM+ share the Collection-2 SR band numbering
            Sensor::Landsat5Tm | Sensor::Landsat7Etm => {
                BandProfile::new("SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5")
            }
            Sensor::Landsat8Oli => BandProfile::new("SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6"),
            Sensor::Sentinel2Msi => BandProfile::new("B2", "B3", "B4", "B8", "B11"),
        }
    }

    pub fn collection_id(&self) -> &'static str {
        match self {
            Sensor::Landsat5Tm => "LANDSAT/LT05/C02/T1_L2",
            Sensor::Landsat7Etm => "LANDSAT/LE07/C02/T1_L2",
            Sensor::Landsat8Oli => "LANDSAT/LC08/C02/T1_L2",
            Sensor::Sentinel2Msi => "COPERNICUS/S2_SR_HARMONIZED",
        }
    }

    pub fn qa_band(&self) -> &'static str {
        match self.family() {
            SensorFamily::Landsat => "QA_PIXEL",
            SensorFamily::Sentinel2 => "QA60",
        }
    }

    /// Native ground sampling distance in meters
    pub fn native_scale(&self) -> f64 {
        match self.family() {
            SensorFamily::Landsat => 30.0,
            SensorFamily::Sentinel2 => 10.0,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Sensor::Landsat5Tm => "Landsat 5 TM",
            Sensor::Landsat7Etm => "Landsat 7 ETM+",
            Sensor::Landsat8Oli => "Landsat 8 OLI",
            Sensor::Sentinel2Msi => "Sentinel-2 MSI",
        }
    }

    pub fn short_label(&self) -> &'static str {
        match self {
            Sensor::Landsat5Tm => "L5",
            Sensor::Landsat7Etm => "L7",
            Sensor::Landsat8Oli => "L8",
            Sensor::Sentinel2Msi => "S2",
        }
    }

    /// (red, green, blue) band names for a natural colour rendering
    pub fn true_color_bands(&self) -> [String; 3] {
        let p = self.profile();
        [p.red, p.green, p.blue]
    }

    /// (nir, red, green) band names for a vegetation false colour rendering
    pub fn false_color_bands(&self) -> [String; 3] {
        let p = self.profile();
        [p.nir, p.red, p.green]
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
