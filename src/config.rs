//! Runtime configuration, read from a JSON document.
//!
//! Every field has a default, so `{}` is a valid
//! configuration and a document only needs the values it
//! changes:
//!
//! ```json
//! {
//!   "asymmetry": { "normal": 0.4 },
//!   "analysis": { "parallel": false },
//!   "validation": { "tolerance_ok": 0.3 },
//!   "matcher": { "acceptance_threshold": 0.85 },
//!   "hotspot": { "method": "otsu", "max_regions": 4 }
//! }
//! ```

use std::{fs, path::Path};

use serde_derive::*;
use tracing::debug;

use crate::{
    analysis::MultiPointAnalyzer,
    asymmetry::AsymmetryThresholds,
    error::Result,
    hotspot::{HotspotConfig, HotspotDetector},
    matching::{MatcherConfig, NameMatcher},
    validation::{ValidationConfig, ValidationEngine},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Measure the ROIs of an image in parallel.
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig { parallel: true }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub asymmetry: AsymmetryThresholds,
    pub analysis: AnalysisConfig,
    pub validation: ValidationConfig,
    pub matcher: MatcherConfig,
    pub hotspot: HotspotConfig,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading configuration");
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.asymmetry.validate()?;
        self.validation.validate()?;
        self.matcher.validate()?;
        self.hotspot.validate()
    }

    pub fn analyzer(&self) -> Result<MultiPointAnalyzer> {
        MultiPointAnalyzer::new(self.asymmetry, self.analysis.parallel)
    }

    pub fn validation_engine(&self) -> Result<ValidationEngine> {
        ValidationEngine::new(self.validation, NameMatcher::new(self.matcher.clone())?)
    }

    pub fn hotspot_detector(&self) -> Result<HotspotDetector> {
        HotspotDetector::new(self.hotspot)
    }
}
