//! Classification of thermal asymmetry from a temperature
//! difference (ΔT) between two regions.
//!
//! The default bins follow the usual clinical thermography
//! convention:
//!
//! | ΔT (°C)        | class      |
//! |----------------|------------|
//! | `< 0.5`        | `Normal`   |
//! | `[0.5, 1.0)`   | `Leve`     |
//! | `[1.0, 1.5)`   | `Moderada` |
//! | `>= 1.5`       | `Severa`   |
//!
//! A value exactly on a threshold belongs to the higher bin.

use serde_derive::*;

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AsymmetryClass {
    Normal,
    Leve,
    Moderada,
    Severa,
}

/// Upper (exclusive) bounds of the `Normal`, `Leve` and
/// `Moderada` bins.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct AsymmetryThresholds {
    pub normal: f64,
    pub mild: f64,
    pub moderate: f64,
}

impl Default for AsymmetryThresholds {
    fn default() -> Self {
        AsymmetryThresholds {
            normal: 0.5,
            mild: 1.0,
            moderate: 1.5,
        }
    }
}

impl AsymmetryThresholds {
    pub fn new(normal: f64, mild: f64, moderate: f64) -> Result<Self> {
        let thresholds = AsymmetryThresholds {
            normal,
            mild,
            moderate,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        let ok = self.normal >= 0. && self.normal < self.mild && self.mild < self.moderate;
        if !ok {
            return Err(Error::InvalidInput(format!(
                "asymmetry thresholds must be non-negative and strictly increasing: {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Map a temperature difference to its class.
    ///
    /// `delta_t` is an absolute difference; negative or NaN
    /// values are rejected.
    pub fn classify(&self, delta_t: f64) -> Result<AsymmetryClass> {
        if delta_t.is_nan() || delta_t < 0. {
            return Err(Error::InvalidInput(format!(
                "temperature difference must be non-negative, got {}",
                delta_t
            )));
        }
        Ok(if delta_t < self.normal {
            AsymmetryClass::Normal
        } else if delta_t < self.mild {
            AsymmetryClass::Leve
        } else if delta_t < self.moderate {
            AsymmetryClass::Moderada
        } else {
            AsymmetryClass::Severa
        })
    }

    /// Compare a left/right pair of temperatures.
    pub fn analyze_pair(&self, left_temp: f64, right_temp: f64) -> Result<AsymmetryResult> {
        let delta_t = (left_temp - right_temp).abs();
        let classification = self.classify(delta_t)?;
        Ok(AsymmetryResult {
            delta_t,
            classification,
            left_temp,
            right_temp,
            confidence: self.confidence(delta_t),
        })
    }

    /// Heuristic confidence in `[0, 1]`: grows with ΔT
    /// (saturating at 2 °C) and is discounted by 15% for
    /// every threshold closer than 0.1 °C.
    fn confidence(&self, delta_t: f64) -> f64 {
        let mut confidence = (delta_t / 2.).min(1.);
        for &threshold in &[self.normal, self.mild, self.moderate] {
            if (delta_t - threshold).abs() < 0.1 {
                confidence *= 0.85;
            }
        }
        (confidence * 100.).round() / 100.
    }
}

/// Classify with the default thresholds.
pub fn classify(delta_t: f64) -> Result<AsymmetryClass> {
    AsymmetryThresholds::default().classify(delta_t)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AsymmetryResult {
    pub delta_t: f64,
    pub classification: AsymmetryClass,
    pub left_temp: f64,
    pub right_temp: f64,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use AsymmetryClass::*;

    #[test]
    fn default_bins() -> anyhow::Result<()> {
        assert_eq!(classify(0.)?, Normal);
        assert_eq!(classify(0.49)?, Normal);
        assert_eq!(classify(0.7)?, Leve);
        assert_eq!(classify(1.2)?, Moderada);
        assert_eq!(classify(3.)?, Severa);
        Ok(())
    }

    #[test]
    fn boundaries_go_to_higher_bin() -> anyhow::Result<()> {
        assert_eq!(classify(0.5)?, Leve);
        assert_eq!(classify(1.0)?, Moderada);
        assert_eq!(classify(1.5)?, Severa);
        Ok(())
    }

    #[test]
    fn monotonic() -> anyhow::Result<()> {
        let mut last = Normal;
        for i in 0..400 {
            let class = classify(i as f64 * 0.01)?;
            assert!(class >= last);
            last = class;
        }
        assert_eq!(last, Severa);
        Ok(())
    }

    #[test]
    fn rejects_negative_and_nan() {
        assert!(matches!(classify(-0.1), Err(Error::InvalidInput(_))));
        assert!(matches!(classify(f64::NAN), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn custom_thresholds() -> anyhow::Result<()> {
        let strict = AsymmetryThresholds::new(0.3, 0.6, 0.9)?;
        assert_eq!(strict.classify(0.3)?, Leve);
        assert_eq!(strict.classify(0.95)?, Severa);
        assert!(AsymmetryThresholds::new(1.0, 0.5, 1.5).is_err());
        assert!(AsymmetryThresholds::new(-0.1, 0.5, 1.5).is_err());
        Ok(())
    }

    #[test]
    fn pair_analysis() -> anyhow::Result<()> {
        let thresholds = AsymmetryThresholds::default();
        let result = thresholds.analyze_pair(33.2, 34.4)?;
        assert_relative_eq!(result.delta_t, 1.2, epsilon = 1e-9);
        assert_eq!(result.classification, Moderada);
        assert_relative_eq!(result.confidence, 0.6);

        // 0.52 is within 0.1 of the 0.5 threshold
        let near = thresholds.analyze_pair(34.0, 34.52)?;
        assert_relative_eq!(near.confidence, 0.22);

        let saturated = thresholds.analyze_pair(30., 34.)?;
        assert_relative_eq!(saturated.confidence, 1.);
        Ok(())
    }
}
