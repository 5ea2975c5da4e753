//! Region-of-interest analysis of thermal images.
//!
//! Given a per-pixel temperature field (°C) and an
//! [anatomical template](template::AnatomicalTemplate)
//! of named regions, the crate
//!
//! 1. [rasterizes](geometry::rasterize) each region into a
//! pixel mask and computes its [statistics](stats::RegionStats);
//!
//! 2. compares regions pairwise and within declared
//! comparison groups, [classifying](asymmetry) each
//! temperature difference as `Normal`, `Leve`, `Moderada` or
//! `Severa` (see [`MultiPointAnalyzer`]);
//!
//! 3. [validates](validation::ValidationEngine) the computed
//! temperatures against the measurements [exported by FLIR
//! Thermal Studio](reference), pairing ROI names with a
//! tolerant [name matcher](matching::NameMatcher).
//!
//! Hot regions can also be [found automatically](hotspot)
//! and turned into ROIs.
//!
//! Decoding radiometric images into temperature fields is
//! out of scope; fields are built from an
//! [`ndarray::Array2`] or read from a grid CSV.
//!
//! # Usage
//!
//! ```rust
//! # fn test_compile() -> anyhow::Result<()> {
//! use std::path::Path;
//! use thermal_roi::{AnatomicalTemplate, MultiPointAnalyzer, TemperatureField};
//!
//! let template = AnatomicalTemplate::load(Path::new("template.json"))?;
//! let field = TemperatureField::from_csv_path(Path::new("IR_0001.csv"))?;
//! let result = MultiPointAnalyzer::default().analyze(&template, &field, "IR_0001.jpg")?;
//! if let Some(max) = result.max_delta() {
//!     println!("{} vs {}: {:.2} °C ({:?})", max.a, max.b, max.delta_t, max.classification);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Per-ROI problems (a region drawn outside the image, a
//! region never drawn) do not fail the analysis; they are
//! listed in [`MultiPointAnalysisResult::warnings`].

pub mod error;
pub mod stats;
pub mod field;
pub mod geometry;
pub mod asymmetry;
pub mod template;
pub mod analysis;
pub mod hotspot;
pub mod reference;
pub mod matching;
pub mod validation;
pub mod config;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::analysis::{MultiPointAnalysisResult, MultiPointAnalyzer};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::field::TemperatureField;
pub use crate::geometry::RegionGeometry;
pub use crate::hotspot::{Hotspot, HotspotDetector};
pub use crate::reference::ReferenceSet;
pub use crate::template::{AnatomicalRoi, AnatomicalTemplate};
pub use crate::validation::{ValidationEngine, ValidationReport};
