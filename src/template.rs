//! Anatomical templates: named, reusable collections of
//! regions of interest plus the groups of regions that are
//! compared against each other (typically left/right
//! pairs).
//!
//! Templates are plain data and serialize to JSON. Every
//! mutation keeps two invariants, and rejects the change
//! without touching the template when it would break one:
//!
//! 1. ROI names are unique within the template.
//! 2. Every name in a comparison group is a ROI of the
//!    template, and every group has at least two members.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
};

use chrono::{DateTime, Utc};
use serde_derive::*;
use tracing::debug;

use crate::{
    error::{Error, Result},
    geometry::RegionGeometry,
    reference::ReferenceSet,
};

/// Open key-value metadata.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RegionType {
    Dermatome,
    TenderPoint,
    Joint,
    Extremity,
    Custom,
}

impl Default for RegionType {
    fn default() -> Self {
        RegionType::Custom
    }
}

/// A region of interest with an anatomical identity.
///
/// The geometry is optional: regions of a built-in protocol
/// or of an imported reference exist before anyone has
/// drawn them on an image.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnatomicalRoi {
    pub name: String,
    #[serde(default)]
    pub anatomical_location: String,
    #[serde(default)]
    pub geometry: Option<RegionGeometry>,
    #[serde(default)]
    pub region_type: RegionType,
    /// Expected `(low, high)` temperature range in °C.
    #[serde(default)]
    pub expected_range: Option<(f64, f64)>,
    #[serde(default)]
    pub notes: String,
}

impl AnatomicalRoi {
    pub fn new<S: Into<String>>(name: S, region_type: RegionType) -> Self {
        AnatomicalRoi {
            name: name.into(),
            anatomical_location: String::new(),
            geometry: None,
            region_type,
            expected_range: None,
            notes: String::new(),
        }
    }

    pub fn with_geometry(mut self, geometry: RegionGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_location<S: Into<String>>(mut self, location: S) -> Self {
        self.anatomical_location = location.into();
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = notes.into();
        self
    }
}

/// What [`AnatomicalTemplate::remove_roi`] does with a
/// comparison group that would be left with a single
/// member.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupRemovalPolicy {
    /// Refuse the removal with
    /// [`Error::DanglingGroupReference`].
    Reject,
    /// Drop the group along with the ROI.
    DropGroup,
}

impl Default for GroupRemovalPolicy {
    fn default() -> Self {
        GroupRemovalPolicy::Reject
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnatomicalTemplate {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub reference_image_path: Option<String>,
    #[serde(default)]
    rois: Vec<AnatomicalRoi>,
    #[serde(default)]
    comparison_groups: Vec<Vec<String>>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_category() -> String {
    "custom".into()
}

impl AnatomicalTemplate {
    pub fn new<S: Into<String>>(name: S) -> Self {
        let now = Utc::now();
        AnatomicalTemplate {
            id: None,
            name: name.into(),
            description: String::new(),
            category: default_category(),
            reference_image_path: None,
            rois: vec![],
            comparison_groups: vec![],
            created: now,
            modified: now,
            metadata: Metadata::new(),
        }
    }

    /// ROIs in insertion order.
    pub fn rois(&self) -> &[AnatomicalRoi] {
        &self.rois
    }

    pub fn roi_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.rois.iter().map(|r| r.name.as_str())
    }

    pub fn roi(&self, name: &str) -> Option<&AnatomicalRoi> {
        self.rois.iter().find(|r| r.name == name)
    }

    pub fn comparison_groups(&self) -> &[Vec<String>] {
        &self.comparison_groups
    }

    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }

    pub fn add_roi(&mut self, roi: AnatomicalRoi) -> Result<()> {
        if self.roi(&roi.name).is_some() {
            return Err(Error::DuplicateName(roi.name));
        }
        debug!(template = %self.name, roi = %roi.name, "adding ROI");
        self.rois.push(roi);
        self.touch();
        Ok(())
    }

    /// Replace the geometry of an existing ROI.
    pub fn set_geometry(&mut self, name: &str, geometry: RegionGeometry) -> Result<()> {
        let roi = self
            .rois
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::UnknownRoi(name.to_string()))?;
        roi.geometry = Some(geometry);
        self.touch();
        Ok(())
    }

    /// Remove a ROI and its memberships in comparison
    /// groups. Groups that would drop below two members are
    /// handled according to `policy`.
    pub fn remove_roi(&mut self, name: &str, policy: GroupRemovalPolicy) -> Result<AnatomicalRoi> {
        let idx = self
            .rois
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| Error::UnknownRoi(name.to_string()))?;

        let mut groups = Vec::with_capacity(self.comparison_groups.len());
        for group in &self.comparison_groups {
            let pruned: Vec<String> = group.iter().filter(|n| *n != name).cloned().collect();
            if pruned.len() >= 2 {
                groups.push(pruned);
            } else if policy == GroupRemovalPolicy::Reject {
                return Err(Error::DanglingGroupReference {
                    roi: name.to_string(),
                    group: group.clone(),
                });
            }
        }

        self.comparison_groups = groups;
        let roi = self.rois.remove(idx);
        self.touch();
        Ok(roi)
    }

    /// Declare a group of ROIs to compare. Repeated names
    /// are collapsed; at least two distinct names are needed.
    pub fn add_comparison_group<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut group: Vec<String> = vec![];
        for name in names {
            let name = name.into();
            if self.roi(&name).is_none() {
                return Err(Error::UnknownRoi(name));
            }
            if !group.contains(&name) {
                group.push(name);
            }
        }
        if group.len() < 2 {
            return Err(Error::InvalidInput(format!(
                "comparison group needs at least 2 distinct ROIs, got {:?}",
                group
            )));
        }
        self.comparison_groups.push(group);
        self.touch();
        Ok(())
    }

    /// Check both invariants. Used after deserialization,
    /// where the document may have been edited by hand.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for roi in &self.rois {
            if !seen.insert(roi.name.as_str()) {
                return Err(Error::DuplicateName(roi.name.clone()));
            }
        }
        for group in &self.comparison_groups {
            if let Some(missing) = group.iter().find(|n| !seen.contains(n.as_str())) {
                return Err(Error::UnknownRoi(missing.clone()));
            }
            let distinct: HashSet<_> = group.iter().collect();
            if distinct.len() < 2 {
                return Err(Error::InvalidInput(format!(
                    "comparison group needs at least 2 distinct ROIs, got {:?}",
                    group
                )));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let template: Self = serde_json::from_str(json)?;
        template.validate()?;
        Ok(template)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Build a template with one (not yet drawn) ROI per
    /// distinct ROI name in the reference set. The expected
    /// range of each ROI is the reference `(min, max)`.
    pub fn from_reference_set<S: Into<String>>(reference: &ReferenceSet, name: S) -> Self {
        let mut template = AnatomicalTemplate::new(name);
        template.description = format!("Imported from {}", reference.source_identifier);
        template.category = "reference_import".into();
        template
            .metadata
            .insert("source_file".into(), reference.source_identifier.clone().into());
        template
            .metadata
            .insert("total_images".into(), reference.images.len().into());

        for m in reference.all_measurements() {
            if template.roi(&m.roi_name).is_some() {
                continue;
            }
            let roi = AnatomicalRoi {
                name: m.roi_name.clone(),
                anatomical_location: format!("Imported reference ROI: {}", m.roi_name),
                geometry: None,
                region_type: RegionType::Custom,
                expected_range: Some((m.min_temp, m.max_temp)),
                notes: format!(
                    "Reference mean {:.2}°C, min {:.2}°C, max {:.2}°C",
                    m.mean_temp, m.min_temp, m.max_temp
                ),
            };
            template.rois.push(roi);
        }
        template
    }

    /// The 18 tender points of the ACR 1990 fibromyalgia
    /// criteria as 9 bilateral pairs. Geometries are left
    /// for the user to draw.
    pub fn fibromyalgia_18_points() -> Self {
        // (site, location, feminine noun)
        const POINTS: [(&str, &str, bool); 9] = [
            ("Occipital", "Suboccipital muscle insertion", false),
            ("Cervical Baixo", "Anterior aspects of the C5-C7 intertransverse spaces", false),
            ("Trapézio", "Midpoint of the upper border of the trapezius", false),
            ("Supraespinal", "Supraspinatus origin above the scapular spine", false),
            ("Segunda Costela", "Second costochondral junction", true),
            ("Epicôndilo Lateral", "2 cm distal to the lateral epicondyle", false),
            ("Glúteo", "Upper outer quadrant of the buttock", false),
            ("Trocanter Maior", "Posterior to the trochanteric prominence", false),
            ("Joelho", "Medial fat pad proximal to the knee joint line", false),
        ];

        let mut template = AnatomicalTemplate::new("Fibromialgia - 18 Tender Points (ACR 1990)");
        template.description =
            "The 18 classic tender points of the ACR 1990 fibromyalgia criteria".into();
        template.category = "fibromyalgia".into();

        for &(site, location, feminine) in POINTS.iter() {
            let (left, right) = if feminine {
                ("Esquerda", "Direita")
            } else {
                ("Esquerdo", "Direito")
            };
            let names = [format!("{} {}", site, left), format!("{} {}", site, right)];
            for (name, side) in names.iter().zip(&["left", "right"]) {
                template.rois.push(
                    AnatomicalRoi::new(name.as_str(), RegionType::TenderPoint)
                        .with_location(format!("{} ({})", location, side))
                        .with_notes("ACR 1990 tender point"),
                );
            }
            template.comparison_groups.push(names.to_vec());
        }
        template
    }
}
