//! Reference measurements exported by FLIR Thermal Studio.
//!
//! The HTML report exported by Thermal Studio contains one
//! `<section>` per image. Each section carries two tables,
//! identified by their `<caption>`:
//!
//! - "File information": two-cell `key | value` rows; the
//!   `File name` entry names the image.
//! - "Measurements": a header row (`Name`, `Max`, `Mean`,
//!   `Min`, in any order) followed by one row per ROI, with
//!   values such as `34.5 °C`.
//!
//! The export is simple and regular enough that a handful
//! of regular expressions is all the HTML parsing needed.
//! Numeric extraction is strict, but a malformed row only
//! costs that row: it is reported as a [`ParseWarning`]
//! and the rest of the document is still parsed.

use std::{collections::BTreeMap, fs, path::Path};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_derive::*;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// One ROI reported for one image.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReferenceMeasurement {
    pub roi_name: String,
    pub max_temp: f64,
    pub mean_temp: f64,
    pub min_temp: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReferenceImageSet {
    pub filename: String,
    pub measurements: Vec<ReferenceMeasurement>,
    pub file_info: BTreeMap<String, String>,
}

impl ReferenceImageSet {
    pub fn measurement(&self, roi_name: &str) -> Option<&ReferenceMeasurement> {
        self.measurements.iter().find(|m| m.roi_name == roi_name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReferenceSet {
    pub source_identifier: String,
    pub images: Vec<ReferenceImageSet>,
}

impl ReferenceSet {
    /// First image section with the given file name.
    pub fn image(&self, filename: &str) -> Option<&ReferenceImageSet> {
        self.images.iter().find(|i| i.filename == filename)
    }

    pub fn all_measurements(&self) -> impl Iterator<Item = &ReferenceMeasurement> + '_ {
        self.images.iter().flat_map(|i| i.measurements.iter())
    }
}

/// A measurement row that could not be parsed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParseWarning {
    /// Zero-based section index.
    pub section: usize,
    pub image: String,
    /// One-based row index within the measurements table.
    pub row: usize,
    pub message: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct ReferenceParse {
    pub reference: ReferenceSet,
    pub warnings: Vec<ParseWarning>,
}

lazy_static! {
    static ref SECTION: Regex = Regex::new(r"(?is)<section\b[^>]*>(.*?)</section\s*>").unwrap();
    static ref TABLE: Regex = Regex::new(r"(?is)<table\b[^>]*>(.*?)</table\s*>").unwrap();
    static ref CAPTION: Regex = Regex::new(r"(?is)<caption\b[^>]*>(.*?)</caption\s*>").unwrap();
    static ref ROW: Regex = Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").unwrap();
    static ref CELL: Regex = Regex::new(r"(?is)<(t[hd])\b[^>]*>(.*?)</t[hd]\s*>").unwrap();
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref ENTITY: Regex = Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap();
    static ref SPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref TEMPERATURE: Regex =
        Regex::new(r"(?i)^([-+]?\d+(?:[.,]\d+)?)\s*(°\s*[CF]|°|[CFK])?$").unwrap();
}

const FILE_INFO_CAPTION: &str = "file information";
const MEASUREMENTS_CAPTION: &str = "measurements";
const FILE_NAME_KEY: &str = "File name";
const UNKNOWN_FILENAME: &str = "Unknown";

/// Parse an exported HTML document. `source` identifies the
/// document in the result and in error messages.
pub fn parse_document(html: &str, source: &str) -> Result<ReferenceParse> {
    let sections: Vec<&str> = SECTION
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    if sections.is_empty() {
        return Err(Error::EmptyReferenceDocument(source.to_string()));
    }
    info!(source, sections = sections.len(), "parsing reference document");

    let mut warnings = vec![];
    let images = sections
        .iter()
        .enumerate()
        .map(|(idx, section)| parse_section(idx, section, &mut warnings))
        .collect();

    Ok(ReferenceParse {
        reference: ReferenceSet {
            source_identifier: source.to_string(),
            images,
        },
        warnings,
    })
}

pub fn parse_file(path: &Path) -> Result<ReferenceParse> {
    let html = fs::read_to_string(path)?;
    parse_document(&html, &path.display().to_string())
}

fn parse_section(idx: usize, section: &str, warnings: &mut Vec<ParseWarning>) -> ReferenceImageSet {
    let mut file_info = BTreeMap::new();
    let mut measurement_rows = vec![];

    for table in TABLE.captures_iter(section).filter_map(|c| c.get(1)) {
        let table = table.as_str();
        let caption = CAPTION
            .captures(table)
            .and_then(|c| c.get(1))
            .map(|m| cell_text(m.as_str()).to_lowercase())
            .unwrap_or_default();

        if caption.contains(FILE_INFO_CAPTION) && file_info.is_empty() {
            for row in rows(table) {
                if let [key, value] = &row.cells[..] {
                    file_info.insert(key.clone(), value.clone());
                }
            }
        } else if caption.contains(MEASUREMENTS_CAPTION) && measurement_rows.is_empty() {
            measurement_rows = rows(table);
        }
    }

    let filename = file_info
        .get(FILE_NAME_KEY)
        .cloned()
        .unwrap_or_else(|| UNKNOWN_FILENAME.to_string());

    let measurements = parse_measurements(&measurement_rows, |row, message| {
        warn!(image = %filename, row, %message, "skipping reference measurement");
        warnings.push(ParseWarning {
            section: idx,
            image: filename.clone(),
            row,
            message,
        });
    });

    debug!(image = %filename, rois = measurements.len(), "parsed section");
    ReferenceImageSet {
        filename,
        measurements,
        file_info,
    }
}

struct Row {
    cells: Vec<String>,
    is_header: bool,
}

fn rows(table: &str) -> Vec<Row> {
    ROW.captures_iter(table)
        .filter_map(|c| c.get(1))
        .map(|row| {
            let mut is_header = true;
            let cells = CELL
                .captures_iter(row.as_str())
                .map(|c| {
                    if !c[1].eq_ignore_ascii_case("th") {
                        is_header = false;
                    }
                    cell_text(&c[2])
                })
                .collect::<Vec<_>>();
            Row {
                is_header: is_header && !cells.is_empty(),
                cells,
            }
        })
        .filter(|r| !r.cells.is_empty())
        .collect()
}

/// Column positions of the four measurement fields.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Columns {
    name: usize,
    max: usize,
    mean: usize,
    min: usize,
}

impl Columns {
    const POSITIONAL: Columns = Columns {
        name: 0,
        max: 1,
        mean: 2,
        min: 3,
    };

    fn from_header(cells: &[String]) -> Option<Self> {
        let find = |prefixes: &[&str]| {
            cells.iter().position(|c| {
                let c = c.to_lowercase();
                prefixes.iter().any(|p| c.starts_with(p))
            })
        };
        Some(Columns {
            name: find(&["name", "label"])?,
            max: find(&["max"])?,
            mean: find(&["mean", "avg", "average"])?,
            min: find(&["min"])?,
        })
    }

    fn width(&self) -> usize {
        1 + self.name.max(self.max).max(self.mean).max(self.min)
    }
}

fn parse_measurements<F>(rows: &[Row], mut warn: F) -> Vec<ReferenceMeasurement>
where
    F: FnMut(usize, String),
{
    let header = rows
        .iter()
        .enumerate()
        .find_map(|(idx, row)| Columns::from_header(&row.cells).map(|cols| (idx, cols)));
    let (first_data, columns) = match header {
        Some((idx, cols)) => (idx + 1, cols),
        None => (0, Columns::POSITIONAL),
    };

    let mut measurements = vec![];
    for (idx, row) in rows.iter().enumerate().skip(first_data) {
        if row.is_header {
            continue;
        }
        let row_no = idx + 1;
        match parse_measurement_row(&row.cells, columns) {
            Ok(m) => measurements.push(m),
            Err(message) => warn(row_no, message),
        }
    }
    measurements
}

fn parse_measurement_row(
    cells: &[String],
    columns: Columns,
) -> std::result::Result<ReferenceMeasurement, String> {
    if cells.len() < columns.width() {
        return Err(format!(
            "expected at least {} cells, found {}",
            columns.width(),
            cells.len()
        ));
    }
    let roi_name = cells[columns.name].trim();
    if roi_name.is_empty() {
        return Err("empty ROI name".into());
    }
    let field = |idx: usize, label: &str| {
        parse_temperature(&cells[idx]).map_err(|e| format!("{} of `{}`: {}", label, roi_name, e))
    };
    Ok(ReferenceMeasurement {
        roi_name: roi_name.to_string(),
        max_temp: field(columns.max, "max")?,
        mean_temp: field(columns.mean, "mean")?,
        min_temp: field(columns.min, "min")?,
    })
}

/// Parse a temperature such as `34.5 °C`, `34,5°C` or `34.5`
/// into °C. Fahrenheit and Kelvin values are converted.
pub fn parse_temperature(text: &str) -> std::result::Result<f64, String> {
    let text = text.trim();
    let caps = TEMPERATURE
        .captures(text)
        .ok_or_else(|| format!("not a temperature: `{}`", text))?;
    let value: f64 = caps[1]
        .replace(',', ".")
        .parse()
        .map_err(|e| format!("`{}`: {}", text, e))?;

    let unit = caps
        .get(2)
        .map(|m| m.as_str().trim_start_matches('°').trim().to_uppercase())
        .unwrap_or_default();
    Ok(match unit.as_str() {
        "F" => (value - 32.) * 5. / 9.,
        "K" => value - 273.15,
        _ => value,
    })
}

fn cell_text(html: &str) -> String {
    let text = TAG.replace_all(html, " ");
    let text = ENTITY.replace_all(&text, |caps: &Captures| decode_entity(&caps[1]));
    SPACE.replace_all(&text, " ").trim().to_string()
}

fn decode_entity(entity: &str) -> String {
    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse().ok()
    } else {
        match entity {
            "amp" => Some('&' as u32),
            "lt" => Some('<' as u32),
            "gt" => Some('>' as u32),
            "quot" => Some('"' as u32),
            "apos" => Some('\'' as u32),
            "nbsp" => Some(0xa0),
            "deg" => Some(0xb0),
            "times" => Some(0xd7),
            _ => None,
        }
    };
    code.and_then(std::char::from_u32)
        .map(String::from)
        .unwrap_or_else(|| format!("&{};", entity))
}
