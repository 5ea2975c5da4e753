//! Helpers shared by the accompanying binaries.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::path::Path;

use anyhow::{Context, Result};
pub use clap::{App, Arg};
use indicatif::{ProgressBar, ProgressStyle};
pub use inflector::Inflector;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing_subscriber::EnvFilter;

use crate::{
    field::TemperatureField,
    reference::{ReferenceImageSet, ReferenceSet},
};

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// Log to stderr, so that stdout only carries the JSON
/// output. Defaults to `info`; `RUST_LOG` overrides.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

/// Image name a field file stands for: its file stem, e.g.
/// `IR_0001` for `dumps/IR_0001.csv`.
pub fn image_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// The image of `reference` that the field file at
/// `field_path` stands for, paired by file stem. Analyses of
/// the field should be named after the returned image's
/// `filename`, which is what validation looks up.
pub fn reference_image<'a>(reference: &'a ReferenceSet, field_path: &str) -> Option<&'a ReferenceImageSet> {
    let stem = image_stem(field_path);
    reference.images.iter().find(|i| image_stem(&i.filename) == stem)
}

pub struct FieldInput {
    pub filename: String,
    pub field: TemperatureField,
}

/// Read grid-CSV fields in parallel, ticking a progress
/// bar as each one is loaded.
pub fn load_fields_par(paths: Vec<String>) -> impl ParallelIterator<Item = Result<FieldInput>> {
    let bar = ProgressBar::new(paths.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );

    paths
        .into_par_iter()
        .map(|filename| {
            let field = TemperatureField::from_csv_path(Path::new(&filename))
                .with_context(|| format!("could not read temperature field {}", filename))?;
            Ok(FieldInput { filename, field })
        })
        .inspect(move |_| bar.inc(1))
}
