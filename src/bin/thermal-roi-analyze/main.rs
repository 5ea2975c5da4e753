mod args;

use anyhow::{Context, Result};
use args::Args;
use rayon::iter::ParallelIterator;
use serde_derive::*;
use tracing::{info, warn};

use thermal_roi::cli::{init_logging, load_fields_par, reference_image};
use thermal_roi::{
    reference, AnatomicalTemplate, Config, Hotspot, MultiPointAnalysisResult, ReferenceSet,
    ValidationReport,
};

#[derive(Debug, Serialize)]
struct ImageOutput {
    filename: String,
    analysis: MultiPointAnalysisResult,
    validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hotspots: Option<Vec<Hotspot>>,
}

#[derive(Debug, Serialize)]
struct OutputJson {
    template: String,
    reference: Option<String>,
    images: Vec<ImageOutput>,
}

fn main() -> Result<()> {
    init_logging()?;
    let Args {
        paths,
        template,
        config,
        reference,
        hotspots: detect_hotspots,
    } = Args::from_cmd_line()?;

    let config = match config {
        Some(path) => Config::from_path(&path)
            .with_context(|| format!("could not load configuration {}", path.display()))?,
        None => Config::default(),
    };
    let analyzer = config.analyzer()?;
    let engine = config.validation_engine()?;
    let detector = config.hotspot_detector()?;

    let template = AnatomicalTemplate::load(&template)
        .with_context(|| format!("could not load template {}", template.display()))?;
    let reference: Option<ReferenceSet> = reference
        .map(|path| -> Result<_> {
            let parsed = reference::parse_file(&path)
                .with_context(|| format!("could not parse reference {}", path.display()))?;
            for w in &parsed.warnings {
                warn!(image = w.image.as_str(), row = w.row, "reference row skipped: {}", w.message);
            }
            Ok(parsed.reference)
        })
        .transpose()?;

    let images = load_fields_par(paths)
        .map(|input| -> Result<ImageOutput> {
            let input = input?;
            let paired = reference.as_ref().and_then(|reference| {
                let image = reference_image(reference, &input.filename);
                if image.is_none() {
                    warn!(image = input.filename.as_str(), "no matching image in reference");
                }
                image.map(|image| (reference, image.filename.as_str()))
            });

            // named after the reference image when paired, so the
            // result validates against it by name
            let image_name = paired.map_or(input.filename.as_str(), |(_, name)| name);
            let analysis = analyzer.analyze(&template, &input.field, image_name)?;
            let validation = paired
                .map(|(reference, _)| engine.validate_analysis(reference, &analysis))
                .transpose()?;
            let hotspots = if detect_hotspots {
                Some(detector.detect(&input.field))
            } else {
                None
            };

            Ok(ImageOutput {
                filename: input.filename,
                analysis,
                validation,
                hotspots,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(images = images.len(), "processed");
    serde_json::to_writer(
        std::io::stdout().lock(),
        &OutputJson {
            template: template.name.clone(),
            reference: reference.map(|r| r.source_identifier),
            images,
        },
    )?;
    Ok(())
}
