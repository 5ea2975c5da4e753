mod args;

use anyhow::{Context, Result};
use args::Args;
use tracing::info;

use thermal_roi::cli::{image_stem, init_logging};
use thermal_roi::{reference, AnatomicalTemplate};

fn main() -> Result<()> {
    init_logging()?;
    let Args {
        path,
        template_name,
        template_out,
    } = Args::from_cmd_line()?;

    let parsed = reference::parse_file(&path)
        .with_context(|| format!("could not parse reference {}", path.display()))?;

    if let Some(out) = template_out {
        let name = template_name.unwrap_or_else(|| image_stem(&path.to_string_lossy()));
        let template = AnatomicalTemplate::from_reference_set(&parsed.reference, name);
        template
            .save(&out)
            .with_context(|| format!("could not write template {}", out.display()))?;
        info!(path = %out.display(), rois = template.rois().len(), "template written");
    }

    serde_json::to_writer(std::io::stdout().lock(), &parsed)?;
    Ok(())
}
