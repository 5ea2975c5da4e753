use std::path::PathBuf;

use anyhow::Result;
use clap::value_t_or_exit;
use thermal_roi::{arg, args_parser, opt};

pub struct Args {
    pub path: PathBuf,
    pub template_name: Option<String>,
    pub template_out: Option<PathBuf>,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-roi-import")
            .about("Parse a FLIR Thermal Studio HTML export.")
            .arg(
                opt!("template name")
                    .short("n")
                    .help("Name of the generated template (default: export file stem)"),
            )
            .arg(
                opt!("template out")
                    .short("o")
                    .help("Write a template with the exported ROI names to this path"),
            )
            .arg(arg!("path").required(true).help("HTML export"))
            .get_matches();

        let path = value_t_or_exit!(matches, "path", PathBuf);
        let template_name = matches.value_of("template name").map(String::from);
        let template_out = matches.value_of("template out").map(PathBuf::from);

        Ok(Args {
            path,
            template_name,
            template_out,
        })
    }
}
