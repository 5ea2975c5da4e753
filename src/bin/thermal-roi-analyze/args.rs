use std::path::PathBuf;

use anyhow::Result;
use clap::value_t_or_exit;
use thermal_roi::{arg, args_parser, opt};

pub struct Args {
    pub paths: Vec<String>,
    pub template: PathBuf,
    pub config: Option<PathBuf>,
    pub reference: Option<PathBuf>,
    pub hotspots: bool,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-roi-analyze")
            .about("Analyze temperature fields against an anatomical template.")
            .arg(
                opt!("template")
                    .short("t")
                    .required(true)
                    .help("Template JSON with the ROIs to measure"),
            )
            .arg(
                opt!("config")
                    .short("c")
                    .help("Configuration JSON (default: built-in defaults)"),
            )
            .arg(
                opt!("reference")
                    .short("r")
                    .help("FLIR Thermal Studio HTML export to validate against"),
            )
            .arg(
                opt!("hotspots")
                    .takes_value(false)
                    .help("Also detect hot regions automatically"),
            )
            .arg(
                arg!("paths")
                    .required(true)
                    .multiple(true)
                    .help("Temperature field grid CSVs"),
            )
            .get_matches();

        let paths = matches
            .values_of("paths")
            .map(|v| v.map(|f| f.into()).collect())
            .unwrap_or_default();
        let template = value_t_or_exit!(matches, "template", PathBuf);
        let config = matches.value_of("config").map(PathBuf::from);
        let reference = matches.value_of("reference").map(PathBuf::from);
        let hotspots = matches.is_present("hotspots");

        Ok(Args {
            paths,
            template,
            config,
            reference,
            hotspots,
        })
    }
}
