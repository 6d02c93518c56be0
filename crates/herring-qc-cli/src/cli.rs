use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use herring_qc_lib::core::SampleType;

#[derive(Parser, Debug)]
#[command(
    name = "herring-qc",
    version,
    about = "Quality-control checks for herring port, sea, lab and otolith samples"
)]
pub struct Cli {
    /// Settings file; the platform config directory is used when omitted
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every check on a sample file and resolve improbable observations
    Check(CheckArgs),
    /// List test definitions
    Catalog(CatalogArgs),
    /// Print the range table
    Ranges(RangesArgs),
    /// Print the probable bounds of a ratio test
    Bounds(BoundsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Sample JSON file
    pub sample: PathBuf,

    /// Comma-separated answers used instead of prompting on stdin
    #[arg(long, value_delimiter = ',')]
    pub answers: Option<Vec<String>>,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Store results and acceptance decisions back into the sample file
    #[arg(long, default_value_t = false)]
    pub write_back: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    #[arg(long, value_enum)]
    pub sample_type: Option<SampleTypeArg>,

    /// Show the earlier lab-only catalog
    #[arg(long, default_value_t = false)]
    pub legacy: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RangesArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BoundsArgs {
    /// Ratio test id (204, 207 or 209 in the built-in catalog)
    #[arg(long = "test")]
    pub test_id: u16,

    /// Value of the independent field
    #[arg(long)]
    pub independent: f64,

    /// Maturity stage for the gonad weight test
    #[arg(long)]
    pub maturity: Option<u8>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SampleTypeArg {
    Port,
    Sea,
    Lab,
    Otolith,
}

impl From<SampleTypeArg> for SampleType {
    fn from(arg: SampleTypeArg) -> Self {
        match arg {
            SampleTypeArg::Port => SampleType::PortSample,
            SampleTypeArg::Sea => SampleType::SeaSample,
            SampleTypeArg::Lab => SampleType::LabSample,
            SampleTypeArg::Otolith => SampleType::OtolithSample,
        }
    }
}
