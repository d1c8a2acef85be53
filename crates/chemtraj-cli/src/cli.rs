use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    name = "chemtraj",
    version,
    about = "Read, convert and analyze molecular dynamics trajectories (DCD, XTC, STF/CTF, XYZ).",
    help_template = HELP_TEMPLATE,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted before or after any subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Log more: -v info, -vv debug, -vvv trace. RUST_LOG overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also log to this file, without colors
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Worker threads for concurrent frame decoding (default: one per core)
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,

    /// TOML file with per-command defaults
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the atom count, frame count and cell information of a trajectory.
    Info(InfoArgs),
    /// Convert a trajectory between formats, chosen by file extension.
    Convert(ConvertArgs),
    /// Compute the RMSD of every frame against a reference structure.
    Rmsd(RmsdArgs),
    /// Compute a radial distribution function between two atom selections.
    Rdf(RdfArgs),
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Path to the trajectory file.
    #[arg(required = true, value_name = "PATH")]
    pub input: PathBuf,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Path to the input trajectory.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path to the output trajectory; the extension picks the format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Decimal digits kept by STF/CTF output.
    #[arg(short, long, value_name = "INT")]
    pub precision: Option<u32>,

    /// Time between frames stored in DCD and XTC output.
    #[arg(long, value_name = "FLOAT")]
    pub timestep: Option<f32>,

    /// Title stored in DCD and STF output.
    #[arg(long, value_name = "TEXT")]
    pub title: Option<String>,

    /// Number of frames decoded concurrently per batch.
    #[arg(short, long, value_name = "INT")]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RmsdArgs {
    /// Path to the input trajectory.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Trajectory or XYZ file whose first frame is the reference.
    /// Defaults to the first frame of the input.
    #[arg(short, long, value_name = "PATH")]
    pub reference: Option<PathBuf>,

    /// Zero-based atom indices to compare (e.g. '0-9,15').
    #[arg(short, long, value_name = "LIST")]
    pub selection: Option<String>,

    /// Compare raw coordinates without optimal superposition.
    #[arg(long)]
    pub no_superpose: bool,

    /// Path for the CSV output; prints to stdout when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RdfArgs {
    /// Path to the input trajectory.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Zero-based indices of the reference atoms (e.g. '0-99').
    #[arg(long = "ref", required = true, value_name = "LIST")]
    pub reference: String,

    /// Zero-based indices of the target atoms.
    #[arg(long, required = true, value_name = "LIST")]
    pub target: String,

    /// Outer radius of the histogram in ångström.
    #[arg(long, value_name = "FLOAT")]
    pub r_max: Option<f64>,

    /// Number of histogram bins.
    #[arg(long, value_name = "INT")]
    pub bins: Option<usize>,

    /// Target number density in atoms per Å³, for trajectories without cells.
    #[arg(long, value_name = "FLOAT")]
    pub density: Option<f64>,

    /// Number of frames decoded concurrently per batch.
    #[arg(short, long, value_name = "INT")]
    pub batch_size: Option<usize>,

    /// Path for the CSV output; prints to stdout when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}
