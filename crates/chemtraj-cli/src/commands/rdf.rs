use super::table_writer;
use crate::cli::RdfArgs;
use crate::config::{FileRdfConfig, RdfSettings, rdf_settings};
use crate::error::{CliError, Result};
use crate::utils::parser::parse_selection;
use crate::utils::progress::CliProgressHandler;
use chemtraj::analysis::config::{RdfConfig, RdfConfigBuilder};
use chemtraj::analysis::rdf::{self, RdfResult};
use chemtraj::analysis::{AnalysisError, ProgressReporter};
use chemtraj::traj::open_trajectory;
use serde::Serialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Serialize)]
struct RdfRow {
    r: f64,
    g: f64,
    count: u64,
}

fn selection(flag: &str, value: &str) -> Result<Vec<usize>> {
    parse_selection(value).map_err(|e| CliError::Argument(format!("--{flag}: {e}")))
}

fn build_config(args: &RdfArgs, settings: &RdfSettings) -> Result<RdfConfig> {
    let mut builder = RdfConfigBuilder::new()
        .reference(selection("ref", &args.reference)?)
        .target(selection("target", &args.target)?)
        .r_max(settings.r_max)
        .bins(settings.bins)
        .batch_size(settings.batch_size);
    if let Some(density) = settings.density {
        builder = builder.density(density);
    }
    Ok(builder.build().map_err(AnalysisError::from)?)
}

fn write_result(result: &RdfResult, output: Option<&Path>) -> Result<()> {
    let mut table = table_writer(output)?;
    for ((&r, &g), &count) in result.r.iter().zip(&result.g).zip(&result.counts) {
        table.serialize(RdfRow { r, g, count })?;
    }
    table.flush()?;
    Ok(())
}

pub fn run(args: RdfArgs, file_config: FileRdfConfig) -> Result<()> {
    let settings = rdf_settings(&args, file_config);
    let config = build_config(&args, &settings)?;
    info!(
        r_max = config.r_max,
        bins = config.bins,
        "Computing RDF for {:?}", &args.input
    );

    let mut trajectory = open_trajectory(&args.input)?;
    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let result = rdf::run(
        trajectory.as_mut(),
        &config,
        &CancellationToken::new(),
        &reporter,
    )?;

    write_result(&result, args.output.as_deref())?;
    if let Some(output) = &args.output {
        println!(
            "Wrote RDF over {} frame(s) to {}",
            result.frames,
            output.display()
        );
    }
    Ok(())
}
