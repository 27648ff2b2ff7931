use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::Parser;
use petmux_pipeline::{
    list_acquisition_dirs, ChannelChooser, ConsoleProgressCallback, ExternalSegmenter, Pipeline, PipelineConfig,
    ProgressTracker, RunOptions,
};
use petmux_registration::{ExitPolicy, ProcessRunner, ToolRunner};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod chooser;
mod progress_bar;

use chooser::InteractiveChooser;
use progress_bar::BarProgressCallback;

#[derive(Parser, Debug)]
#[command(name = "petmux")]
#[command(version, about = "Align multi-tracer PET/CT acquisitions of one subject into a shared frame")]
struct Cli {
    /// Subject directory with one subdirectory per tracer acquisition
    #[arg(short = 'd', long = "subject-directory")]
    subject_directory: PathBuf,

    /// Regions left out of the registration guidance masks, or `none`
    #[arg(short = 'i', long = "ignore-regions", num_args = 1.., required = true)]
    ignore_regions: Vec<String>,

    /// Compose the aligned functional volumes into an RGB image
    #[arg(short = 'm', long)]
    multiplex: bool,

    /// Tracer colours, such as `FDG:red,PSMA:green` (asked interactively otherwise)
    #[arg(short = 'c', long = "colors")]
    colors: Option<String>,

    /// Write per-label agreement of every aligned mask with the reference
    #[arg(short = 'e', long)]
    evaluate: bool,

    /// Convert the aligned outputs back to DICOM
    #[arg(long)]
    dicom_export: bool,

    /// JSON file overriding the default configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Compute pool size
    #[arg(long)]
    workers: Option<usize>,

    /// Accept non-zero exit codes from external tools whose outputs exist
    #[arg(long)]
    tolerate_tool_errors: bool,

    /// Log progress instead of drawing progress bars
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if self.tolerate_tool_errors {
            config.registration.exit_policy = ExitPolicy::Tolerate;
        }
        Ok(config)
    }

    fn run_options(&self) -> Result<RunOptions> {
        let channel_map = match &self.colors {
            Some(text) => RunOptions::parse_channel_map(text)?,
            None => Vec::new(),
        };
        Ok(RunOptions {
            ignore_regions: self.ignore_regions.clone(),
            multiplex: self.multiplex,
            channel_map,
            dicom_export: self.dicom_export,
            evaluate: self.evaluate,
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline_config()?;
    let options = cli.run_options()?;
    let subject_dir = cli
        .subject_directory
        .canonicalize()
        .with_context(|| format!("Subject directory {} not found", cli.subject_directory.display()))?;

    info!(subject = %subject_dir.display(), "Starting petmux");
    info!(regions = ?options.ignore_regions, multiplex = options.multiplex, "Run options");

    let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner);
    let segmenter = ExternalSegmenter::new(runner.clone(), config.segmentation.clone())
        .with_exit_policy(config.registration.exit_policy);

    let progress = if cli.no_progress {
        ProgressTracker::new().with_callback(Arc::new(ConsoleProgressCallback))
    } else {
        ProgressTracker::new().with_callback(Arc::new(BarProgressCallback::new()))
    };

    let acquisition_dirs = list_acquisition_dirs(&subject_dir, &config.naming)?;
    info!(found = acquisition_dirs.len(), "Acquisition directories");

    let pipeline = Pipeline::<NdArray<f32>>::new(config, runner, Arc::new(segmenter), NdArrayDevice::Cpu)
        .with_progress(progress);

    let interactive = (options.multiplex && options.channel_map.is_empty())
        .then(|| InteractiveChooser::new(std::io::stdin().lock(), std::io::stdout()));
    let chooser = interactive.as_ref().map(|c| c as &dyn ChannelChooser);

    let report = pipeline
        .run(&subject_dir, &acquisition_dirs, &options, chooser)
        .context("Pipeline failed")?;

    info!(
        reference = %report.alignment.reference,
        registrations = report.alignment.registrations,
        fov_min = ?report.fov.bounding_box.min,
        fov_max = ?report.fov.bounding_box.max,
        "Alignment complete"
    );
    for dir in report.layout.aligned_dirs() {
        info!(output = %dir.display(), "Aligned outputs");
    }
    if let Some(evaluation) = &report.evaluation {
        info!(metrics = %evaluation.path.display(), "Label evaluation written");
    }
    if let Some(multiplex) = &report.multiplex {
        info!(composite = %multiplex.composite.display(), "Multiplexed composite written");
    }
    for dir in &report.dicom {
        info!(output = %dir.display(), "DICOM export written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "petmux", "-d", "/data/subject", "-i", "arms", "head", "-m", "-c", "FDG:red,PSMA:b", "--workers", "3", "-e",
        ])
        .unwrap();
        assert_eq!(cli.ignore_regions, vec!["arms", "head"]);

        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.registration.exit_policy, ExitPolicy::Strict);

        let options = cli.run_options().unwrap();
        assert!(options.multiplex);
        assert!(options.evaluate);
        assert_eq!(options.channel_map.len(), 2);
        assert!(options.validate(&config).is_ok());
    }

    #[test]
    fn test_regions_are_required() {
        assert!(Cli::try_parse_from(["petmux", "-d", "/data/subject"]).is_err());
    }

    #[test]
    fn test_none_sentinel() {
        let cli = Cli::try_parse_from(["petmux", "-d", "s", "-i", "none", "--tolerate-tool-errors"]).unwrap();
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.registration.exit_policy, ExitPolicy::Tolerate);
        let plan = cli.run_options().unwrap().validate(&config).unwrap();
        assert!(!plan.regions.is_ignored(3));
    }
}
