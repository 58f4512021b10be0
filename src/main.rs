use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use gaia_xp_dl::{BatchSummary, Config, Error, ExportStyle, Result, SamplingSpec, XpRetriever};
use tracing_subscriber::EnvFilter;

/// Retrieve calibrated Gaia XP spectra for every source in a CSV file
#[derive(Parser, Debug)]
#[command(name = "gaia-xp-dl", version, about)]
struct Cli {
    /// Input CSV file with a column of Gaia DR3 source identifiers
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Wavelength sampling: FUNCTION START STOP PARAM (linspace or arange, nm)
    #[arg(
        short = 's',
        long = "sampling",
        num_args = 4,
        value_names = ["FUNCTION", "START", "STOP", "PARAM"],
        allow_negative_numbers = true
    )]
    sampling: Option<Vec<String>>,

    /// Truncate the basis function set
    #[arg(short = 't', long = "truncate")]
    truncate: bool,

    /// Also write one file per object
    #[arg(short = 'o', long = "output", value_enum)]
    output: Option<OutputStyle>,

    /// Column holding the source identifiers
    #[arg(short = 'i', long = "id-column")]
    id_column: Option<String>,

    /// Column used to name per-object files (defaults to the identifier column)
    #[arg(short = 'n', long = "name-column")]
    name_column: Option<String>,

    /// Report progress and absorbed batch failures
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Calibration service endpoint
    #[arg(long, env = "XP_ENDPOINT")]
    endpoint: Option<String>,

    /// Archive username
    #[arg(long, env = "XP_USERNAME")]
    username: Option<String>,

    /// Archive password
    #[arg(long, env = "XP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// JSON configuration file; command line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker count used for chunk sizing
    #[arg(long)]
    workers: Option<usize>,

    /// Comma separated batch granularities, coarsest first
    #[arg(long, value_delimiter = ',')]
    granularities: Option<Vec<usize>>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputStyle {
    /// Three-column table
    #[value(alias = "fits")]
    Table,
    /// Whitespace separated text
    #[value(alias = "txt")]
    Text,
}

impl From<OutputStyle> for ExportStyle {
    fn from(style: OutputStyle) -> Self {
        match style {
            OutputStyle::Table => ExportStyle::Table,
            OutputStyle::Text => ExportStyle::Text,
        }
    }
}

impl Cli {
    fn into_config(self) -> Result<(PathBuf, Config)> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(args) = &self.sampling {
            config.fetch.sampling = Some(SamplingSpec::from_args(args.as_slice())?);
        }
        if self.truncate {
            config.fetch.truncate = true;
        }
        if let Some(style) = self.output {
            config.export.style = style.into();
        }
        if let Some(id_column) = self.id_column {
            config.input.id_column = id_column;
        }
        if self.name_column.is_some() {
            config.input.name_column = self.name_column;
        }
        if self.endpoint.is_some() {
            config.fetch.endpoint = self.endpoint;
        }
        if self.username.is_some() {
            config.fetch.username = self.username;
        }
        if self.password.is_some() {
            config.fetch.password = self.password;
        }
        if self.workers.is_some() {
            config.dispatch.workers = self.workers;
        }
        if let Some(granularities) = self.granularities {
            config.retry.granularities = granularities;
        }
        config.verbose |= self.verbose;

        Ok((self.file, config))
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "gaia_xp_dl=info" } else { "gaia_xp_dl=error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Lines printed after a successful run; quiet runs only list the files written
fn summary_lines(summary: &BatchSummary, verbose: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if verbose {
        lines.push(format!(
            "Retrieved {} of {} sources",
            summary.resolved, summary.requested
        ));
    }
    lines.push(format!("Saved {}", summary.saved.paths.full.display()));
    lines.push(format!("Saved {}", summary.saved.paths.cut.display()));
    if !summary.saved.object_files.is_empty() {
        lines.push(format!(
            "Saved {} spectra to {}",
            summary.saved.object_files.len(),
            summary.saved.paths.spectra_dir.display()
        ));
    }
    lines
}

async fn run(file: PathBuf, config: Config) -> Result<()> {
    let verbose = config.verbose;
    let retriever = XpRetriever::new(config)?;
    let summary = retriever.run_batch(&file).await?;

    for line in summary_lines(&summary, verbose) {
        println!("{line}");
    }
    Ok(())
}

fn report(error: &Error) -> ExitCode {
    tracing::error!(code = error.error_code(), "{error}");
    eprintln!("error: {error}");
    ExitCode::from(error.exit_code())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let cli_verbose = cli.verbose;
    let parsed = cli.into_config();
    init_tracing(parsed.as_ref().map_or(cli_verbose, |(_, config)| config.verbose));

    let (file, config) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return report(&e),
    };

    match run(file, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}
