use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use datakeep::app::{AddRequest, App, ConfigRequest, DownloadOptions};
use datakeep::catalog::{ArchiveSource, DatasetCatalog};
use datakeep::config::{CatalogLoader, Settings};
use datakeep::domain::{CacheField, DatasetName};
use datakeep::download::{Downloader, HttpDownloader};
use datakeep::error::DatakeepError;
use datakeep::output::{JsonOutput, OutputMode, TextOutput};
use datakeep::process::{ManifestProcessor, Processor};

#[derive(Parser)]
#[command(name = "datakeep")]
#[command(about = "Download, process and keep track of datasets in a local cache")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Extra dataset descriptors to add to the built-in catalog.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Download a dataset's archives and register it in the cache")]
    Download(DownloadArgs),
    #[command(about = "Process a downloaded dataset for a task")]
    Process(ProcessArgs),
    #[command(about = "Resolve a dataset task, downloading and processing it if needed")]
    Load(LoadArgs),
    #[command(about = "Register a custom dataset task file")]
    Add(AddArgs),
    #[command(about = "Remove a dataset or one of its tasks from the cache")]
    Remove(RemoveArgs),
    #[command(about = "Show or change cache settings")]
    Config(ConfigArgs),
    #[command(about = "Search datasets, tasks and categories by regex")]
    Query(QueryArgs),
    #[command(about = "List datasets in the cache")]
    List,
    #[command(about = "Show a cached dataset")]
    Info(InfoArgs),
    #[command(about = "List datasets that can be downloaded")]
    Available,
}

#[derive(Args)]
struct DownloadArgs {
    name: String,

    #[arg(long)]
    data_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    no_extract: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args)]
struct ProcessArgs {
    name: String,

    #[arg(long)]
    task: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args)]
struct LoadArgs {
    name: String,

    #[arg(long)]
    task: Option<String>,

    #[arg(long)]
    data_dir: Option<Utf8PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args)]
struct AddArgs {
    name: String,

    #[arg(long)]
    task: String,

    #[arg(long)]
    data_dir: Utf8PathBuf,

    #[arg(long = "file")]
    file_path: Utf8PathBuf,

    #[arg(long = "keyword")]
    keywords: Vec<String>,
}

#[derive(Args)]
struct RemoveArgs {
    name: String,

    #[arg(long)]
    task: Option<String>,

    #[arg(long)]
    delete_data: bool,
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, value_enum)]
    field: Option<CacheField>,

    #[arg(long, requires = "field")]
    value: Option<Utf8PathBuf>,

    #[arg(long, conflicts_with_all = ["field", "reset_cache"])]
    delete_cache: bool,

    #[arg(long)]
    reset_cache: bool,
}

#[derive(Args)]
struct QueryArgs {
    pattern: String,
}

#[derive(Args)]
struct InfoArgs {
    name: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<DatakeepError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DatakeepError) -> u8 {
    match error {
        err if err.is_not_found() => 2,
        DatakeepError::Http(_) | DatakeepError::HttpStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let settings = Settings::new()?;
    let catalog = build_catalog(cli.catalog.as_deref())?;

    match cli.command {
        Command::Download(args) => {
            let app = App::new(settings, catalog, HttpDownloader::new()?, ManifestProcessor);
            run_download(args, app, output_mode)
        }
        Command::Load(args) => {
            let app = App::new(settings, catalog, HttpDownloader::new()?, ManifestProcessor);
            run_load(args, app, output_mode)
        }
        command => {
            let app = App::new(settings, catalog, NopDownloader, ManifestProcessor);
            run_local(command, app, output_mode)
        }
    }
}

fn build_catalog(path: Option<&std::path::Path>) -> Result<DatasetCatalog, DatakeepError> {
    let mut catalog = DatasetCatalog::builtin();
    if let Some(path) = path {
        for descriptor in CatalogLoader::resolve(path)? {
            catalog.register(descriptor)?;
        }
    }
    Ok(catalog)
}

fn parse_name(value: &str) -> miette::Result<DatasetName> {
    Ok(value.parse::<DatasetName>()?)
}

fn run_download<D: Downloader, P: Processor>(
    args: DownloadArgs,
    app: App<D, P>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let name = parse_name(&args.name)?;
    let options = DownloadOptions {
        data_dir: args.data_dir,
        extract: !args.no_extract,
    };
    match output_mode {
        OutputMode::Json => {
            let result = app.download(name.as_str(), options, &JsonOutput)?;
            JsonOutput::print(&result).into_diagnostic()
        }
        OutputMode::Text => {
            let sink = TextOutput {
                verbose: args.verbose,
            };
            let result = app.download(name.as_str(), options, &sink)?;
            TextOutput::print_download(&result);
            Ok(())
        }
    }
}

fn run_load<D: Downloader, P: Processor>(
    args: LoadArgs,
    app: App<D, P>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let name = parse_name(&args.name)?;
    let sink = TextOutput {
        verbose: args.verbose && output_mode == OutputMode::Text,
    };
    let loader = app.load(name.as_str(), args.task.as_deref(), args.data_dir, &sink)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print(&loader).into_diagnostic(),
        OutputMode::Text => {
            TextOutput::print_load(&loader);
            Ok(())
        }
    }
}

fn run_local<D: Downloader, P: Processor>(
    command: Command,
    app: App<D, P>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let json = output_mode == OutputMode::Json;
    match command {
        Command::Process(args) => {
            let name = parse_name(&args.name)?;
            let sink = TextOutput {
                verbose: args.verbose && !json,
            };
            let result = app.process(name.as_str(), args.task.as_deref(), &sink)?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                TextOutput::print_process(&result);
            }
        }
        Command::Add(args) => {
            let result = app.add(AddRequest {
                name: args.name,
                task: args.task,
                data_dir: args.data_dir,
                file_path: args.file_path,
                keywords: args.keywords,
            })?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                TextOutput::print_entry(&result);
            }
        }
        Command::Remove(args) => {
            let result = app.remove(&args.name, args.task.as_deref(), args.delete_data)?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                TextOutput::print_remove(&result);
            }
        }
        Command::Config(args) => {
            let result = app.config_cache(ConfigRequest {
                field: args.field,
                value: args.value,
                delete_cache: args.delete_cache,
                reset_cache: args.reset_cache,
            })?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                TextOutput::print_config(&result);
            }
        }
        Command::Query(args) => {
            let result = app.query(&args.pattern)?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                TextOutput::print_query(&result);
            }
        }
        Command::List => {
            let result = app.list()?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                TextOutput::print_list(&result);
            }
        }
        Command::Info(args) => {
            let result = app.info(&args.name)?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                TextOutput::print_entry(&result);
            }
        }
        Command::Available => {
            let result = app.available()?;
            if json {
                JsonOutput::print(&result).into_diagnostic()?;
            } else {
                TextOutput::print_available(&result);
            }
        }
        Command::Download(_) | Command::Load(_) => {
            return Err(miette::Report::msg("command requires network access"));
        }
    }
    Ok(())
}

struct NopDownloader;

impl Downloader for NopDownloader {
    fn fetch(
        &self,
        source: &ArchiveSource,
        _destination: &std::path::Path,
    ) -> Result<(), DatakeepError> {
        Err(DatakeepError::Http(format!(
            "downloader not configured for {}",
            source.url
        )))
    }
}
