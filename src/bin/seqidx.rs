use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use seqidx::algorithm::{Algorithm, AlgorithmKind, SystemToolRunner};
use seqidx::app::{IndexRequest, LogSink, Pipeline};
use seqidx::config::{ConfigLoader, Settings};
use seqidx::domain::{Protocol, Provider, SeqType, Species};
use seqidx::error::SeqidxError;
use seqidx::fetch::Downloader;
use seqidx::mirbase::{self, MirnaRequest};
use seqidx::output::{self, JsonOutput, OutputMode};
use seqidx::remote::NetFetcher;

const SPECIES_HELP: &str = "\
Species:
  hs -> Human (Homo sapiens)
  mm -> Mouse (Mus musculus)
  rn -> Rat (Rattus norvegicus) (Ensembl only)
  dr -> Zebrafish (Danio rerio) (Ensembl only)
  dm -> Fruitfly (Drosophila melanogaster) (Ensembl only)

Releases:
  gencode: hs 30, mm M22
  ensembl: 96, 97 for every species

Examples:
  seqidx index
    Gencode human release 30, RNA-seq indices (STAR + Salmon)
  seqidx index -a ensembl -r 96 -s dm
    Ensembl fruitfly release 96
  seqidx index -t chip -a ensembl -r 96 -s dm -d ensembl_dm_96
    ChIP-seq indices from files already under ensembl_dm_96";

#[derive(Parser)]
#[command(name = "seqidx")]
#[command(about = "Fetch reference annotation bundles and build sequencing indices")]
#[command(version, author)]
struct Cli {
    /// Print the run report as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ./seqidx.json, then the user config directory).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download an annotation bundle and build indices", after_help = SPECIES_HELP)]
    Index(IndexArgs),
    #[command(about = "Download miRBase mature sequences and split them per species")]
    Mirna(MirnaArgs),
}

#[derive(Args, Clone)]
struct FetchArgs {
    /// Simultaneous connections to the annotation server.
    #[arg(short = 'c', long)]
    connections: Option<usize>,

    /// Protocol used to reach the provider.
    #[arg(long)]
    transport: Option<Protocol>,

    /// Directory new bundles are created under.
    #[arg(long)]
    output_root: Option<Utf8PathBuf>,
}

#[derive(Args, Clone)]
struct IndexArgs {
    /// Sequencing type; picks the default indexers.
    #[arg(short = 't', long = "type", value_enum, default_value = "rna")]
    seq_type: SeqType,

    /// Annotation source.
    #[arg(short = 'a', long = "source", value_enum, default_value = "gencode")]
    provider: Provider,

    #[arg(short = 's', long, default_value = "hs")]
    species: String,

    /// Provider release, e.g. "30" or "M22" for Gencode, "96" for Ensembl.
    #[arg(short = 'r', long = "release", default_value = "30")]
    version: String,

    /// Directory that already holds the decompressed annotation files; skips downloading.
    #[arg(short = 'd', long = "dir")]
    existing_dir: Option<Utf8PathBuf>,

    /// Indexers to build instead of the sequencing type's defaults.
    #[arg(long = "algorithm", value_enum, value_delimiter = ',')]
    algorithms: Vec<AlgorithmKind>,

    #[arg(long)]
    star_threads: Option<u32>,

    /// STAR --genomeSAindexNbases; lower it for small genomes.
    #[arg(long)]
    star_sa_index_nbases: Option<u32>,

    #[command(flatten)]
    fetch: FetchArgs,
}

#[derive(Args, Clone)]
struct MirnaArgs {
    /// Species code, or "all".
    #[arg(short = 's', long, default_value = "all")]
    species: String,

    /// miRBase release ("21" or "22").
    #[arg(short = 'r', long = "release", default_value = "21")]
    release: String,

    #[command(flatten)]
    fetch: FetchArgs,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SeqidxError>() {
            return ExitCode::from(err.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let settings = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Index(args) => run_index(args, settings, output_mode),
        Commands::Mirna(args) => run_mirna(args, settings, output_mode),
    }
}

fn apply_fetch_args(mut settings: Settings, args: &FetchArgs) -> Result<Settings, SeqidxError> {
    if let Some(connections) = args.connections {
        if connections == 0 {
            return Err(SeqidxError::InvalidArgument(
                "--connections must be at least 1".to_string(),
            ));
        }
        settings.connections = connections;
    }
    if let Some(transport) = args.transport {
        settings.transport = transport;
    }
    if let Some(root) = &args.output_root {
        settings.output_root = root.clone();
    }
    Ok(settings)
}

fn run_index(args: IndexArgs, settings: Settings, output_mode: OutputMode) -> miette::Result<()> {
    let mut settings = apply_fetch_args(settings, &args.fetch)?;
    if let Some(threads) = args.star_threads {
        settings.star.threads = threads;
    }
    if let Some(nbases) = args.star_sa_index_nbases {
        settings.star.sa_index_nbases = nbases;
    }

    if let Some(dir) = &args.existing_dir {
        if !dir.is_dir() {
            return Err(SeqidxError::InvalidArgument(format!(
                "-d must name an existing directory holding the annotation files: {dir}"
            ))
            .into());
        }
    }

    let algorithms = if args.algorithms.is_empty() {
        Algorithm::preset(args.seq_type, settings.star)
    } else {
        args.algorithms
            .iter()
            .map(|kind| Algorithm::from_kind(*kind, settings.star))
            .collect()
    };

    let request = IndexRequest {
        provider: args.provider,
        species: args.species,
        version: args.version,
        existing_base_dir: args.existing_dir,
        algorithms,
    };

    let fetcher = NetFetcher::new(settings.timeout)?;
    let pipeline = Pipeline::new(fetcher, SystemToolRunner, settings);
    let report = pipeline.run(&request, &LogSink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&report).into_diagnostic()?,
        OutputMode::Human => output::print_run_summary(&report),
    }
    Ok(())
}

fn run_mirna(args: MirnaArgs, settings: Settings, output_mode: OutputMode) -> miette::Result<()> {
    let settings = apply_fetch_args(settings, &args.fetch)?;
    let species = if args.species == "all" {
        Species::ALL.to_vec()
    } else {
        vec![args.species.parse::<Species>()?]
    };
    let request = MirnaRequest {
        release: args.release,
        species,
    };

    let downloader = Downloader::new(NetFetcher::new(settings.timeout)?, settings.connections);
    let report = mirbase::prepare(&downloader, &settings, &request)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_mirna(&report).into_diagnostic()?,
        OutputMode::Human => output::print_mirna_summary(&report),
    }
    Ok(())
}
