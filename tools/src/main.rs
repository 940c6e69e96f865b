use std::path::PathBuf;

use asset_cache::{
    discover_packages, AssetKind, AssetPipeline, IngestConfig, IngestError, IngestReport,
    PackageStream,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_CONFIG: i32 = 10;
const EXIT_INGEST: i32 = 11;

#[derive(Parser)]
#[command(name = "tools", version, about = "pk3 asset cache tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion pass and print the report.
    Ingest(SourceArgs),
    /// Print the package processing order of every source directory.
    Packages(SourceArgs),
    /// Print the merged entry sequence without converting anything.
    Stream(SourceArgs),
    /// Run one ingestion pass and list the names of one asset kind.
    List {
        #[arg(value_enum)]
        kind: KindArg,
        #[command(flatten)]
        sources: SourceArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long = "source", value_name = "DIR")]
    sources: Vec<PathBuf>,

    #[arg(long, value_name = "DIR")]
    cache: Option<PathBuf>,

    #[arg(long)]
    no_dedup: bool,
}

#[derive(ValueEnum, Clone, Copy)]
enum KindArg {
    Maps,
    Textures,
    Levelshots,
    Shaders,
}

impl KindArg {
    fn kind(self) -> AssetKind {
        match self {
            KindArg::Maps => AssetKind::Map,
            KindArg::Textures => AssetKind::Texture,
            KindArg::Levelshots => AssetKind::Levelshot,
            KindArg::Shaders => AssetKind::Shader,
        }
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Ingest(args) => run_ingest(&args),
        Commands::Packages(args) => run_packages(&args),
        Commands::Stream(args) => run_stream(&args),
        Commands::List { kind, sources } => run_list(kind.kind(), &sources),
    };
    std::process::exit(exit_code);
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(args: &SourceArgs, need_cache: bool) -> Result<IngestConfig, i32> {
    let mut config = match &args.config {
        Some(path) => {
            if !args.sources.is_empty() || args.cache.is_some() {
                eprintln!("--config cannot be combined with --source or --cache");
                return Err(EXIT_USAGE);
            }
            match IngestConfig::load(path) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("config load failed: {}", err);
                    return Err(EXIT_CONFIG);
                }
            }
        }
        None => {
            if args.sources.is_empty() {
                eprintln!("either --config or at least one --source is required");
                return Err(EXIT_USAGE);
            }
            let cache = match (&args.cache, need_cache) {
                (Some(cache), _) => cache.clone(),
                (None, false) => PathBuf::from("cache"),
                (None, true) => {
                    eprintln!("--cache is required without --config");
                    return Err(EXIT_USAGE);
                }
            };
            IngestConfig::new(args.sources.clone(), cache)
        }
    };
    if args.no_dedup {
        config.dedup = false;
    }
    match config.check() {
        Ok(warnings) => {
            for warning in warnings {
                warn!("{}", warning);
            }
            Ok(config)
        }
        Err(err) => {
            eprintln!("{}", err);
            Err(EXIT_CONFIG)
        }
    }
}

fn run_ingest(args: &SourceArgs) -> i32 {
    let config = match resolve_config(args, true) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let mut pipeline = AssetPipeline::new(config);
    match pipeline.run() {
        Ok(report) => {
            print_report(&report);
            EXIT_SUCCESS
        }
        Err(err) => ingest_failed(&err),
    }
}

fn run_packages(args: &SourceArgs) -> i32 {
    let config = match resolve_config(args, false) {
        Ok(config) => config,
        Err(code) => return code,
    };
    for dir in &config.sources {
        println!("{}:", dir.display());
        match discover_packages(dir) {
            Ok(packages) => {
                for package in packages {
                    println!("  {}", package.file_name);
                }
            }
            Err(err) => return ingest_failed(&err),
        }
    }
    EXIT_SUCCESS
}

fn run_stream(args: &SourceArgs) -> i32 {
    let config = match resolve_config(args, false) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let mut stream = PackageStream::new(config.sources.iter().cloned(), config.dedup);
    let result = stream.for_each(|entry| {
        println!("{} {}", entry.package().path().display(), entry.path());
        Ok(())
    });
    match result {
        Ok(stats) => {
            eprintln!(
                "{} entries from {} packages ({} duplicates suppressed)",
                stats.emitted, stats.packages, stats.duplicates
            );
            EXIT_SUCCESS
        }
        Err(err) => ingest_failed(&err),
    }
}

fn run_list(kind: AssetKind, args: &SourceArgs) -> i32 {
    let config = match resolve_config(args, true) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let mut pipeline = AssetPipeline::new(config);
    if let Err(err) = pipeline.run() {
        return ingest_failed(&err);
    }
    match pipeline.index().names(kind) {
        Ok(names) => {
            for name in names {
                println!("{}", name);
            }
            EXIT_SUCCESS
        }
        Err(err) => ingest_failed(&err),
    }
}

fn print_report(report: &IngestReport) {
    println!(
        "packages: {}  entries: {}  duplicates: {}  ignored: {}",
        report.packages, report.entries, report.duplicates, report.ignored
    );
    for kind in AssetKind::ALL {
        println!("{:>10}: {}", kind, report.routed(kind));
    }
    println!("shader definitions: {}", report.shader_definitions);
    println!(
        "cache hits: {}  conversions: {}",
        report.cache_hits, report.conversions
    );
}

fn ingest_failed(err: &IngestError) -> i32 {
    eprintln!("ingestion failed: {}", err);
    EXIT_INGEST
}
