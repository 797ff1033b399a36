use std::num::NonZeroUsize;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use smap_stream::config::{self, DEFAULT_URL};
use smap_stream::{
    Client, ClientConfig, CsvSink, DownloadParams, Ingester, JsonLinesSink, Result, Sink, TextSink,
};

#[derive(Parser)]
#[command(name = "datarepoman", version, about = "Download data from and load data into sMAP archivers")]
struct Cli {
    /// Query endpoint of the archiver
    #[arg(long, visible_alias = "url", default_value = DEFAULT_URL, env = "DATAREPOMAN_URL", global = true)]
    address: String,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, visible_alias = "debuglevel", default_value = "debug", global = true)]
    level: String,

    /// Request timeout in Go duration syntax ("30s", "1h30m"); 0 means none
    #[arg(long, short = 'w', default_value = "0", global = true)]
    timeout: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download readings into local files
    #[command(visible_alias = "dl")]
    Download(DownloadArgs),
    /// Download metadata documents into a JSON file
    Metadata(MetadataArgs),
    /// Load metadata and readings into the archiver
    Ingest(IngestArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// Comma separated list of UUIDs to download
    #[arg(long, default_value = "")]
    uuids: String,

    /// Download every stream on the archiver; overrides --uuids
    #[arg(long, short = 'a')]
    all: bool,

    /// Metadata predicate selecting the streams to download
    #[arg(long = "where")]
    filter: Option<String>,

    /// Start of the range: epoch seconds, RFC3339 or YYYY-MM-DD
    #[arg(long, short = 'f', default_value = "0")]
    from: String,

    /// End of the range; defaults to now
    #[arg(long, short = 't')]
    to: Option<String>,

    /// How many UUIDs to fetch per query
    #[arg(long, visible_alias = "uuidchunk", default_value = "10")]
    chunk: NonZeroUsize,

    /// Talk to the sMAP Python archiver 2.0 (millisecond ranges)
    #[arg(long)]
    legacy: bool,

    /// CSV output file
    #[arg(long, default_value = "out.csv")]
    csv: PathBuf,

    /// Also write rows as JSON lines to this file
    #[arg(long)]
    json: Option<PathBuf>,

    /// Also print rows to stdout
    #[arg(long)]
    stdout: bool,
}

#[derive(Args)]
struct MetadataArgs {
    /// Metadata predicate selecting the documents
    #[arg(long = "where", default_value = "has uuid")]
    filter: String,

    /// Output file
    #[arg(long, default_value = "metadata.json")]
    out: PathBuf,
}

#[derive(Args)]
struct IngestArgs {
    /// JSON file to load metadata from
    #[arg(long, visible_alias = "md", default_value = "metadata.json")]
    metadata: PathBuf,

    /// CSV file of data: uuid,time,value
    #[arg(long, default_value = "out.csv")]
    datafile: PathBuf,

    /// Readings per stream per upload
    #[arg(long, default_value = "1000")]
    batch: NonZeroUsize,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let directive = config::level_directive(&cli.level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| directive.unwrap_or("info").into()),
        )
        .init();
    if directive.is_none() {
        warn!("Could not parse log level '{}', using info", cli.level);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::new(&cli.address)?.with_timeout(config::parse_timeout(&cli.timeout)?);
    let client = Client::new(&config)?;
    client.connect().await?;

    match cli.command {
        Command::Download(args) => download(&client, args).await,
        Command::Metadata(args) => {
            client.export_metadata(&args.filter, &args.out).await?;
            Ok(())
        }
        Command::Ingest(args) => {
            let mut ingester = Ingester::new(&client).with_batch_size(args.batch);
            info!("Loading metadata");
            ingester.load_metadata_file(&args.metadata).await?;
            info!("Loading timeseries data");
            ingester.load_data_file(&args.datafile).await?;
            Ok(())
        }
    }
}

async fn download(client: &Client, args: DownloadArgs) -> Result<()> {
    let start = config::parse_time(&args.from)?;
    let end = match &args.to {
        Some(to) => config::parse_time(to)?,
        None => Utc::now(),
    };

    let mut params = DownloadParams::new(start, end)
        .with_uuids(config::parse_uuids(&args.uuids))
        .with_chunk_size(args.chunk)
        .with_all(args.all)
        .with_legacy(args.legacy);
    if let Some(filter) = args.filter {
        params = params.with_filter(filter);
    }

    let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(CsvSink::create(&args.csv).await?)];
    if let Some(path) = &args.json {
        sinks.push(Box::new(JsonLinesSink::create(path).await?));
    }
    if args.stdout {
        sinks.push(Box::new(TextSink::stdout()));
    }

    client.download(params, &mut sinks).await?;
    Ok(())
}
