use chrono::{Days, NaiveDate, Utc};
use clap::{ArgAction, ArgGroup, Parser, Subcommand, ValueEnum};
use forge_blobstore::{BlobStore, FsBlobStore, OrchestrationInstance, parse_day_segment, parse_key};
use forge_claimcheck::{
    BlobHelper, ClaimCheckConfig, Envelope, MessageContext, MessageConverter,
    RuntimeStateConverter,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "forge-claimcheck")]
#[command(about = "Operator commands for a filesystem claim-check blob store")]
struct Cli {
    /// Directory holding the store's containers.
    #[arg(long, global = true, default_value = ".forge-claimcheck")]
    root: PathBuf,
    /// Hub prefix for container names.
    #[arg(long, global = true, default_value = "claimcheck")]
    hub: String,
    /// JSON config file; `FORGE_CLAIMCHECK_*` variables still override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Put(PutArgs),
    Get(GetArgs),
    Purge(PurgeArgs),
    Clear,
    InspectKey(InspectKeyArgs),
    InspectState(InspectStateArgs),
    ShowConfig,
}

#[derive(clap::Args, Debug)]
struct PutArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, value_enum, default_value_t = PutKind::Message)]
    kind: PutKind,
    #[arg(long)]
    instance_id: Option<String>,
    #[arg(long)]
    execution_id: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PutKind {
    Blob,
    Message,
}

#[derive(clap::Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["key", "envelope"])))]
struct GetArgs {
    /// Storage key to read raw bytes from.
    #[arg(long)]
    key: Option<String>,
    /// Envelope JSON as printed by `put`.
    #[arg(long)]
    envelope: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
#[command(group(ArgGroup::new("threshold").required(true).args(["before", "retain_days"])))]
struct PurgeArgs {
    /// Delete containers dated strictly before this `yyyymmdd` day.
    #[arg(long)]
    before: Option<String>,
    /// Keep today plus this many previous days.
    #[arg(long)]
    retain_days: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct InspectKeyArgs {
    key: String,
}

#[derive(clap::Args, Debug)]
struct InspectStateArgs {
    #[arg(long)]
    file: PathBuf,
    #[arg(long, default_value = "inspect")]
    session_id: String,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Put(ref args) => put_command(&cli, args).await,
        Commands::Get(ref args) => get_command(&cli, args).await,
        Commands::Purge(ref args) => purge_command(&cli, args).await,
        Commands::Clear => clear_command(&cli).await,
        Commands::InspectKey(ref args) => inspect_key_command(args),
        Commands::InspectState(ref args) => inspect_state_command(&cli, args).await,
        Commands::ShowConfig => show_config_command(&cli),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<ClaimCheckConfig, String> {
    let config = match cli.config.as_deref() {
        Some(path) => ClaimCheckConfig::from_json_path(path)
            .and_then(|config| config.with_overrides(|name| std::env::var(name).ok())),
        None => ClaimCheckConfig::from_env(),
    };
    config.map_err(|error| error.to_string())
}

fn open_store(cli: &Cli) -> Result<Arc<FsBlobStore>, String> {
    FsBlobStore::new(&cli.root, cli.hub.clone())
        .map(Arc::new)
        .map_err(|error| error.to_string())
}

async fn put_command(cli: &Cli, args: &PutArgs) -> Result<ExitCode, String> {
    let payload = read_file(&args.input)?;
    let store = open_store(cli)?;

    let json = match args.kind {
        PutKind::Blob => {
            let blob = BlobHelper::new(store)
                .save(&payload, None)
                .await
                .map_err(|error| error.to_string())?;
            tracing::info!(storage_key = %blob.storage_key, size = payload.len(), "blob stored");
            serde_json::to_string_pretty(&blob)
        }
        PutKind::Message => {
            let config = load_config(cli)?;
            let instance = match (&args.instance_id, &args.execution_id) {
                (None, None) => None,
                (instance_id, execution_id) => Some(OrchestrationInstance::new(
                    instance_id.clone().unwrap_or_default(),
                    execution_id.clone().unwrap_or_default(),
                )),
            };
            let context = MessageContext {
                instance,
                ..MessageContext::default()
            };
            let envelope = MessageConverter::from_config(&config)
                .with_store(store)
                .to_envelope(&payload, &context)
                .await
                .map_err(|error| error.to_string())?;
            tracing::info!(
                external = envelope.is_external(),
                compression = envelope.compression_type().unwrap_or("legacy"),
                body_len = envelope.body_len(),
                "message envelope written"
            );
            serde_json::to_string_pretty(&envelope)
        }
    }
    .map_err(|error| error.to_string())?;

    println!("{json}");
    Ok(ExitCode::SUCCESS)
}

async fn get_command(cli: &Cli, args: &GetArgs) -> Result<ExitCode, String> {
    let store = open_store(cli)?;
    let bytes = match (&args.key, &args.envelope) {
        (Some(key), None) => store.load(key).await.map_err(|error| error.to_string())?,
        (None, Some(path)) => {
            let envelope: Envelope = serde_json::from_slice(&read_file(path)?)
                .map_err(|error| format!("failed parsing envelope '{}': {error}", path.display()))?;
            let config = load_config(cli)?;
            MessageConverter::from_config(&config)
                .with_store(store)
                .from_envelope::<Vec<u8>>(&envelope)
                .await
                .map_err(|error| error.to_string())?
        }
        _ => return Err("provide exactly one of --key or --envelope".to_string()),
    };

    match args.output.as_deref() {
        Some(path) => std::fs::write(path, &bytes)
            .map_err(|error| format!("failed writing '{}': {error}", path.display()))?,
        None => std::io::stdout()
            .write_all(&bytes)
            .map_err(|error| error.to_string())?,
    }
    Ok(ExitCode::SUCCESS)
}

async fn purge_command(cli: &Cli, args: &PurgeArgs) -> Result<ExitCode, String> {
    let threshold = purge_threshold(args, Utc::now().date_naive())?;
    let purged = open_store(cli)?
        .purge_expired(threshold)
        .await
        .map_err(|error| error.to_string())?;
    tracing::info!(hub = %cli.hub, %threshold, purged, "purge finished");
    println!("threshold: {}", threshold.format("%Y%m%d"));
    println!("purged_containers: {purged}");
    Ok(ExitCode::SUCCESS)
}

fn purge_threshold(args: &PurgeArgs, today: NaiveDate) -> Result<NaiveDate, String> {
    match (&args.before, args.retain_days) {
        (Some(day), None) => {
            parse_day_segment(day).ok_or_else(|| format!("'{day}' is not a yyyymmdd date"))
        }
        (None, Some(days)) => today
            .checked_sub_days(Days::new(days))
            .ok_or_else(|| format!("--retain-days {days} is out of range")),
        _ => Err("provide exactly one of --before or --retain-days".to_string()),
    }
}

async fn clear_command(cli: &Cli) -> Result<ExitCode, String> {
    let deleted = open_store(cli)?
        .delete_all()
        .await
        .map_err(|error| error.to_string())?;
    tracing::info!(hub = %cli.hub, deleted, "cleared all containers");
    println!("deleted_containers: {deleted}");
    Ok(ExitCode::SUCCESS)
}

fn inspect_key_command(args: &InspectKeyArgs) -> Result<ExitCode, String> {
    let parsed = parse_key(&args.key).map_err(|error| error.to_string())?;
    println!("container_suffix: {}", parsed.container_suffix);
    println!("blob_name: {}", parsed.blob_name);
    println!(
        "kind: {}",
        parsed
            .kind()
            .map_or_else(|| "<unknown>".to_string(), |kind| kind.to_string())
    );
    println!(
        "day: {}",
        parsed
            .day()
            .map_or_else(|| "<unknown>".to_string(), |day| day.to_string())
    );
    Ok(ExitCode::SUCCESS)
}

async fn inspect_state_command(cli: &Cli, args: &InspectStateArgs) -> Result<ExitCode, String> {
    let bytes = read_file(&args.file)?;
    let config = load_config(cli)?;
    let converter = RuntimeStateConverter::from_config(&config).with_store(open_store(cli)?);

    let layer = converter
        .decode_layer(&bytes, &args.session_id)
        .map_err(|error| error.to_string())?;
    let state = converter
        .decode(&bytes, &args.session_id)
        .await
        .map_err(|error| error.to_string())?;

    if args.json {
        let json = serde_json::to_string_pretty(&state.events).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(ExitCode::SUCCESS);
    }
    match layer {
        Some(layer) => {
            println!("format: {}", layer.format);
            println!("compressed: {}", layer.compressed);
            println!(
                "storage_key: {}",
                layer.storage_key.as_deref().unwrap_or("<inline>")
            );
        }
        None => println!("format: <empty>"),
    }
    println!("events: {}", state.len());
    Ok(ExitCode::SUCCESS)
}

fn show_config_command(cli: &Cli) -> Result<ExitCode, String> {
    let config = load_config(cli)?;
    let json = serde_json::to_string_pretty(&config).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(ExitCode::SUCCESS)
}

fn read_file(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|error| format!("failed reading '{}': {error}", path.display()))
}
