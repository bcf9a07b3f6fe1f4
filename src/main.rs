use datadog_importer::{
    logging, metrics, settings::Settings, ConfigMap, DatadogClient, DatadogImporter,
    ImporterError, Result, Row,
};
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "datadog-importer", version, about = "Import Datadog metrics as pipeline rows")]
struct Args {
    /// Invocation JSON file; stdin when absent
    input: Option<PathBuf>,
}

/// Document handed over by the pipeline: plugin config plus the input rows.
#[derive(Debug, Deserialize)]
struct Invocation {
    #[serde(default)]
    config: ConfigMap,
    #[serde(default)]
    inputs: Vec<Row>,
}

async fn read_invocation(input: Option<PathBuf>) -> Result<Invocation> {
    let raw = match input {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            buffer
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

async fn run(args: Args, settings: Settings) -> Result<()> {
    let invocation = read_invocation(args.input).await?;
    let client = DatadogClient::new(&settings)?;
    let importer = DatadogImporter::configure(&invocation.config, client)?;

    let metadata = DatadogImporter::<DatadogClient>::metadata();
    info!(
        kind = %metadata.kind,
        inputs = invocation.inputs.len(),
        "Running importer"
    );
    let outputs = importer.execute(&invocation.inputs).await?;

    println!("{}", serde_json::to_string_pretty(&outputs)?);

    if env::var("IMPORTER_PRINT_METRICS").is_ok() {
        eprintln!("{}", metrics::gather_text());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = logging::init_logger(&settings.log_level, settings.log_format) {
        eprintln!("{}", e);
    }

    if let Err(e) = run(args, settings).await {
        error!("{}", e);
        let code = match e {
            ImporterError::Config(_) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}
