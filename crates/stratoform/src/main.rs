use anyhow::Context;
use clap::{Parser, Subcommand};
use stratoform::{Provider, ProviderConfig};

#[derive(Parser)]
#[command(name = "stratoform")]
#[command(about = "Stratus Cloud IaC provider plugin", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the registered resource schemas as JSON
    Schema,
    /// Validate a provider configuration file
    Validate {
        /// Path to a JSON configuration file
        config: std::path::PathBuf,
    },
    /// Check that credentials and region resolve to working endpoints
    Doctor,
    /// Print the provider version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Schema => {
            // Schema export needs no credentials
            let registry = stratoform::provider::build_registry()
                .context("registry validation failed")?;
            println!("{}", serde_json::to_string_pretty(&registry.describe())?);
        }
        Commands::Validate { config } => {
            let raw = std::fs::read_to_string(&config)
                .with_context(|| format!("cannot read {}", config.display()))?;
            let parsed: serde_json::Value = serde_json::from_str(&raw)?;
            ProviderConfig::from_json(&parsed).context("configuration is invalid")?;
            println!("{} is valid", config.display());
        }
        Commands::Doctor => {
            let config = ProviderConfig::from_env()
                .context("set STRATO_REGION and STRATO_TOKEN")?;
            let provider = Provider::new(config)?;
            let factory = provider.factory();
            // Resolving a client exercises endpoint construction without
            // touching the network
            let client = factory.client("iam", "v3", None);
            println!(
                "ok: {} resource types, iam endpoint {}",
                provider.engine().registry().len(),
                client.base_url()
            );
        }
        Commands::Version => {
            println!("stratoform {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
