use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zonebot::{
    browser::ChromeConnector,
    config::{port_from_env, LocalConfig, ScraperConfig},
    local::{OpenRouterExplainer, SqliteContextRetriever, SqliteParcelStore},
    resolve::ScrapeOutcome,
    server, ArtifactDir, BrowserbaseProvisioner, FallbackScraper, Identifier, NavigationDriver,
    Resolver,
};

#[derive(Parser, Debug)]
#[command(about = "Zoning lookup by assessor's parcel number")]
struct Cli {
    /// Directory for failure screenshots
    #[arg(long, global = true)]
    artifact_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a parcel: local store first, portal on a miss
    Lookup { apn: String },
    /// Scrape the portal only
    Scrape { apn: String },
    /// Serve `POST /` over HTTP
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,zonebot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Cli::parse();

    match args.command {
        Command::Scrape { apn } => {
            let identifier = Identifier::parse(&apn)?;
            let config = ScraperConfig::from_env(args.artifact_dir)?;
            config.require_credentials()?;
            let scraper = build_scraper(config)?;
            let outcome: ScrapeOutcome = scraper.scrape(&identifier).await.into();
            print_json(&outcome)?;
        }
        Command::Lookup { apn } => {
            let identifier = Identifier::parse(&apn)?;
            let (resolver, store) = build_resolver(args.artifact_dir).await?;
            let response = resolver.resolve(&identifier).await;
            store.pool().close().await;
            print_json(&response?)?;
        }
        Command::Serve { port } => {
            let port = match port {
                Some(p) => p,
                None => port_from_env()?,
            };
            let (resolver, store) = build_resolver(args.artifact_dir).await?;

            let addr = format!("0.0.0.0:{port}");
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .context("Failed to bind to address")?;
            tracing::info!("Listening on {}", addr);

            axum::serve(listener, server::router(Arc::new(resolver)))
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Shutting down");
                })
                .await
                .context("server error")?;
            store.pool().close().await;
        }
    }

    Ok(())
}

fn build_scraper(config: ScraperConfig) -> Result<FallbackScraper> {
    let provisioner =
        BrowserbaseProvisioner::new(config.broker_url, config.api_key, config.project_id)?;
    let driver = NavigationDriver::new(Arc::new(ChromeConnector::default()));
    Ok(FallbackScraper::new(
        Arc::new(provisioner),
        driver,
        ArtifactDir::new(config.artifact_dir),
    ))
}

async fn build_resolver(
    artifact_dir: Option<PathBuf>,
) -> Result<(Resolver, Arc<SqliteParcelStore>)> {
    let local = LocalConfig::from_env()?;
    let config = ScraperConfig::from_env(artifact_dir)?;
    if let Err(e) = config.require_credentials() {
        tracing::warn!("portal fallback unavailable: {e:#}");
    }
    let scraper = build_scraper(config)?;

    let store = Arc::new(
        SqliteParcelStore::connect(&local.database_url)
            .await
            .context("Failed to open parcel database")?,
    );
    let retriever = SqliteContextRetriever::new(store.pool().clone());
    let explainer = OpenRouterExplainer::new(
        local.openrouter_base_url,
        local.openrouter_api_key,
        local.model,
    )?;

    let resolver = Resolver::new(
        store.clone(),
        Arc::new(retriever),
        Arc::new(explainer),
        Arc::new(scraper),
    );
    Ok((resolver, store))
}

fn print_json<T: Serialize>(v: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}
