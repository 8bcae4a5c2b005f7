use comboledger::datasource::CsvPositionSource;
use comboledger::{config::Config, db::init_db, ComboSync, Reconciler, Repository, TimeMs};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match init_db(&config.store).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config, Arc::new(Repository::new(pool))).await {
        eprintln!("Run failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: &Config, repo: Arc<Repository>) -> anyhow::Result<()> {
    let source = CsvPositionSource::new(
        config.positions_csv.as_ref().map(PathBuf::from),
        config.executions_csv.as_ref().map(PathBuf::from),
    );

    if config.positions_csv.is_some() {
        let sync = ComboSync::from_config(repo.clone(), config);
        let report = sync.run_from_source(&source, TimeMs::now()).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if config.executions_csv.is_some() {
        let reconciler = Reconciler::from_config(config);
        let report = reconciler.run_from_source(&source, &repo).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    tracing::info!("comboledger run finished");
    Ok(())
}
