use std::{env, fs};

use anyhow::{Context, Result};

use activities::{
    config::AppConfig,
    db,
    jobs::RolloutPrison,
    regime::{parse_regime_import, PrisonRegime, RegimeRegistry},
    store::{ActivityStore, PgStore},
};

const USAGE: &str = "Usage: maintenance import-regime <file.json> | enable-prison <CODE>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let mut args = env::args().skip(1);
    match (args.next().as_deref(), args.next()) {
        (Some("import-regime"), Some(path)) => import_regime(&path).await?,
        (Some("enable-prison"), Some(code)) => enable_prison(&code).await?,
        (Some(cmd), _) => {
            eprintln!("Unknown command or missing argument: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        (None, _) => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn connect() -> Result<PgStore> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded activities configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    Ok(PgStore::new(pool))
}

async fn import_regime(path: &str) -> Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let rows = parse_regime_import(&raw)?;
    // Validate the whole document before touching the database.
    RegimeRegistry::from_rows(rows.clone())?;

    let mut by_prison: std::collections::BTreeMap<String, Vec<PrisonRegime>> = Default::default();
    for row in rows {
        by_prison.entry(row.prison_code.clone()).or_default().push(row);
    }

    let store = connect().await?;
    for (prison_code, regime) in &by_prison {
        store
            .replace_regime(prison_code, regime)
            .await
            .with_context(|| format!("failed to replace regime for {prison_code}"))?;
        println!("Imported {} regime days for {prison_code}.", regime.len());
    }
    Ok(())
}

async fn enable_prison(code: &str) -> Result<()> {
    let prison_code = code.trim().to_uppercase();
    anyhow::ensure!(!prison_code.is_empty(), "prison code must not be empty");

    let store = connect().await?;
    let appointments_enabled = store
        .rollout_prisons()
        .await?
        .into_iter()
        .any(|prison| prison.prison_code == prison_code && prison.appointments_enabled);
    store
        .save_rollout_prison(&RolloutPrison {
            prison_code: prison_code.clone(),
            activities_enabled: true,
            appointments_enabled,
        })
        .await
        .context("failed to save rollout prison")?;
    println!("Activities enabled for {prison_code}.");
    Ok(())
}
