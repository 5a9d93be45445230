use std::env;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wallet_eng::config::TRANSFER_TIMEOUT_ENV;
use wallet_eng::csv::{read_accounts, read_transfers, write_balances};
use wallet_eng::{Engine, EngineConfig, MemoryStore};

fn config_from_env() -> EngineConfig {
    let config = EngineConfig::default();
    let Ok(raw) = env::var(TRANSFER_TIMEOUT_ENV) else {
        return config;
    };
    match config.clone().with_timeout_millis(&raw) {
        Some(config) => config,
        None => {
            warn!(value = %raw, "ignoring invalid {TRANSFER_TIMEOUT_ENV}");
            config
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let (Some(accounts_path), Some(transfers_path)) = (args.next(), args.next()) else {
        eprintln!("usage: wallet-eng <accounts.csv> <transfers.csv>");
        return ExitCode::FAILURE;
    };

    let engine = Arc::new(Engine::with_config(MemoryStore::new(), config_from_env()));

    let accounts = match read_accounts(accounts_path) {
        Ok(accounts) => accounts,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    for result in accounts {
        match result {
            Ok(account) => {
                if let Err(e) = engine
                    .open_account_with_balance(account.owner, account.balance)
                    .await
                {
                    warn!(owner = %account.owner, "{e}");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    let transfers = match read_transfers(transfers_path) {
        Ok(transfers) => transfers,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (tx_sender, tx_receiver) = tokio::sync::mpsc::channel(16);
    let reader = tokio::spawn(async move {
        for result in transfers {
            match result {
                Ok(command) => {
                    if tx_sender.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    let summary = Arc::clone(&engine)
        .run(ReceiverStream::new(tx_receiver))
        .await;
    if let Err(e) = reader.await {
        error!(reason = %e, "transfer reader did not complete");
    }
    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        failed = summary.failed,
        "transfers processed"
    );

    let balances = engine.store().snapshot().await;
    if let Err(e) = write_balances(io::stdout().lock(), balances) {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
