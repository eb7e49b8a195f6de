//! Wiring shared by the stateful commands: config, persisted ledger and the
//! file-backed driver.
//!
//! An open [`App`] holds an exclusive lock on the data directory, so separate
//! processes working on the same directory run one after another and never
//! overwrite each other's ledger.

use anyhow::{Context, Result};
use escrowflow_ledger::{InMemoryLedger, LedgerSnapshot, LedgerState};
use escrowflow_negotiation::{EscrowConfig, NegotiationDriver, NegotiationResources};
use escrowflow_runtime::JsonFileCheckpointStore;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct App {
    pub config: EscrowConfig,
    pub ledger: Arc<InMemoryLedger>,
    pub driver: NegotiationDriver,
    // Released when the file closes on drop.
    _lock: File,
}

impl App {
    /// Lock the data directory, waiting for any other holder, then load the
    /// ledger and checkpoints.
    pub async fn open(config: EscrowConfig) -> Result<Self> {
        let data_dir = &config.storage.data_dir;
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
        let lock = lock_data_dir(config.lock_path()).await?;

        let ledger = Arc::new(load_ledger(&config.ledger_path(), config.opening_balances()).await?);
        let store = JsonFileCheckpointStore::open(config.checkpoint_dir())
            .await
            .context("Failed to open checkpoint store")?;
        let reasoner = config.reasoner().context("Failed to build reasoner")?;

        let resources = NegotiationResources::new(ledger.clone(), reasoner)
            .with_policy(config.policy())
            .with_upfront_bps(config.escrow.upfront_bps);
        let driver = NegotiationDriver::new(resources, Arc::new(store))
            .context("Negotiation graph is invalid")?;

        Ok(Self {
            config,
            ledger,
            driver,
            _lock: lock,
        })
    }

    /// Write the ledger back to `ledger.json`. Called after every command
    /// that may have moved money, including failed ones.
    pub async fn save_ledger(&self) -> Result<()> {
        let path = self.config.ledger_path();
        let body = serde_json::to_vec_pretty(&self.ledger.export())
            .context("Failed to serialize ledger")?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Ledger saved");
        Ok(())
    }
}

async fn lock_data_dir(path: PathBuf) -> Result<File> {
    tokio::task::spawn_blocking(move || -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;
        if file.try_lock_exclusive().is_err() {
            tracing::info!(path = %path.display(), "Data dir in use, waiting for lock");
            file.lock_exclusive()
                .with_context(|| format!("Failed to lock {}", path.display()))?;
        }
        tracing::debug!(path = %path.display(), "Data dir locked");
        Ok(file)
    })
    .await
    .context("Lock task panicked")?
}

async fn load_ledger(path: &Path, opening: LedgerSnapshot) -> Result<InMemoryLedger> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let state: LedgerState = serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt ledger file {}", path.display()))?;
            Ok(InMemoryLedger::from_state(state))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No ledger yet, using opening balances");
            Ok(InMemoryLedger::with_balances(opening))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrowflow_ledger::{Account, Money};
    use escrowflow_negotiation::InitialFacts;

    use std::time::Duration;

    fn config_in(dir: &Path) -> EscrowConfig {
        let mut config = EscrowConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn ledger_and_checkpoints_persist_between_invocations() {
        let dir = tempfile::tempdir().unwrap();

        let app = App::open(config_in(dir.path())).await.unwrap();
        app.driver
            .start(
                "tx-1",
                InitialFacts::declared("Vintage Rolex", Money::from_major(1500)),
            )
            .await
            .unwrap();
        app.driver.resume("tx-1").await.unwrap();
        app.save_ledger().await.unwrap();
        drop(app);

        let app = App::open(config_in(dir.path())).await.unwrap();
        let snapshot = app.ledger.snapshot();
        assert_eq!(snapshot.get(Account::Escrow), Money::from_major(1200));
        assert_eq!(snapshot.get(Account::Buyer), Money::from_major(8500));
        assert_eq!(app.driver.list().await.unwrap(), vec!["tx-1".to_string()]);
    }

    async fn escrow_one(app: &App, id: &str) {
        app.driver
            .start(id, InitialFacts::declared("Vintage Rolex", Money::from_major(1500)))
            .await
            .unwrap();
        app.driver.resume(id).await.unwrap();
        app.save_ledger().await.unwrap();
    }

    #[tokio::test]
    async fn second_app_waits_for_the_first_and_sees_its_transfers() {
        let dir = tempfile::tempdir().unwrap();

        let first = App::open(config_in(dir.path())).await.unwrap();
        let second = {
            let config = config_in(dir.path());
            tokio::spawn(async move { App::open(config).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!second.is_finished(), "data dir lock was not held");

        escrow_one(&first, "tx-1").await;
        drop(first);

        let second = tokio::time::timeout(Duration::from_secs(10), second)
            .await
            .expect("lock not released on drop")
            .unwrap()
            .unwrap();
        escrow_one(&second, "tx-2").await;
        drop(second);

        let app = App::open(config_in(dir.path())).await.unwrap();
        let snapshot = app.ledger.snapshot();
        assert_eq!(snapshot.get(Account::Buyer), Money::from_major(7000));
        assert_eq!(snapshot.get(Account::Seller), Money::from_major(600));
        assert_eq!(snapshot.get(Account::Escrow), Money::from_major(2400));
        let mut ids = app.driver.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["tx-1".to_string(), "tx-2".to_string()]);
    }
}
