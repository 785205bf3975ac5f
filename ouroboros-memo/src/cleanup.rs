//! Optional background sweeper
//!
//! Expiry is lazy, so entries that are never read again stay in memory until
//! their wrapper is cleared. The sweeper calls [`Memoizer::sweep`] on an
//! interval to reclaim them. It changes no observable caching behavior.

use crate::error::Result;
use crate::memoizer::Memoizer;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Sweep `memoizer` forever at its configured cleanup interval
pub async fn start_auto_cleanup(memoizer: Arc<Memoizer>) {
    let interval = memoizer.config().cleanup_interval;

    info!("Starting automatic memo cleanup task (interval: {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;

        let report = memoizer.sweep();
        if !report.is_empty() {
            debug!("Auto cleanup: {}", report);
        }
    }
}

/// Spawn the sweeper on the current tokio runtime if the config enables it.
///
/// Returns `Ok(None)` when auto cleanup is disabled, and a
/// [`ConfigError`](crate::MemoError::ConfigError) when the config is invalid.
pub fn spawn_auto_cleanup(memoizer: &Arc<Memoizer>) -> Result<Option<JoinHandle<()>>> {
    let config = memoizer.config();
    config.validate()?;

    if !config.enable_auto_cleanup {
        debug!("Automatic memo cleanup disabled");
        return Ok(None);
    }

    Ok(Some(tokio::spawn(start_auto_cleanup(Arc::clone(memoizer)))))
}
