//! Background expiry of idle login sessions.

use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tangle_store::Store;
use tangle_store::repositories::SessionRepo;

/// Run the periodic session sweep until cancelled.
///
/// The gate also drops expired rows it happens to touch; this loop is the
/// backstop that reclaims sessions nobody presents again.
pub async fn run_sweeper(store: Store, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // The immediate first tick would sweep on startup for no reason.
    let _ = ticker.tick().await;

    info!(interval_secs = interval.as_secs(), "session sweeper started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep_once(&store) {
                    Ok(0) => debug!("session sweep found nothing to remove"),
                    Ok(removed) => info!(removed, "swept expired sessions"),
                    Err(err) => warn!(error = %err, "session sweep failed"),
                }
            }
            () = cancel.cancelled() => {
                info!("session sweeper stopped");
                return;
            }
        }
    }
}

fn sweep_once(store: &Store) -> tangle_store::Result<usize> {
    let conn = store.conn()?;
    let removed = SessionRepo::sweep_expired(&conn)?;
    if removed > 0 {
        counter!("sessions_swept_total").increment(removed as u64);
    }
    Ok(removed)
}
