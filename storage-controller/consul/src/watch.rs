use crate::ConsulClient;
use gateway_storage_core::{CancellationToken, Error, Handlers, Resource, Result};
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

/// How long a blocking query may wait for the index to move.
const WAIT: Duration = Duration::from_secs(60);

/// Polls the client's prefix with blocking queries until `stop` is cancelled.
///
/// The first response is delivered unconditionally so subscribers observe the current state.
/// Afterwards a response is delivered whenever Consul's index moves. Transient failures are
/// logged and retried after the sync interval; any other failure ends the watch.
pub(crate) async fn run<T: Resource>(
    client: ConsulClient<T>,
    handlers: Handlers<T>,
    stop: CancellationToken,
) -> Result<()> {
    let prefix = client.prefix().to_string();
    info!(%prefix, "Watching");

    let mut last: Option<u64> = None;
    loop {
        let wait = (last.unwrap_or(0), WAIT);
        let res = tokio::select! {
            _ = stop.cancelled() => return Ok(()),
            res = client.kv().list(&prefix, Some(wait)) => res,
        };

        let (pairs, index) = match res {
            Ok(rsp) => rsp,
            Err(error) if error.is_transient() => {
                warn!(%error, %prefix, "Failed to list; retrying");
                tokio::select! {
                    _ = stop.cancelled() => return Ok(()),
                    _ = time::sleep(client.sync_interval()) => continue,
                }
            }
            Err(error) => {
                return Err(Error::backend(format!("failed to watch {prefix}"), error));
            }
        };

        // Consul indexes are never zero; a missing header is treated as index 1.
        let index = index.max(1);
        match last {
            // Nothing changed. Consul may answer an unchanged index immediately, so wait out the
            // sync interval before asking again.
            Some(last) if last == index => {
                tokio::select! {
                    _ = stop.cancelled() => return Ok(()),
                    _ = time::sleep(client.sync_interval()) => continue,
                }
            }
            // The index went backwards (e.g. after a snapshot restore); start over from 0.
            Some(prev) if index < prev => {
                debug!(%prefix, last = prev, index, "Index reset");
                last = None;
                continue;
            }
            _ => {}
        }
        last = Some(index);

        let mut items = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            match client.decode(pair) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(error) => warn!(%error, key = %pair.key, "Skipping undecodable pair"),
            }
        }
        items.sort_by(|a, b| a.name().cmp(b.name()));
        handlers.update(&items, None);
    }
}
