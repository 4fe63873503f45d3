//! Concurrent event scanning over a height range.
//!
//! The range is cut into stripes of `blocks_per_worker` heights. Every
//! stripe is queried once per event type by a pool of workers pulling from
//! a shared queue. Results come back in completion order; sort by height if
//! order matters.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::Error;
use crate::gateway::Gateway;
use crate::types::BlockEvents;

/// Worker pool shape for [`get_events`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventWorker {
    /// Number of concurrent workers.
    pub count: usize,
    /// Heights covered by a single query.
    pub blocks_per_worker: u64,
}

impl Default for EventWorker {
    fn default() -> Self {
        Self {
            count: 1,
            blocks_per_worker: 250,
        }
    }
}

/// One gateway query: an event type over an inclusive height range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRangeQuery {
    pub event_type: String,
    pub start_height: u64,
    pub end_height: u64,
}

/// Split `[start, end]` into stripes, one query per stripe and event type.
///
/// Every height in the range lands in exactly one stripe.
pub fn event_range_queries(
    names: &[String],
    start: u64,
    end: u64,
    blocks_per_worker: u64,
) -> Result<Vec<EventRangeQuery>, Error> {
    if end < start {
        return Err(Error::InvalidArgument(format!(
            "cannot have end height ({}) less than start height ({})",
            end, start
        )));
    }
    if blocks_per_worker == 0 {
        return Err(Error::InvalidArgument(
            "blocks per worker must be at least 1".to_string(),
        ));
    }

    let mut queries = Vec::new();
    let mut stripe_start = start;
    loop {
        let stripe_end = stripe_start.saturating_add(blocks_per_worker - 1).min(end);
        for name in names {
            queries.push(EventRangeQuery {
                event_type: name.clone(),
                start_height: stripe_start,
                end_height: stripe_end,
            });
        }
        if stripe_end >= end {
            break;
        }
        stripe_start = stripe_end + 1;
    }
    Ok(queries)
}

/// Fetch events of every type in `names` between `start` and `end`
/// inclusive.
///
/// The first failing query fails the whole scan; outstanding workers are
/// aborted.
pub async fn get_events(
    gateway: Arc<dyn Gateway>,
    names: &[String],
    start: u64,
    end: u64,
    worker: EventWorker,
) -> Result<Vec<BlockEvents>, Error> {
    let queries = event_range_queries(names, start, end, worker.blocks_per_worker)?;
    if queries.is_empty() {
        return Ok(Vec::new());
    }

    let (sender, receiver) = mpsc::unbounded_channel();
    let total = queries.len();
    for query in queries {
        // The receiver is alive until the workers below are done.
        let _ = sender.send(query);
    }
    drop(sender);

    let receiver = Arc::new(Mutex::new(receiver));
    let mut workers = JoinSet::new();
    for id in 0..worker.count.clamp(1, total) {
        let gateway = Arc::clone(&gateway);
        let receiver = Arc::clone(&receiver);
        workers.spawn(async move {
            let mut found = Vec::new();
            loop {
                let next = receiver.lock().await.recv().await;
                let Some(query) = next else { break };

                debug!(
                    worker = id,
                    event_type = %query.event_type,
                    start = query.start_height,
                    end = query.end_height,
                    "fetching events"
                );
                let events = gateway
                    .get_events(&query.event_type, query.start_height, query.end_height)
                    .await
                    .map_err(|e| Error::gateway("get events", e))?;
                found.extend(events);
            }
            Ok::<_, Error>(found)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(events)) => results.extend(events),
            Ok(Err(e)) => {
                workers.abort_all();
                return Err(e);
            }
            Err(e) => {
                workers.abort_all();
                return Err(Error::EventWorker(e.to_string()));
            }
        }
    }
    Ok(results)
}
