use std::collections::HashMap;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::channel::Channel;
use crate::error::Result;

type PendingWatch = Shared<BoxFuture<'static, Result<()>>>;

/// In-flight `watch` calls keyed by cid.
///
/// Two events racing for the same channel share one request: the second
/// caller awaits the first caller's pending future instead of issuing its own.
#[derive(Default)]
pub struct WatchRegistry {
    in_flight: Mutex<HashMap<String, PendingWatch>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watches `channel`, joining a watch that is already in flight for its cid.
    pub async fn get_and_watch(&self, channel: Arc<Channel>) -> Result<Arc<Channel>> {
        let cid = channel.cid().to_string();

        let pending = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&cid) {
                Some(pending) => {
                    debug!(cid = %cid, "joining in-flight watch");
                    pending.clone()
                }
                None => {
                    let target = Arc::clone(&channel);
                    let pending: PendingWatch = async move { target.watch().await.map(|_| ()) }.boxed().shared();
                    in_flight.insert(cid.clone(), pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        // whoever finishes first clears the entry, unless a newer watch already replaced it
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&cid).is_some_and(|stored| stored.ptr_eq(&pending)) {
            in_flight.remove(&cid);
        }
        drop(in_flight);

        result.map(|_| channel)
    }

    /// Number of cids with a watch in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}
