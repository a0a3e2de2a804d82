//! Per-extension subscription bookkeeping for the `Events`/`Commands`
//! streaming surface.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::rpc::wire::StreamItem;

const SEND_TIMEOUT: Duration = Duration::from_millis(500);
const CHANNEL_CAPACITY: usize = 64;

struct Subscription {
    id: u64,
    ext: String,
    filter: HashSet<String>,
    tx: mpsc::Sender<StreamItem>,
}

/// The server-wide set of live `Events`/`Commands` streams, indexed
/// linearly (subscription counts per process are small; a linear scan
/// per broadcast is simpler than indexing by event name and is fine at
/// this scale).
#[derive(Default)]
pub struct SubscriptionTable {
    subs: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl SubscriptionTable {
    pub fn new() -> SubscriptionTable {
        SubscriptionTable::default()
    }

    /// Registers a new subscription for `ext`, filtered to `filter` (empty
    /// means "all"). Returns its id and the receiving half of its channel.
    pub fn add(&self, ext: impl Into<String>, filter: Vec<String>) -> (u64, mpsc::Receiver<StreamItem>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.subs.write().push(Subscription {
            id,
            ext: ext.into(),
            filter: filter.into_iter().collect(),
            tx,
        });
        (id, rx)
    }

    pub fn remove(&self, id: u64) {
        self.subs.write().retain(|s| s.id != id);
    }

    pub fn remove_ext(&self, ext: &str) {
        self.subs.write().retain(|s| s.ext != ext);
    }

    /// Sends one event to every subscription admitting `event_name`,
    /// bounding each send by [`SEND_TIMEOUT`]. Returns `true` iff at least
    /// one subscriber accepted it. Subscriptions that accepted none — a
    /// closed channel, or every send in the set timed out — are torn down.
    pub async fn broadcast(&self, event_name: &str, build: impl Fn(u64) -> StreamItem) -> bool {
        let targets: Vec<(u64, mpsc::Sender<StreamItem>)> = self
            .subs
            .read()
            .iter()
            .filter(|s| s.filter.is_empty() || s.filter.contains(event_name))
            .map(|s| (s.id, s.tx.clone()))
            .collect();

        if targets.is_empty() {
            return false;
        }

        let mut delivered = false;
        let mut dead = Vec::new();
        for (id, tx) in targets {
            let item = build(id);
            match tokio::time::timeout(SEND_TIMEOUT, tx.send(item)).await {
                Ok(Ok(())) => delivered = true,
                Ok(Err(_)) => dead.push(id),
                Err(_) => log::debug!("subscription {id} timed out waiting for event {event_name:?}"),
            }
        }

        for id in dead {
            self.remove(id);
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivered_true_when_first_subscriber_reads() {
        let table = SubscriptionTable::new();
        let (id1, mut rx1) = table.add("ext1", vec!["42".to_owned()]);
        let (_id2, _rx2_unread) = table.add("ext1", vec!["42".to_owned()]);

        let delivered = table
            .broadcast("42", |sid| StreamItem {
                subscription_id: sid,
                event_name: "42".to_owned(),
                network: "net1".to_owned(),
                sender: String::new(),
                args: vec![],
                unix_ts: 0,
            })
            .await;

        assert!(delivered);
        let item = rx1.try_recv().unwrap();
        assert_eq!(item.subscription_id, id1);
    }

    #[tokio::test]
    async fn empty_filter_matches_any_event() {
        let table = SubscriptionTable::new();
        let (_id, mut rx) = table.add("ext1", vec![]);
        let delivered = table
            .broadcast("PRIVMSG", |sid| StreamItem {
                subscription_id: sid,
                event_name: "PRIVMSG".to_owned(),
                network: "net1".to_owned(),
                sender: String::new(),
                args: vec![],
                unix_ts: 0,
            })
            .await;
        assert!(delivered);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn closed_subscription_is_torn_down_even_if_another_delivers() {
        let table = SubscriptionTable::new();
        let (dead_id, rx_dead) = table.add("ext1", vec!["42".to_owned()]);
        drop(rx_dead);
        let (_live_id, mut rx_live) = table.add("ext1", vec!["42".to_owned()]);

        let delivered = table
            .broadcast("42", |sid| StreamItem {
                subscription_id: sid,
                event_name: "42".to_owned(),
                network: "net1".to_owned(),
                sender: String::new(),
                args: vec![],
                unix_ts: 0,
            })
            .await;

        assert!(delivered);
        assert!(rx_live.try_recv().is_ok());
        assert_eq!(table.subs.read().iter().filter(|s| s.id == dead_id).count(), 0);
    }

    #[tokio::test]
    async fn unfiltered_event_with_no_subscribers_is_not_delivered() {
        let table = SubscriptionTable::new();
        table.add("ext1", vec!["other".to_owned()]);
        let delivered = table
            .broadcast("42", |sid| StreamItem {
                subscription_id: sid,
                event_name: "42".to_owned(),
                network: "net1".to_owned(),
                sender: String::new(),
                args: vec![],
                unix_ts: 0,
            })
            .await;
        assert!(!delivered);
    }
}
