//! Channel for market data distribution

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{self, Receiver, Sender, TrySendError};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::models::MarketDataMessage;

/// Topic types for market data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Market price updates for a market
    MarketPrice(String),
    /// Trades for a market
    Trades(String),
    /// All market price updates
    AllMarketPrices,
    /// All trades
    AllTrades,
}

impl Topic {
    /// The catch-all topic that also receives messages of this topic
    fn wildcard(&self) -> Option<Topic> {
        match self {
            Topic::MarketPrice(_) => Some(Topic::AllMarketPrices),
            Topic::Trades(_) => Some(Topic::AllTrades),
            _ => None,
        }
    }
}

/// Receiving end of a subscription
pub type Subscription = Receiver<Arc<MarketDataMessage>>;

/// Subscription entry
struct SubscriptionEntry {
    /// Sender channel
    sender: Sender<Arc<MarketDataMessage>>,
    /// Subscription ID
    id: Uuid,
}

/// Market data channel
#[derive(Default)]
pub struct MarketDataChannel {
    /// Senders by topic
    senders: Mutex<HashMap<Topic, Vec<SubscriptionEntry>>>,
}

impl MarketDataChannel {
    /// Create a new market data channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic
    pub async fn subscribe(&self, topic: Topic) -> (Uuid, Subscription) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let subscription_id = Uuid::new_v4();

        let mut senders = self.senders.lock().await;
        debug!("New subscription {} to {:?}", subscription_id, topic);
        senders.entry(topic).or_default().push(SubscriptionEntry {
            sender,
            id: subscription_id,
        });

        (subscription_id, receiver)
    }

    /// Publish to a topic and its catch-all topic. Returns the number of
    /// subscribers the message was delivered to.
    pub async fn publish(&self, topic: Topic, message: MarketDataMessage) -> usize {
        let message = Arc::new(message);
        let mut senders = self.senders.lock().await;

        let mut delivered = 0;
        for topic in std::iter::once(topic.clone()).chain(topic.wildcard()) {
            if let Some(entries) = senders.get_mut(&topic) {
                // Remove subscribers whose receiver was dropped
                entries.retain(|entry| match entry.sender.try_send(message.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(TrySendError::Full(_)) => true,
                    Err(TrySendError::Disconnected(_)) => false,
                });
            }
        }

        delivered
    }

    /// Unsubscribe using subscription ID
    pub async fn unsubscribe(&self, subscription_id: Uuid) -> bool {
        let mut senders = self.senders.lock().await;
        let mut found = false;

        for entries in senders.values_mut() {
            let initial_len = entries.len();
            entries.retain(|entry| entry.id != subscription_id);

            if entries.len() < initial_len {
                found = true;
            }
        }

        found
    }

    /// Number of live subscriptions on a topic
    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        let senders = self.senders.lock().await;
        senders.get(topic).map_or(0, Vec::len)
    }
}
