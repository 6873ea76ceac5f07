//! Live fan-out to subscribers.
//!
//! Messages go out on a bounded `broadcast` ring. Publishing never waits:
//! a subscriber that falls behind by more than the ring capacity loses
//! its oldest messages and counts how many it skipped.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use shotscope_common::clock::{RateController, RecordingClock};
use shotscope_common::config::LiveConfig;
use shotscope_model::message::LiveMessage;
use shotscope_model::sample::ProcessedSample;

pub struct LiveHub {
    tx: broadcast::Sender<Arc<LiveMessage>>,
    decimator: RateController,
}

impl LiveHub {
    pub fn new(config: &LiveConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            tx,
            decimator: RateController::new(config.sample_rate_hz),
        }
    }

    pub fn subscribe(&self) -> LiveSubscriber {
        self.feed().subscribe()
    }

    /// Cloneable handle for subscribing from other tasks.
    pub fn feed(&self) -> LiveFeed {
        LiveFeed {
            tx: self.tx.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send to every current subscriber. Returns how many there were.
    pub fn publish(&self, message: LiveMessage) -> usize {
        // No subscribers is not an error for a live feed.
        self.tx.send(Arc::new(message)).unwrap_or(0)
    }

    /// Publish a sample if the decimation interval (in device time) has
    /// passed since the last one published.
    pub fn publish_sample(&mut self, sample: &ProcessedSample) -> bool {
        if !self
            .decimator
            .should_tick(RecordingClock::ms_to_ns(sample.t_ms))
        {
            return false;
        }
        self.publish(LiveMessage::Sample {
            data: sample.clone(),
        });
        true
    }

    /// Restart decimation, e.g. when the time base starts over.
    pub fn reset_decimation(&mut self) {
        self.decimator.reset();
    }
}

/// Subscription point detached from the hub.
#[derive(Clone)]
pub struct LiveFeed {
    tx: broadcast::Sender<Arc<LiveMessage>>,
}

impl LiveFeed {
    pub fn subscribe(&self) -> LiveSubscriber {
        LiveSubscriber {
            rx: self.tx.subscribe(),
            skipped: 0,
        }
    }
}

/// One subscriber's view of the live feed.
pub struct LiveSubscriber {
    rx: broadcast::Receiver<Arc<LiveMessage>>,
    skipped: u64,
}

impl LiveSubscriber {
    /// Next message. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Arc<LiveMessage>> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(n)) => self.lagged(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next message if one is queued.
    pub fn try_recv(&mut self) -> Option<Arc<LiveMessage>> {
        loop {
            match self.rx.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(n)) => self.lagged(n),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Messages this subscriber lost by falling behind.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn lagged(&mut self, n: u64) {
        self.skipped += n;
        tracing::warn!(skipped = n, total = self.skipped, "Live subscriber lagged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotscope_model::stats::Stats;

    fn hub(capacity: usize) -> LiveHub {
        LiveHub::new(&LiveConfig {
            sample_rate_hz: 30,
            channel_capacity: capacity,
            stat_interval_ms: 1_000,
        })
    }

    fn stat(received: u64) -> LiveMessage {
        LiveMessage::Stat {
            data: Stats {
                received,
                ..Stats::default()
            },
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = hub(4);
        assert_eq!(hub.publish(stat(1)), 0);
    }

    #[test]
    fn test_slow_subscriber_drops_oldest() {
        let hub = hub(4);
        let mut slow = hub.subscribe();
        for i in 0..10 {
            hub.publish(stat(i));
        }
        let mut seen = Vec::new();
        while let Some(msg) = slow.try_recv() {
            if let LiveMessage::Stat { data } = msg.as_ref() {
                seen.push(data.received);
            }
        }
        assert_eq!(seen, vec![6, 7, 8, 9]);
        assert_eq!(slow.skipped(), 6);
    }

    #[test]
    fn test_subscribers_are_independent() {
        let hub = hub(4);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        hub.publish(stat(1));
        assert!(a.try_recv().is_some());
        assert!(a.try_recv().is_none());
        assert!(b.try_recv().is_some());
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_recv_ends_when_hub_dropped() {
        let hub = hub(4);
        let mut sub = hub.subscribe();
        hub.publish(stat(1));
        drop(hub);
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }
}
