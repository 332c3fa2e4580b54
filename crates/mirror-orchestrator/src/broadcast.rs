//! Replay-one result broadcasting.
//!
//! Each [`Channel`] is a single-slot cache backed by a `tokio::sync::watch`
//! channel: publishing replaces the slot atomically, and every subscriber
//! first sees the current value (if any) and then each later publication.
//! Slow subscribers skip intermediate values rather than queueing them.
//!
//! # Example
//!
//! ```no_run
//! use mirror_orchestrator::broadcast::{Channel, ResultBroadcaster};
//!
//! # async fn example(broadcaster: ResultBroadcaster) {
//! let mut analyses = broadcaster.subscribe(Channel::Analysis);
//! while let Some(event) = analyses.recv().await {
//!     println!("{}", event.channel());
//! }
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::analysis::AnalysisResult;
use crate::orchestrator::EffectApplicationResult;

/// A named result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    /// Skin analysis results.
    Analysis,
    /// Effect application results.
    EffectApplied,
}

impl Channel {
    /// Every channel, in slot order.
    pub const ALL: [Self; 2] = [Self::Analysis, Self::EffectApplied];

    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::EffectApplied => "effectApplied",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    const fn index(self) -> usize {
        match self {
            Self::Analysis => 0,
            Self::EffectApplied => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A published result.
///
/// Serialized as `{"event": <channel>, "payload": <result>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ResultEvent {
    /// Published by a successful analysis.
    Analysis(AnalysisResult),
    /// Published by each successful effect application.
    EffectApplied(EffectApplicationResult),
}

impl ResultEvent {
    /// The channel this event belongs to.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Analysis(_) => Channel::Analysis,
            Self::EffectApplied(_) => Channel::EffectApplied,
        }
    }
}

type Slot = watch::Sender<Option<ResultEvent>>;

/// Publishes results to any number of subscribers with replay-one semantics.
///
/// Cloning shares the same slots. Slots live until the last clone is
/// dropped and are reset only by [`ResultBroadcaster::clear`].
#[derive(Debug, Clone)]
pub struct ResultBroadcaster {
    slots: Arc<[Slot; 2]>,
}

impl Default for ResultBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultBroadcaster {
    /// Creates a broadcaster with every slot empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new([watch::channel(None).0, watch::channel(None).0]),
        }
    }

    fn slot(&self, channel: Channel) -> &Slot {
        &self.slots[channel.index()]
    }

    /// Replaces the slot for the event's channel and notifies subscribers.
    ///
    /// Returns the number of live subscribers on that channel.
    pub fn publish(&self, event: ResultEvent) -> usize {
        let slot = self.slot(event.channel());
        let channel = event.channel();
        slot.send_replace(Some(event));
        let receivers = slot.receiver_count();
        debug!(%channel, receivers, "Published result");
        receivers
    }

    /// Subscribes to a channel. The first `recv` yields the current value, if any.
    #[must_use]
    pub fn subscribe(&self, channel: Channel) -> Subscription {
        Subscription {
            receiver: self.slot(channel).subscribe(),
            primed: false,
        }
    }

    /// The last value published on a channel.
    #[must_use]
    pub fn latest(&self, channel: Channel) -> Option<ResultEvent> {
        self.slot(channel).borrow().clone()
    }

    /// Empties every slot. Existing subscribers keep waiting for the next publication.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.send_replace(None);
        }
        debug!("Cleared all result channels");
    }

    /// Live subscribers on a channel.
    #[must_use]
    pub fn receiver_count(&self, channel: Channel) -> usize {
        self.slot(channel).receiver_count()
    }
}

/// One subscriber's view of a channel.
#[derive(Debug)]
pub struct Subscription {
    receiver: watch::Receiver<Option<ResultEvent>>,
    primed: bool,
}

impl Subscription {
    /// Waits for the next value.
    ///
    /// The first call returns the replayed value immediately when the slot
    /// is filled. Returns `None` once the broadcaster is dropped.
    pub async fn recv(&mut self) -> Option<ResultEvent> {
        if !self.primed {
            self.primed = true;
            if let Some(event) = self.receiver.borrow_and_update().clone() {
                return Some(event);
            }
        }

        loop {
            self.receiver.changed().await.ok()?;
            if let Some(event) = self.receiver.borrow_and_update().clone() {
                return Some(event);
            }
        }
    }

    /// Converts into a stream of values.
    pub fn into_stream(self) -> impl Stream<Item = ResultEvent> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}
