//! Real-time event channel types.
//!
//! Provides [`SectionEvent`] — the typed envelope the host pushes into the
//! engine when the server emits a section notification — plus
//! [`ChannelHealth`], the fallback signal that gates the diff poll loop.
//!
//! The engine subscribes to a tokio broadcast of events and a watch of the
//! channel's health. Hosts own the sending side via [`SectionChannel`]: a
//! websocket bridge, an SSE reader, or a test harness all feed the same
//! channel.

use tokio::sync::{broadcast, watch};

use galley_types::{ConflictPayload, SectionDiff, SectionId};

/// Topic of a server push notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionTopic {
    /// `section.conflict` — an out-of-band conflict for this section.
    Conflict,
    /// `section.diff` — the draft-vs-approved diff changed.
    Diff,
}

/// One pushed notification envelope.
#[derive(Clone, Debug)]
pub struct SectionEvent {
    pub section_id: SectionId,
    pub payload: SectionEventPayload,
}

/// Typed payload of a pushed notification.
#[derive(Clone, Debug)]
pub enum SectionEventPayload {
    Conflict(ConflictPayload),
    Diff(SectionDiff),
}

impl SectionEvent {
    pub fn topic(&self) -> SectionTopic {
        match self.payload {
            SectionEventPayload::Conflict(_) => SectionTopic::Conflict,
            SectionEventPayload::Diff(_) => SectionTopic::Diff,
        }
    }
}

/// Delivery health of the real-time channel.
///
/// While `Degraded`, push delivery cannot be trusted and the engine falls
/// back to polling diffs on a fixed interval; recovery cancels the poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelHealth {
    #[default]
    Healthy,
    Degraded,
}

impl ChannelHealth {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ChannelHealth::Degraded)
    }
}

/// Host-side handle for feeding events and health transitions to the engine.
///
/// Cheap to clone the receivers off; the sender half stays with whatever
/// bridges the actual transport.
pub struct SectionChannel {
    events: broadcast::Sender<SectionEvent>,
    health: watch::Sender<ChannelHealth>,
}

impl SectionChannel {
    /// Buffer sized for notification bursts during reconnect replay.
    const EVENT_BUFFER: usize = 64;

    pub fn new() -> Self {
        let (events, _) = broadcast::channel(Self::EVENT_BUFFER);
        let (health, _) = watch::channel(ChannelHealth::Healthy);
        Self { events, health }
    }

    /// Subscribe to pushed section events.
    pub fn subscribe(&self) -> broadcast::Receiver<SectionEvent> {
        self.events.subscribe()
    }

    /// Watch the channel health signal.
    pub fn watch_health(&self) -> watch::Receiver<ChannelHealth> {
        self.health.subscribe()
    }

    /// Push an event. Returns the number of live subscribers.
    pub fn publish(&self, event: SectionEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Flip the health signal. No-op when the value is unchanged.
    pub fn set_health(&self, health: ChannelHealth) {
        self.health.send_if_modified(|current| {
            if *current == health {
                false
            } else {
                *current = health;
                true
            }
        });
    }
}

impl Default for SectionChannel {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
