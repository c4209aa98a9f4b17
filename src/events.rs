//! Event bus for marketplace state changes
//!
//! Every committed transition is published here. The Postgres projector and the
//! notification collaborator subscribe; the core never waits on them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::escrow::{EscrowMovement, EscrowRecord};
use crate::lifecycle::{ReviewRequest, ReviewSlot};
use crate::reputation::KarmaTransaction;

const EVENT_BUFFER: usize = 1024;

/// Actor name used for transitions driven by the scheduler.
pub const AUTO_ACTOR: &str = "auto";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum MarketEvent {
    RequestCreated {
        request: ReviewRequest,
    },

    /// A slot changed state; carries the parent request so counters travel with it
    SlotChanged {
        slot: ReviewSlot,
        request: ReviewRequest,
        actor: String,
    },

    KarmaRecorded {
        transaction: KarmaTransaction,
    },

    EscrowMoved {
        record: EscrowRecord,
        movement: EscrowMovement,
    },

    /// Requester asked the reviewer for more detail
    ElaborationRequested {
        slot_id: Uuid,
        requester_id: Uuid,
        reviewer_id: Option<Uuid>,
        text: String,
        respond_by: DateTime<Utc>,
    },
}

impl MarketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MarketEvent::RequestCreated { .. } => "request_created",
            MarketEvent::SlotChanged { .. } => "slot_changed",
            MarketEvent::KarmaRecorded { .. } => "karma_recorded",
            MarketEvent::EscrowMoved { .. } => "escrow_moved",
            MarketEvent::ElaborationRequested { .. } => "elaboration_requested",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MarketEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    pub fn publish(&self, event: MarketEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            debug!(event = name, "No subscribers for market event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.sender.subscribe()
    }
}
