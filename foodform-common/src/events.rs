//! Session event types and the broadcast event bus
//!
//! Events describe what happened inside a form session (images arriving,
//! scans finishing, fields changing owner). They are informational: the
//! session state is authoritative and consumers must never reconstruct it
//! from events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Form session event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Source image added to the session
    ImageAdded {
        session_id: Uuid,
        image_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Image scan finished and its candidates were applied
    ScanCompleted {
        session_id: Uuid,
        image_id: Uuid,
        candidates: usize,
        timestamp: DateTime<Utc>,
    },

    /// Image scan failed (no candidates offered)
    ScanFailed {
        session_id: Uuid,
        image_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Label has two value columns, user must pick one for the image
    ColumnSelectionNeeded {
        session_id: Uuid,
        image_id: Uuid,
        /// 1 or 2
        best_column: u8,
        timestamp: DateTime<Utc>,
    },

    /// Field value/provenance changed
    FieldFilled {
        session_id: Uuid,
        field_id: Uuid,
        attribute: String,
        source: String,
        timestamp: DateTime<Utc>,
    },

    /// Field's machine-derived value was discarded
    FieldDiscarded {
        session_id: Uuid,
        field_id: Uuid,
        attribute: String,
        timestamp: DateTime<Utc>,
    },

    /// Image removed from the session (explicitly or by pruning)
    ImageRemoved {
        session_id: Uuid,
        image_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Cropped region image attached to a field
    CropApplied {
        session_id: Uuid,
        field_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Barcode payload removed from every image
    BarcodeRemoved {
        session_id: Uuid,
        payload: String,
        images_removed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Event type name as used in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::ImageAdded { .. } => "image_added",
            SessionEvent::ScanCompleted { .. } => "scan_completed",
            SessionEvent::ScanFailed { .. } => "scan_failed",
            SessionEvent::ColumnSelectionNeeded { .. } => "column_selection_needed",
            SessionEvent::FieldFilled { .. } => "field_filled",
            SessionEvent::FieldDiscarded { .. } => "field_discarded",
            SessionEvent::ImageRemoved { .. } => "image_removed",
            SessionEvent::CropApplied { .. } => "crop_applied",
            SessionEvent::BarcodeRemoved { .. } => "barcode_removed",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::ImageAdded { session_id, .. }
            | SessionEvent::ScanCompleted { session_id, .. }
            | SessionEvent::ScanFailed { session_id, .. }
            | SessionEvent::ColumnSelectionNeeded { session_id, .. }
            | SessionEvent::FieldFilled { session_id, .. }
            | SessionEvent::FieldDiscarded { session_id, .. }
            | SessionEvent::ImageRemoved { session_id, .. }
            | SessionEvent::CropApplied { session_id, .. }
            | SessionEvent::BarcodeRemoved { session_id, .. } => *session_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for session events
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the session)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use foodform_common::events::{EventBus, SessionEvent};
/// use uuid::Uuid;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SessionEvent::ImageAdded {
///     session_id: Uuid::new_v4(),
///     image_id: Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
