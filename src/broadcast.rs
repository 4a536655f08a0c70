use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{Cabin, CabinStatus};

#[derive(Serialize)]
struct CabinUpdateMessage<'a> {
    #[serde(rename = "type")]
    message_type: &'static str,
    data: CabinUpdateData<'a>,
}

#[derive(Serialize)]
struct CabinUpdateData<'a> {
    cabin_no: i64,
    status: CabinStatus,
    student_id: Option<&'a str>,
    student_name: Option<&'a str>,
    current_session_duration: i64,
    last_activity: Option<DateTime<Utc>>,
}

struct Listener {
    id: Uuid,
    tx: mpsc::Sender<String>,
}

/// Fan-out of cabin state changes to registered listeners.
///
/// Deliveries are independent and never block: each listener gets a bounded
/// channel, and a listener whose channel is closed or full is dropped from
/// the registry on the spot.
pub struct Broadcaster {
    buffer: usize,
    listeners: Mutex<Vec<Listener>>,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> (Uuid, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();

        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.push(Listener { id, tx });

        (id, rx)
    }

    pub fn unsubscribe(&self, id: Uuid) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.retain(|listener| listener.id != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Serialize a compact update for the cabin and deliver it to every
    /// registered listener, pruning the ones that fail.
    pub fn publish(&self, cabin: &Cabin) {
        let payload = CabinUpdateMessage {
            message_type: "cabin_update",
            data: CabinUpdateData {
                cabin_no: cabin.cabin_no,
                status: cabin.status,
                student_id: cabin.student_id.as_deref(),
                student_name: cabin.student_name.as_deref(),
                current_session_duration: cabin.current_session_duration,
                last_activity: cabin.last_activity,
            },
        };

        let message = match serde_json::to_string(&payload) {
            Ok(message) => message,
            Err(err) => {
                warn!("Failed to serialize cabin update: {err}");
                return;
            }
        };

        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.retain(|listener| match listener.tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(err) => {
                info!("Dropping broadcast listener {}: {err}", listener.id);
                false
            }
        });
    }
}
