use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId};
use tokio::sync::{broadcast, Mutex};

use crate::handlers::{api_log, AppState};

const TICK_SECS: u64 = 5;

#[derive(Debug, Clone, Copy)]
struct Entry {
    chat_id: ChatId,
    message_id: MessageId,
    due: DateTime<Utc>,
}

/// Deferred message deletion. Reports, prompts and moderation echoes are
/// queued here so the group does not silt up; a ticker task drains whatever
/// is due. Deleting an already-gone message is not an error.
pub struct Autodelete {
    queue: Mutex<Vec<Entry>>,
}

impl Autodelete {
    pub fn new() -> Self {
        Autodelete {
            queue: Mutex::new(Vec::new()),
        }
    }

    pub async fn schedule(&self, chat_id: ChatId, message_id: MessageId, delay_secs: u64) {
        let due = Utc::now() + chrono::Duration::seconds(delay_secs as i64);
        self.queue.lock().await.push(Entry {
            chat_id,
            message_id,
            due,
        });
    }

    async fn drain_due(&self, now: DateTime<Utc>) -> Vec<(ChatId, MessageId)> {
        let mut queue = self.queue.lock().await;
        let mut due = Vec::new();
        queue.retain(|e| {
            if e.due <= now {
                due.push((e.chat_id, e.message_id));
                false
            } else {
                true
            }
        });
        due
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

pub async fn autodelete_task(bot: Bot, state: Arc<AppState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(TICK_SECS));
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => { break; }
            _ = ticker.tick() => {
                for (chat_id, message_id) in state.autodelete.drain_due(Utc::now()).await {
                    let _ = api_log("delete_message", bot.delete_message(chat_id, message_id)).await;
                }
            }
        }
    }
}
