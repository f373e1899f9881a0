//! Outbound notifications.
//!
//! Every commit that changed something produces one entity event, plus the
//! side-channel events the conversation layer listens to.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

use parlor_shared::{ChannelId, ChatId, DialogId, SecretChatId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Event {
    UserUpdated(UserId),
    ChatUpdated(ChatId),
    ChannelUpdated(ChannelId),
    SecretChatUpdated(SecretChatId),

    UserFullUpdated(UserId),
    ChatFullUpdated(ChatId),
    ChannelFullUpdated(ChannelId),

    /// Last-seen time changed. Not persisted.
    UserStatusChanged { user_id: UserId, was_online: i32 },

    TitleChanged(DialogId),

    /// File references to register (`new_photo_id`) and release
    /// (`old_photo_id`).
    PhotoChanged {
        dialog_id: DialogId,
        old_photo_id: Option<i64>,
        new_photo_id: Option<i64>,
    },

    PermissionsChanged(DialogId),
    AdministratorsChanged(DialogId),
    ContactChanged { user_id: UserId, is_contact: bool },

    /// The dialog can no longer be read; the conversation layer should hide it.
    AccessLost(DialogId),
}

/// Fan-out of events to every live subscriber.
#[derive(Default)]
pub struct EventSink {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Event>>>,
}

impl EventSink {
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn emit(&self, event: Event) {
        tracing::trace!(?event, "emitting event");
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_subscribers_are_dropped() {
        let sink = EventSink::default();
        let mut live = sink.subscribe();
        let closed = sink.subscribe();
        drop(closed);

        sink.emit(Event::UserUpdated(UserId(1)));
        assert_eq!(live.try_recv().unwrap(), Event::UserUpdated(UserId(1)));
        assert_eq!(sink.subscribers.lock().unwrap().len(), 1);
    }
}
