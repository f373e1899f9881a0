//! Expiry of temporary channel restrictions on the current user.

use std::time::Duration;

use parlor_shared::ChannelId;

use crate::engine::{Engine, EngineState};
use crate::propagate::Family;
use crate::records::Channel;

impl Engine {
    /// (Re)arm the timer that lifts our restriction in `channel_id` at
    /// `until_date`. A non-positive date only cancels the current timer.
    pub(crate) fn arm_restriction_timer(
        &self,
        state: &mut EngineState,
        channel_id: ChannelId,
        until_date: i64,
    ) {
        if let Some(timer) = state.restriction_timers.remove(&channel_id) {
            timer.abort();
        }
        if until_date <= 0 {
            return;
        }

        let delay = u64::try_from(until_date - self.inner.clock.unix_time()).unwrap_or(0);
        tracing::debug!(%channel_id, until_date, delay, "Arming restriction timer");
        let engine = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            engine.on_restriction_timeout(channel_id);
        });
        state.restriction_timers.insert(channel_id, task.abort_handle());
    }

    fn on_restriction_timeout(&self, channel_id: ChannelId) {
        let mut state = self.state();
        state.restriction_timers.remove(&channel_id);
        let now = self.inner.clock.unix_time();
        let Some(channel) = state.records.get_mut::<Channel>(channel_id) else {
            return;
        };

        let mut status = channel.status.clone();
        if status.update_restrictions(now) {
            tracing::info!(%channel_id, "Restriction expired");
            channel.set_status(status);
            Channel::commit(self, &mut state, channel_id, false);
        } else if status.until_date() > now {
            // Woke up early.
            self.arm_restriction_timer(&mut state, channel_id, status.until_date());
        }
    }
}
