//! Speculative membership changes.
//!
//! A membership change requested by the user is applied to the local
//! counters at once, before the backend acknowledges it. Each backend call
//! leaves a pending effect behind; when the matching delta arrives on the
//! update stream it consumes the effect instead of counting the change a
//! second time. A failed call rolls the speculative change back and
//! refetches the group.

use parlor_shared::{CacheError, ChannelId, ChatId, DialogId, ParticipantStatus, UserId};

use crate::engine::{Engine, EngineState};
use crate::propagate::Family;
use crate::records::{speculative_add_count, Channel, ChannelFull, Chat, ChatFull};

/// The counter buckets a status falls into. Two statuses with the same
/// class have the same effect on a group's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusClass {
    pub is_member: bool,
    pub is_admin: bool,
    pub is_restricted: bool,
    pub is_banned: bool,
}

impl StatusClass {
    pub fn of(status: &ParticipantStatus) -> Self {
        Self {
            is_member: status.is_member(),
            is_admin: status.is_administrator(),
            is_restricted: status.is_restricted(),
            is_banned: status.is_banned(),
        }
    }
}

/// Who caused a speculative change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOrigin {
    /// Requested by us; the update stream will echo it.
    Own,
    /// Learned from the update stream without a matching request.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantAction {
    Add,
    Promote,
    Restrict,
}

/// One backend call, or a pause between two of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantStep {
    Invite,
    EditAdmin(ParticipantStatus),
    EditBanned(ParticipantStatus),
    Settle,
}

impl ParticipantStep {
    fn effect(&self) -> Option<StatusClass> {
        match self {
            ParticipantStep::Invite => Some(StatusClass::of(&ParticipantStatus::Member)),
            ParticipantStep::EditAdmin(status) | ParticipantStep::EditBanned(status) => {
                Some(StatusClass::of(status))
            }
            ParticipantStep::Settle => None,
        }
    }
}

/// Decide which kind of request turns `old` into `new`. `Ok(None)` means
/// there is nothing to do.
pub fn classify_status_change(
    old: &ParticipantStatus,
    new: &ParticipantStatus,
    is_self: bool,
) -> Result<Option<ParticipantAction>, CacheError> {
    if old == new && !new.is_creator() {
        return Ok(None);
    }

    if new.is_creator() || old.is_creator() {
        if !old.is_creator() {
            return Err(CacheError::InvalidArgument("Can't add another owner".into()));
        }
        if !new.is_creator() {
            return Err(CacheError::InvalidArgument("Can't remove chat owner".into()));
        }
        return Ok(Some(if old.is_member() == new.is_member() {
            ParticipantAction::Promote
        } else if new.is_member() {
            ParticipantAction::Add
        } else {
            ParticipantAction::Restrict
        }));
    }

    if new.is_administrator() {
        if is_self {
            return Err(CacheError::InvalidArgument(
                "Can't change own administrator rights".into(),
            ));
        }
        return Ok(Some(ParticipantAction::Promote));
    }

    if !new.is_member() || new.is_restricted() {
        if new.is_member() && !old.is_member() && old.with_member(true) == *new {
            return Ok(Some(ParticipantAction::Add));
        }
        return Ok(Some(ParticipantAction::Restrict));
    }

    // A plain member.
    Ok(Some(if old.is_administrator() {
        ParticipantAction::Promote
    } else if old.is_restricted() || old.is_banned() {
        ParticipantAction::Restrict
    } else {
        ParticipantAction::Add
    }))
}

/// The backend calls that carry out `action`, in order.
pub fn plan_participant_steps(
    action: ParticipantAction,
    old: &ParticipantStatus,
    new: &ParticipantStatus,
    is_self: bool,
) -> Vec<ParticipantStep> {
    match action {
        ParticipantAction::Add => vec![ParticipantStep::Invite],
        ParticipantAction::Promote => vec![ParticipantStep::EditAdmin(new.clone())],
        ParticipantAction::Restrict => {
            if new.is_member() && !old.is_member() {
                vec![
                    ParticipantStep::Invite,
                    ParticipantStep::Settle,
                    ParticipantStep::EditBanned(new.clone()),
                ]
            } else if old.is_member() && *new == ParticipantStatus::Left && !is_self {
                // Kick: ban, then lift the ban.
                vec![
                    ParticipantStep::EditBanned(ParticipantStatus::Banned { until_date: 0 }),
                    ParticipantStep::Settle,
                    ParticipantStep::EditBanned(ParticipantStatus::Left),
                ]
            } else {
                vec![ParticipantStep::EditBanned(new.clone())]
            }
        }
    }
}

impl EngineState {
    pub(crate) fn push_pending_effect(
        &mut self,
        dialog_id: DialogId,
        user_id: UserId,
        effect: StatusClass,
    ) {
        self.pending_effects
            .entry((dialog_id, user_id))
            .or_default()
            .push(effect);
    }

    /// Consume one matching pending effect. Returns `true` if there was one.
    pub(crate) fn take_pending_effect(
        &mut self,
        dialog_id: DialogId,
        user_id: UserId,
        effect: StatusClass,
    ) -> bool {
        let key = (dialog_id, user_id);
        let Some(effects) = self.pending_effects.get_mut(&key) else {
            return false;
        };
        let Some(index) = effects.iter().position(|pending| *pending == effect) else {
            return false;
        };
        effects.remove(index);
        if effects.is_empty() {
            self.pending_effects.remove(&key);
        }
        true
    }
}

fn class_delta(old: bool, new: bool) -> i32 {
    i32::from(new) - i32::from(old)
}

impl Engine {
    /// Move a channel's counters from `old_status` to `new_status`.
    pub(crate) fn speculative_add_channel_user(
        &self,
        state: &mut EngineState,
        channel_id: ChannelId,
        new_status: &ParticipantStatus,
        old_status: &ParticipantStatus,
        origin: EffectOrigin,
    ) {
        let old = StatusClass::of(old_status);
        let new = StatusClass::of(new_status);
        let member_delta = class_delta(old.is_member, new.is_member);

        if member_delta != 0 {
            if let Some(channel) = state.records.get_mut::<Channel>(channel_id) {
                if channel.participant_count != 0 {
                    let mut count = channel.participant_count;
                    if speculative_add_count(&mut count, member_delta, 0) {
                        channel.set_participant_count(count);
                    }
                }
            }
            Channel::commit(self, state, channel_id, false);
        }

        let Some(full) = state.records.get_mut::<ChannelFull>(channel_id) else {
            return;
        };
        let mut changed = speculative_add_count(&mut full.participant_count, member_delta, 0);
        changed |= speculative_add_count(
            &mut full.administrator_count,
            class_delta(old.is_admin, new.is_admin),
            0,
        );
        changed |= speculative_add_count(
            &mut full.restricted_count,
            class_delta(old.is_restricted, new.is_restricted),
            0,
        );
        changed |= speculative_add_count(
            &mut full.banned_count,
            class_delta(old.is_banned, new.is_banned),
            0,
        );
        if !changed {
            return;
        }

        full.speculative_version = full.speculative_version.wrapping_add(1);
        full.meta.is_changed = true;
        tracing::debug!(
            %channel_id,
            participant_count = full.participant_count,
            administrator_count = full.administrator_count,
            ?origin,
            "Applied speculative participant change"
        );
        ChannelFull::commit(self, state, channel_id, false);

        if origin == EffectOrigin::Remote {
            self.request_channel_full_repair(state, channel_id);
        }
    }

    /// Schedule a refetch that confirms speculative counters, unless one
    /// already covers the latest change.
    fn request_channel_full_repair(&self, state: &mut EngineState, channel_id: ChannelId) {
        let dialog_id = DialogId::Channel(channel_id);
        let Some(full) = state.records.get_mut::<ChannelFull>(channel_id) else {
            return;
        };
        if full.repair_request_version >= full.speculative_version
            || self.inner.full_fetches.is_in_flight(&dialog_id)
        {
            return;
        }
        full.repair_request_version = full.speculative_version;
        self.spawn_full_refetch(dialog_id);
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// Change a channel member's status: add, promote, restrict, ban or
    /// remove them. Counters move immediately and are rolled back if the
    /// backend refuses.
    pub async fn change_channel_participant_status(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
        status: ParticipantStatus,
    ) -> Result<(), CacheError> {
        let dialog_id = DialogId::Channel(channel_id);
        let tries = self.inner.config.default_get_tries;
        self.get_record(dialog_id, tries).await?;
        let is_self = user_id == self.my_user_id();

        let my_status = self
            .channel(channel_id)
            .map(|channel| channel.status)
            .ok_or(CacheError::NotFound(dialog_id))?;
        let old_status = if is_self {
            my_status.clone()
        } else {
            self.inner
                .backend
                .get_channel_participant(channel_id, user_id)
                .await
                .map_err(|e| e.into_cache_error(dialog_id))?
        };

        let Some(action) = classify_status_change(&old_status, &status, is_self)? else {
            return Ok(());
        };
        let allowed = match action {
            ParticipantAction::Add => is_self || my_status.can_invite_users(),
            ParticipantAction::Promote => my_status.can_promote_members(),
            ParticipantAction::Restrict => {
                (is_self && !status.is_member()) || my_status.can_restrict_members()
            }
        };
        if !allowed {
            return Err(CacheError::NoAccess(dialog_id));
        }

        let steps = plan_participant_steps(action, &old_status, &status, is_self);
        tracing::debug!(%channel_id, %user_id, ?action, steps = steps.len(), "Changing participant status");
        self.begin_channel_change(channel_id, user_id, &old_status, &status, &steps);

        for step in &steps {
            let backend = &self.inner.backend;
            let result = match step {
                ParticipantStep::Invite => backend.invite_to_channel(channel_id, user_id).await,
                ParticipantStep::EditAdmin(target) => {
                    backend
                        .edit_channel_admin(channel_id, user_id, target.clone())
                        .await
                }
                ParticipantStep::EditBanned(target) => {
                    backend
                        .edit_channel_banned(channel_id, user_id, target.clone())
                        .await
                }
                ParticipantStep::Settle => {
                    tokio::time::sleep(self.inner.config.settle_delay).await;
                    Ok(())
                }
            };
            if let Err(e) = result {
                tracing::warn!(%channel_id, %user_id, error = %e, "Participant change rejected, rolling back");
                self.rollback_channel_change(channel_id, user_id, &old_status, &status, &steps);
                return Err(e.into_cache_error(dialog_id));
            }
        }
        Ok(())
    }

    fn begin_channel_change(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
        old_status: &ParticipantStatus,
        new_status: &ParticipantStatus,
        steps: &[ParticipantStep],
    ) {
        let dialog_id = DialogId::Channel(channel_id);
        let mut state = self.state();
        for effect in steps.iter().filter_map(ParticipantStep::effect) {
            state.push_pending_effect(dialog_id, user_id, effect);
        }
        self.speculative_add_channel_user(
            &mut state,
            channel_id,
            new_status,
            old_status,
            EffectOrigin::Own,
        );
    }

    fn rollback_channel_change(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
        old_status: &ParticipantStatus,
        new_status: &ParticipantStatus,
        steps: &[ParticipantStep],
    ) {
        let dialog_id = DialogId::Channel(channel_id);
        let mut state = self.state();
        for effect in steps.iter().filter_map(ParticipantStep::effect) {
            state.take_pending_effect(dialog_id, user_id, effect);
        }
        self.speculative_add_channel_user(
            &mut state,
            channel_id,
            old_status,
            new_status,
            EffectOrigin::Own,
        );
        self.invalidate_channel_full(&mut state, channel_id);
        self.spawn_full_refetch(dialog_id);
    }

    // ------------------------------------------------------------------
    // Basic groups
    // ------------------------------------------------------------------

    /// Add, promote, demote or remove a basic group member. Basic groups
    /// have no restrictions, so only member, administrator and left are
    /// accepted.
    pub async fn change_chat_participant_status(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        status: ParticipantStatus,
    ) -> Result<(), CacheError> {
        let dialog_id = DialogId::Chat(chat_id);
        if status.is_restricted() || status.is_banned() {
            return Err(CacheError::InvalidArgument(
                "Basic groups have no restricted or banned members".into(),
            ));
        }
        if status.is_creator() {
            return Err(CacheError::InvalidArgument("Can't add another owner".into()));
        }
        let tries = self.inner.config.default_get_tries;
        self.get_record(dialog_id, tries).await?;
        if self.chat_full(chat_id).is_none() {
            self.get_full_record(dialog_id).await?;
        }

        let (my_status, current) = {
            let state = self.state();
            let my_status = state
                .records
                .get::<Chat>(chat_id)
                .map(|chat| chat.status.clone())
                .unwrap_or_default();
            let current = state
                .records
                .get::<ChatFull>(chat_id)
                .and_then(|full| full.participant(user_id))
                .map(|participant| participant.status.clone());
            (my_status, current)
        };

        let Some(change) = plan_chat_change(current.as_ref(), &status)? else {
            return Ok(());
        };
        let allowed = match change {
            ChatChange::Add => my_status.can_invite_users(),
            ChatChange::Promote(_) => my_status.is_creator(),
            ChatChange::Delete => user_id == self.my_user_id() || my_status.can_restrict_members(),
        };
        if !allowed {
            return Err(CacheError::NoAccess(dialog_id));
        }

        let member_delta = change.member_delta();
        self.apply_chat_change(chat_id, user_id, member_delta, true);

        let backend = &self.inner.backend;
        let result = match change {
            ChatChange::Add => backend.add_chat_user(chat_id, user_id).await,
            ChatChange::Promote(is_admin) => backend.edit_chat_admin(chat_id, user_id, is_admin).await,
            ChatChange::Delete => backend.delete_chat_user(chat_id, user_id).await,
        };
        if let Err(e) = result {
            tracing::warn!(%chat_id, %user_id, error = %e, "Group member change rejected, rolling back");
            self.apply_chat_change(chat_id, user_id, -member_delta, false);
            return Err(e.into_cache_error(dialog_id));
        }
        Ok(())
    }

    /// Apply (`begin`) or undo a speculative member count change.
    fn apply_chat_change(&self, chat_id: ChatId, user_id: UserId, member_delta: i32, begin: bool) {
        let dialog_id = DialogId::Chat(chat_id);
        let mut state = self.state();
        let joined = if begin { member_delta > 0 } else { member_delta < 0 };
        let effect = StatusClass::of(if joined {
            &ParticipantStatus::Member
        } else {
            &ParticipantStatus::Left
        });
        if member_delta != 0 {
            if begin {
                state.push_pending_effect(dialog_id, user_id, effect);
            } else {
                state.take_pending_effect(dialog_id, user_id, effect);
            }
            if let Some(chat) = state.records.get_mut::<Chat>(chat_id) {
                if speculative_add_count(&mut chat.participant_count, member_delta, 0) {
                    chat.meta.is_changed = true;
                }
            }
            Chat::commit(self, &mut state, chat_id, false);
        }
        if !begin {
            if let Some(full) = state.records.get_mut::<ChatFull>(chat_id) {
                full.is_up_to_date = false;
            }
            drop(state);
            self.spawn_full_refetch(dialog_id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatChange {
    Add,
    Promote(bool),
    Delete,
}

impl ChatChange {
    fn member_delta(self) -> i32 {
        match self {
            ChatChange::Add => 1,
            ChatChange::Promote(_) => 0,
            ChatChange::Delete => -1,
        }
    }
}

fn plan_chat_change(
    current: Option<&ParticipantStatus>,
    target: &ParticipantStatus,
) -> Result<Option<ChatChange>, CacheError> {
    if !target.is_member() {
        return Ok(current.map(|_| ChatChange::Delete));
    }
    match current {
        None if target.is_administrator() => Err(CacheError::InvalidArgument(
            "Can't promote a user who is not a member".into(),
        )),
        None => Ok(Some(ChatChange::Add)),
        Some(current) if current.is_creator() => {
            Err(CacheError::InvalidArgument("Can't change chat owner rights".into()))
        }
        Some(current) if current.is_administrator() == target.is_administrator() => Ok(None),
        Some(_) => Ok(Some(ChatChange::Promote(target.is_administrator()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_shared::{AdminRights, RestrictedRights};

    fn restricted(is_member: bool) -> ParticipantStatus {
        ParticipantStatus::restricted(is_member, 0, RestrictedRights::none())
    }

    #[test]
    fn test_unchanged_status_is_a_no_op() {
        let result = classify_status_change(&ParticipantStatus::Member, &ParticipantStatus::Member, false);
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_owner_changes() {
        let creator = ParticipantStatus::creator();
        assert!(classify_status_change(&ParticipantStatus::Member, &creator, false).is_err());
        assert!(classify_status_change(&creator, &ParticipantStatus::Member, true).is_err());
        assert_eq!(
            classify_status_change(&creator, &creator, true),
            Ok(Some(ParticipantAction::Promote))
        );
        assert_eq!(
            classify_status_change(&creator, &creator.with_member(false), true),
            Ok(Some(ParticipantAction::Restrict))
        );
    }

    #[test]
    fn test_promotion() {
        let admin = ParticipantStatus::administrator(AdminRights::all());
        assert_eq!(
            classify_status_change(&ParticipantStatus::Member, &admin, false),
            Ok(Some(ParticipantAction::Promote))
        );
        assert!(classify_status_change(&ParticipantStatus::Member, &admin, true).is_err());
        assert_eq!(
            classify_status_change(&admin, &ParticipantStatus::Member, false),
            Ok(Some(ParticipantAction::Promote))
        );
    }

    #[test]
    fn test_add_and_restrict() {
        assert_eq!(
            classify_status_change(&ParticipantStatus::Left, &ParticipantStatus::Member, false),
            Ok(Some(ParticipantAction::Add))
        );
        assert_eq!(
            classify_status_change(&restricted(false), &restricted(true), false),
            Ok(Some(ParticipantAction::Add))
        );
        assert_eq!(
            classify_status_change(&ParticipantStatus::Left, &restricted(true), false),
            Ok(Some(ParticipantAction::Restrict))
        );
        assert_eq!(
            classify_status_change(&ParticipantStatus::Member, &ParticipantStatus::Left, false),
            Ok(Some(ParticipantAction::Restrict))
        );
        assert_eq!(
            classify_status_change(&restricted(true), &ParticipantStatus::Member, false),
            Ok(Some(ParticipantAction::Restrict))
        );
    }

    #[test]
    fn test_kick_is_ban_then_unban() {
        let steps = plan_participant_steps(
            ParticipantAction::Restrict,
            &ParticipantStatus::Member,
            &ParticipantStatus::Left,
            false,
        );
        assert_eq!(
            steps,
            vec![
                ParticipantStep::EditBanned(ParticipantStatus::Banned { until_date: 0 }),
                ParticipantStep::Settle,
                ParticipantStep::EditBanned(ParticipantStatus::Left),
            ]
        );

        let leave = plan_participant_steps(
            ParticipantAction::Restrict,
            &ParticipantStatus::Member,
            &ParticipantStatus::Left,
            true,
        );
        assert_eq!(leave, vec![ParticipantStep::EditBanned(ParticipantStatus::Left)]);
    }

    #[test]
    fn test_restricting_a_new_member_invites_first() {
        let steps = plan_participant_steps(
            ParticipantAction::Restrict,
            &ParticipantStatus::Left,
            &restricted(true),
            false,
        );
        assert_eq!(steps.first(), Some(&ParticipantStep::Invite));
        assert_eq!(steps.get(1), Some(&ParticipantStep::Settle));
        assert_eq!(steps.len(), 3);
    }

    #[test]
    fn test_pending_effects_are_consumed_once() {
        let mut state = EngineState::default();
        let dialog_id = DialogId::Channel(ChannelId(5));
        let member = StatusClass::of(&ParticipantStatus::Member);

        state.push_pending_effect(dialog_id, UserId(2), member);
        assert!(!state.take_pending_effect(dialog_id, UserId(3), member));
        assert!(!state.take_pending_effect(
            dialog_id,
            UserId(2),
            StatusClass::of(&ParticipantStatus::Left)
        ));
        assert!(state.take_pending_effect(dialog_id, UserId(2), member));
        assert!(!state.take_pending_effect(dialog_id, UserId(2), member));
        assert!(state.pending_effects.is_empty());
    }

    #[test]
    fn test_chat_changes() {
        let admin = ParticipantStatus::administrator(AdminRights::all());
        assert_eq!(plan_chat_change(None, &ParticipantStatus::Left), Ok(None));
        assert_eq!(
            plan_chat_change(Some(&ParticipantStatus::Member), &ParticipantStatus::Left),
            Ok(Some(ChatChange::Delete))
        );
        assert_eq!(
            plan_chat_change(None, &ParticipantStatus::Member),
            Ok(Some(ChatChange::Add))
        );
        assert!(plan_chat_change(None, &admin).is_err());
        assert_eq!(
            plan_chat_change(Some(&admin), &ParticipantStatus::Member),
            Ok(Some(ChatChange::Promote(false)))
        );
        assert_eq!(plan_chat_change(Some(&admin), &admin), Ok(None));
        assert!(plan_chat_change(
            Some(&ParticipantStatus::creator()),
            &ParticipantStatus::Member
        )
        .is_err());
    }
}
