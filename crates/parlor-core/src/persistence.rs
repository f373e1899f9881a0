//! Persistence gateway: write-ahead log, keyed-store saves and loads.
//!
//! Saves for one key never overlap: a commit during an in-flight save only
//! rewrites the log entry and marks the record, and the completion of the
//! in-flight save issues the next one. Loads for one key are coalesced.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use parlor_shared::codec;
use parlor_shared::constants::{
    LOG_EVENT_CHANNEL, LOG_EVENT_CHAT, LOG_EVENT_SECRET_CHAT, LOG_EVENT_USER,
};
use parlor_store::{LogEventId, StoreError};

use crate::commit::{plan_commit, plan_save_completion, CommitContext, SaveAction, SaveCompletion};
use crate::engine::{Engine, EngineState};
use crate::propagate::Family;
use crate::records::{storage_key, Channel, Chat, Entity, SecretChat, User};

impl Engine {
    /// Shared tail of every family commit: drain the flags, persist and
    /// schedule a cache repair as planned. Returns whether the record
    /// changed.
    pub(crate) fn finish_commit<E: Entity>(
        &self,
        state: &mut EngineState,
        id: E::Id,
        from_database: bool,
    ) -> bool {
        let Some(record) = state.records.get_mut::<E>(id) else {
            return false;
        };
        let ctx = CommitContext {
            from_database,
            persist: self.inner.config.use_database,
            cache_outdated: record.cache_version() < E::CACHE_VERSION,
        };
        let (meta, plan) = plan_commit(record.meta(), ctx);
        *record.meta_mut() = meta;

        if plan.save != SaveAction::None {
            match codec::to_bytes(&*record) {
                Ok(data) => {
                    self.write_log_event(id, record);
                    if plan.save == SaveAction::Start {
                        self.spawn_save::<E>(id, data);
                    }
                }
                Err(e) => {
                    tracing::error!(key = %storage_key::<E>(id), error = %e, "Failed to encode record");
                    if plan.save == SaveAction::Start {
                        record.meta_mut().is_being_saved = false;
                    }
                }
            }
        }

        if plan.repair {
            let dialog_id = id.into();
            tracing::info!(%dialog_id, "Cached record is outdated, refetching");
            self.spawn_record_refetch(dialog_id);
        }

        plan.notify
    }

    /// Record the pending write so it survives a crash before the keyed
    /// store has it.
    fn write_log_event<E: Entity>(&self, id: E::Id, record: &mut E) {
        let Some(kind) = E::LOG_EVENT_KIND else {
            return;
        };
        let data = match codec::to_bytes(&(id, &*record)) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(%id, error = %e, "Failed to encode log event");
                return;
            }
        };
        match record.meta().log_event_id {
            Some(log_id) => {
                if let Err(e) = self.inner.log.rewrite(log_id, &data) {
                    tracing::warn!(log_id, error = %e, "Failed to rewrite log event");
                }
            }
            None => match self.inner.log.append(kind, &data) {
                Ok(log_id) => record.meta_mut().log_event_id = Some(log_id),
                Err(e) => tracing::warn!(%id, error = %e, "Failed to append log event"),
            },
        }
    }

    fn spawn_save<E: Entity>(&self, id: E::Id, data: Vec<u8>) {
        let engine = self.clone();
        let key = storage_key::<E>(id);
        tokio::spawn(async move {
            let success = match engine.inner.store.set(&key, Bytes::from(data)).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to save record");
                    false
                }
            };
            engine.on_record_saved::<E>(id, success);
        });
    }

    fn on_record_saved<E: Entity>(&self, id: E::Id, success: bool) {
        let mut state = self.state();
        let Some(record) = state.records.get_mut::<E>(id) else {
            // Dropped while the write was in flight.
            drop(state);
            self.spawn_erase(storage_key::<E>(id));
            return;
        };

        match plan_save_completion(record.meta_mut(), success) {
            SaveCompletion::Resave => match codec::to_bytes(&*record) {
                Ok(data) => self.spawn_save::<E>(id, data),
                Err(e) => {
                    tracing::error!(key = %storage_key::<E>(id), error = %e, "Failed to encode record");
                    record.meta_mut().is_being_saved = false;
                }
            },
            SaveCompletion::Done {
                erase_log: Some(log_id),
            } => {
                if let Err(e) = self.inner.log.erase(log_id) {
                    tracing::warn!(log_id, error = %e, "Failed to erase log event");
                }
            }
            SaveCompletion::Done { erase_log: None } | SaveCompletion::Failed => {}
        }
    }

    pub(crate) fn spawn_erase(&self, key: String) {
        let store = Arc::clone(&self.inner.store);
        tokio::spawn(async move {
            if let Err(e) = store.erase(&key).await {
                tracing::warn!(key = %key, error = %e, "Failed to erase record");
            }
        });
    }

    /// Forget a full record in memory and on disk.
    pub(crate) fn drop_full_record<E: Entity>(&self, state: &mut EngineState, id: E::Id) {
        if state.records.remove::<E>(id).is_none() {
            return;
        }
        tracing::debug!(%id, "Dropped full record");
        if self.inner.config.use_database {
            self.spawn_erase(storage_key::<E>(id));
        }
    }

    fn saves_in_flight(&self) -> usize {
        let state = self.state();
        state.records.saves_in_flight() + state.administrator_saves.len()
    }

    /// Wait until no keyed-store write is in flight.
    pub async fn flush(&self) {
        while self.saves_in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    // ------------------------------------------------------------------
    // Loads
    // ------------------------------------------------------------------

    /// Read a record from the keyed store, once per key and process.
    /// Concurrent callers share a single read; a caller arriving after it
    /// finished returns at once.
    pub(crate) async fn load_from_database<E: Family>(&self, id: E::Id) {
        if !self.inner.config.use_database {
            return;
        }
        let key = storage_key::<E>(id);
        // Marking the key and joining the read happen under one lock, so a
        // caller never sees an attempted load that is not yet in flight.
        let waiter = {
            let mut state = self.state();
            let in_flight = self.inner.loads.is_in_flight(&key);
            if !state.attempted_loads.insert(key.clone()) && !in_flight {
                return;
            }

            let engine = self.clone();
            let load_key = key.clone();
            self.inner.loads.submit(key, move || async move {
                let data = match engine.inner.store.get(&load_key).await {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!(key = %load_key, error = %e, "Failed to load record");
                        None
                    }
                };
                if engine.on_load_from_database::<E>(id, &load_key, data) {
                    if let Err(e) = engine.inner.store.erase(&load_key).await {
                        tracing::warn!(key = %load_key, error = %e, "Failed to erase corrupted record");
                    }
                }
            })
        };
        waiter.wait().await;
    }

    /// Install a loaded record. Returns `true` if the stored bytes were
    /// corrupted and must be erased.
    fn on_load_from_database<E: Family>(&self, id: E::Id, key: &str, data: Option<Bytes>) -> bool {
        let Some(data) = data else {
            tracing::debug!(key, "Record not found in database");
            return false;
        };
        let (mut record, outdated_format) = match E::decode(&data) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::error!(key, error = %e, "Corrupted record in database, erasing");
                return true;
            }
        };

        let mut state = self.state();
        if state
            .records
            .get::<E>(id)
            .is_some_and(|existing| existing.meta().is_received)
        {
            tracing::debug!(key, "Ignoring database copy of a newer record");
            return false;
        }

        let meta = record.meta_mut();
        meta.is_received = true;
        meta.is_saved = true;
        meta.is_changed = true;
        meta.need_save_to_database = outdated_format;
        state.records.insert(id, record);
        E::commit(self, &mut state, id, true);
        false
    }

    // ------------------------------------------------------------------
    // Write-ahead log replay
    // ------------------------------------------------------------------

    /// Re-apply record writes that were logged but may never have reached
    /// the keyed store. Returns the number of entries replayed.
    pub fn replay_log(&self) -> Result<usize, StoreError> {
        let entries = self.inner.log.pending()?;
        let mut replayed = 0;

        for entry in entries {
            let installed = match entry.kind {
                LOG_EVENT_USER => self.replay_log_event::<User>(entry.id, &entry.data),
                LOG_EVENT_CHAT => self.replay_log_event::<Chat>(entry.id, &entry.data),
                LOG_EVENT_CHANNEL => self.replay_log_event::<Channel>(entry.id, &entry.data),
                LOG_EVENT_SECRET_CHAT => {
                    self.replay_log_event::<SecretChat>(entry.id, &entry.data)
                }
                kind => {
                    tracing::error!(log_id = entry.id, kind, "Unknown log event kind, erasing");
                    false
                }
            };

            if installed {
                replayed += 1;
            } else if let Err(e) = self.inner.log.erase(entry.id) {
                tracing::warn!(log_id = entry.id, error = %e, "Failed to erase log event");
            }
        }

        tracing::info!(replayed, "Replayed write-ahead log");
        Ok(replayed)
    }

    fn replay_log_event<E: Family>(&self, log_id: LogEventId, data: &[u8]) -> bool {
        let (id, mut record): (E::Id, E) = match codec::from_bytes(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::error!(log_id, error = %e, "Undecodable log event, erasing");
                return false;
            }
        };
        tracing::debug!(log_id, %id, "Replaying log event");

        let mut state = self.state();
        let meta = record.meta_mut();
        meta.log_event_id = Some(log_id);
        meta.is_received = true;
        meta.is_changed = true;
        meta.need_save_to_database = true;
        state.records.insert(id, record);
        state.attempted_loads.insert(storage_key::<E>(id));
        E::commit(self, &mut state, id, false);
        true
    }
}
