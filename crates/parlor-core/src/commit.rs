//! The commit pipeline as a pure function of a record's flags.
//!
//! Mutation code raises `is_changed` (and sometimes `need_save_to_database`
//! directly); [`plan_commit`] turns those flags into the side effects the
//! engine has to perform and returns the drained flags.

use parlor_store::LogEventId;

use crate::records::RecordMeta;

/// Facts about the commit that are not part of the record's flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitContext {
    /// The record was just read from the persistent store.
    pub from_database: bool,
    /// The engine persists records at all.
    pub persist: bool,
    /// The record's `cache_version` is older than the current one.
    pub cache_outdated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    None,
    /// Serialize and start a keyed-store write now.
    Start,
    /// A write is in flight; its completion issues another one.
    Defer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPlan {
    /// Emit the family's "updated" event.
    pub notify: bool,
    pub save: SaveAction,
    /// Schedule a network refetch of the record.
    pub repair: bool,
}

pub fn plan_commit(old: &RecordMeta, ctx: CommitContext) -> (RecordMeta, CommitPlan) {
    let mut meta = old.clone();

    let notify = meta.is_changed;
    // A record read from disk is already persisted unless decoding asked
    // for a rewrite.
    if meta.is_changed && !ctx.from_database {
        meta.need_save_to_database = true;
    }

    let mut save = SaveAction::None;
    if meta.need_save_to_database && ctx.persist {
        if meta.is_being_saved {
            meta.save_pending = true;
            save = SaveAction::Defer;
        } else {
            meta.is_being_saved = true;
            save = SaveAction::Start;
        }
    }

    let mut repair = false;
    if ctx.cache_outdated && !meta.is_repaired {
        meta.is_repaired = true;
        repair = true;
    }

    meta.is_changed = false;
    meta.need_save_to_database = false;

    (
        meta,
        CommitPlan {
            notify,
            save,
            repair,
        },
    )
}

/// What to do once a keyed-store write finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveCompletion {
    /// The record changed while the write was in flight: write it again.
    Resave,
    /// Persisted. The log entry, if any, can go.
    Done { erase_log: Option<LogEventId> },
    /// Failed. The log entry stays for replay.
    Failed,
}

pub fn plan_save_completion(meta: &mut RecordMeta, success: bool) -> SaveCompletion {
    meta.is_being_saved = false;

    if meta.save_pending {
        meta.save_pending = false;
        meta.is_being_saved = true;
        return SaveCompletion::Resave;
    }

    if !success {
        return SaveCompletion::Failed;
    }

    meta.is_saved = true;
    SaveCompletion::Done {
        erase_log: meta.log_event_id.take(),
    }
}
