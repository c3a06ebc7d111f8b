//! Draft manager: keyed store `operator → shipment draft`.
//!
//! A draft is created on the operator's first action and discarded once it is
//! committed, aborted or idle past the configured TTL. Each draft sits behind its
//! own mutex; a second action arriving while one is in flight (a commit, typically)
//! is answered with `DraftBusy` instead of waiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, TryLockError};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use depot_core::OperatorId;
use depot_shipping::{DraftError, ShipmentDraft};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("operator {0} has no open draft")]
    NoActiveDraft(OperatorId),

    #[error("draft of operator {0} is busy with another action")]
    DraftBusy(OperatorId),

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error("session store lock poisoned")]
    Poisoned,
}

type Slot = Arc<Mutex<ShipmentDraft>>;

#[derive(Debug)]
pub struct DraftManager {
    drafts: RwLock<HashMap<OperatorId, Slot>>,
    ttl: Duration,
}

impl DraftManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            drafts: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a fresh draft, discarding (never committing) any unfinished one.
    pub fn start(&self, operator: &OperatorId, now: DateTime<Utc>) -> Result<ShipmentDraft, SessionError> {
        let mut drafts = self.drafts.write().map_err(|_| SessionError::Poisoned)?;
        if let Some(previous) = drafts.get(operator) {
            let mut previous = try_lock(previous, operator)?;
            if previous.abort(now).is_ok() {
                tracing::info!(%operator, draft_id = %previous.id(), "unfinished draft discarded");
            }
        }

        let draft = ShipmentDraft::new(operator.clone(), now);
        let view = draft.clone();
        drafts.insert(operator.clone(), Arc::new(Mutex::new(draft)));
        tracing::debug!(%operator, draft_id = %view.id(), "draft started");
        Ok(view)
    }

    /// Run `action` against the operator's open draft.
    ///
    /// Drafts that end up committed or aborted are dropped from the store afterwards.
    pub fn with_draft<R, E>(
        &self,
        operator: &OperatorId,
        action: impl FnOnce(&mut ShipmentDraft) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<SessionError>,
    {
        let slot = self.slot(operator)?.ok_or_else(|| SessionError::NoActiveDraft(operator.clone()))?;
        let (result, finished) = {
            let mut draft = try_lock(&slot, operator)?;
            let result = action(&mut *draft);
            (result, draft.state().is_terminal())
        };

        if finished {
            self.discard(operator, &slot)?;
        }
        result
    }

    /// Like [`with_draft`](Self::with_draft), starting a draft first if none is open.
    pub fn with_draft_or_start<R, E>(
        &self,
        operator: &OperatorId,
        now: DateTime<Utc>,
        action: impl FnOnce(&mut ShipmentDraft) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<SessionError>,
    {
        if self.slot(operator)?.is_none() {
            self.start(operator, now)?;
        }
        self.with_draft(operator, action)
    }

    /// Abort and drop the operator's draft. No stock is touched.
    pub fn cancel(&self, operator: &OperatorId, now: DateTime<Utc>) -> Result<ShipmentDraft, SessionError> {
        self.with_draft(operator, |draft| {
            draft.abort(now)?;
            Ok::<_, SessionError>(draft.clone())
        })
    }

    /// Copy of the operator's open draft.
    pub fn snapshot(&self, operator: &OperatorId) -> Result<Option<ShipmentDraft>, SessionError> {
        match self.slot(operator)? {
            Some(slot) => Ok(Some(try_lock(&slot, operator)?.clone())),
            None => Ok(None),
        }
    }

    pub fn active_count(&self) -> usize {
        self.drafts.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Abort and drop drafts untouched for longer than the TTL. Busy drafts are
    /// skipped; they are by definition not idle.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> Result<Vec<OperatorId>, SessionError> {
        let mut drafts = self.drafts.write().map_err(|_| SessionError::Poisoned)?;
        let mut expired = Vec::new();

        drafts.retain(|operator, slot| {
            let Ok(mut draft) = slot.try_lock() else {
                return true;
            };
            if now - draft.touched_at() <= self.ttl {
                return true;
            }
            let _ = draft.abort(now);
            expired.push(operator.clone());
            false
        });

        for operator in &expired {
            tracing::info!(%operator, "idle draft expired");
        }
        Ok(expired)
    }

    fn slot(&self, operator: &OperatorId) -> Result<Option<Slot>, SessionError> {
        let drafts = self.drafts.read().map_err(|_| SessionError::Poisoned)?;
        Ok(drafts.get(operator).cloned())
    }

    /// Remove `slot` unless a newer draft already replaced it.
    fn discard(&self, operator: &OperatorId, slot: &Slot) -> Result<(), SessionError> {
        let mut drafts = self.drafts.write().map_err(|_| SessionError::Poisoned)?;
        if drafts.get(operator).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            drafts.remove(operator);
        }
        Ok(())
    }
}

fn try_lock<'a>(
    slot: &'a Mutex<ShipmentDraft>,
    operator: &OperatorId,
) -> Result<std::sync::MutexGuard<'a, ShipmentDraft>, SessionError> {
    match slot.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::WouldBlock) => Err(SessionError::DraftBusy(operator.clone())),
        Err(TryLockError::Poisoned(_)) => Err(SessionError::Poisoned),
    }
}
