// ============================
// crates/backend-lib/src/lifecycle.rs
// ============================
//! Match creation and teardown.
//!
//! Every write that touches a match record or a queue status goes through a
//! single conditional commit on the keyed store. Chat session work happens
//! after the commit, outside the atomic boundary, and is idempotent.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use roulette_common::{Match, QueueEntry, QueueStatus, SuccessResponse};
use tracing::{debug, info, warn};

use crate::chats::ChatSessionStore;
use crate::config::{ChatSettings, EndMatchPolicy};
use crate::error::AppError;
use crate::metrics::{MATCH_CONTENDED, MATCH_CREATED, MATCH_DISSOLVED, SESSION_REPAIRED};
use crate::store::{KeyedStore, Mutation, Precondition, Transaction, TxOutcome};

/// Conflicting commits tolerated before a teardown gives up
pub const MAX_CAS_ATTEMPTS: usize = 3;

/// Canonical chat id for a pair, independent of argument order
pub fn chat_id_for(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

/// Result of a match attempt
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Both users are connected; `session_ready` is false when the chat
    /// session could not be created and awaits repair
    Created { chat_id: String, session_ready: bool },
    /// One of the users stopped searching before the commit
    Contended,
}

/// Owns the transactional contract for match records and statuses
pub struct MatchLifecycle {
    keyed: Arc<dyn KeyedStore>,
    chats: Arc<ChatSessionStore>,
    settings: ChatSettings,
}

impl MatchLifecycle {
    pub fn new(
        keyed: Arc<dyn KeyedStore>,
        chats: Arc<ChatSessionStore>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            keyed,
            chats,
            settings,
        }
    }

    /// Record stored under the owner, describing `partner`
    fn record_for(&self, partner: &QueueEntry, chat_id: &str, now: DateTime<Utc>) -> Match {
        let profile = self.settings.denormalize_profile;
        Match {
            partner_uid: partner.uid.clone(),
            partner_name: partner.name.clone(),
            partner_avatar: partner.avatar(),
            chat_id: chat_id.to_string(),
            created_at: now,
            partner_age: profile.then_some(partner.age),
            partner_gender: profile.then(|| partner.gender.clone()),
            partner_interests: profile.then(|| partner.interests.clone()),
        }
    }

    /// Pair two searching users.
    ///
    /// Both statuses flip Searching -> Connected and both match records are
    /// written in one conditional commit. If either user is no longer
    /// searching nothing is written and the outcome is `Contended`.
    pub async fn create_match(
        &self,
        a: &QueueEntry,
        b: &QueueEntry,
    ) -> Result<MatchOutcome, AppError> {
        if a.uid == b.uid {
            return Err(AppError::InvalidArgument(
                "A user cannot be matched with themselves".to_string(),
            ));
        }

        let chat_id = chat_id_for(&a.uid, &b.uid);
        let now = Utc::now();

        let tx = Transaction::new()
            .require(Precondition::StatusIs {
                uid: a.uid.clone(),
                status: QueueStatus::Searching,
            })
            .require(Precondition::StatusIs {
                uid: b.uid.clone(),
                status: QueueStatus::Searching,
            })
            .apply(Mutation::SetStatus {
                uid: a.uid.clone(),
                status: QueueStatus::Connected,
            })
            .apply(Mutation::SetStatus {
                uid: b.uid.clone(),
                status: QueueStatus::Connected,
            })
            .apply(Mutation::PutMatch {
                uid: a.uid.clone(),
                record: self.record_for(b, &chat_id, now),
            })
            .apply(Mutation::PutMatch {
                uid: b.uid.clone(),
                record: self.record_for(a, &chat_id, now),
            });

        if let TxOutcome::Aborted(failed) = self.keyed.commit(tx).await? {
            debug!(a = %a.uid, b = %b.uid, ?failed, "match precondition failed");
            counter!(MATCH_CONTENDED).increment(1);
            return Ok(MatchOutcome::Contended);
        }
        counter!(MATCH_CREATED).increment(1);

        let session_ready = match self.chats.create_session(&chat_id, a, b).await {
            Ok(_) => true,
            Err(e) => {
                warn!(chat_id, error = %e, "match committed without a chat session");
                false
            },
        };

        Ok(MatchOutcome::Created {
            chat_id,
            session_ready,
        })
    }

    /// Remove the match of `uid` together with its partner's.
    ///
    /// The partner's record is only touched when it points back at `uid`;
    /// the partner then returns to Searching. With `reset_owner` the owner
    /// does too. A record created at or after `created_before` is left alone.
    /// Returns the removed record, or `None` if there was nothing to remove.
    pub async fn teardown(
        &self,
        uid: &str,
        reset_owner: bool,
        created_before: Option<DateTime<Utc>>,
    ) -> Result<Option<Match>, AppError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let Some(record) = self.keyed.match_record(uid).await? else {
                return Ok(None);
            };
            if created_before.is_some_and(|t| record.created_at >= t) {
                debug!(uid, chat_id = %record.chat_id, "match is newer than the departure");
                return Ok(None);
            }

            let partner_uid = record.partner_uid.clone();
            let partner = self.keyed.match_record(&partner_uid).await?;
            let points_back = partner
                .as_ref()
                .is_some_and(|p| p.partner_uid == uid && p.chat_id == record.chat_id);

            let mut tx = Transaction::new()
                .require(Precondition::MatchChatIs {
                    uid: uid.to_string(),
                    chat_id: Some(record.chat_id.clone()),
                })
                .require(Precondition::MatchChatIs {
                    uid: partner_uid.clone(),
                    chat_id: partner.as_ref().map(|p| p.chat_id.clone()),
                })
                .apply(Mutation::DeleteMatch {
                    uid: uid.to_string(),
                });
            if reset_owner {
                tx = tx.apply(Mutation::SetStatus {
                    uid: uid.to_string(),
                    status: QueueStatus::Searching,
                });
            }
            if points_back {
                tx = tx
                    .apply(Mutation::DeleteMatch {
                        uid: partner_uid.clone(),
                    })
                    .apply(Mutation::SetStatus {
                        uid: partner_uid.clone(),
                        status: QueueStatus::Searching,
                    });
            } else {
                warn!(uid, partner = %partner_uid, "partner match does not point back");
            }

            match self.keyed.commit(tx).await? {
                TxOutcome::Committed => {
                    counter!(MATCH_DISSOLVED).increment(1);
                    info!(uid, partner = %partner_uid, chat_id = %record.chat_id, "match dissolved");
                    return Ok(Some(record));
                },
                TxOutcome::Aborted(failed) => {
                    debug!(uid, attempt, ?failed, "teardown conflicted, retrying");
                },
            }
        }

        Err(AppError::Internal(format!(
            "teardown of {uid} conflicted {MAX_CAS_ATTEMPTS} times"
        )))
    }

    /// Caller-initiated end of the current match.
    ///
    /// Under the discard policy the temporary session goes first: once the
    /// records are gone both users search again and may be re-paired under
    /// the same chat id, whose fresh session must survive.
    pub async fn end_match(&self, uid: &str) -> Result<SuccessResponse, AppError> {
        let Some(record) = self.keyed.match_record(uid).await? else {
            return Err(AppError::NotFound("No active match".to_string()));
        };

        if self.settings.end_policy == EndMatchPolicy::Discard {
            self.chats.discard_temporary(&record.chat_id).await?;
        }

        self.teardown(uid, true, None)
            .await?
            .ok_or_else(|| AppError::NotFound("No active match".to_string()))?;
        Ok(SuccessResponse::ok())
    }

    /// Current match of `uid`, recreating its chat session if it went missing
    pub async fn current_match(&self, uid: &str) -> Result<Option<Match>, AppError> {
        let Some(record) = self.keyed.match_record(uid).await? else {
            return Ok(None);
        };

        if !self.chats.exists(&record.chat_id).await? {
            let owner = self.keyed.queue_entry(uid).await?;
            let partner = self.keyed.queue_entry(&record.partner_uid).await?;
            if let (Some(owner), Some(partner)) = (owner, partner) {
                self.chats.create_session(&record.chat_id, &owner, &partner).await?;
                counter!(SESSION_REPAIRED).increment(1);
                info!(uid, chat_id = %record.chat_id, "recreated missing chat session");
            }
        }

        Ok(Some(record))
    }
}
