// Per-room message list: optimistic entries, reconciliation and read state.

use crate::record::MessageRecord;
use crate::state::{ChatMessage, MessageContent, MessageStatus, RoomSummary};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LocalMessage {
    pub(crate) id: Option<String>,
    // Kept after confirmation for lookups; never shown once `id` is set.
    pub(crate) temporary_id: Option<String>,
    pub(crate) room_id: String,
    pub(crate) sender_id: String,
    pub(crate) reply_to_id: Option<String>,
    pub(crate) content: MessageContent,
    pub(crate) status: MessageStatus,
    pub(crate) created_at: i64,
    pub(crate) failure_reason: Option<String>,
}

impl LocalMessage {
    fn from_record(record: MessageRecord, temporary_id: Option<String>) -> Self {
        let status = record.confirmed_status();
        let created_at = record.created_at_millis();
        Self {
            id: Some(record.id),
            temporary_id: temporary_id.or(record.temporary_id),
            room_id: record.room_id,
            sender_id: record.sender_id,
            reply_to_id: record.reply_to_id,
            content: MessageContent::from(record.body),
            status,
            created_at,
            failure_reason: None,
        }
    }

    pub(crate) fn project(&self, my_user_id: &str, attempt_count: u32) -> ChatMessage {
        let is_mine = self.sender_id == my_user_id;
        let unconfirmed = self.id.is_none();
        ChatMessage {
            id: self.id.clone(),
            temporary_id: if unconfirmed {
                self.temporary_id.clone()
            } else {
                None
            },
            room_id: self.room_id.clone(),
            sender_id: self.sender_id.clone(),
            reply_to_id: self.reply_to_id.clone(),
            content: self.content.clone(),
            status: self.status,
            created_at: self.created_at,
            is_mine,
            attempt_count,
            can_retry: unconfirmed && self.status == MessageStatus::Failed,
            can_cancel: unconfirmed
                && matches!(self.status, MessageStatus::Failed | MessageStatus::Sending),
            failure_reason: self.failure_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReconcileOutcome {
    /// A local entry was overwritten in place.
    Replaced,
    /// No local entry matched; the record was inserted chronologically.
    Inserted,
    /// The record was already applied.
    Unchanged,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum TimelineError {
    #[error("temporary id {0} already in use")]
    DuplicateTemporaryId(String),
    #[error("optimistic message has no temporary id")]
    MissingTemporaryId,
    #[error("message {0} not found")]
    NotFound(String),
    #[error("illegal status change {from:?} -> {to:?}")]
    IllegalTransition {
        from: MessageStatus,
        to: MessageStatus,
    },
}

#[derive(Debug)]
pub(crate) struct RoomTimeline {
    pub(crate) room_id: String,
    /// Newest first.
    messages: Vec<LocalMessage>,
    pub(crate) can_load_older: bool,
    pub(crate) history_loaded: bool,
    pub(crate) loading_older: bool,
}

impl RoomTimeline {
    pub(crate) fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            messages: vec![],
            can_load_older: true,
            history_loaded: false,
            loading_older: false,
        }
    }

    pub(crate) fn messages(&self) -> &[LocalMessage] {
        &self.messages
    }

    pub(crate) fn position_of_temporary(&self, temporary_id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.temporary_id.as_deref() == Some(temporary_id))
    }

    fn position_of_id(&self, id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.id.as_deref() == Some(id))
    }

    pub(crate) fn get_temporary(&self, temporary_id: &str) -> Option<&LocalMessage> {
        self.position_of_temporary(temporary_id)
            .map(|i| &self.messages[i])
    }

    /// Put a freshly composed message at the head for immediate display.
    pub(crate) fn insert_optimistic(&mut self, message: LocalMessage) -> Result<(), TimelineError> {
        let Some(temporary_id) = message.temporary_id.clone() else {
            return Err(TimelineError::MissingTemporaryId);
        };
        if self.position_of_temporary(&temporary_id).is_some() {
            return Err(TimelineError::DuplicateTemporaryId(temporary_id));
        }
        self.messages.insert(0, message);
        Ok(())
    }

    pub(crate) fn set_status(
        &mut self,
        temporary_id: &str,
        status: MessageStatus,
        failure_reason: Option<String>,
    ) -> Result<(), TimelineError> {
        let idx = self
            .position_of_temporary(temporary_id)
            .ok_or_else(|| TimelineError::NotFound(temporary_id.to_string()))?;
        let msg = &mut self.messages[idx];
        if !msg.status.can_transition_to(status) {
            return Err(TimelineError::IllegalTransition {
                from: msg.status,
                to: status,
            });
        }
        msg.status = status;
        msg.failure_reason = failure_reason;
        Ok(())
    }

    /// Merge a server-confirmed record.
    ///
    /// Lookup order: the temporary id the send was issued with, the id the
    /// backend echoes, then the server id. A matching entry keeps its list
    /// position; delivery state never moves backwards.
    pub(crate) fn reconcile(
        &mut self,
        record: MessageRecord,
        temporary_id: Option<&str>,
    ) -> ReconcileOutcome {
        let by_temporary = temporary_id
            .and_then(|t| self.position_of_temporary(t))
            .or_else(|| {
                record
                    .temporary_id
                    .as_deref()
                    .and_then(|t| self.position_of_temporary(t))
            });
        // The same record may already have landed without a temporary id
        // (history page, push). Keep the optimistic slot and drop that copy.
        let mut copy = None;
        let idx = match by_temporary {
            Some(mut idx) => {
                if let Some(dup) = self.position_of_id(&record.id).filter(|&d| d != idx) {
                    copy = Some(self.messages.remove(dup));
                    if dup < idx {
                        idx -= 1;
                    }
                }
                Some(idx)
            }
            None => self.position_of_id(&record.id),
        };

        match idx {
            Some(idx) => {
                let existing = &self.messages[idx];
                let mut merged =
                    LocalMessage::from_record(record, existing.temporary_id.clone());
                if existing.id.is_some() {
                    merged.status = existing.status.furthest(merged.status);
                }
                if let Some(copy) = &copy {
                    merged.status = copy.status.furthest(merged.status);
                }
                if copy.is_none() && merged == *existing {
                    return ReconcileOutcome::Unchanged;
                }
                self.messages[idx] = merged;
                ReconcileOutcome::Replaced
            }
            None => {
                let msg = LocalMessage::from_record(record, temporary_id.map(str::to_string));
                let at = self
                    .messages
                    .iter()
                    .position(|m| m.created_at < msg.created_at)
                    .unwrap_or(self.messages.len());
                self.messages.insert(at, msg);
                ReconcileOutcome::Inserted
            }
        }
    }

    pub(crate) fn remove_temporary(&mut self, temporary_id: &str) -> Option<LocalMessage> {
        let idx = self.position_of_temporary(temporary_id)?;
        Some(self.messages.remove(idx))
    }

    /// Confirmed incoming messages the current user hasn't read yet.
    pub(crate) fn unread_incoming_ids(&self, my_user_id: &str) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.sender_id != my_user_id)
            .filter(|m| matches!(m.status, MessageStatus::Sent | MessageStatus::Delivered))
            .filter_map(|m| m.id.clone())
            .collect()
    }

    pub(crate) fn mark_read(&mut self, ids: &[String]) -> usize {
        let mut changed = 0;
        for m in self.messages.iter_mut() {
            let Some(id) = m.id.as_deref() else {
                continue;
            };
            if ids.iter().any(|i| i == id) && m.status.can_transition_to(MessageStatus::Read) {
                m.status = MessageStatus::Read;
                changed += 1;
            }
        }
        changed
    }

    pub(crate) fn oldest_confirmed_id(&self) -> Option<String> {
        self.messages.iter().rev().find_map(|m| m.id.clone())
    }

    pub(crate) fn summary(&self, my_user_id: &str) -> RoomSummary {
        let newest = self.messages.first();
        RoomSummary {
            room_id: self.room_id.clone(),
            last_message: newest.map(|m| m.content.preview()),
            last_message_at: newest.map(|m| m.created_at),
            unread_count: self.unread_incoming_ids(my_user_id).len() as u32,
            pending_count: self
                .messages
                .iter()
                .filter(|m| m.id.is_none() && m.status.is_pending())
                .count() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::record::RecordBody;

    fn pending(temp: &str, at: i64) -> LocalMessage {
        LocalMessage {
            id: None,
            temporary_id: Some(temp.to_string()),
            room_id: "room".into(),
            sender_id: "me".into(),
            reply_to_id: None,
            content: MessageContent::Text { text: "Hi".into() },
            status: MessageStatus::Sending,
            created_at: at,
            failure_reason: None,
        }
    }

    fn record(id: &str, sender: &str, temp: Option<&str>, at_ms: i64) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            room_id: "room".into(),
            sender_id: sender.to_string(),
            temporary_id: temp.map(str::to_string),
            reply_to_id: None,
            created_at: Utc.timestamp_millis_opt(at_ms).unwrap(),
            status: MessageStatus::Sent,
            body: RecordBody::Text {
                content: "Hi".into(),
            },
        }
    }

    fn ids(t: &RoomTimeline) -> Vec<String> {
        t.messages()
            .iter()
            .map(|m| m.id.clone().or(m.temporary_id.clone()).unwrap())
            .collect()
    }

    #[test]
    fn optimistic_insert_goes_to_head_and_rejects_duplicates() {
        let mut t = RoomTimeline::new("room");
        t.insert_optimistic(pending("t1", 1_000)).unwrap();
        t.insert_optimistic(pending("t2", 900)).unwrap();
        assert_eq!(ids(&t), vec!["t2", "t1"]);
        assert_eq!(
            t.insert_optimistic(pending("t1", 2_000)),
            Err(TimelineError::DuplicateTemporaryId("t1".into()))
        );
    }

    #[test]
    fn confirmation_replaces_in_place_and_keeps_temporary_id() {
        let mut t = RoomTimeline::new("room");
        t.insert_optimistic(pending("t1", 1_000)).unwrap();
        t.insert_optimistic(pending("t2", 1_001)).unwrap();

        // Server clock says t1 is newer than t2; the list must not jump.
        let out = t.reconcile(record("42", "me", None, 5_000), Some("t1"));
        assert_eq!(out, ReconcileOutcome::Replaced);
        assert_eq!(ids(&t), vec!["t2", "42"]);

        let m = &t.messages()[1];
        assert_eq!(m.status, MessageStatus::Sent);
        assert_eq!(m.created_at, 5_000);
        assert_eq!(m.temporary_id.as_deref(), Some("t1"));
        assert!(m.project("me", 0).temporary_id.is_none());
    }

    #[test]
    fn reconciling_twice_is_a_no_op() {
        let mut t = RoomTimeline::new("room");
        t.insert_optimistic(pending("t1", 1_000)).unwrap();
        let rec = record("42", "me", Some("t1"), 1_200);

        assert_eq!(t.reconcile(rec.clone(), Some("t1")), ReconcileOutcome::Replaced);
        let after_first = t.messages().to_vec();
        assert_eq!(t.reconcile(rec.clone(), Some("t1")), ReconcileOutcome::Unchanged);
        // Same record via push (no temp hint) also matches.
        assert_eq!(t.reconcile(rec, None), ReconcileOutcome::Unchanged);
        assert_eq!(t.messages(), after_first.as_slice());
    }

    #[test]
    fn unknown_records_are_inserted_chronologically() {
        let mut t = RoomTimeline::new("room");
        assert_eq!(
            t.reconcile(record("a", "bob", None, 1_000), None),
            ReconcileOutcome::Inserted
        );
        t.reconcile(record("c", "bob", None, 3_000), None);
        t.reconcile(record("b", "bob", None, 2_000), None);
        t.reconcile(record("z", "bob", None, 500), None);
        assert_eq!(ids(&t), vec!["c", "b", "a", "z"]);
    }

    #[test]
    fn stale_record_does_not_regress_read_state() {
        let mut t = RoomTimeline::new("room");
        t.reconcile(record("a", "bob", None, 1_000), None);
        assert_eq!(t.mark_read(&["a".to_string()]), 1);
        assert_eq!(
            t.reconcile(record("a", "bob", None, 1_000), None),
            ReconcileOutcome::Unchanged
        );
        assert_eq!(t.messages()[0].status, MessageStatus::Read);
    }

    #[test]
    fn confirmation_supersedes_failed_entry() {
        let mut t = RoomTimeline::new("room");
        t.insert_optimistic(pending("t1", 1_000)).unwrap();
        t.set_status("t1", MessageStatus::Failed, Some("timeout".into()))
            .unwrap();
        t.reconcile(record("42", "me", Some("t1"), 1_100), None);
        let m = &t.messages()[0];
        assert_eq!(m.status, MessageStatus::Sent);
        assert_eq!(m.failure_reason, None);
    }

    #[test]
    fn illegal_status_changes_are_refused() {
        let mut t = RoomTimeline::new("room");
        t.insert_optimistic(pending("t1", 1_000)).unwrap();
        t.set_status("t1", MessageStatus::Failed, None).unwrap();
        assert!(matches!(
            t.set_status("t1", MessageStatus::Sent, None),
            Err(TimelineError::IllegalTransition { .. })
        ));
        t.set_status("t1", MessageStatus::Sending, None).unwrap();
        assert_eq!(
            t.set_status("missing", MessageStatus::Sent, None),
            Err(TimelineError::NotFound("missing".into()))
        );
    }

    #[test]
    fn unread_only_counts_confirmed_incoming() {
        let mut t = RoomTimeline::new("room");
        t.reconcile(record("a", "bob", None, 1_000), None);
        t.reconcile(record("b", "me", None, 1_100), None);
        t.insert_optimistic(pending("t1", 1_200)).unwrap();
        assert_eq!(t.unread_incoming_ids("me"), vec!["a".to_string()]);
        let summary = t.summary("me");
        assert_eq!(summary.unread_count, 1);
        assert_eq!(summary.pending_count, 1);
        assert_eq!(summary.last_message.as_deref(), Some("Hi"));
        assert_eq!(t.oldest_confirmed_id().as_deref(), Some("a"));
    }

    #[test]
    fn late_response_merges_with_record_seen_without_temporary_id() {
        let mut t = RoomTimeline::new("room");
        t.reconcile(record("a", "bob", None, 500), None);
        t.insert_optimistic(pending("t1", 1_000)).unwrap();
        t.insert_optimistic(pending("t2", 1_001)).unwrap();

        // Product shares come back without an echoed temporary id.
        let rec = record("42", "me", None, 1_100);
        assert_eq!(t.reconcile(rec.clone(), None), ReconcileOutcome::Inserted);
        assert_eq!(ids(&t), vec!["42", "t2", "t1", "a"]);

        assert_eq!(t.reconcile(rec.clone(), Some("t1")), ReconcileOutcome::Replaced);
        assert_eq!(ids(&t), vec!["t2", "42", "a"]);
        let with_42 = t
            .messages()
            .iter()
            .filter(|m| m.id.as_deref() == Some("42"))
            .count();
        assert_eq!(with_42, 1);

        assert_eq!(t.reconcile(rec, Some("t1")), ReconcileOutcome::Unchanged);
    }

    #[test]
    fn merged_copy_keeps_its_read_state() {
        let mut t = RoomTimeline::new("room");
        t.insert_optimistic(pending("t1", 1_000)).unwrap();
        let rec = record("42", "me", None, 1_100);
        t.reconcile(rec.clone(), None);
        t.mark_read(&["42".to_string()]);

        t.reconcile(rec, Some("t1"));
        assert_eq!(t.messages().len(), 1);
        assert_eq!(t.messages()[0].status, MessageStatus::Read);
    }

    #[test]
    fn cancelled_message_is_removed() {
        let mut t = RoomTimeline::new("room");
        t.insert_optimistic(pending("t1", 1_000)).unwrap();
        assert!(t.remove_temporary("t1").is_some());
        assert!(t.remove_temporary("t1").is_none());
        assert!(t.messages().is_empty());
    }
}
