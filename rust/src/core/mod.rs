mod allocator;
mod config;
mod dispatch;
mod push;
mod read_tracker;
mod retry;
mod timeline;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::{AppAction, OutgoingPayload};
use crate::record::MessageRecord;
use crate::state::{
    now_millis, AppState, Attachment, ChatViewState, MessageContent, MessageStatus, PollOption,
    SendAlert,
};
use crate::transport::{
    ChatTransport, ErrorClass, HttpTransport, LoopbackTransport, TransportError,
    UnavailableTransport,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use allocator::TemporaryIdAllocator;
use dispatch::{DispatchQueue, PendingSend};
use read_tracker::ReadTracker;
use retry::{RetryController, RetryDecision};
use timeline::{LocalMessage, ReconcileOutcome, RoomTimeline};

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    transport: Arc<dyn ChatTransport>,

    // Actor-internal send pipeline bookkeeping.
    allocator: TemporaryIdAllocator,
    timelines: HashMap<String, RoomTimeline>, // room_id -> messages
    outgoing: HashMap<String, PendingSend>,   // temporary_id -> payload for (re)sends
    dispatch: DispatchQueue,
    retry: RetryController,

    // Chat screen lifecycle.
    open_room: Option<String>,
    chat_focused: bool,
    read_tracker: ReadTracker,
}

fn default_transport(config: &config::AppConfig, user_id: &str) -> Arc<dyn ChatTransport> {
    if !config.network_enabled() {
        return Arc::new(LoopbackTransport::new(user_id));
    }
    let Some(base_url) = config.api_base_url() else {
        tracing::error!("api_base_url not configured; sends will fail");
        return Arc::new(UnavailableTransport::new("api_base_url missing"));
    };
    match HttpTransport::new(
        &base_url,
        config.auth_token.clone(),
        config.request_timeout(),
    ) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            tracing::error!(err = %format!("{e:#}"), "http transport init failed");
            Arc::new(UnavailableTransport::new(format!("{e:#}")))
        }
    }
}

/// What the sender sees before the backend confirms.
fn optimistic_content(payload: &OutgoingPayload) -> MessageContent {
    let local = |path: &String| Attachment {
        url: None,
        local_path: Some(path.clone()),
        mime_type: None,
    };
    match payload {
        OutgoingPayload::Text { text } => MessageContent::Text { text: text.clone() },
        OutgoingPayload::Images { paths, captions } => MessageContent::Image {
            attachments: paths.iter().map(local).collect(),
            captions: captions.clone(),
        },
        OutgoingPayload::Voice { path, duration_ms } => MessageContent::Voice {
            attachment: local(path),
            duration_ms: *duration_ms,
        },
        OutgoingPayload::Poll {
            question,
            options,
            allow_multiple,
        } => MessageContent::Poll {
            question: question.clone(),
            options: options
                .iter()
                .map(|text| PollOption {
                    id: None,
                    text: text.clone(),
                    votes: 0,
                })
                .collect(),
            allow_multiple: *allow_multiple,
        },
        OutgoingPayload::Product { product_id } => MessageContent::Product {
            product_id: product_id.clone(),
            name: None,
            price: None,
            image_url: None,
        },
    }
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: &str,
        user_id: String,
        shared_state: Arc<RwLock<AppState>>,
        transport: Option<Arc<dyn ChatTransport>>,
    ) -> Self {
        let config = config::load_app_config(data_dir);
        let state = AppState::empty(user_id.clone());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let transport = transport.unwrap_or_else(|| default_transport(&config, &user_id));
        let retry = RetryController::new(config.retry_max_attempts(), config.retry_base());

        let mut this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            transport,
            allocator: TemporaryIdAllocator::new(),
            timelines: HashMap::new(),
            outgoing: HashMap::new(),
            dispatch: DispatchQueue::default(),
            retry,
            open_room: None,
            chat_focused: false,
            read_tracker: ReadTracker::default(),
        };

        // Ensure ChatApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this.start_push_channel();
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_current_chat(&mut self) {
        self.refresh_room_summaries();
        self.refresh_current_chat();
        self.emit_state();
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Keep toast in state until the UI explicitly clears it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    fn refresh_room_summaries(&mut self) {
        let me = self.state.user_id.as_str();
        let mut rooms: Vec<_> = self.timelines.values().map(|t| t.summary(me)).collect();
        rooms.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| a.room_id.cmp(&b.room_id))
        });
        self.state.rooms = rooms;
    }

    fn refresh_current_chat(&mut self) {
        let Some(room_id) = self.open_room.clone() else {
            self.state.current_chat = None;
            return;
        };
        let me = self.state.user_id.as_str();
        let view = match self.timelines.get(&room_id) {
            Some(t) => ChatViewState {
                room_id,
                messages: t
                    .messages()
                    .iter()
                    .map(|m| {
                        let attempts = m
                            .temporary_id
                            .as_deref()
                            .map(|tmp| self.retry.attempt_count(tmp))
                            .unwrap_or(0);
                        m.project(me, attempts)
                    })
                    .collect(),
                is_focused: self.chat_focused,
                can_load_older: t.can_load_older,
                loading_older: t.loading_older,
            },
            None => ChatViewState {
                room_id,
                messages: vec![],
                is_focused: self.chat_focused,
                can_load_older: true,
                loading_older: false,
            },
        };
        self.state.current_chat = Some(view);
    }

    fn timeline_mut(&mut self, room_id: &str) -> &mut RoomTimeline {
        self.timelines
            .entry(room_id.to_string())
            .or_insert_with(|| RoomTimeline::new(room_id))
    }

    fn clear_alert_for(&mut self, temporary_id: &str) {
        if self
            .state
            .alert
            .as_ref()
            .is_some_and(|a| a.temporary_id == temporary_id)
        {
            self.state.alert = None;
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it carries message content.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Chat screen lifecycle
            AppAction::OpenChat { room_id } => {
                if let Some(prev) = self.open_room.clone() {
                    if prev != room_id {
                        self.close_room(&prev);
                    }
                }
                self.open_room = Some(room_id.clone());
                let timeline = self.timeline_mut(&room_id);
                let needs_history = !timeline.history_loaded && !timeline.loading_older;
                if needs_history {
                    timeline.loading_older = true;
                }
                self.emit_current_chat();
                if needs_history {
                    let limit = self.config.page_size();
                    self.fetch_history(&room_id, limit, None, false);
                }
            }
            AppAction::CloseChat { room_id } => {
                if self.open_room.as_deref() != Some(room_id.as_str()) {
                    return;
                }
                self.close_room(&room_id);
                self.open_room = None;
                self.emit_current_chat();
            }
            AppAction::ChatFocused { room_id } => {
                if self.open_room.as_deref() != Some(room_id.as_str()) {
                    tracing::debug!(%room_id, "focus for a chat that isn't open");
                    return;
                }
                self.chat_focused = true;
                self.arm_read_debounce(&room_id);
                self.emit_current_chat();
            }
            AppAction::ChatBlurred { room_id } => {
                if self.open_room.as_deref() != Some(room_id.as_str()) {
                    return;
                }
                self.chat_focused = false;
                self.read_tracker.disarm();
                self.emit_current_chat();
            }
            AppAction::LoadOlderMessages { room_id, limit } => {
                let Some(timeline) = self.timelines.get_mut(&room_id) else {
                    return;
                };
                if timeline.loading_older || !timeline.can_load_older {
                    return;
                }
                // Nothing confirmed yet means the first page hasn't landed.
                let Some(cursor) = timeline.oldest_confirmed_id() else {
                    return;
                };
                timeline.loading_older = true;
                let limit = if limit == 0 {
                    self.config.page_size()
                } else {
                    limit
                };
                self.emit_current_chat();
                self.fetch_history(&room_id, limit, Some(cursor), true);
            }

            // Sending
            AppAction::SendMessage {
                room_id,
                payload,
                reply_to_id,
            } => {
                if let Err(reason) = payload.validate() {
                    self.toast(reason);
                    return;
                }
                let payload = payload.normalized();
                let temporary_id = self.allocator.next_id();
                let message = LocalMessage {
                    id: None,
                    temporary_id: Some(temporary_id.clone()),
                    room_id: room_id.clone(),
                    sender_id: self.state.user_id.clone(),
                    reply_to_id: reply_to_id.clone(),
                    content: optimistic_content(&payload),
                    status: MessageStatus::Sending,
                    created_at: now_millis(),
                    failure_reason: None,
                };
                let kind = message.content.kind();
                if let Err(e) = self.timeline_mut(&room_id).insert_optimistic(message) {
                    tracing::error!(%e, %temporary_id, "optimistic insert refused");
                    return;
                }
                tracing::info!(%room_id, %temporary_id, ?kind, "message allocated");

                self.outgoing.insert(
                    temporary_id.clone(),
                    PendingSend {
                        room_id: room_id.clone(),
                        payload,
                        reply_to_id,
                    },
                );
                self.retry.begin(&temporary_id, &room_id);
                self.emit_current_chat();
                self.start_dispatch(&temporary_id);
            }
            AppAction::RetryMessage {
                room_id,
                temporary_id,
            } => {
                let retryable = self
                    .timelines
                    .get(&room_id)
                    .and_then(|t| t.get_temporary(&temporary_id))
                    .is_some_and(|m| m.id.is_none() && m.status == MessageStatus::Failed);
                if !retryable || !self.outgoing.contains_key(&temporary_id) {
                    self.toast("Nothing to retry");
                    return;
                }
                if !self.retry.reset_for_manual_retry(&temporary_id) {
                    self.retry.begin(&temporary_id, &room_id);
                }
                if let Err(e) =
                    self.timeline_mut(&room_id)
                        .set_status(&temporary_id, MessageStatus::Sending, None)
                {
                    tracing::error!(%e, %temporary_id, "manual retry refused");
                    return;
                }
                tracing::info!(%room_id, %temporary_id, "manual retry");
                self.clear_alert_for(&temporary_id);
                self.emit_current_chat();
                self.start_dispatch(&temporary_id);
            }
            AppAction::CancelMessage {
                room_id,
                temporary_id,
                confirmed,
            } => {
                let status = self
                    .timelines
                    .get(&room_id)
                    .and_then(|t| t.get_temporary(&temporary_id))
                    .filter(|m| m.id.is_none())
                    .map(|m| m.status);
                match status {
                    Some(MessageStatus::Failed) => {}
                    Some(MessageStatus::Sending) if confirmed => {}
                    Some(MessageStatus::Sending) => {
                        self.toast("Message is still sending. Confirm to discard it.");
                        return;
                    }
                    _ => {
                        self.toast("Nothing to cancel");
                        return;
                    }
                }
                self.discard_outgoing(&temporary_id);
                self.timeline_mut(&room_id).remove_temporary(&temporary_id);
                tracing::info!(%room_id, %temporary_id, "message cancelled");
                self.clear_alert_for(&temporary_id);
                self.emit_current_chat();
            }

            // UI
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
            AppAction::ClearAlert => {
                if self.state.alert.is_some() {
                    self.state.alert = None;
                    self.emit_state();
                }
            }

            // Lifecycle
            AppAction::Foregrounded => {
                if !self.chat_focused {
                    return;
                }
                if let Some(room_id) = self.open_room.clone() {
                    if !self.read_tracker.is_armed_for(&room_id) {
                        self.arm_read_debounce(&room_id);
                    }
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::DispatchFinished {
                room_id,
                temporary_id,
                result,
            } => {
                self.dispatch.finish(&temporary_id);
                match result {
                    Ok(record) => self.handle_send_confirmed(&room_id, &temporary_id, record),
                    Err(e) => self.handle_send_failure(&room_id, &temporary_id, e),
                }
            }
            InternalEvent::BackoffElapsed {
                temporary_id,
                token,
            } => {
                if !self.retry.timer_fired(&temporary_id, token) {
                    tracing::debug!(%temporary_id, token, "stale backoff timer");
                    return;
                }
                tracing::info!(
                    %temporary_id,
                    attempt = self.retry.attempt_count(&temporary_id),
                    "retrying send"
                );
                self.emit_current_chat();
                self.start_dispatch(&temporary_id);
            }
            InternalEvent::ReadDebounceElapsed { room_id, token } => {
                if !self.read_tracker.fire(&room_id, token) {
                    return;
                }
                if !self.chat_focused || self.open_room.as_deref() != Some(room_id.as_str()) {
                    return;
                }
                let unread = self
                    .timelines
                    .get(&room_id)
                    .map(|t| t.unread_incoming_ids(&self.state.user_id))
                    .unwrap_or_default();
                let message_ids = self.read_tracker.claim(unread);
                if message_ids.is_empty() {
                    return;
                }
                self.send_mark_as_read(room_id, message_ids);
            }
            InternalEvent::MarkReadFinished {
                room_id,
                message_ids,
                result,
            } => {
                self.read_tracker.release(&message_ids);
                match result {
                    Ok(()) => {
                        let changed = self
                            .timelines
                            .get_mut(&room_id)
                            .map(|t| t.mark_read(&message_ids))
                            .unwrap_or(0);
                        tracing::debug!(%room_id, count = message_ids.len(), changed, "marked read");
                        if changed > 0 {
                            self.emit_current_chat();
                        }
                    }
                    Err(e) => {
                        // Ids stay unread and are picked up by the next focus.
                        tracing::warn!(%e, %room_id, "mark as read failed");
                    }
                }
            }
            InternalEvent::HistoryFetched {
                room_id,
                limit,
                older,
                result,
            } => self.handle_history(&room_id, limit, older, result),
            InternalEvent::PushReceived(record) => self.handle_push(record),
        }
    }

    fn start_dispatch(&mut self, temporary_id: &str) {
        let Some(pending) = self.outgoing.get(temporary_id).cloned() else {
            return;
        };
        if !self.dispatch.try_begin(temporary_id) {
            tracing::debug!(%temporary_id, "dispatch already in flight");
            return;
        }
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let tmp = temporary_id.to_string();
        let handle = self.runtime.spawn(async move {
            let result = dispatch::send_once(transport.as_ref(), &tmp, &pending).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::DispatchFinished {
                    room_id: pending.room_id,
                    temporary_id: tmp,
                    result,
                },
            )));
        });
        self.dispatch.attach(temporary_id, handle.abort_handle());
    }

    fn handle_send_confirmed(&mut self, room_id: &str, temporary_id: &str, record: MessageRecord) {
        tracing::info!(%room_id, %temporary_id, id = %record.id, "message confirmed");
        self.outgoing.remove(temporary_id);
        self.retry.discard(temporary_id);
        let Some(timeline) = self.timelines.get_mut(room_id) else {
            return;
        };
        if timeline.position_of_temporary(temporary_id).is_none() {
            // Cancelled while the request was already on the wire.
            tracing::debug!(%temporary_id, "confirmation for a cancelled message");
            return;
        }
        if timeline.reconcile(record, Some(temporary_id)) != ReconcileOutcome::Unchanged {
            self.clear_alert_for(temporary_id);
            self.emit_current_chat();
        }
    }

    fn handle_send_failure(&mut self, room_id: &str, temporary_id: &str, err: TransportError) {
        if !self.outgoing.contains_key(temporary_id) {
            tracing::debug!(%temporary_id, %err, "failure for a message no longer pending");
            return;
        }
        let already_confirmed = self
            .timelines
            .get(room_id)
            .and_then(|t| t.get_temporary(temporary_id))
            .is_some_and(|m| m.id.is_some());
        if already_confirmed {
            // The push channel delivered the confirmation first; re-sending would duplicate.
            self.discard_outgoing(temporary_id);
            return;
        }

        if err.class() == ErrorClass::Network && self.open_room.as_deref() != Some(room_id) {
            // Chat is closed; no timers for an unmounted screen.
            self.retry.pause(temporary_id, err.class());
            tracing::info!(%room_id, %temporary_id, %err, "send failed after close, paused");
            self.fail_message(room_id, temporary_id, "Sending paused".to_string());
            return;
        }

        match self.retry.on_failure(temporary_id, err.class()) {
            RetryDecision::Backoff { delay, token } => {
                tracing::warn!(
                    %temporary_id,
                    %err,
                    attempt = self.retry.attempt_count(temporary_id),
                    next_delay = ?self.retry.get(temporary_id).and_then(|s| s.next_delay),
                    "send failed, backing off"
                );
                let tx = self.core_sender.clone();
                let tmp = temporary_id.to_string();
                let handle = self.runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::BackoffElapsed {
                        temporary_id: tmp,
                        token,
                    })));
                });
                self.retry
                    .arm_timer(temporary_id, token, handle.abort_handle());
            }
            RetryDecision::Exhausted { attempts } => {
                tracing::warn!(%temporary_id, %err, attempts, "send failed, retries exhausted");
                self.fail_message(room_id, temporary_id, format!("Not sent: {err}"));
            }
            RetryDecision::Surface => {
                let alert = SendAlert {
                    room_id: room_id.to_string(),
                    temporary_id: temporary_id.to_string(),
                    summary: err.to_string(),
                    issues: err.issues().to_vec(),
                };
                tracing::warn!(
                    %temporary_id,
                    %err,
                    last_error = ?self.retry.get(temporary_id).and_then(|s| s.last_error),
                    "send rejected"
                );
                let reason = alert.lines().join("\n");
                self.state.alert = Some(alert);
                self.fail_message(room_id, temporary_id, reason);
            }
        }
    }

    fn fail_message(&mut self, room_id: &str, temporary_id: &str, reason: String) {
        if let Err(e) =
            self.timeline_mut(room_id)
                .set_status(temporary_id, MessageStatus::Failed, Some(reason))
        {
            tracing::warn!(%e, %temporary_id, "could not mark message failed");
        }
        self.emit_current_chat();
    }

    /// Forget a pending send: payload, retry state, timers and any in-flight request.
    fn discard_outgoing(&mut self, temporary_id: &str) {
        self.outgoing.remove(temporary_id);
        self.retry.discard(temporary_id);
        self.dispatch.cancel(temporary_id);
    }

    fn close_room(&mut self, room_id: &str) {
        self.chat_focused = false;
        self.read_tracker.disarm();
        for temporary_id in self.retry.waiting_in_room(room_id) {
            if self.retry.interrupt(&temporary_id) {
                tracing::info!(%room_id, %temporary_id, "backoff cancelled on close");
                if let Err(e) = self.timeline_mut(room_id).set_status(
                    &temporary_id,
                    MessageStatus::Failed,
                    Some("Sending paused".to_string()),
                ) {
                    tracing::warn!(%e, %temporary_id, "could not pause message");
                }
            }
        }
    }

    /// Arrivals join a pending window; only focus events restart it.
    fn ensure_read_debounce(&mut self, room_id: &str) {
        if !self.chat_focused || self.open_room.as_deref() != Some(room_id) {
            return;
        }
        if !self.read_tracker.is_armed_for(room_id) {
            self.arm_read_debounce(room_id);
        }
    }

    fn arm_read_debounce(&mut self, room_id: &str) {
        let token = self.read_tracker.arm(room_id);
        let delay = self.config.read_debounce();
        let tx = self.core_sender.clone();
        let room = room_id.to_string();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ReadDebounceElapsed {
                    room_id: room,
                    token,
                },
            )));
        });
        self.read_tracker.attach(token, handle.abort_handle());
    }

    fn send_mark_as_read(&mut self, room_id: String, message_ids: Vec<String>) {
        tracing::info!(%room_id, count = message_ids.len(), "mark as read");
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let user_id = self.state.user_id.clone();
        self.runtime.spawn(async move {
            let result = transport
                .mark_as_read(&room_id, &user_id, &message_ids)
                .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::MarkReadFinished {
                    room_id,
                    message_ids,
                    result,
                },
            )));
        });
    }

    fn fetch_history(&mut self, room_id: &str, limit: u32, cursor: Option<String>, older: bool) {
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        let room = room_id.to_string();
        self.runtime.spawn(async move {
            let result = transport
                .fetch_messages(&room, limit, cursor.as_deref())
                .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::HistoryFetched {
                room_id: room,
                limit,
                older,
                result,
            })));
        });
    }

    fn handle_history(
        &mut self,
        room_id: &str,
        limit: u32,
        older: bool,
        result: Result<Vec<MessageRecord>, TransportError>,
    ) {
        let me = self.state.user_id.clone();
        let timeline = self.timeline_mut(room_id);
        timeline.loading_older = false;
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(%e, %room_id, older, "history fetch failed");
                self.refresh_current_chat();
                self.toast(format!("Couldn't load messages: {e}"));
                return;
            }
        };

        let fetched = records.len();
        let mut incoming = 0usize;
        for record in records {
            let from_other = record.sender_id != me;
            if timeline.reconcile(record, None) == ReconcileOutcome::Inserted && from_other {
                incoming += 1;
            }
        }
        timeline.history_loaded = true;
        if (fetched as u32) < limit {
            timeline.can_load_older = false;
        }
        tracing::debug!(%room_id, fetched, incoming, older, "history page applied");

        if incoming > 0 {
            self.ensure_read_debounce(room_id);
        }
        self.emit_current_chat();
    }

    fn handle_push(&mut self, record: MessageRecord) {
        let room_id = record.room_id.clone();
        let from_other = record.sender_id != self.state.user_id;
        let own_pending = record
            .temporary_id
            .clone()
            .filter(|t| self.outgoing.contains_key(t));

        let outcome = self.timeline_mut(&room_id).reconcile(record, None);
        tracing::debug!(%room_id, from_other, ?outcome, "push record");

        if let Some(temporary_id) = own_pending {
            // Confirmed out of band. An in-flight request finishes the bookkeeping itself.
            if !self.dispatch.is_in_flight(&temporary_id) {
                self.discard_outgoing(&temporary_id);
                self.clear_alert_for(&temporary_id);
            }
        }
        if outcome == ReconcileOutcome::Unchanged {
            return;
        }
        if from_other {
            self.ensure_read_debounce(&room_id);
        }
        self.emit_current_chat();
    }
}

impl Drop for AppCore {
    fn drop(&mut self) {
        self.dispatch.clear();
        self.retry.clear();
        self.read_tracker.clear();
    }
}
