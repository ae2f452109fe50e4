//! Message routing and session glue.
//!
//! [`CollabSession`] owns one of everything — connection manager, text
//! surface, presence tracker, operation synchronizer — and is the single
//! place inbound frames and local edit notifications meet. Each frame is
//! split into lines, each line parses independently (a bad line is logged
//! and skipped, its siblings still apply), and every parsed message is
//! dispatched through one exhaustive match over the closed
//! [`ServerMessage`] enum.
//!
//! All handlers run to completion before the next event is processed, so no
//! locking discipline is needed around the shared state.

use crate::client::{ClientEvent, CollabClient};
use crate::presence::PresenceTracker;
use crate::protocol::{split_frame, ClientMessage, ProtocolError, ServerMessage};
use crate::surface::{EditError, EditList, TextSurface};
use crate::sync::{operation_from_payload, OperationSync};

/// One participant's whole synchronization session.
pub struct CollabSession<S: TextSurface> {
    client: CollabClient,
    surface: S,
    presence: PresenceTracker,
    sync: OperationSync,
}

impl<S: TextSurface> CollabSession<S> {
    pub fn new(client: CollabClient, surface: S) -> Self {
        Self {
            client,
            surface,
            presence: PresenceTracker::new(),
            sync: OperationSync::new(),
        }
    }

    /// Apply a local edit to the surface and propagate it: remap overlays,
    /// stamp an operation, and hand it to the transport.
    pub fn apply_local_edit(&mut self, edit: &EditList) -> Result<(), EditError> {
        self.surface.apply_edit(edit)?;
        self.note_local_change(edit);
        Ok(())
    }

    /// Notification path for a surface that already applied the edit itself
    /// (the usual widget integration). Overlays are remapped before anything
    /// else from the same batch can add new ones.
    pub fn note_local_change(&mut self, edit: &EditList) {
        self.presence.remap_on_change(edit);

        let self_id = self.client.session().self_id.clone();
        let Some(op) = self.sync.capture_local_change(self_id.as_deref(), edit) else {
            return;
        };
        match edit.to_window(&self.surface.snapshot()) {
            Ok(window) => {
                self.client.send(&ClientMessage::Operation {
                    version: op.base_version,
                    operation: crate::protocol::EditPayload {
                        retain: window.retain,
                        delete: window.delete,
                        insert: window.insert,
                    },
                });
            }
            Err(e) => log::warn!("local change disagrees with document, not sent: {e}"),
        }
    }

    /// Local cursor/selection moved; presence-only message.
    pub fn note_local_selection(&mut self, from: usize, to: usize, cursor: usize) {
        self.client.send(&ClientMessage::Selection { from, to, cursor });
    }

    /// Feed one transport event into the session.
    pub fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connected => {
                log::info!("session connected as '{}'", self.client.session().username);
            }
            ClientEvent::Frame(frame) => self.handle_frame(&frame),
            ClientEvent::Disconnected => {
                log::info!("session disconnected, clearing presence");
                self.presence.reset();
            }
        }
    }

    /// Split a frame and dispatch each line; bad lines are skipped.
    pub fn handle_frame(&mut self, frame: &str) {
        for line in split_frame(frame) {
            match ServerMessage::decode(line) {
                Ok(ServerMessage::Unknown) => {
                    log::warn!("unrecognized message kind, ignoring: {line}");
                }
                Ok(msg) => self.dispatch(msg),
                Err(e) => {
                    log::warn!("skipping malformed frame line: {e}");
                }
            }
        }
    }

    fn dispatch(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome { client_id, version, document } => {
                log::info!("welcome: id={client_id} version={version}");
                self.client.session_mut().self_id = Some(client_id);
                self.sync.set_version(version);
                if let Some(document) = document {
                    if document != self.surface.snapshot() {
                        self.sync.apply_full_document(&document, &mut self.surface);
                    }
                }
            }
            ServerMessage::Operation { client_id, version, operation, updates } => {
                if self.is_self(&client_id) {
                    return;
                }
                let payloads = operation.into_iter().chain(updates.into_iter().flatten());
                for payload in payloads {
                    let op = match operation_from_payload(
                        &client_id,
                        version,
                        &payload,
                        self.surface.len_chars(),
                    ) {
                        Ok(op) => op,
                        Err(e) => {
                            log::warn!("dropping operation from {client_id}: {e}");
                            continue;
                        }
                    };
                    let self_id = self.client.session().self_id.clone();
                    if self.sync.apply_remote_operation(&op, self_id.as_deref(), &mut self.surface)
                    {
                        self.presence.remap_on_change(&op.edit);
                    }
                }
            }
            ServerMessage::Selection { client_id, from, to, cursor } => {
                if self.is_self(&client_id) {
                    return;
                }
                // Unknown participants are ignored, not an error.
                let Some(participant) = self.presence.participant(&client_id) else {
                    log::debug!("selection from unknown participant {client_id}, ignoring");
                    return;
                };
                let username = participant.username.clone();
                self.presence.upsert_cursor(&client_id, cursor, username);
                self.presence.upsert_selection(&client_id, from, to);
            }
            ServerMessage::UserJoined { client_id, username } => {
                if self.is_self(&client_id) {
                    return;
                }
                let username = username.unwrap_or_else(|| client_id.clone());
                self.presence.add_participant(&client_id, username);
            }
            ServerMessage::UserLeft { client_id } => {
                self.presence.remove_participant(&client_id);
            }
            ServerMessage::Users { users } => {
                let self_id = self.client.session().self_id.clone();
                self.presence.replace_roster(
                    users.into_iter().map(|u| (u.client_id, u.username)),
                    self_id.as_deref(),
                );
            }
            // Filtered out in handle_frame; nothing to do here.
            ServerMessage::Unknown => {}
        }
    }

    /// Consume transport events until shutdown, reconnecting with bounded
    /// backoff on unexpected loss.
    pub async fn run(&mut self) -> Result<(), ProtocolError> {
        let mut events = self
            .client
            .take_event_rx()
            .ok_or(ProtocolError::ConnectionClosed)?;
        while let Some(event) = events.recv().await {
            let lost = event == ClientEvent::Disconnected;
            self.handle_event(event);
            if lost {
                if self.client.is_shutdown() {
                    return Ok(());
                }
                self.client.connect_with_retry().await?;
            }
        }
        Ok(())
    }

    fn is_self(&self, client_id: &str) -> bool {
        self.client.session().self_id.as_deref() == Some(client_id)
    }

    pub fn client(&self) -> &CollabClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut CollabClient {
        &mut self.client
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn sync(&self) -> &OperationSync {
        &self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, CollabClient};
    use crate::surface::BufferSurface;

    fn offline_session(doc: &str) -> CollabSession<BufferSurface> {
        let client = CollabClient::new(ClientConfig::default());
        CollabSession::new(client, BufferSurface::new(doc))
    }

    fn welcomed_session(doc: &str, self_id: &str) -> CollabSession<BufferSurface> {
        let mut s = offline_session("");
        s.handle_frame(&format!(
            r#"{{"type":"welcome","clientId":"{self_id}","version":0,"document":{}}}"#,
            serde_json::to_string(doc).unwrap()
        ));
        s
    }

    #[test]
    fn test_welcome_sets_identity_version_and_document() {
        let mut s = offline_session("local draft");
        s.handle_frame(
            r#"{"type":"welcome","clientId":"client_1","version":7,"document":"authoritative"}"#,
        );

        assert_eq!(s.client().session().self_id.as_deref(), Some("client_1"));
        assert_eq!(s.sync().version(), 7);
        assert_eq!(s.surface().text(), "authoritative");
    }

    #[test]
    fn test_welcome_identical_document_untouched() {
        let mut s = offline_session("same");
        s.handle_frame(r#"{"type":"welcome","clientId":"c1","version":2,"document":"same"}"#);
        assert_eq!(s.surface().text(), "same");
        assert_eq!(s.sync().version(), 2);
    }

    #[test]
    fn test_newline_joined_messages_apply_in_order() {
        let mut s = welcomed_session("", "me");
        let frame = concat!(
            r#"{"type":"userJoined","clientId":"a","username":"Alice"}"#,
            "\n",
            r#"{"type":"userJoined","clientId":"b","username":"Bob"}"#
        );
        s.handle_frame(frame);

        assert_eq!(s.presence().participant_count(), 2);
        assert_eq!(s.presence().participant("a").unwrap().username, "Alice");
        assert_eq!(s.presence().participant("b").unwrap().username, "Bob");
    }

    #[test]
    fn test_malformed_line_skipped_rest_applied() {
        let mut s = welcomed_session("", "me");
        let frame = concat!(
            "{broken json\n",
            r#"{"type":"userJoined","clientId":"a","username":"Alice"}"#
        );
        s.handle_frame(frame);
        assert_eq!(s.presence().participant_count(), 1);
    }

    #[test]
    fn test_unknown_kind_ignored() {
        let mut s = welcomed_session("", "me");
        s.handle_frame(r#"{"type":"metrics","clientId":"x"}"#);
        assert_eq!(s.presence().participant_count(), 0);
    }

    #[test]
    fn test_self_echo_operation_is_noop() {
        let mut s = welcomed_session("hello", "me");
        let before = s.sync().version();
        s.handle_frame(
            r#"{"type":"operation","clientId":"me","version":0,"operation":{"retain":0,"delete":5,"insert":"bye"}}"#,
        );
        assert_eq!(s.surface().text(), "hello");
        assert_eq!(s.sync().version(), before);
    }

    #[test]
    fn test_remote_operation_applies_and_remaps_overlays() {
        let mut s = welcomed_session("hello world", "me");
        s.handle_frame(r#"{"type":"userJoined","clientId":"peer","username":"Alice"}"#);
        s.handle_frame(r#"{"type":"selection","clientId":"peer","from":6,"to":11,"cursor":11}"#);

        // Insert "!! " at offset 0 from another peer.
        s.handle_frame(
            r#"{"type":"operation","clientId":"other","version":0,"operation":{"retain":0,"delete":0,"insert":"!! "}}"#,
        );

        assert_eq!(s.surface().text(), "!! hello world");
        let caret = s.presence().overlays().caret("peer").unwrap();
        assert_eq!(caret.pos, 14);
        let hl = s.presence().overlays().highlight("peer").unwrap();
        assert_eq!((hl.from, hl.to), (9, 14));
    }

    #[test]
    fn test_remote_operation_updates_batch() {
        let mut s = welcomed_session("ab", "me");
        s.handle_frame(
            r#"{"type":"operation","clientId":"peer","updates":[{"retain":2,"insert":"c"},{"retain":3,"insert":"d"}]}"#,
        );
        assert_eq!(s.surface().text(), "abcd");
        assert_eq!(s.sync().version(), 2);
    }

    #[test]
    fn test_stale_operation_dropped_document_unchanged() {
        let mut s = welcomed_session("abc", "me");
        s.handle_frame(
            r#"{"type":"operation","clientId":"peer","operation":{"retain":90,"delete":1,"insert":""}}"#,
        );
        assert_eq!(s.surface().text(), "abc");
        assert_eq!(s.sync().version(), 0);
    }

    #[test]
    fn test_selection_for_unknown_participant_ignored() {
        let mut s = welcomed_session("hello", "me");
        s.handle_frame(r#"{"type":"selection","clientId":"ghost","from":1,"to":3,"cursor":3}"#);
        assert!(s.presence().overlays().is_empty());
    }

    #[test]
    fn test_selection_from_self_ignored() {
        let mut s = welcomed_session("hello", "me");
        s.handle_frame(r#"{"type":"selection","clientId":"me","from":1,"to":3,"cursor":3}"#);
        assert!(s.presence().overlays().is_empty());
    }

    #[test]
    fn test_selection_creates_overlays_for_known_participant() {
        let mut s = welcomed_session("hello world", "me");
        s.handle_frame(r#"{"type":"userJoined","clientId":"a","username":"Alice"}"#);
        s.handle_frame(r#"{"type":"selection","clientId":"a","from":0,"to":5,"cursor":5}"#);

        let caret = s.presence().overlays().caret("a").unwrap();
        assert_eq!(caret.pos, 5);
        assert_eq!(caret.username, "Alice");
        assert!(s.presence().overlays().highlight("a").is_some());
    }

    #[test]
    fn test_user_left_removes_roster_and_overlays() {
        let mut s = welcomed_session("hello", "me");
        s.handle_frame(r#"{"type":"userJoined","clientId":"a","username":"Alice"}"#);
        s.handle_frame(r#"{"type":"selection","clientId":"a","from":1,"to":4,"cursor":4}"#);

        s.handle_frame(r#"{"type":"userLeft","clientId":"a"}"#);
        assert_eq!(s.presence().participant_count(), 0);
        assert!(s.presence().overlays().is_empty());
    }

    #[test]
    fn test_users_snapshot_replaces_roster_excluding_self() {
        let mut s = welcomed_session("", "me");
        s.handle_frame(r#"{"type":"userJoined","clientId":"old","username":"Old"}"#);
        s.handle_frame(
            r#"{"type":"users","users":[{"clientId":"me","username":"Self"},{"clientId":"a","username":"Alice"}]}"#,
        );

        assert_eq!(s.presence().participant_count(), 1);
        assert!(s.presence().participant("me").is_none());
        assert!(s.presence().participant("old").is_none());
        assert_eq!(s.presence().participant("a").unwrap().username, "Alice");
    }

    #[test]
    fn test_disconnect_event_clears_presence() {
        let mut s = welcomed_session("hello", "me");
        s.handle_frame(r#"{"type":"userJoined","clientId":"a","username":"Alice"}"#);
        s.handle_frame(r#"{"type":"userJoined","clientId":"b","username":"Bob"}"#);
        s.handle_frame(r#"{"type":"selection","clientId":"a","from":0,"to":2,"cursor":2}"#);

        s.handle_event(ClientEvent::Disconnected);
        assert_eq!(s.presence().participant_count(), 0);
        assert!(s.presence().overlays().is_empty());
    }

    #[test]
    fn test_apply_local_edit_mutates_remaps_and_advances() {
        let mut s = welcomed_session("hello world", "me");
        s.handle_frame(r#"{"type":"userJoined","clientId":"a","username":"Alice"}"#);
        s.handle_frame(r#"{"type":"selection","clientId":"a","from":6,"to":11,"cursor":11}"#);

        let edit = EditList::replacement(0, 0, ">> ", 11).unwrap();
        s.apply_local_edit(&edit).unwrap();

        assert_eq!(s.surface().text(), ">> hello world");
        assert_eq!(s.sync().version(), 1);
        assert_eq!(s.presence().overlays().caret("a").unwrap().pos, 14);
    }

    #[test]
    fn test_identity_local_edit_not_versioned() {
        let mut s = welcomed_session("hello", "me");
        let edit = EditList::from_spans(vec![crate::surface::EditSpan::Retain(5)]);
        s.apply_local_edit(&edit).unwrap();
        assert_eq!(s.sync().version(), 0);
    }
}
