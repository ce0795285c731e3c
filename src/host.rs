//! Host side of the frame protocol.
//!
//! `PreviewHost` owns the bridge frame from the embedding page's point of
//! view: it remembers the last document it wanted shown, numbers builds so a
//! slow one cannot overwrite a newer one, and only listens to the bridge
//! frame's own window.

use crate::bridge::{ConsoleLevel, PreviewMessage};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Opaque identity of a browsing context (a `MessageEvent.source`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    pub generation: u64,
    pub level: ConsoleLevel,
    pub args: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostReaction {
    /// Sender was not the bridge frame or the message was not for the host
    Ignored,
    Acknowledged,
    Loaded,
    /// `preview:loaded` arrived before any acknowledgement; content resent
    Resent,
    ConsoleRecorded,
}

#[derive(Debug)]
pub struct PreviewHost {
    frame_window: WindowId,
    generation: u64,
    desired: Option<String>,
    accepted_generation: Option<u64>,
    loaded_generation: Option<u64>,
    resent_generation: Option<u64>,
    console: Vec<ConsoleEntry>,
    outbox: Vec<PreviewMessage>,
}

impl PreviewHost {
    pub fn new(frame_window: WindowId) -> Self {
        Self {
            frame_window,
            generation: 0,
            desired: None,
            accepted_generation: None,
            loaded_generation: None,
            resent_generation: None,
            console: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn desired_content(&self) -> Option<&str> {
        self.desired.as_deref()
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted_generation == Some(self.generation) && self.generation > 0
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded_generation == Some(self.generation) && self.generation > 0
    }

    pub fn console_entries(&self) -> &[ConsoleEntry] {
        &self.console
    }

    /// Start a build. The returned ticket must be handed back to
    /// [`PreviewHost::complete_build`].
    pub fn begin_build(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Deliver a finished build. Results of superseded builds are dropped.
    pub fn complete_build(&mut self, ticket: u64, html: impl Into<String>) -> bool {
        if ticket != self.generation {
            tracing::debug!(ticket, current = self.generation, "discarded superseded preview build");
            return false;
        }
        self.desired = Some(html.into());
        self.send_desired();
        true
    }

    /// Shorthand for a build that completes immediately.
    pub fn set_content(&mut self, html: impl Into<String>) -> u64 {
        let ticket = self.begin_build();
        self.complete_build(ticket, html);
        ticket
    }

    /// The bridge frame itself (re)loaded; whatever it held is gone.
    pub fn on_frame_load(&mut self) {
        if self.desired.is_some() {
            self.send_desired();
        }
    }

    pub fn on_message(&mut self, sender: WindowId, message: PreviewMessage) -> HostReaction {
        if !self.is_frame(sender) {
            return HostReaction::Ignored;
        }
        match message {
            // Messages carry no generation. An acknowledgement is credited
            // to the current one, which holds while the bridge answers in
            // delivery order.
            PreviewMessage::Accepted => {
                self.accepted_generation = Some(self.generation);
                HostReaction::Acknowledged
            }
            PreviewMessage::Loaded => {
                self.loaded_generation = Some(self.generation);
                let unacknowledged = self.accepted_generation != Some(self.generation);
                let already_resent = self.resent_generation == Some(self.generation);
                if self.desired.is_some() && unacknowledged && !already_resent {
                    self.resent_generation = Some(self.generation);
                    self.send_desired();
                    return HostReaction::Resent;
                }
                HostReaction::Loaded
            }
            PreviewMessage::Console { level, args } => {
                self.console.push(ConsoleEntry {
                    generation: self.generation,
                    level,
                    args,
                });
                HostReaction::ConsoleRecorded
            }
            PreviewMessage::SetPreviewHtml { .. } => HostReaction::Ignored,
        }
    }

    pub fn on_message_json(&mut self, sender: WindowId, raw: &str) -> Result<HostReaction> {
        if !self.is_frame(sender) {
            return Ok(HostReaction::Ignored);
        }
        let message = PreviewMessage::from_json(raw)?;
        Ok(self.on_message(sender, message))
    }

    /// Messages to post to the bridge frame since the last call.
    pub fn take_outbox(&mut self) -> Vec<PreviewMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn is_frame(&self, sender: WindowId) -> bool {
        if sender != self.frame_window {
            tracing::warn!(sender = sender.0, "host ignored message from unknown window");
            return false;
        }
        true
    }

    fn send_desired(&mut self) {
        if let Some(html) = &self.desired {
            self.outbox.push(PreviewMessage::SetPreviewHtml { html: html.clone() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: WindowId = WindowId(7);

    #[test]
    fn test_unknown_sender_ignored() {
        let mut host = PreviewHost::new(FRAME);
        host.set_content("<p>a</p>");
        host.take_outbox();
        assert_eq!(host.on_message(WindowId(99), PreviewMessage::Accepted), HostReaction::Ignored);
        assert!(!host.is_accepted());
        let reaction = host
            .on_message_json(WindowId(99), r#"{"type":"console","level":"log","args":[]}"#)
            .unwrap();
        assert_eq!(reaction, HostReaction::Ignored);
        assert!(host.console_entries().is_empty());
    }

    #[test]
    fn test_superseded_build_discarded() {
        let mut host = PreviewHost::new(FRAME);
        let slow = host.begin_build();
        let fast = host.begin_build();
        assert!(host.complete_build(fast, "<p>new</p>"));
        assert!(!host.complete_build(slow, "<p>old</p>"));
        assert_eq!(host.desired_content(), Some("<p>new</p>"));
        assert_eq!(host.take_outbox().len(), 1);
    }

    #[test]
    fn test_resend_on_frame_reload() {
        let mut host = PreviewHost::new(FRAME);
        host.on_frame_load();
        assert!(host.take_outbox().is_empty());
        host.set_content("<p>a</p>");
        host.take_outbox();
        host.on_frame_load();
        assert_eq!(
            host.take_outbox(),
            vec![PreviewMessage::SetPreviewHtml {
                html: "<p>a</p>".to_string()
            }]
        );
    }

    #[test]
    fn test_loaded_resends_once_per_generation() {
        let mut host = PreviewHost::new(FRAME);
        host.set_content("<p>a</p>");
        host.take_outbox();
        assert_eq!(host.on_message(FRAME, PreviewMessage::Loaded), HostReaction::Resent);
        assert_eq!(host.on_message(FRAME, PreviewMessage::Loaded), HostReaction::Loaded);
        assert_eq!(host.take_outbox().len(), 1);

        host.set_content("<p>b</p>");
        host.take_outbox();
        assert_eq!(host.on_message(FRAME, PreviewMessage::Accepted), HostReaction::Acknowledged);
        assert_eq!(host.on_message(FRAME, PreviewMessage::Loaded), HostReaction::Loaded);
        assert!(host.take_outbox().is_empty());
        assert!(host.is_loaded());
    }

    #[test]
    fn test_acknowledgement_credits_current_generation() {
        let mut host = PreviewHost::new(FRAME);
        host.set_content("<p>a</p>");
        host.set_content("<p>b</p>");
        host.take_outbox();
        assert_eq!(host.on_message(FRAME, PreviewMessage::Accepted), HostReaction::Acknowledged);
        assert!(host.is_accepted());
        assert_eq!(host.on_message(FRAME, PreviewMessage::Loaded), HostReaction::Loaded);
        assert!(host.take_outbox().is_empty());
    }

    #[test]
    fn test_console_entries_tagged_with_generation() {
        let mut host = PreviewHost::new(FRAME);
        host.set_content("<p>a</p>");
        let reaction = host
            .on_message_json(FRAME, r#"{"type":"console","level":"error","args":["boom"]}"#)
            .unwrap();
        assert_eq!(reaction, HostReaction::ConsoleRecorded);
        assert_eq!(
            host.console_entries(),
            &[ConsoleEntry {
                generation: 1,
                level: ConsoleLevel::Error,
                args: vec![serde_json::json!("boom")],
            }]
        );
        assert!(host.on_message_json(FRAME, "{not json").is_err());
    }
}
