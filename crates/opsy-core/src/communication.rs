// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use opsy_tools::ExecutedCommand;

/// A narrative progress line published during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Tool the line is about; `None` for the agent's own text.
    pub tool: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(tool: Option<&str>, message: impl Into<String>) -> Self {
        Self { tool: tool.map(str::to_string), message: message.into(), timestamp: Utc::now() }
    }
}

/// Lifecycle of a run.  `Running` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Running,
    Finished,
    Failed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        })
    }
}

/// Write ends of the three event streams.  Each channel is bounded and
/// FIFO; there is no ordering across channels.
#[derive(Debug, Clone)]
pub struct Communication {
    commands: mpsc::Sender<ExecutedCommand>,
    messages: mpsc::Sender<Message>,
    status: mpsc::Sender<Status>,
}

/// Read ends matching a [`Communication`].
#[derive(Debug)]
pub struct CommunicationReceivers {
    pub commands: mpsc::Receiver<ExecutedCommand>,
    pub messages: mpsc::Receiver<Message>,
    pub status: mpsc::Receiver<Status>,
}

/// Create a bus whose channels each hold `capacity` events.
pub fn channel(capacity: usize) -> (Communication, CommunicationReceivers) {
    let capacity = capacity.max(1);
    let (commands_tx, commands) = mpsc::channel(capacity);
    let (messages_tx, messages) = mpsc::channel(capacity);
    let (status_tx, status) = mpsc::channel(capacity);
    (
        Communication { commands: commands_tx, messages: messages_tx, status: status_tx },
        CommunicationReceivers { commands, messages, status },
    )
}

// A closed receiver means the consumer went away; the run carries on.
impl Communication {
    pub async fn command(&self, command: ExecutedCommand) {
        if self.commands.send(command).await.is_err() {
            debug!("command consumer gone, dropping event");
        }
    }

    pub async fn message(&self, message: Message) {
        if self.messages.send(message).await.is_err() {
            debug!("message consumer gone, dropping event");
        }
    }

    pub async fn status(&self, status: Status) {
        if self.status.send(status).await.is_err() {
            debug!(%status, "status consumer gone, dropping event");
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channels_are_fifo_and_independent() {
        let (bus, mut rx) = channel(4);
        bus.message(Message::new(None, "one")).await;
        bus.status(Status::Running).await;
        bus.message(Message::new(Some("exec"), "two")).await;

        assert_eq!(rx.messages.recv().await.unwrap().message, "one");
        let second = rx.messages.recv().await.unwrap();
        assert_eq!(second.message, "two");
        assert_eq!(second.tool.as_deref(), Some("exec"));
        assert_eq!(rx.status.recv().await, Some(Status::Running));
        assert!(rx.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_consumer_does_not_fail_publishing() {
        let (bus, rx) = channel(1);
        drop(rx);
        bus.status(Status::Finished).await;
        bus.message(Message::new(None, "nobody listens")).await;
    }

    #[tokio::test]
    async fn publishing_waits_while_channel_is_full() {
        let (bus, mut rx) = channel(1);
        bus.status(Status::Running).await;

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.status(Status::Finished).await })
        };
        tokio::task::yield_now().await;
        assert!(!publisher.is_finished());

        assert_eq!(rx.status.recv().await, Some(Status::Running));
        publisher.await.unwrap();
        assert_eq!(rx.status.recv().await, Some(Status::Finished));
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!Status::Running.is_terminal());
        assert!(Status::Finished.is_terminal());
        assert!(Status::Failed.is_terminal());
    }
}
