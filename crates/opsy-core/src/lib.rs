// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
mod error;
mod communication;
mod conversation;
mod agent;

pub use error::AgentError;
pub use communication::{channel, Communication, CommunicationReceivers, Message, Status};
pub use conversation::Conversation;
pub use agent::{Agent, AgentState, RunReport};
