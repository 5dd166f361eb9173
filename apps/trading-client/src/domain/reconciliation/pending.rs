//! In-flight command table.
//!
//! Maps client-generated provisional command ids to the metadata needed to
//! confirm or roll back the optimistic change they made.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::trading::{CommandId, OrderId, OrderState};

/// Kind of in-flight command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// Optimistic cancel.
    Cancel,
}

/// Metadata for one in-flight command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// Provisional id.
    pub command_id: CommandId,
    /// Target order.
    pub order_id: OrderId,
    /// Command kind.
    pub kind: PendingKind,
    /// When the command was issued.
    pub issued_at: DateTime<Utc>,
    /// Last confirmed state, restored on rollback.
    pub rollback_state: OrderState,
}

/// Table of in-flight commands.
#[derive(Debug, Default)]
pub struct PendingCommands {
    by_id: HashMap<CommandId, PendingCommand>,
}

impl PendingCommands {
    /// Record a command.
    pub fn insert(&mut self, command: PendingCommand) {
        self.by_id.insert(command.command_id.clone(), command);
    }

    /// Remove and return a command.
    pub fn remove(&mut self, command_id: &CommandId) -> Option<PendingCommand> {
        self.by_id.remove(command_id)
    }

    /// Look up a command.
    #[must_use]
    pub fn get(&self, command_id: &CommandId) -> Option<&PendingCommand> {
        self.by_id.get(command_id)
    }

    /// Ids of commands issued at or before `cutoff`, oldest first.
    #[must_use]
    pub fn issued_before(&self, cutoff: DateTime<Utc>) -> Vec<CommandId> {
        let mut stale: Vec<&PendingCommand> = self
            .by_id
            .values()
            .filter(|command| command.issued_at <= cutoff)
            .collect();
        stale.sort_by_key(|command| command.issued_at);
        stale.into_iter().map(|command| command.command_id.clone()).collect()
    }

    /// Number of commands in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true if nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
