//! ============================================================================
//! Conversation - One memory-grounded request/response cycle
//! ============================================================================
//! Retrieves memories, grounds the prompt in them, asks the model, shows the
//! result, then persists the exchange. Memory and generation problems
//! degrade the turn; they never abort it.
//! ============================================================================

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{MemoryError, Result};
use crate::generation::GenerationInvoker;
use crate::memory::{ConversationTurn, MemoryRecord, MemoryStore};

/// Fixed instructions placed ahead of the memory block
pub const SYSTEM_INSTRUCTIONS: &str =
    "You are an assistant that uses short user memories to help answer queries.\nHere are relevant memories for this user (if any):";

/// Memory block text when nothing relevant was retrieved
pub const NO_MEMORIES: &str = "No relevant memories found.";

/// Receives what a turn shows to the user
pub trait TurnDisplay {
    fn show_memories(&mut self, memories: &[String]);

    fn show_response(&mut self, response: &str);

    fn show_saved(&mut self, _saved: bool) {}
}

/// What the memory search contributed to a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLookup {
    Found(usize),
    Empty,
    /// Search failed; the turn ran without memories
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn: ConversationTurn,
    pub memory_lookup: MemoryLookup,
    /// Whether the exchange was persisted
    pub saved: bool,
}

/// Drives conversation turns against a memory store and a model
pub struct ConversationTurnController {
    store: Arc<MemoryStore>,
    invoker: GenerationInvoker,
}

impl ConversationTurnController {
    pub fn new(store: Arc<MemoryStore>, invoker: GenerationInvoker) -> Self {
        Self { store, invoker }
    }

    /// Run one turn for `user_id`
    pub async fn run_turn(
        &self,
        query: &str,
        user_id: &str,
        display: &mut dyn TurnDisplay,
    ) -> Result<TurnOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MemoryError::InvalidInput("query is empty".into()));
        }

        let (records, memory_lookup) = match self.store.search(query, user_id).await {
            Ok(records) if records.is_empty() => {
                debug!("No memories found for user {}", user_id);
                (Vec::new(), MemoryLookup::Empty)
            }
            Ok(records) => {
                debug!("Found {} memories for user {}", records.len(), user_id);
                let found = records.len();
                (records, MemoryLookup::Found(found))
            }
            Err(e) => {
                warn!("Memory search unavailable, continuing without memories: {}", e);
                (Vec::new(), MemoryLookup::Unavailable)
            }
        };

        let memories: Vec<String> = records.iter().map(MemoryRecord::summary).collect();
        display.show_memories(&memories);

        let prompt = self.build_prompt(query, &memories);
        let response = self.invoker.generate(&prompt).await;
        display.show_response(&response);

        let turn = ConversationTurn {
            query: query.to_string(),
            memories,
            response,
        };

        let saved = match self.store.add(user_id, &turn.exchange()).await {
            Ok(record) => {
                info!("Saved turn as memory {}", record.id);
                true
            }
            Err(e) => {
                warn!("Failed to save memory: {}", e);
                false
            }
        };
        display.show_saved(saved);

        Ok(TurnOutcome {
            turn,
            memory_lookup,
            saved,
        })
    }

    /// System instructions, grounding block, then the user query
    pub fn build_prompt(&self, query: &str, memories: &[String]) -> String {
        let grounding = if memories.is_empty() {
            NO_MEMORIES.to_string()
        } else {
            serde_json::to_string_pretty(memories).unwrap_or_else(|_| memories.join("\n"))
        };

        format!(
            "{}\n{}\n\nUser: {}\n\nAssistant:",
            SYSTEM_INSTRUCTIONS, grounding, query
        )
    }
}
