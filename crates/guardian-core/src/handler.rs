//! Request handling — one line of input in, one response out.

use std::sync::Arc;

use tracing::{error, info};

use crate::cycle::Guardian;
use crate::events::GuardianEvent;
use crate::lookup::KnowledgeLookup;
use crate::types::CycleSource;

const SHUTDOWN_WORDS: &[&str] = &["goodbye", "exit", "quit"];
const SEARCH_PREFIX: &str = "search ";
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Dream,
    Search(String),
    Shutdown,
    Status,
}

impl Command {
    /// Case-insensitive match; the first rule that matches wins. Shutdown
    /// words must stand alone, so "quite" or "equity" never end a session.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_lowercase();

        if lower.contains("dream") {
            return Command::Dream;
        }

        if let Some(idx) = lower.find(SEARCH_PREFIX) {
            let start = idx + SEARCH_PREFIX.len();
            // Keep the user's casing when lower-casing did not shift byte offsets.
            let topic = trimmed
                .get(start..)
                .filter(|_| lower.len() == trimmed.len())
                .unwrap_or(&lower[start..])
                .trim();
            if !topic.is_empty() {
                return Command::Search(topic.to_string());
            }
        }

        if lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| SHUTDOWN_WORDS.contains(&word))
        {
            return Command::Shutdown;
        }

        Command::Status
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Command::Shutdown)
    }
}

pub struct RequestHandler {
    guardian: Arc<Guardian>,
    lookup: Arc<dyn KnowledgeLookup>,
}

impl RequestHandler {
    pub fn new(guardian: Arc<Guardian>, lookup: Arc<dyn KnowledgeLookup>) -> Self {
        Self { guardian, lookup }
    }

    /// Run one cycle, then dispatch the parsed command.
    pub async fn handle(&self, input: &str) -> String {
        self.guardian.run_cycle(CycleSource::Request).await;

        let response = match Command::parse(input) {
            Command::Dream => self.dream().await,
            Command::Search(topic) => self.search(&topic).await,
            Command::Shutdown => self.shutdown().await,
            Command::Status => self.status(input).await,
        };

        self.speak(&response).await;
        response
    }

    async fn dream(&self) -> String {
        match self.guardian.force_dream().await {
            Some(_) => "Engaging in dream-state processing.".to_string(),
            None => "Nothing to dream about yet.".to_string(),
        }
    }

    async fn search(&self, topic: &str) -> String {
        info!("Searching for '{}'", topic);
        let found = self.lookup.lookup(topic).await;

        let state = self.guardian.state();
        let mut store = state.lock().await;
        let record = store.record_learning(topic, found.is_some());

        let response = match found {
            Some(content) => {
                let excerpt = excerpt(&content);
                store.learn(topic, content);
                store.remember(format!("Learned about {}", topic));
                format!("Learned about {}: {}", topic, excerpt)
            }
            None => format!("No data found for '{}'.", topic),
        };
        drop(store);

        self.guardian.broadcast(GuardianEvent::Learned(record));
        response
    }

    async fn shutdown(&self) -> String {
        match self.guardian.save().await {
            Ok(()) => "Goodbye. State saved.".to_string(),
            Err(e) => {
                error!("Save on shutdown failed: {}", e);
                "Goodbye. (State could not be saved.)".to_string()
            }
        }
    }

    async fn status(&self, input: &str) -> String {
        let state = self.guardian.state();
        let mut store = state.lock().await;
        let line = input.trim();
        if !line.is_empty() {
            store.remember(line);
        }
        format!(
            "Thinking... Recursive cycle: {} | energy limit {:.2}",
            store.recursion_count(),
            store.energy_limit()
        )
    }

    async fn speak(&self, text: &str) {
        if self.guardian.capabilities().voice.is_none() {
            return;
        }
        let capabilities = self.guardian.capabilities().clone();
        let text = text.to_string();
        if let Err(e) = tokio::task::spawn_blocking(move || capabilities.speak(&text)).await {
            error!("Voice task failed: {}", e);
        }
    }
}

fn excerpt(content: &str) -> String {
    if content.chars().count() > EXCERPT_CHARS {
        let cut: String = content.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut)
    } else {
        content.to_string()
    }
}
