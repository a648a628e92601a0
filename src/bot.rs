//! Bot descriptor consumed by answer assembly.
//!
//! Account management and bot CRUD live in the surrounding service layer;
//! the pipeline only needs the bot's identity and its instruction lines.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::BotId;

/// Minimal bot profile: identity plus the prompt instructions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BotProfile {
    pub id: BotId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// Instruction lines folded into every prompt for this bot.
    pub instructions: Vec<String>,
}

impl BotProfile {
    pub fn new(name: impl Into<String>, instructions: Vec<String>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            slug: slugify(&name),
            name,
            description: None,
            instructions,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Instruction lines joined for prompt assembly.
    pub fn instructions_text(&self) -> String {
        self.instructions.join("\n")
    }
}

/// Derive a URL-safe slug from a display name: lowercase, alphanumerics and
/// hyphens only, runs of whitespace and hyphens collapsed.
pub fn slugify(name: &str) -> String {
    static STRIP: OnceLock<Regex> = OnceLock::new();
    static HYPHENATE: OnceLock<Regex> = OnceLock::new();

    let strip = STRIP.get_or_init(|| Regex::new(r"[^a-z0-9\s-]").expect("literal pattern"));
    let hyphenate = HYPHENATE.get_or_init(|| Regex::new(r"[\s-]+").expect("literal pattern"));

    let lowered = name.to_lowercase();
    let stripped = strip.replace_all(&lowered, "");
    hyphenate
        .replace_all(stripped.trim(), "-")
        .trim_matches('-')
        .to_string()
}
