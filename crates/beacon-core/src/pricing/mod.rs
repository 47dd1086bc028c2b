//! Model pricing tables and cost computation.
//!
//! One JSON table per model family ships inside the binary. Each table maps
//! a canonical model id (plus declared aliases) to per-million-token rates
//! for input, output, cache-read and cache-write. The registry is loaded
//! once and immutable afterwards; unknown models price to `None`.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::warn;

const M_TOK: f64 = 1_000_000.0;

const CLAUDE_TABLE: &str = include_str!("data/claude.json");
const CODEX_TABLE: &str = include_str!("data/codex.json");
const GEMINI_TABLE: &str = include_str!("data/gemini.json");

/// Token counts priced by [`calculate_cost`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenCounts {
    pub input: i64,
    pub output: i64,
    pub cache_read: i64,
    pub cache_write: i64,
}

#[derive(Clone, Copy, Debug)]
struct ModelRates {
    input_per_token: f64,
    output_per_token: f64,
    cache_read_per_token: f64,
    cache_write_per_token: f64,
}

#[derive(Debug, Deserialize)]
struct TableFile {
    models: HashMap<String, TableModel>,
}

#[derive(Debug, Deserialize)]
struct TableModel {
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(rename = "inputCostPerMTok")]
    input_per_m_tok: f64,
    #[serde(rename = "outputCostPerMTok")]
    output_per_m_tok: f64,
    #[serde(rename = "cacheReadCostPerMTok")]
    cache_read_per_m_tok: f64,
    #[serde(rename = "cacheWriteCostPerMTok")]
    cache_write_per_m_tok: f64,
}

#[derive(Debug, Default)]
struct Registry {
    models: HashMap<String, ModelRates>,
    aliases: HashMap<String, String>,
}

impl Registry {
    fn load() -> Self {
        let mut registry = Self::default();
        for table in [CLAUDE_TABLE, CODEX_TABLE, GEMINI_TABLE] {
            match serde_json::from_str::<TableFile>(table) {
                Ok(file) => registry.absorb(file),
                Err(err) => warn!(error = %err, "skipping unparseable pricing table"),
            }
        }
        registry
    }

    fn absorb(&mut self, file: TableFile) {
        for (canonical, model) in file.models {
            let rates = ModelRates {
                input_per_token: model.input_per_m_tok / M_TOK,
                output_per_token: model.output_per_m_tok / M_TOK,
                cache_read_per_token: model.cache_read_per_m_tok / M_TOK,
                cache_write_per_token: model.cache_write_per_m_tok / M_TOK,
            };
            for alias in model.aliases {
                let _ = self.aliases.insert(alias, canonical.clone());
            }
            let _ = self.models.insert(canonical, rates);
        }
    }

    fn lookup(&self, model: &str) -> Option<ModelRates> {
        let normalized = strip_provider_prefix(model);
        if let Some(rates) = self.models.get(normalized) {
            return Some(*rates);
        }
        self.aliases
            .get(normalized)
            .and_then(|canonical| self.models.get(canonical))
            .copied()
    }
}

fn strip_provider_prefix(model: &str) -> &str {
    model
        .trim_start_matches("anthropic/")
        .trim_start_matches("openai/")
        .trim_start_matches("google/")
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::load)
}

/// Price a request against the loaded tables.
///
/// Returns `None` when the model (after provider-prefix and alias
/// resolution) is unknown.
pub fn calculate_cost(model: &str, tokens: TokenCounts) -> Option<f64> {
    let rates = registry().lookup(model)?;
    Some(
        tokens.input as f64 * rates.input_per_token
            + tokens.output as f64 * rates.output_per_token
            + tokens.cache_read as f64 * rates.cache_read_per_token
            + tokens.cache_write as f64 * rates.cache_write_per_token,
    )
}

/// Whether the model resolves to a pricing entry.
pub fn knows_model(model: &str) -> bool {
    registry().lookup(model).is_some()
}

/// Force the tables to load now rather than on the first priced event.
pub fn preload() {
    let _ = registry();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_closed_form() {
        // o3: $2 in, $8 out per MTok.
        let cost = calculate_cost(
            "o3",
            TokenCounts {
                input: 1_000_000,
                output: 500_000,
                ..TokenCounts::default()
            },
        )
        .unwrap();
        assert!((cost - 6.0).abs() < 1e-10);
    }

    #[test]
    fn cache_rates_included() {
        // claude-sonnet-4-5: 3 / 15 / 0.3 / 3.75 per MTok.
        let cost = calculate_cost(
            "claude-sonnet-4-5",
            TokenCounts {
                input: 1_000_000,
                output: 1_000_000,
                cache_read: 1_000_000,
                cache_write: 1_000_000,
            },
        )
        .unwrap();
        assert!((cost - (3.0 + 15.0 + 0.3 + 3.75)).abs() < 1e-10);
    }

    #[test]
    fn alias_resolves_to_canonical() {
        let direct = calculate_cost(
            "o3",
            TokenCounts {
                input: 1_000_000,
                ..TokenCounts::default()
            },
        )
        .unwrap();
        let via_alias = calculate_cost(
            "o3-2025-04-16",
            TokenCounts {
                input: 1_000_000,
                ..TokenCounts::default()
            },
        )
        .unwrap();
        assert!((direct - via_alias).abs() < 1e-12);
        assert!((direct - 2.0).abs() < 1e-10);
    }

    #[test]
    fn provider_prefix_stripped() {
        assert!(knows_model("anthropic/claude-sonnet-4-5"));
        assert!(knows_model("openai/o3"));
        assert!(knows_model("google/gemini-2.5-pro"));
    }

    #[test]
    fn unknown_model_returns_none() {
        let cost = calculate_cost(
            "not-a-model",
            TokenCounts {
                input: 1_000_000,
                ..TokenCounts::default()
            },
        );
        assert!(cost.is_none());
    }

    #[test]
    fn zero_tokens_zero_cost() {
        let cost = calculate_cost("o3", TokenCounts::default()).unwrap();
        assert!(cost.abs() < 1e-12);
    }

    #[test]
    fn tables_cover_all_three_families() {
        assert!(knows_model("claude-3-5-haiku"));
        assert!(knows_model("gpt-5"));
        assert!(knows_model("gemini-2.5-flash"));
    }

    #[test]
    fn dated_claude_alias_resolves() {
        assert!(knows_model("claude-sonnet-4-5-20250929"));
    }
}
