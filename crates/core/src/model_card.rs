//! Model cards: what a model supports and what it costs.
//!
//! Prices are in USD per 1 million tokens. The catalog ships with built-in
//! cards for the OpenAI models in common use; custom cards can be added from
//! `[[models]]` entries in config.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ModelError;
use crate::message::{Message, Modality, Usage};

/// Arguments an OpenAI chat model accepts from agent configuration.
pub const OPENAI_ARGS: &[&str] = &[
    "temperature",
    "max_completion_tokens",
    "max_tokens",
    "presence_penalty",
    "frequency_penalty",
    "reasoning_effort",
    "response_format",
    "tools",
    "tool_choice",
    "logit_bias",
    "logprobs",
    "top_logprobs",
    "seed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    FunctionCall,
    StructuredOutput,
    Streaming,
    Finetuning,
    Distillation,
    PredictedOutput,
    Classification,
}

/// A dated, pinned version of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    /// `YYYY-MM-DD`
    pub date: String,
}

impl Snapshot {
    pub fn new(name: impl Into<String>, date: impl Into<String>) -> Self {
        Self { name: name.into(), date: date.into() }
    }

    pub fn parsed_date(&self) -> Result<NaiveDate, ModelError> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|_| ModelError::InvalidSnapshotDate(self.date.clone()))
    }
}

/// Token counts and USD cost of one or more completions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionCost {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_prompt_tokens: u64,
    pub cost: f64,
}

impl std::ops::Add for CompletionCost {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            cached_prompt_tokens: self.cached_prompt_tokens + rhs.cached_prompt_tokens,
            cost: self.cost + rhs.cost,
        }
    }
}

impl std::iter::Sum for CompletionCost {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, c| acc + c)
    }
}

impl std::fmt::Display for CompletionCost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Prompt tokens: {}, Completion tokens: {}, Cached prompt tokens: {}, Cost: {:.4} USD",
            self.prompt_tokens, self.completion_tokens, self.cached_prompt_tokens, self.cost
        )
    }
}

/// Converts text to token ids. Needed to build classification logit biases.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError>;
}

fn default_provider() -> String {
    "openai".into()
}

fn default_modalities() -> Vec<Modality> {
    vec![Modality::Text]
}

/// Capabilities and pricing of one model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    pub name: String,

    /// Provider family whose argument set applies (e.g. "openai")
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub snapshots: Vec<Snapshot>,

    #[serde(default)]
    pub max_tokens: u64,

    #[serde(default)]
    pub max_output_tokens: u64,

    /// USD per 1M uncached input tokens
    pub input_price: f64,

    /// USD per 1M cached input tokens
    #[serde(default)]
    pub cached_input_price: f64,

    /// USD per 1M output tokens
    pub output_price: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_cutoff: Option<String>,

    #[serde(default)]
    pub features: Vec<Feature>,

    #[serde(default = "default_modalities")]
    pub input_modalities: Vec<Modality>,

    #[serde(default)]
    pub is_reasoning: bool,

    /// Override of the provider's API base URL for this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ModelCard {
    /// The model id actually sent to the provider: the newest snapshot, or the
    /// family name when no snapshot is pinned.
    pub fn latest_snapshot(&self) -> &str {
        self.snapshots
            .iter()
            .max_by_key(|s| s.parsed_date().ok())
            .map(|s| s.name.as_str())
            .unwrap_or(&self.name)
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        for snapshot in &self.snapshots {
            snapshot.parsed_date()?;
        }
        Ok(())
    }

    /// Reject arguments the provider family does not accept.
    pub fn check_args(&self, args: &Map<String, Value>) -> Result<(), ModelError> {
        let supported: &[&str] = match self.provider.as_str() {
            "openai" => OPENAI_ARGS,
            _ => &[],
        };
        match args.keys().find(|k| !supported.contains(&k.as_str())) {
            Some(arg) => Err(ModelError::UnsupportedArgument {
                model: self.name.clone(),
                arg: arg.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn cost(&self, usage: &Usage) -> CompletionCost {
        let cached = usage.cached_prompt_tokens.min(usage.prompt_tokens);
        let uncached = usage.prompt_tokens - cached;
        let cost = (self.input_price * uncached as f64
            + self.output_price * usage.completion_tokens as f64
            + self.cached_input_price * cached as f64)
            / 1_000_000.0;
        CompletionCost {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cached_prompt_tokens: cached,
            cost,
        }
    }

    /// Model arguments that force a single-token answer drawn from `classes`.
    ///
    /// Each class must encode to exactly one token. Every class token gets a
    /// logit bias of `strength`.
    pub fn make_classifier(
        &self,
        tokenizer: &dyn Tokenizer,
        classes: &[String],
        strength: i32,
    ) -> Result<Map<String, Value>, ModelError> {
        if !self.supports(Feature::Classification) {
            return Err(ModelError::ClassificationUnsupported(self.name.clone()));
        }
        let ids = tokenizer.encode(&classes.join(" "))?;
        if ids.len() != classes.len() {
            return Err(ModelError::MultiTokenClasses(classes.to_vec()));
        }
        let mut bias = Map::new();
        for id in ids {
            bias.insert(id.to_string(), Value::from(strength));
        }

        let mut args = Map::new();
        args.insert("top_logprobs".into(), Value::from(bias.len()));
        args.insert("logit_bias".into(), Value::Object(bias));
        args.insert("temperature".into(), Value::from(0.0));
        args.insert("max_completion_tokens".into(), Value::from(1));
        args.insert("logprobs".into(), Value::Bool(true));
        Ok(args)
    }
}

/// Known model cards, looked up by family name or snapshot name.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    cards: HashMap<String, ModelCard>,
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog with built-in OpenAI cards.
    pub fn with_defaults() -> Self {
        use Feature::*;
        let full = vec![
            FunctionCall,
            StructuredOutput,
            Streaming,
            Finetuning,
            Distillation,
            PredictedOutput,
            Classification,
        ];
        let reasoning = vec![FunctionCall, StructuredOutput, Streaming];
        let vision = vec![Modality::Text, Modality::Image];

        let card = |name: &str, snapshot: &str, date: &str, prices: (f64, f64, f64)| ModelCard {
            name: name.into(),
            provider: default_provider(),
            snapshots: vec![Snapshot::new(snapshot, date)],
            max_tokens: 0,
            max_output_tokens: 0,
            input_price: prices.0,
            cached_input_price: prices.1,
            output_price: prices.2,
            knowledge_cutoff: None,
            features: full.clone(),
            input_modalities: vision.clone(),
            is_reasoning: false,
            base_url: None,
        };

        let mut catalog = Self::empty();
        catalog.register(ModelCard {
            max_tokens: 1_047_576,
            max_output_tokens: 32_768,
            knowledge_cutoff: Some("2024-06-01".into()),
            ..card("gpt-4.1", "gpt-4.1-2025-04-14", "2025-04-14", (2.0, 0.5, 8.0))
        });
        catalog.register(ModelCard {
            max_tokens: 1_047_576,
            max_output_tokens: 32_768,
            knowledge_cutoff: Some("2024-06-01".into()),
            ..card("gpt-4.1-mini", "gpt-4.1-mini-2025-04-14", "2025-04-14", (0.4, 0.1, 1.6))
        });
        catalog.register(ModelCard {
            max_tokens: 128_000,
            max_output_tokens: 16_384,
            knowledge_cutoff: Some("2023-10-01".into()),
            ..card("gpt-4o-mini", "gpt-4o-mini-2024-07-18", "2024-07-18", (0.15, 0.075, 0.6))
        });
        catalog.register(ModelCard {
            max_tokens: 400_000,
            max_output_tokens: 128_000,
            knowledge_cutoff: Some("2024-05-31".into()),
            ..card("gpt-5-mini", "gpt-5-mini-2025-08-07", "2025-08-07", (0.25, 0.025, 2.0))
        });
        catalog.register(ModelCard {
            max_tokens: 200_000,
            max_output_tokens: 100_000,
            knowledge_cutoff: Some("2024-06-01".into()),
            features: reasoning.clone(),
            is_reasoning: true,
            ..card("o4-mini", "o4-mini-2025-04-16", "2025-04-16", (1.1, 0.275, 4.4))
        });
        catalog.register(ModelCard {
            max_tokens: 200_000,
            max_output_tokens: 100_000,
            knowledge_cutoff: Some("2024-06-01".into()),
            features: reasoning,
            is_reasoning: true,
            ..card("o3", "o3-2025-04-16", "2025-04-16", (2.0, 0.5, 8.0))
        });
        catalog
    }

    /// Add or replace a card.
    pub fn register(&mut self, card: ModelCard) {
        self.cards.insert(card.name.clone(), card);
    }

    /// Find a card by family name, falling back to snapshot names.
    pub fn find(&self, name: &str) -> Result<&ModelCard, ModelError> {
        if let Some(card) = self.cards.get(name) {
            return Ok(card);
        }
        self.cards
            .values()
            .find(|c| c.snapshots.iter().any(|s| s.name == name))
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    /// Card names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.cards.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Cost of a message; zero for turns not produced by a model or by an unknown model.
    pub fn message_cost(&self, message: &Message) -> CompletionCost {
        if !message.from_llm_side() {
            return CompletionCost::default();
        }
        match message.model.as_deref().map(|m| self.find(m)) {
            Some(Ok(card)) => card.cost(&message.usage),
            _ => CompletionCost::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct WordTokenizer;

    impl Tokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError> {
            // one token per word, except words containing '-' which split in two
            Ok(text
                .split_whitespace()
                .flat_map(|w| {
                    let id = w.bytes().map(u32::from).sum::<u32>();
                    if w.contains('-') { vec![id, id + 1] } else { vec![id] }
                })
                .collect())
        }
    }

    #[test]
    fn find_by_name_or_snapshot() {
        let catalog = ModelCatalog::with_defaults();
        assert_eq!(catalog.find("gpt-4.1").unwrap().name, "gpt-4.1");
        assert_eq!(catalog.find("gpt-4o-mini-2024-07-18").unwrap().name, "gpt-4o-mini");
        assert_eq!(
            catalog.find("llama-3").unwrap_err(),
            ModelError::UnknownModel("llama-3".into())
        );
    }

    #[test]
    fn latest_snapshot_by_date() {
        let mut card = ModelCatalog::with_defaults().find("gpt-4.1").unwrap().clone();
        card.snapshots.push(Snapshot::new("gpt-4.1-2025-09-01", "2025-09-01"));
        card.snapshots.push(Snapshot::new("gpt-4.1-2024-01-01", "2024-01-01"));
        assert_eq!(card.latest_snapshot(), "gpt-4.1-2025-09-01");

        card.snapshots.clear();
        assert_eq!(card.latest_snapshot(), "gpt-4.1");
    }

    #[test]
    fn cost_accounts_for_cached_tokens() {
        let catalog = ModelCatalog::with_defaults();
        let card = catalog.find("gpt-4.1").unwrap();
        let usage = Usage {
            prompt_tokens: 1_000_000,
            completion_tokens: 500_000,
            total_tokens: 1_500_000,
            cached_prompt_tokens: 200_000,
        };
        let cost = card.cost(&usage);
        // 0.8M * 2 + 0.5M * 8 + 0.2M * 0.5
        assert!((cost.cost - 5.7).abs() < 1e-9);
        assert_eq!(cost.cached_prompt_tokens, 200_000);
    }

    #[test]
    fn check_args_rejects_unknown() {
        let catalog = ModelCatalog::with_defaults();
        let card = catalog.find("gpt-4.1").unwrap();
        let ok = json!({"temperature": 0.2, "max_completion_tokens": 100});
        assert!(card.check_args(ok.as_object().unwrap()).is_ok());
        let bad = json!({"temperature": 0.2, "top_k": 3});
        assert_eq!(
            card.check_args(bad.as_object().unwrap()).unwrap_err(),
            ModelError::UnsupportedArgument { model: "gpt-4.1".into(), arg: "top_k".into() }
        );
    }

    #[test]
    fn make_classifier_builds_bias() {
        let catalog = ModelCatalog::with_defaults();
        let card = catalog.find("gpt-4.1").unwrap();
        let classes = vec!["yes".to_string(), "no".to_string()];
        let args = card.make_classifier(&WordTokenizer, &classes, 10).unwrap();
        assert_eq!(args["logit_bias"].as_object().unwrap().len(), 2);
        assert_eq!(args["top_logprobs"], 2);
        assert_eq!(args["max_completion_tokens"], 1);
        assert_eq!(args["temperature"], 0.0);
        assert_eq!(args["logprobs"], true);
    }

    #[test]
    fn make_classifier_rejects_multi_token_classes() {
        let catalog = ModelCatalog::with_defaults();
        let card = catalog.find("gpt-4.1").unwrap();
        let classes = vec!["yes".to_string(), "not-sure".to_string()];
        assert!(matches!(
            card.make_classifier(&WordTokenizer, &classes, 10),
            Err(ModelError::MultiTokenClasses(_))
        ));
    }

    #[test]
    fn make_classifier_requires_feature() {
        let catalog = ModelCatalog::with_defaults();
        let card = catalog.find("o4-mini").unwrap();
        assert!(matches!(
            card.make_classifier(&WordTokenizer, &["a".to_string()], 10),
            Err(ModelError::ClassificationUnsupported(_))
        ));
    }

    #[test]
    fn message_cost_only_for_model_turns() {
        let catalog = ModelCatalog::with_defaults();
        let usage = Usage { prompt_tokens: 1000, completion_tokens: 1000, total_tokens: 2000, cached_prompt_tokens: 0 };
        let reply = Message::assistant("hi", "bot").with_model("gpt-4o-mini-2024-07-18").with_usage(usage.clone());
        assert!(catalog.message_cost(&reply).cost > 0.0);
        let user = Message::user("hi").with_usage(usage);
        assert_eq!(catalog.message_cost(&user), CompletionCost::default());
    }

    #[test]
    fn custom_card_from_toml_shape() {
        let card: ModelCard = serde_json::from_value(json!({
            "name": "local-llama",
            "input_price": 0.0,
            "output_price": 0.0,
            "snapshots": [{"name": "local-llama-v1", "date": "2025-01-02"}]
        }))
        .unwrap();
        assert_eq!(card.provider, "openai");
        assert!(card.validate().is_ok());
        assert_eq!(card.input_modalities, vec![Modality::Text]);

        let bad = ModelCard {
            snapshots: vec![Snapshot::new("x", "January")],
            ..card
        };
        assert_eq!(bad.validate(), Err(ModelError::InvalidSnapshotDate("January".into())));
    }
}
