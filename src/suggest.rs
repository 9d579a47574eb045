use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SuggestConfig;
use crate::dsl::normalize_description;

#[derive(Error, Debug)]
pub enum SuggestError {
    #[error("No suggestion models configured")]
    NoModels,
    #[error("HTTP request to {model} failed: {source}")]
    Http {
        model: String,
        #[source]
        source: ureq::Error,
    },
    #[error("{model} returned an empty suggestion")]
    Empty { model: String },
}

/// Round-robin over the configured models. The position is owned by the
/// caller: pass the counter in, store the returned one.
#[derive(Debug, Clone)]
pub struct ModelRotation {
    models: Vec<String>,
}

impl ModelRotation {
    pub fn new(models: Vec<String>) -> Self {
        Self { models }
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Model for `counter` and the counter to use next time.
    pub fn pick(&self, counter: u64) -> Option<(&str, u64)> {
        if self.models.is_empty() {
            return None;
        }
        let idx = (counter % self.models.len() as u64) as usize;
        Some((&self.models[idx], counter.wrapping_add(1)))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// A description proposed for a move.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub description: String,
    pub model: String,
    pub next_counter: u64,
}

pub fn build_prompt(name: &str, tags: &[String]) -> String {
    let mut prompt = format!(
        "Write a one-sentence description of the combat move \"{name}\" for a choreography notebook."
    );
    if !tags.is_empty() {
        prompt.push_str(&format!(" It is tagged: {}.", tags.join(", ")));
    }
    prompt.push_str(" Reply with the sentence only, no quotes, no preamble.");
    prompt
}

/// First non-empty line of a model answer, without markdown heading marks or
/// quotes, normalized.
pub fn extract_description(answer: &str) -> String {
    let line = answer
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let unquoted = line.trim_matches(|c: char| c == '"' || c == '\'' || c == '`');
    normalize_description(unquoted.trim())
}

/// Ollama `/api/generate` client.
pub struct Suggester {
    agent: ureq::Agent,
    endpoint: String,
    rotation: ModelRotation,
}

impl Suggester {
    pub fn new(config: &SuggestConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();
        Self {
            agent,
            endpoint: format!("{}/api/generate", config.url.trim_end_matches('/')),
            rotation: ModelRotation::new(config.models.clone()),
        }
    }

    fn generate(&self, model: &str, prompt: &str) -> Result<String, SuggestError> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
        };
        let response: GenerateResponse = self
            .agent
            .post(&self.endpoint)
            .send_json(&request)
            .map_err(|source| SuggestError::Http {
                model: model.to_string(),
                source,
            })?
            .body_mut()
            .read_json()
            .map_err(|source| SuggestError::Http {
                model: model.to_string(),
                source,
            })?;
        Ok(response.response)
    }

    /// Ask the model at `counter`; on failure fall through to the next ones.
    pub fn suggest(&self, name: &str, tags: &[String], counter: u64) -> Result<Suggestion, SuggestError> {
        let prompt = build_prompt(name, tags);
        let mut counter = counter;
        let mut last_err = SuggestError::NoModels;

        for _ in 0..self.rotation.len() {
            let Some((model, next)) = self.rotation.pick(counter) else {
                break;
            };
            counter = next;
            log::debug!("Asking {model} about {name:?}");

            match self.generate(model, &prompt) {
                Ok(answer) => {
                    let description = extract_description(&answer);
                    if description.is_empty() {
                        last_err = SuggestError::Empty {
                            model: model.to_string(),
                        };
                        continue;
                    }
                    return Ok(Suggestion {
                        description,
                        model: model.to_string(),
                        next_counter: counter,
                    });
                }
                Err(e) => {
                    log::warn!("{e}");
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}
