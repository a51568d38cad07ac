//! One generate→verify→self-fix micro-loop per backend slot.
//!
//! Workers never share mutable state beyond the immutable memory-context
//! string they are constructed with; the runner spawns `W` of these and
//! joins on all of them via `futures::future::join_all`.

use std::time::{Duration, Instant};

use crate::executor::{self, Executor};
use crate::inference::ChatMessage;
use crate::inference::Inference;
use crate::tools::ToolRegistry;
use crate::types::{Task, WorkerResponse};

const INVALID_RESPONSE_TAGS: &[&str] = &["[INST]", "[/INST]", "<<SYS>>", "<</SYS>>"];

/// One worker's fixed identity for the lifetime of a task.
pub struct Worker<'a> {
    pub worker_index: usize,
    pub temperature: f32,
    pub memory_context: &'a str,
    pub suggested_tools: &'a [String],
}

impl<'a> Worker<'a> {
    #[must_use]
    pub fn new(worker_index: usize, temperature: f32, memory_context: &'a str, suggested_tools: &'a [String]) -> Self {
        Self { worker_index, temperature, memory_context, suggested_tools }
    }

    fn system_prompt(&self, registry: &ToolRegistry, skills_catalog: &str) -> String {
        let mut suggested_detail = String::new();
        for name in self.suggested_tools {
            if let Some(schema) = registry.get(name) {
                suggested_detail.push_str(&format!("- {}: {}\n", schema.name, schema.description));
            }
        }

        let mut prompt = String::from("You write a single Python function named `solve`.\n\n");
        prompt.push_str("Tools available in detail:\n");
        prompt.push_str(&suggested_detail);
        prompt.push_str("\nOther tools:\n");
        prompt.push_str(&registry.catalog_text());
        if !skills_catalog.is_empty() {
            prompt.push_str("\n\nHarvested helper functions you may reuse:\n");
            prompt.push_str(skills_catalog);
        }
        if !self.memory_context.is_empty() {
            prompt.push_str("\n\nRelevant lessons:\n");
            prompt.push_str(self.memory_context);
        }
        prompt
    }

    /// Run this worker's full micro-loop against `task`. Every verification
    /// failure along the way is recorded with `curator` so the background
    /// curator can later consider promoting a tool schema's error hint.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        task: &Task,
        inference: &dyn Inference,
        exec: &dyn Executor,
        registry: &ToolRegistry,
        skills_catalog: &str,
        retries: u32,
        execution_timeout: Duration,
        curator: &crate::memory::Curator,
    ) -> WorkerResponse {
        let start = Instant::now();
        let system = self.system_prompt(registry, skills_catalog);
        let messages = vec![ChatMessage::system(system), ChatMessage::user(task.description.clone())];

        let slot_id = i64::try_from(self.worker_index).unwrap_or(0);
        let raw_text = match inference.generate(&messages, self.temperature, slot_id).await {
            Ok(text) => text,
            Err(e) => {
                return self.invalid_response(format!("inference error: {e}"), 0, start.elapsed());
            }
        };

        if is_invalid_output(&raw_text) {
            return self.invalid_response(raw_text, 0, start.elapsed());
        }

        let Some(mut candidate) = executor::extract_python_block(&raw_text) else {
            let tool_call = crate::aggregator::parse_tool_call(&raw_text);
            return WorkerResponse {
                worker_index: self.worker_index,
                temperature: self.temperature,
                raw_text,
                tool_call,
                verified: false,
                execution_result: String::new(),
                attempts: 0,
                duration: start.elapsed(),
            };
        };

        let mut conversation = messages;
        conversation.push(ChatMessage::assistant(raw_text.clone()));

        for attempt in 0..=retries {
            let injected = match executor::inject_assertions(&candidate, &task.test_cases) {
                Ok(injected) => injected,
                Err(_) => break,
            };
            let outcome = exec.execute(&injected, execution_timeout).await;

            if outcome.verified() {
                return WorkerResponse {
                    worker_index: self.worker_index,
                    temperature: self.temperature,
                    raw_text,
                    tool_call: None,
                    verified: true,
                    execution_result: outcome.stdout,
                    attempts: attempt + 1,
                    duration: start.elapsed(),
                };
            }

            let error_type = outcome
                .err
                .as_deref()
                .and_then(crate::reflection::extract_error_type)
                .unwrap_or_else(|| "Error".to_string());
            let raw_message = outcome.err.clone().unwrap_or_else(|| outcome.stdout.clone());
            curator.record_error("python_exec", &error_type, crate::reflection::lesson_for_error_type(&error_type));

            if attempt == retries {
                return WorkerResponse {
                    worker_index: self.worker_index,
                    temperature: self.temperature,
                    raw_text,
                    tool_call: None,
                    verified: false,
                    execution_result: raw_message,
                    attempts: attempt + 1,
                    duration: start.elapsed(),
                };
            }

            let semantic = crate::reflection::translate_error(&error_type, &raw_message);

            conversation.push(ChatMessage::user(format!(
                "Your code failed verification:\n{semantic}\n\nReturn a corrected ```python block."
            )));

            let fix = match inference.generate(&conversation, self.temperature, slot_id).await {
                Ok(fix) => fix,
                Err(_) => break,
            };
            conversation.push(ChatMessage::assistant(fix.clone()));

            let Some(fixed_candidate) = executor::extract_python_block(&fix) else {
                break;
            };
            candidate = fixed_candidate;
        }

        WorkerResponse {
            worker_index: self.worker_index,
            temperature: self.temperature,
            raw_text,
            tool_call: None,
            verified: false,
            execution_result: String::new(),
            attempts: retries + 1,
            duration: start.elapsed(),
        }
    }

    fn invalid_response(&self, raw_text: String, attempts: u32, duration: Duration) -> WorkerResponse {
        WorkerResponse {
            worker_index: self.worker_index,
            temperature: self.temperature,
            raw_text: format!("invalid response: {raw_text}"),
            tool_call: None,
            verified: false,
            execution_result: String::new(),
            attempts,
            duration,
        }
    }
}

fn is_invalid_output(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    let stripped: String = INVALID_RESPONSE_TAGS.iter().fold(trimmed.to_string(), |acc, tag| acc.replace(tag, ""));
    stripped.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_is_invalid() {
        assert!(is_invalid_output("   "));
    }

    #[test]
    fn tags_only_output_is_invalid() {
        assert!(is_invalid_output(" [INST] <<SYS>> <</SYS>> [/INST] "));
    }

    #[test]
    fn real_code_is_valid() {
        assert!(!is_invalid_output("```python\ndef solve(x):\n    return x\n```"));
    }
}
