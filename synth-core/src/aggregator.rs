//! Aggregator / Pruner: selects or prunes among a task's worker responses
//! down to a single winner.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::executor;
use crate::tools::ToolRegistry;
use crate::types::{Task, ToolCall, Value, WorkerResponse};

const BASE_SCORE: i32 = 5;
const TOOL_CALL_BONUS: i32 = 5;
const TOOL_KEYWORD_MATCH_BONUS: i32 = 3;
const CODE_BLOCK_BONUS: i32 = 3;
const GOOD_LENGTH_BONUS: i32 = 2;
const FIRST_ATTEMPT_BONUS: i32 = 2;
const ERROR_TEXT_PENALTY: i32 = 3;
const MIN_SCORE: i32 = 0;
const MAX_SCORE: i32 = 25;
const PRUNE_GAP_THRESHOLD: i32 = 4;
const WEAK_WINNER_CEILING: i32 = 5;

static JSON_TOOL_CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\{[^{}]*"tool"\s*:\s*"[^"]+"[^{}]*\}"#).unwrap());

/// Best-effort extraction of a `{"tool": "...", "params": {...}}` blob
/// from a worker's raw text, used when no python block was extractable.
#[must_use]
pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    JSON_TOOL_CALL.find(text).and_then(|m| serde_json::from_str::<ToolCall>(m.as_str()).ok())
}

/// The result of running the aggregator over one task's worker responses.
#[derive(Debug, Clone)]
pub struct AggregationResult {
    pub winner: WorkerResponse,
    pub kept: Vec<WorkerResponse>,
    pub fallback_used: bool,
}

/// Fast, LLM-free heuristic score for a candidate that was not verified.
#[must_use]
pub fn quick_score(response: &WorkerResponse, task: &Task) -> i32 {
    let mut score = BASE_SCORE;

    if response.tool_call.is_some() {
        score += TOOL_CALL_BONUS;
        if let Some(call) = &response.tool_call {
            let lower_desc = task.description.to_lowercase();
            if lower_desc.contains(&call.tool.replace('_', " ")) {
                score += TOOL_KEYWORD_MATCH_BONUS;
            }
        }
    }

    if executor::extract_python_block(&response.raw_text).is_some() {
        score += CODE_BLOCK_BONUS;
    }

    let len = response.raw_text.len();
    if len > 200 && len < 2000 {
        score += GOOD_LENGTH_BONUS;
    }

    if response.attempts == 1 {
        score += FIRST_ATTEMPT_BONUS;
    }

    let lower_text = response.raw_text.to_lowercase();
    if lower_text.contains("error") || lower_text.contains("failed") {
        score -= ERROR_TEXT_PENALTY;
    }

    score.clamp(MIN_SCORE, MAX_SCORE)
}

/// Select and prune among worker responses, then repair any hallucinated
/// tool name in the winner.
#[must_use]
pub fn select(responses: Vec<WorkerResponse>, task: &Task, registry: &ToolRegistry) -> AggregationResult {
    if let Some(verified) = responses.iter().filter(|r| r.verified).min_by_key(|r| r.attempts) {
        let winner = verified.clone();
        return AggregationResult { winner, kept: responses, fallback_used: false };
    }

    let all_texts: Vec<String> = responses.iter().map(|r| r.raw_text.clone()).collect();
    let mut scored: Vec<(i32, WorkerResponse)> = responses.into_iter().map(|r| (quick_score(&r, task), r)).collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let kept: Vec<(i32, WorkerResponse)> = match scored.as_slice() {
        [top, second, ..] if top.0 - second.0 >= PRUNE_GAP_THRESHOLD => vec![scored.remove(0)],
        _ => {
            scored.truncate(2);
            scored
        }
    };

    let top_score = kept.first().map_or(0, |(s, _)| *s);
    let fallback_used = top_score < WEAK_WINNER_CEILING;
    let mut kept_responses: Vec<WorkerResponse> = kept.into_iter().map(|(_, r)| r).collect();
    if kept_responses.is_empty() {
        kept_responses.push(blank_response(task));
    }

    repair_tool_call(&mut kept_responses[0], registry, &all_texts);
    let winner = kept_responses[0].clone();

    AggregationResult { winner, kept: kept_responses, fallback_used }
}

fn blank_response(_task: &Task) -> WorkerResponse {
    WorkerResponse {
        worker_index: 0,
        temperature: 0.0,
        raw_text: String::new(),
        tool_call: None,
        verified: false,
        execution_result: String::new(),
        attempts: 0,
        duration: std::time::Duration::ZERO,
    }
}

/// Validate the winner's tool call against the registry; if it names an
/// unregistered tool, replace it with `python_exec` backed by the longest
/// recoverable code block, or a diagnostic placeholder if none exists.
fn repair_tool_call(winner: &mut WorkerResponse, registry: &ToolRegistry, other_texts: &[String]) {
    let Some(call) = &winner.tool_call else { return };
    if registry.is_registered(&call.tool) {
        return;
    }

    let code = executor::longest_fenced_block(&winner.raw_text)
        .or_else(|| other_texts.iter().find_map(|t| executor::longest_fenced_block(t)))
        .unwrap_or_else(|| "print('no recoverable candidate code')".to_string());

    let mut params = BTreeMap::new();
    params.insert("code".to_string(), Value::Str(code));
    winner.tool_call = Some(ToolCall { tool: "python_exec".to_string(), params });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(raw_text: &str, attempts: u32, verified: bool) -> WorkerResponse {
        WorkerResponse {
            worker_index: 0,
            temperature: 0.7,
            raw_text: raw_text.to_string(),
            tool_call: None,
            verified,
            execution_result: String::new(),
            attempts,
            duration: std::time::Duration::from_millis(10),
        }
    }

    #[test]
    fn verified_with_fewest_attempts_wins() {
        let registry = ToolRegistry::with_builtins("/workspace");
        let task = Task::new("solve it", vec![]);
        let responses = vec![response("a", 2, true), response("b", 1, true), response("c", 1, false)];
        let result = select(responses, &task, &registry);
        assert!(result.winner.verified);
        assert_eq!(result.winner.attempts, 1);
    }

    #[test]
    fn error_text_lowers_quick_score() {
        let task = Task::new("solve it", vec![]);
        let clean = response("```python\ndef solve(x):\n    return x\n```", 1, false);
        let erroring = response("```python\ndef solve(x):\n    return x\n```\nerror: it failed", 1, false);
        assert!(quick_score(&clean, &task) > quick_score(&erroring, &task));
    }

    #[test]
    fn wide_score_gap_prunes_down_to_the_single_top_candidate() {
        let registry = ToolRegistry::with_builtins("/workspace");
        let task = Task::new("solve it", vec![]);
        let strong = response("```python\ndef solve(x):\n    return x\n```", 1, false);
        let weak = response("error: it failed", 3, false);
        assert!(quick_score(&strong, &task) - quick_score(&weak, &task) >= PRUNE_GAP_THRESHOLD);
        let result = select(vec![strong, weak], &task, &registry);
        assert_eq!(result.kept.len(), 1);
    }

    #[test]
    fn narrow_score_gap_keeps_the_top_two_candidates() {
        let registry = ToolRegistry::with_builtins("/workspace");
        let task = Task::new("solve it", vec![]);
        let a = response("```python\ndef solve(x):\n    return x\n```", 1, false);
        let b = response("```python\ndef solve(y):\n    return y\n```", 2, false);
        assert!((quick_score(&a, &task) - quick_score(&b, &task)).abs() < PRUNE_GAP_THRESHOLD);
        let result = select(vec![a, b], &task, &registry);
        assert_eq!(result.kept.len(), 2);
    }

    #[test]
    fn unregistered_tool_is_remapped_to_python_exec() {
        let registry = ToolRegistry::with_builtins("/workspace");
        let task = Task::new("solve it", vec![]);
        let mut bogus = response("```python\ndef solve(x):\n    return x\n```", 1, false);
        let mut params = BTreeMap::new();
        params.insert("arg".to_string(), Value::Str("x".to_string()));
        bogus.tool_call = Some(ToolCall { tool: "hallucinated_tool".to_string(), params });
        let result = select(vec![bogus], &task, &registry);
        assert_eq!(result.winner.tool_call.as_ref().unwrap().tool, "python_exec");
    }
}
