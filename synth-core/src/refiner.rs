//! Outer self-refine loop over an aggregated winner: evaluate, optionally
//! re-verify against test cases, track the best candidate seen, and either
//! stop or send one more refine request.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::executor::{self, Executor};
use crate::inference::{ChatMessage, Inference};
use crate::reflection::ReflectionBuffer;
use crate::tools::ToolRegistry;
use crate::types::{Task, ToolCall, WorkerResponse};

pub const MAX_SCORE: u32 = 25;

static TOTAL_SCORE_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)TOTAL_SCORE:\s*(\d+)\s*/\s*25").unwrap());
static BARE_FRACTION_25: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*/\s*25").unwrap());
static DIMENSION_FRACTION_5: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*/\s*5\b").unwrap());

const POSITIVE_KEYWORDS: &[&str] = &["correct", "works", "passes", "good", "solid", "handles"];
const NEGATIVE_KEYWORDS: &[&str] = &["wrong", "fails", "incorrect", "broken", "missing", "error"];
const HEURISTIC_BASE: i32 = 12;
const HEURISTIC_STEP: i32 = 2;

/// One candidate considered by the refiner: its text, any tool call, and
/// the evaluator's verdict on it.
#[derive(Debug, Clone)]
pub struct RefineCandidate {
    pub raw_text: String,
    pub tool_call: Option<ToolCall>,
    pub verified: bool,
    pub score: u32,
    pub feedback: String,
}

impl RefineCandidate {
    fn from_winner(winner: &WorkerResponse) -> Self {
        Self {
            raw_text: winner.raw_text.clone(),
            tool_call: winner.tool_call.clone(),
            verified: winner.verified,
            score: 0,
            feedback: String::new(),
        }
    }
}

/// Result of a full [`Refiner::refine`] call: the best candidate seen,
/// never the last one generated.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    pub best: RefineCandidate,
    pub iterations: u32,
    pub score_delta: i32,
    pub duration: Duration,
}

/// Score-parsing precedence: a labeled `TOTAL_SCORE: n/25` line wins,
/// then a bare `n/25` fraction, then the sum of every `n/5` dimension
/// score found, then a keyword-tally heuristic as the last resort.
#[must_use]
pub fn parse_score(feedback: &str) -> u32 {
    if let Some(cap) = TOTAL_SCORE_LABEL.captures(feedback) {
        return cap[1].parse::<u32>().unwrap_or(0).min(MAX_SCORE);
    }
    if let Some(cap) = BARE_FRACTION_25.captures(feedback) {
        return cap[1].parse::<u32>().unwrap_or(0).min(MAX_SCORE);
    }
    let dimension_sum: u32 = DIMENSION_FRACTION_5
        .captures_iter(feedback)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .sum();
    if dimension_sum > 0 {
        return dimension_sum.min(MAX_SCORE);
    }
    keyword_tally(feedback)
}

fn keyword_tally(feedback: &str) -> u32 {
    let lower = feedback.to_lowercase();
    let mut score = HEURISTIC_BASE;
    for word in POSITIVE_KEYWORDS {
        if lower.contains(word) {
            score += HEURISTIC_STEP;
        }
    }
    for word in NEGATIVE_KEYWORDS {
        if lower.contains(word) {
            score -= HEURISTIC_STEP;
        }
    }
    score.clamp(0, MAX_SCORE as i32) as u32
}

/// Outer evaluate-and-fix loop configuration. Evaluation and refine
/// requests both go to the dedicated management slot with the evaluator's
/// low temperature, per the slot-affinity model.
pub struct Refiner {
    pub management_slot: i64,
    pub evaluator_temperature: f32,
    pub max_iterations: u32,
    pub score_threshold: u32,
}

impl Refiner {
    /// Run the outer loop over `winner` until the score threshold is met
    /// (with verification passing, when test cases exist) or
    /// `max_iterations` is exhausted. Returns the best candidate seen, not
    /// necessarily the last one generated. Every verification failure is
    /// recorded with `curator` for later error-hint promotion.
    #[allow(clippy::too_many_arguments)]
    pub async fn refine(
        &self,
        winner: &WorkerResponse,
        task: &Task,
        inference: &dyn Inference,
        exec: &dyn Executor,
        registry: &ToolRegistry,
        reflection: &mut ReflectionBuffer,
        required_tool: Option<&str>,
        error_pattern_summary: &str,
        curator: &crate::memory::Curator,
    ) -> RefineOutcome {
        let start = Instant::now();
        let mut current = RefineCandidate::from_winner(winner);
        let mut best: Option<RefineCandidate> = None;
        let mut iterations = 0u32;
        let mut first_score: Option<u32> = None;

        if self.max_iterations == 0 {
            let (score, feedback) = self.evaluate(task, &current, inference, required_tool).await;
            current.score = score;
            current.feedback = feedback;
            return RefineOutcome { best: current, iterations: 0, score_delta: 0, duration: start.elapsed() };
        }

        loop {
            let (mut score, mut feedback) = self.evaluate(task, &current, inference, required_tool).await;

            let has_test_cases = !task.test_cases.is_empty();
            let mut verification_passed = !has_test_cases;
            if has_test_cases {
                if let Some(code) = executor::extract_python_block(&current.raw_text) {
                    match executor::inject_assertions(&code, &task.test_cases) {
                        Ok(injected) => {
                            let outcome = exec.execute(&injected, Duration::from_secs(30)).await;
                            verification_passed = outcome.verified();
                            current.verified = verification_passed;
                            if !verification_passed {
                                let raw = outcome.err.clone().unwrap_or_else(|| outcome.stdout.clone());
                                let error_type = crate::reflection::extract_error_type(&raw).unwrap_or_else(|| "Error".to_string());
                                feedback.push_str(&format!("\nVerification failed: {raw}"));
                                curator.record_error("python_exec", &error_type, crate::reflection::lesson_for_error_type(&error_type));
                                reflection.record(iterations, error_type, raw);
                                score = score.min(self.score_threshold.saturating_sub(1));
                            }
                        }
                        Err(e) => {
                            verification_passed = false;
                            feedback.push_str(&format!("\nVerification failed: {e}"));
                            reflection.record(iterations, "SyntaxError", e);
                            score = 0;
                        }
                    }
                } else {
                    verification_passed = false;
                }
            }

            current.score = score;
            current.feedback = feedback;
            first_score.get_or_insert(score);

            best = Some(match best.take() {
                Some(existing) if existing.score > current.score => existing,
                Some(existing) if existing.score == current.score && existing.verified && !current.verified => existing,
                _ => current.clone(),
            });

            iterations += 1;
            let threshold_met = current.score >= self.score_threshold && (!has_test_cases || verification_passed);
            if threshold_met || iterations >= self.max_iterations {
                break;
            }

            current = self.send_refine_request(task, &current, inference, registry, reflection, error_pattern_summary).await;
        }

        let initial_score = first_score.unwrap_or(0);
        let best = best.unwrap_or(current);
        let score_delta = i32::try_from(best.score).unwrap_or(0) - i32::try_from(initial_score).unwrap_or(0);
        RefineOutcome { best, iterations, score_delta, duration: start.elapsed() }
    }

    async fn evaluate(
        &self,
        task: &Task,
        candidate: &RefineCandidate,
        inference: &dyn Inference,
        required_tool: Option<&str>,
    ) -> (u32, String) {
        let tool_used = candidate.tool_call.as_ref().map(|c| c.tool.as_str());
        if let Some(required) = required_tool {
            if tool_used != Some(required) {
                return (0, format!("required tool `{required}` was declared but not used"));
            }
        }

        let prompt = format!(
            "Task:\n{}\n\nCandidate response:\n{}\n\nScore this 0-25 for correctness, completeness, \
             and tool use. Reply with a line `TOTAL_SCORE: n/25` followed by brief feedback.",
            task.description, candidate.raw_text
        );
        let messages = [ChatMessage::user(prompt)];

        match inference.generate(&messages, self.evaluator_temperature, self.management_slot).await {
            Ok(text) => {
                let score = parse_score(&text);
                (score, text)
            }
            Err(e) => (0, format!("evaluator unavailable: {e}")),
        }
    }

    async fn send_refine_request(
        &self,
        task: &Task,
        current: &RefineCandidate,
        inference: &dyn Inference,
        registry: &ToolRegistry,
        reflection: &ReflectionBuffer,
        error_pattern_summary: &str,
    ) -> RefineCandidate {
        let mut prompt = format!(
            "Task:\n{}\n\nYour previous attempt:\n{}\n\nEvaluator feedback:\n{}\n\nTools available:\n{}\n\n{}",
            task.description,
            current.raw_text,
            current.feedback,
            registry.catalog_text(),
            reflection.as_prompt_section(),
        );
        if !error_pattern_summary.is_empty() {
            prompt.push_str("\nFrequent errors across recent tasks:\n");
            prompt.push_str(error_pattern_summary);
        }
        prompt.push_str("\n\nReturn a corrected ```python block.");
        let messages = [ChatMessage::user(prompt)];

        match inference.generate(&messages, self.evaluator_temperature, self.management_slot).await {
            Ok(raw_text) => {
                let tool_call = crate::aggregator::parse_tool_call(&raw_text);
                RefineCandidate { raw_text, tool_call, verified: false, score: 0, feedback: String::new() }
            }
            Err(_) => current.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_total_score_takes_precedence() {
        let text = "some rambling. TOTAL_SCORE: 19/25. also 3/5 and 2/5 mentioned elsewhere.";
        assert_eq!(parse_score(text), 19);
    }

    #[test]
    fn bare_fraction_used_when_no_label() {
        assert_eq!(parse_score("overall this is 14/25"), 14);
    }

    #[test]
    fn dimension_scores_summed_when_no_fraction_present() {
        let text = "correctness 4/5, style 3/5, tests 5/5, clarity 2/5, tools 3/5";
        assert_eq!(parse_score(text), 17);
    }

    #[test]
    fn heuristic_tally_used_as_last_resort() {
        let good = parse_score("the code looks correct and passes everything, good job");
        let bad = parse_score("the code is wrong and fails, broken logic");
        assert!(good > bad);
    }
}
