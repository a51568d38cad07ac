//! Cross-session skill harvester.
//!
//! On every verified worker response, helper functions other than `solve`
//! are parsed out of the candidate source and kept under a persistent
//! skill store: one source file per skill, plus an index. Names are
//! unique; a second definition of an already-known name is silently
//! ignored, matching the "first-seen wins" invariant.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

static FUNCTION_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^def\s+(\w+)\s*\(([^)]*)\)").unwrap());

/// A verified callable harvested from successful code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub parameters: Vec<String>,
    pub source_text: String,
    pub doc: String,
    pub harvested_at: DateTime<Utc>,
}

impl Skill {
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.parameters.join(", "))
    }

    fn keyword_tokens(&self) -> Vec<String> {
        self.name.split('_').map(str::to_lowercase).collect()
    }
}

/// Parse every top-level function definition in `code` other than `solve`,
/// rejecting private (`_`-prefixed) names.
#[must_use]
pub fn harvestable_functions(code: &str) -> Vec<(String, Vec<String>, String)> {
    let mut found = Vec::new();
    let defs: Vec<_> = FUNCTION_DEF.captures_iter(code).collect();
    for (idx, cap) in defs.iter().enumerate() {
        let name = cap[1].to_string();
        if name == "solve" || name.starts_with('_') {
            continue;
        }
        let params: Vec<String> = cap[2]
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.split(':').next().unwrap_or(p).trim().to_string())
            .collect();

        let start = cap.get(0).map(|m| m.start()).unwrap_or(0);
        let end = defs.get(idx + 1).and_then(|next| next.get(0)).map_or(code.len(), |m| m.start());
        let source_text = code[start..end].trim_end().to_string();

        found.push((name, params, source_text));
    }
    found
}

/// The persistent, append-mostly set of harvested skills.
#[derive(Debug, Default)]
pub struct SkillStore {
    skills: HashMap<String, Skill>,
}

impl SkillStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Harvest every eligible function from `code`. Returns the names that
    /// were newly added (names already known are left untouched).
    pub fn harvest_from_code(&mut self, code: &str) -> Vec<String> {
        let mut added = Vec::new();
        for (name, parameters, source_text) in harvestable_functions(code) {
            if self.skills.contains_key(&name) {
                continue;
            }
            let doc = format!("harvested helper `{name}`");
            self.skills.insert(
                name.clone(),
                Skill { name: name.clone(), parameters, source_text, doc, harvested_at: Utc::now() },
            );
            added.push(name);
        }
        added
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// A short catalog of skill signatures whose name tokens overlap with
    /// `task_text`, capped at `max`. Naive keyword overlap, no embeddings.
    #[must_use]
    pub fn skills_for_prompt(&self, task_text: &str, max: usize) -> Vec<String> {
        let task_lower = task_text.to_lowercase();
        let task_tokens: Vec<&str> = task_lower.split_whitespace().collect();

        let mut matches: Vec<&Skill> = self
            .skills
            .values()
            .filter(|s| s.keyword_tokens().iter().any(|t| task_tokens.contains(&t.as_str())))
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches.truncate(max);
        matches.into_iter().map(Skill::signature).collect()
    }

    /// Write one `.py` file per skill under `skills_dir`, plus an
    /// `index.json` summary.
    ///
    /// # Errors
    /// Propagates an I/O or serialization failure.
    pub fn persist(&self, skills_dir: &Path) -> crate::Result<()> {
        std::fs::create_dir_all(skills_dir)?;
        for skill in self.skills.values() {
            let path = skills_dir.join(format!("{}.py", skill.name));
            std::fs::write(path, &skill.source_text)?;
        }
        let index_path = skills_dir.join("index.json");
        let index = SkillIndex {
            skills: self.skills.values().map(|s| s.name.clone()).collect(),
            last_updated: Utc::now(),
        };
        std::fs::write(index_path, serde_json::to_string_pretty(&index)?)?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SkillIndex {
    skills: Vec<String>,
    last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harvests_helper_but_not_solve_or_private() {
        let code = "def solve(x):\n    return helper(x)\n\ndef helper(x):\n    return x + 1\n\ndef _private(x):\n    return x\n";
        let functions = harvestable_functions(code);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].0, "helper");
    }

    #[test]
    fn first_seen_definition_wins_on_duplicate_harvest() {
        let mut store = SkillStore::new();
        store.harvest_from_code("def solve(x):\n    return helper(x)\n\ndef helper(x):\n    return x + 1\n");
        let first_source = store.get("helper").unwrap().source_text.clone();
        store.harvest_from_code("def solve(x):\n    return helper(x)\n\ndef helper(x):\n    return x * 2\n");
        assert_eq!(store.get("helper").unwrap().source_text, first_source);
    }

    #[test]
    fn skills_for_prompt_matches_by_keyword_overlap() {
        let mut store = SkillStore::new();
        store.harvest_from_code("def solve(x):\n    return reverse_string(x)\n\ndef reverse_string(s):\n    return s[::-1]\n");
        let matches = store.skills_for_prompt("please reverse this string", 5);
        assert_eq!(matches, vec!["reverse_string(s)".to_string()]);
    }
}
