//! The closed tool registry and schemas.
//!
//! Tools are data, not a class hierarchy: a `ToolSchema` describes name,
//! parameters, and the curator-maintained `error_hints` table, and a
//! `ToolRegistry` is populated once at startup. `python_exec` is the only
//! tool the orchestration kernel invokes directly; the rest exist so
//! generated tool calls have somewhere to route to and so their schemas can
//! accumulate error hints the same way `python_exec`'s does.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One named parameter a tool accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: String,
    pub required: bool,
}

impl ParamSpec {
    fn required(name: &str, kind: &str) -> Self {
        Self { name: name.to_string(), kind: kind.to_string(), required: true }
    }

    fn optional(name: &str, kind: &str) -> Self {
        Self { name: name.to_string(), kind: kind.to_string(), required: false }
    }
}

/// A tool's schema: identity, parameters, and the curator-maintained
/// error-hint table. Mutating `error_hints`/`version`/`last_updated` is the
/// curator's entire write surface over this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
    pub error_hints: HashMap<String, String>,
    pub version: u32,
    pub last_updated: DateTime<Utc>,
}

impl ToolSchema {
    fn new(name: &str, description: &str, parameters: Vec<ParamSpec>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            error_hints: HashMap::new(),
            version: 1,
            last_updated: Utc::now(),
        }
    }

    /// Apply a curator-decided promotion: insert the hint if absent, bump
    /// version and timestamp only when something actually changed.
    pub fn promote_hint(&mut self, error_type: &str, lesson: &str) -> bool {
        if self.error_hints.contains_key(error_type) {
            return false;
        }
        self.error_hints.insert(error_type.to_string(), lesson.to_string());
        self.version += 1;
        self.last_updated = Utc::now();
        true
    }
}

/// The closed, lookup-only set of tools available to generated code. Closed
/// at runtime: no tool is registered after startup.
pub struct ToolRegistry {
    schemas: RwLock<HashMap<String, ToolSchema>>,
    workspace_root: PathBuf,
}

impl ToolRegistry {
    /// Build the registry with the seven built-in tools, rooted at
    /// `workspace_root` for path-escape checks.
    #[must_use]
    pub fn with_builtins(workspace_root: impl Into<PathBuf>) -> Self {
        let mut schemas = HashMap::new();
        for schema in builtin_schemas() {
            schemas.insert(schema.name.clone(), schema);
        }
        Self { schemas: RwLock::new(schemas), workspace_root: workspace_root.into() }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolSchema> {
        self.schemas.read().get(name).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.schemas.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.schemas.read().contains_key(name)
    }

    /// The curator's write surface: apply one hint promotion to the named
    /// tool's schema. No-op if the tool is unknown or the hint already
    /// exists.
    pub fn apply_hint(&self, tool: &str, error_type: &str, lesson: &str) -> bool {
        self.schemas
            .write()
            .get_mut(tool)
            .is_some_and(|schema| schema.promote_hint(error_type, lesson))
    }

    /// Existing `(tool, error_type)` pairs, for the curator to avoid
    /// re-promoting a hint that is already set.
    #[must_use]
    pub fn existing_hints(&self) -> HashMap<(String, String), ()> {
        self.schemas
            .read()
            .values()
            .flat_map(|schema| schema.error_hints.keys().map(move |e| ((schema.name.clone(), e.clone()), ())))
            .collect()
    }

    /// Render the registry into the compact "tool catalog" text included in
    /// worker/refine prompts.
    #[must_use]
    pub fn catalog_text(&self) -> String {
        let schemas = self.schemas.read();
        let mut names: Vec<&String> = schemas.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let schema = &schemas[name];
                format!("- {name}: {}", schema.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Error hints relevant to `tool`, rendered for a refine prompt.
    #[must_use]
    pub fn hints_for(&self, tool: &str) -> Vec<(String, String)> {
        self.schemas
            .read()
            .get(tool)
            .map(|schema| schema.error_hints.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Resolve `path` relative to the workspace root and reject any path
    /// that escapes it (`..` components or an absolute path outside the
    /// root), matching the security-rejected-path policy every path-taking
    /// tool must apply.
    ///
    /// # Errors
    /// Returns [`crate::Error::SecurityRejected`] when `path` would escape
    /// `workspace_root`.
    pub fn resolve_workspace_path(&self, path: &str) -> crate::Result<PathBuf> {
        let candidate = Path::new(path);
        if candidate.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(crate::Error::SecurityRejected(path.to_string()));
        }
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workspace_root.join(candidate)
        };
        if !resolved.starts_with(&self.workspace_root) {
            return Err(crate::Error::SecurityRejected(path.to_string()));
        }
        Ok(resolved)
    }
}

fn builtin_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema::new(
            "python_exec",
            "Execute a Python snippet and report stdout/stderr/success.",
            vec![ParamSpec::required("code", "string")],
        ),
        ToolSchema::new(
            "write_file",
            "Write content to a path under the workspace root.",
            vec![ParamSpec::required("path", "string"), ParamSpec::required("content", "string")],
        ),
        ToolSchema::new("read_file", "Read a file under the workspace root.", vec![ParamSpec::required("path", "string")]),
        ToolSchema::new("list_dir", "List entries of a directory under the workspace root.", vec![ParamSpec::required("path", "string")]),
        ToolSchema::new("run_command", "Run a shell command in the workspace.", vec![ParamSpec::required("command", "string")]),
        ToolSchema::new(
            "search_files",
            "Search files under the workspace root by content query.",
            vec![
                ParamSpec::required("query", "string"),
                ParamSpec::optional("path", "string"),
                ParamSpec::optional("extensions", "list"),
            ],
        ),
        ToolSchema::new(
            "replace_in_file",
            "Replace a target substring with a replacement in a workspace file.",
            vec![
                ParamSpec::required("path", "string"),
                ParamSpec::required("target", "string"),
                ParamSpec::required("replacement", "string"),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_ships_seven_builtins() {
        let registry = ToolRegistry::with_builtins("/workspace");
        assert_eq!(registry.names().len(), 7);
        assert!(registry.is_registered("python_exec"));
    }

    #[test]
    fn promote_hint_bumps_version_once() {
        let registry = ToolRegistry::with_builtins("/workspace");
        assert!(registry.apply_hint("python_exec", "IndexError", "check bounds"));
        assert!(!registry.apply_hint("python_exec", "IndexError", "a different lesson"));
        let schema = registry.get("python_exec").unwrap();
        assert_eq!(schema.version, 2);
        assert_eq!(schema.error_hints["IndexError"], "check bounds");
    }

    #[test]
    fn parent_dir_component_is_rejected() {
        let registry = ToolRegistry::with_builtins("/workspace");
        assert!(registry.resolve_workspace_path("../etc/passwd").is_err());
    }

    #[test]
    fn relative_path_resolves_under_workspace_root() {
        let registry = ToolRegistry::with_builtins("/workspace");
        let resolved = registry.resolve_workspace_path("notes/a.txt").unwrap();
        assert_eq!(resolved, PathBuf::from("/workspace/notes/a.txt"));
    }
}
