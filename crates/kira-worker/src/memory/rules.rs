//! Coding rules and guidelines, ported from
//! `original_source/src/kira/rules/{manager,models}.py`.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    Coding,
    Refactoring,
    UiDesign,
    Testing,
    Documentation,
    Security,
    Performance,
    Custom,
}

impl RuleCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleCategory::Coding => "coding",
            RuleCategory::Refactoring => "refactoring",
            RuleCategory::UiDesign => "ui-design",
            RuleCategory::Testing => "testing",
            RuleCategory::Documentation => "documentation",
            RuleCategory::Security => "security",
            RuleCategory::Performance => "performance",
            RuleCategory::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "coding" => RuleCategory::Coding,
            "refactoring" => RuleCategory::Refactoring,
            "ui-design" => RuleCategory::UiDesign,
            "testing" => RuleCategory::Testing,
            "documentation" => RuleCategory::Documentation,
            "security" => RuleCategory::Security,
            "performance" => RuleCategory::Performance,
            _ => RuleCategory::Custom,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub text: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub category: String,
}

fn default_priority() -> i32 {
    5
}

/// Either a bare string or `{text, priority, category}` in the source YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RuleEntry {
    Text(String),
    Full(Rule),
}

impl From<RuleEntry> for Rule {
    fn from(entry: RuleEntry) -> Self {
        match entry {
            RuleEntry::Text(text) => Rule {
                text,
                priority: default_priority(),
                category: String::new(),
            },
            RuleEntry::Full(rule) => rule,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RuleSetFile {
    name: Option<String>,
    category: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    rules: Vec<RuleEntry>,
    #[serde(default)]
    anti_patterns: Vec<String>,
    #[serde(default)]
    principles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    pub name: String,
    pub category: RuleCategory,
    pub description: String,
    pub triggers: Vec<String>,
    pub rules: Vec<Rule>,
    pub anti_patterns: Vec<String>,
    pub principles: Vec<String>,
}

impl RuleSet {
    pub fn matches_task(&self, task: &str) -> bool {
        let task_lower = task.to_lowercase();
        self.triggers
            .iter()
            .any(|trigger| task_lower.contains(&trigger.to_lowercase()))
    }

    /// Markdown rendering for prompt injection: principles, then rules
    /// sorted by priority descending and capped at `max_rules`, then
    /// anti-patterns.
    pub fn to_prompt(&self, max_rules: usize) -> String {
        let mut parts = vec![format!("## {}", self.name)];

        if !self.description.is_empty() {
            parts.push(format!("\n{}\n", self.description));
        }

        if !self.principles.is_empty() {
            parts.push("\n### Guiding Principles".to_string());
            for principle in self.principles.iter().take(5) {
                parts.push(format!("- {principle}"));
            }
        }

        if !self.rules.is_empty() {
            parts.push("\n### Rules".to_string());
            let mut sorted = self.rules.clone();
            sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
            for rule in sorted.iter().take(max_rules) {
                parts.push(format!("- {}", rule.text));
            }
        }

        if !self.anti_patterns.is_empty() {
            parts.push("\n### Anti-patterns (avoid these)".to_string());
            for anti in self.anti_patterns.iter().take(5) {
                parts.push(format!("- {anti}"));
            }
        }

        parts.join("\n")
    }
}

/// Loads rulesets from three layered directories (built-in, user, project),
/// later directories overriding earlier ones by category key.
pub struct RulesManager {
    working_dir: PathBuf,
    rulesets: HashMap<String, RuleSet>,
    loaded: bool,
}

impl RulesManager {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            rulesets: HashMap::new(),
            loaded: false,
        }
    }

    fn user_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| Path::new(".").to_path_buf())
            .join(".kira")
            .join("rules")
    }

    fn project_dir(&self) -> PathBuf {
        self.working_dir.join(".kira").join("rules")
    }

    /// Built-in rulesets are compiled in rather than discovered on disk
    /// (this crate carries no `builtin/` asset directory); overridden by
    /// any same-category file under the user or project directories.
    fn builtin_rulesets() -> Vec<RuleSet> {
        Vec::new()
    }

    pub fn load(&mut self) {
        if self.loaded {
            return;
        }

        for ruleset in Self::builtin_rulesets() {
            self.rulesets.insert(ruleset.category.as_str().to_string(), ruleset);
        }

        for dir in [Self::user_dir(), self.project_dir()] {
            self.load_from_directory(&dir);
        }

        self.loaded = true;
    }

    fn load_from_directory(&mut self, dir: &Path) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            match Self::parse_ruleset(&path) {
                Ok(Some(ruleset)) => {
                    self.rulesets.insert(ruleset.category.as_str().to_string(), ruleset);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to load ruleset");
                }
            }
        }
    }

    fn parse_ruleset(path: &Path) -> Result<Option<RuleSet>, String> {
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let file: RuleSetFile = serde_yaml::from_str(&text).map_err(|e| e.to_string())?;

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("custom");
        let category = RuleCategory::parse(file.category.as_deref().unwrap_or(stem));
        let name = file.name.unwrap_or_else(|| {
            stem.replace('-', " ")
                .split_whitespace()
                .map(|w| {
                    let mut c = w.chars();
                    match c.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        });

        Ok(Some(RuleSet {
            name,
            category,
            description: file.description,
            triggers: file.triggers,
            rules: file.rules.into_iter().map(Rule::from).collect(),
            anti_patterns: file.anti_patterns,
            principles: file.principles,
        }))
    }

    pub fn get_matching_rulesets(&mut self, task: &str) -> Vec<&RuleSet> {
        self.load();
        self.rulesets.values().filter(|rs| rs.matches_task(task)).collect()
    }

    /// Rendered rules context for prompt assembly, capped at `max_rulesets`
    /// rulesets; empty string if nothing matched.
    pub fn get_context(&mut self, task: &str, max_rulesets: usize) -> String {
        let matching = self.get_matching_rulesets(task);
        if matching.is_empty() {
            return String::new();
        }

        let mut parts = vec!["## Coding Rules & Guidelines\n".to_string()];
        for ruleset in matching.into_iter().take(max_rulesets) {
            parts.push(ruleset.to_prompt(10));
            parts.push(String::new());
        }
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ruleset() -> RuleSet {
        RuleSet {
            name: "Rust Style".to_string(),
            category: RuleCategory::Coding,
            description: "House style for Rust code".to_string(),
            triggers: vec!["rust".to_string(), "cargo".to_string()],
            rules: vec![
                Rule { text: "prefer Result over panics".to_string(), priority: 9, category: String::new() },
                Rule { text: "no unused imports".to_string(), priority: 2, category: String::new() },
            ],
            anti_patterns: vec!["unwrap() in library code".to_string()],
            principles: vec!["explicit is better than implicit".to_string()],
        }
    }

    #[test]
    fn matches_task_checks_triggers_case_insensitively() {
        let rs = sample_ruleset();
        assert!(rs.matches_task("Please review this Rust module"));
        assert!(!rs.matches_task("review this python module"));
    }

    #[test]
    fn to_prompt_sorts_rules_by_priority_descending() {
        let rs = sample_ruleset();
        let prompt = rs.to_prompt(10);
        let prefer_idx = prompt.find("prefer Result").unwrap();
        let no_unused_idx = prompt.find("no unused imports").unwrap();
        assert!(prefer_idx < no_unused_idx);
    }

    #[test]
    fn empty_manager_yields_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RulesManager::new(dir.path());
        assert_eq!(manager.get_context("anything", 3), "");
    }

    #[test]
    fn project_rules_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let rules_dir = dir.path().join(".kira").join("rules");
        std::fs::create_dir_all(&rules_dir).unwrap();
        std::fs::write(
            rules_dir.join("coding.yaml"),
            "name: Project Coding Rules\ntriggers: [\"refactor\"]\nrules:\n  - text: keep functions small\n    priority: 8\n",
        )
        .unwrap();

        let mut manager = RulesManager::new(dir.path());
        let ctx = manager.get_context("please refactor this module", 3);
        assert!(ctx.contains("Project Coding Rules"));
        assert!(ctx.contains("keep functions small"));
    }
}
