// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Task Fingerprints
//!
//! A [`Fingerprint`] is the normalized key used to match an incoming task
//! against historical patterns. Generation is a total function: every field
//! has a fallback, so callers never deal with a partially-typed fingerprint.
//!
//! | Field | Fallback |
//! |-------|----------|
//! | `type` | `"unknown"` |
//! | `keywords` | `["general"]` |
//! | `language` | `"unknown"` (inferred from file extensions / keywords first) |
//! | `framework` | `"unknown"` (inferred from keywords first) |
//! | `complexity` | `medium` |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const UNKNOWN_TAG: &str = "unknown";
pub const GENERAL_KEYWORD: &str = "general";
pub const DEFAULT_MAX_KEYWORDS: usize = 12;

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9][A-Za-z0-9_\-]*").expect("token pattern is a valid regex")
});

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "that", "this", "these", "those", "are", "was",
    "were", "will", "would", "should", "could", "can", "has", "have", "had", "not", "but", "all",
    "any", "our", "your", "their", "its", "also", "then", "than", "when", "where", "which",
    "while", "what", "who", "how", "why", "use", "using", "used", "make", "need", "needs", "some",
    "more", "most", "very", "just", "only", "over", "under", "about", "after", "before", "each",
    "other", "such", "via", "per", "please", "task",
];

const EXTENSION_LANGUAGES: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("pyi", "python"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("rb", "ruby"),
    ("php", "php"),
    ("cs", "csharp"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("hpp", "cpp"),
    ("c", "c"),
    ("h", "c"),
    ("swift", "swift"),
];

const KNOWN_LANGUAGES: &[&str] = &[
    "rust", "python", "typescript", "javascript", "go", "golang", "java", "kotlin", "ruby", "php",
    "csharp", "cpp", "swift",
];

const KNOWN_FRAMEWORKS: &[&str] = &[
    "fastapi", "django", "flask", "react", "vue", "angular", "svelte", "nextjs", "express",
    "nestjs", "rails", "spring", "laravel", "axum", "actix", "rocket", "gin", "tokio",
];

/// Ordinal task complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

impl Complexity {
    /// Lenient parse; anything unrecognized is `Medium`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" | "simple" | "trivial" | "easy" => Self::Low,
            "high" | "complex" | "hard" | "critical" => Self::High,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl From<String> for Complexity {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-empty, order-insensitive keyword set.
///
/// An empty input collapses to `{"general"}` so two fingerprints built from
/// identical input always share at least one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct KeywordSet(BTreeSet<String>);

impl KeywordSet {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set: BTreeSet<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if set.is_empty() {
            set.insert(GENERAL_KEYWORD.to_string());
        }
        Self(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.0.contains(keyword)
    }

    /// Jaccard index `|A ∩ B| / |A ∪ B|`, 0.0 when both sides are empty.
    pub fn overlap(&self, other: &KeywordSet) -> f64 {
        let union = self.0.union(&other.0).count();
        if union == 0 {
            return 0.0;
        }
        let intersection = self.0.intersection(&other.0).count();
        intersection as f64 / union as f64
    }
}

impl Default for KeywordSet {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

impl From<Vec<String>> for KeywordSet {
    fn from(keywords: Vec<String>) -> Self {
        Self::new(keywords)
    }
}

impl From<KeywordSet> for Vec<String> {
    fn from(set: KeywordSet) -> Self {
        set.0.into_iter().collect()
    }
}

/// Structured key summarizing a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(rename = "type", default = "unknown_tag", deserialize_with = "normalized_tag")]
    pub task_type: String,

    #[serde(default)]
    pub keywords: KeywordSet,

    #[serde(default = "unknown_tag", deserialize_with = "normalized_tag")]
    pub language: String,

    #[serde(default = "unknown_tag", deserialize_with = "normalized_tag")]
    pub framework: String,

    #[serde(default)]
    pub complexity: Complexity,
}

impl Fingerprint {
    pub fn new<I, S>(
        task_type: &str,
        keywords: I,
        language: &str,
        framework: &str,
        complexity: Complexity,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            task_type: normalize_tag(Some(task_type)),
            keywords: KeywordSet::new(keywords),
            language: normalize_tag(Some(language)),
            framework: normalize_tag(Some(framework)),
            complexity,
        }
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self {
            task_type: unknown_tag(),
            keywords: KeywordSet::default(),
            language: unknown_tag(),
            framework: unknown_tag(),
            complexity: Complexity::Medium,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{} [{}]",
            self.task_type,
            self.language,
            self.framework,
            self.complexity,
            self.keywords.iter().collect::<Vec<_>>().join(",")
        )
    }
}

/// Raw, caller-supplied task attributes. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskAttributes {
    #[serde(rename = "type", default)]
    pub task_type: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub framework: Option<String>,

    #[serde(default)]
    pub complexity: Option<String>,

    /// Paths touched by the task; used to infer the language.
    #[serde(default)]
    pub files: Vec<String>,
}

impl TaskAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with_complexity(mut self, complexity: impl Into<String>) -> Self {
        self.complexity = Some(complexity.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.files.push(path.into());
        self
    }
}

/// Derives fingerprints from task attributes.
#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    max_keywords: usize,
}

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self {
            max_keywords: DEFAULT_MAX_KEYWORDS,
        }
    }

    pub fn with_max_keywords(mut self, max_keywords: usize) -> Self {
        self.max_keywords = max_keywords.max(1);
        self
    }

    /// Total and deterministic: the same attributes always yield the same fingerprint.
    pub fn generate(&self, attributes: &TaskAttributes) -> Fingerprint {
        let keywords = self.extract_keywords(attributes);

        let language = match non_blank(attributes.language.as_deref()) {
            Some(language) => normalize_tag(Some(language)),
            None => infer_language(&attributes.files, &keywords),
        };

        let framework = match non_blank(attributes.framework.as_deref()) {
            Some(framework) => normalize_tag(Some(framework)),
            None => infer_framework(&keywords),
        };

        Fingerprint {
            task_type: normalize_tag(attributes.task_type.as_deref()),
            keywords: KeywordSet::new(&keywords),
            language,
            framework,
            complexity: attributes
                .complexity
                .as_deref()
                .map(Complexity::parse)
                .unwrap_or_default(),
        }
    }

    /// Explicit keywords first, then description tokens, in order of first
    /// appearance, capped at `max_keywords`.
    fn extract_keywords(&self, attributes: &TaskAttributes) -> Vec<String> {
        let explicit = attributes
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty());
        let described = attributes
            .description
            .as_deref()
            .map(tokenize)
            .unwrap_or_default();

        let mut seen = BTreeSet::new();
        explicit
            .chain(described)
            .filter(|k| seen.insert(k.clone()))
            .take(self.max_keywords)
            .collect()
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort tokenizer over free text. Never fails; empty input yields nothing.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_PATTERN
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['-', '_'])
                .to_lowercase()
        })
        .filter(|token| {
            token.chars().count() >= 3
                && !token.chars().all(|c| c.is_ascii_digit())
                && !STOP_WORDS.contains(&token.as_str())
        })
        .collect()
}

fn infer_language(files: &[String], keywords: &[String]) -> String {
    let from_extension = files.iter().find_map(|path| {
        let extension = std::path::Path::new(path)
            .extension()?
            .to_str()?
            .to_lowercase();
        EXTENSION_LANGUAGES
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, language)| *language)
    });

    let language = from_extension.or_else(|| {
        keywords
            .iter()
            .find_map(|k| KNOWN_LANGUAGES.iter().find(|l| **l == k.as_str()).copied())
            .map(|l| if l == "golang" { "go" } else { l })
    });

    language.unwrap_or(UNKNOWN_TAG).to_string()
}

fn infer_framework(keywords: &[String]) -> String {
    keywords
        .iter()
        .find_map(|k| KNOWN_FRAMEWORKS.iter().find(|f| **f == k.as_str()))
        .map(|f| f.to_string())
        .unwrap_or_else(unknown_tag)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn normalize_tag(value: Option<&str>) -> String {
    non_blank(value)
        .map(|v| v.trim().to_lowercase())
        .unwrap_or_else(unknown_tag)
}

fn unknown_tag() -> String {
    UNKNOWN_TAG.to_string()
}

fn normalized_tag<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(normalize_tag(raw.as_deref()))
}
