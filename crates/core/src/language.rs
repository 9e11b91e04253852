//! Language registry.
//!
//! Maps a language name to the container image that runs it, the source file
//! extension and the interpreter executable. The built-in table covers Python
//! and JavaScript; configuration can add languages or override entries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{Error, Result};

/// How to run one language inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Container image reference (e.g. "python:3").
    pub image: String,
    /// Source file extension without the dot (e.g. "py").
    pub extension: String,
    /// Interpreter executable invoked with the source file (e.g. "python").
    pub interpreter: String,
}

impl LanguageProfile {
    pub fn new(
        image: impl Into<String>,
        extension: impl Into<String>,
        interpreter: impl Into<String>,
    ) -> Self {
        Self {
            image: image.into(),
            extension: extension.into(),
            interpreter: interpreter.into(),
        }
    }

    /// `<stem>.<extension>`
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension)
    }
}

/// Static table of supported languages.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: HashMap<String, LanguageProfile>,
}

impl LanguageRegistry {
    /// An empty registry. Mostly useful in tests.
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
        }
    }

    /// Built-in languages extended (or overridden) by `overrides`.
    pub fn with_overrides(overrides: &HashMap<String, LanguageProfile>) -> Self {
        let mut registry = Self::default();
        for (name, profile) in overrides {
            registry.register(name.clone(), profile.clone());
        }
        registry
    }

    /// Add or replace a language.
    pub fn register(&mut self, name: impl Into<String>, profile: LanguageProfile) {
        self.profiles.insert(name.into(), profile);
    }

    pub fn get(&self, name: &str) -> Option<&LanguageProfile> {
        self.profiles.get(name)
    }

    /// Look up a language, failing with `UnsupportedLanguage`.
    pub fn resolve(&self, name: &str) -> Result<&LanguageProfile> {
        self.get(name)
            .ok_or_else(|| Error::unsupported_language(name.to_string()))
    }

    /// Supported language names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("python", LanguageProfile::new("python:3", "py", "python"));
        registry.register(
            "javascript",
            LanguageProfile::new("node:18-alpine", "js", "node"),
        );
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_languages() {
        let registry = LanguageRegistry::default();
        let python = registry.resolve("python").unwrap();
        assert_eq!(python.image, "python:3");
        assert_eq!(python.file_name("file"), "file.py");

        let js = registry.resolve("javascript").unwrap();
        assert_eq!(js.image, "node:18-alpine");
        assert_eq!(js.interpreter, "node");
        assert_eq!(registry.names(), vec!["javascript", "python"]);
    }

    #[test]
    fn test_unknown_language_is_unsupported() {
        let registry = LanguageRegistry::default();
        let err = registry.resolve("cobol").unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(ref l) if l == "cobol"));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(LanguageRegistry::default().get("Python").is_none());
    }

    #[test]
    fn test_overrides_extend_and_replace() {
        let overrides = HashMap::from([
            (
                "python".to_string(),
                LanguageProfile::new("python:3.12-slim", "py", "python3"),
            ),
            (
                "ruby".to_string(),
                LanguageProfile::new("ruby:3", "rb", "ruby"),
            ),
        ]);
        let registry = LanguageRegistry::with_overrides(&overrides);
        assert_eq!(registry.resolve("python").unwrap().image, "python:3.12-slim");
        assert_eq!(registry.resolve("ruby").unwrap().extension, "rb");
        assert!(registry.get("javascript").is_some());
    }
}
