/*
 * options.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Build options carried by every script.

use crate::error::BuildResult;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Options controlling how a script is built and rendered.
///
/// Deserializes from any serde format; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptOptions {
    /// Whether `<foreach>` tags without a `nullable` attribute accept a
    /// null collection.
    pub foreach_nullable: bool,

    /// Text written in place of each `#{...}` placeholder.
    pub parameter_marker: String,

    /// Regular expression every `${...}` value must match in full.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injection_filter: Option<String>,

    /// Keep literal text as written instead of collapsing whitespace runs.
    pub preserve_whitespace: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            foreach_nullable: false,
            parameter_marker: "?".to_string(),
            injection_filter: None,
            preserve_whitespace: false,
        }
    }
}

impl ScriptOptions {
    pub fn with_injection_filter(mut self, pattern: impl Into<String>) -> Self {
        self.injection_filter = Some(pattern.into());
        self
    }

    pub fn with_parameter_marker(mut self, marker: impl Into<String>) -> Self {
        self.parameter_marker = marker.into();
        self
    }

    /// Compile the injection filter, anchored so it must match the whole value.
    pub(crate) fn compile_injection_filter(&self) -> BuildResult<Option<InjectionFilter>> {
        let Some(pattern) = &self.injection_filter else {
            return Ok(None);
        };
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Some(InjectionFilter {
            pattern: pattern.clone(),
            regex,
        }))
    }
}

/// A compiled injection filter.
#[derive(Debug, Clone)]
pub(crate) struct InjectionFilter {
    pub pattern: String,
    regex: Regex,
}

impl InjectionFilter {
    pub fn accepts(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;

    #[test]
    fn test_defaults() {
        let options = ScriptOptions::default();
        assert!(!options.foreach_nullable);
        assert_eq!(options.parameter_marker, "?");
        assert_eq!(options.injection_filter, None);
        assert!(!options.preserve_whitespace);
    }

    #[test]
    fn test_deserialize_partial() {
        let options: ScriptOptions =
            serde_json::from_str(r#"{"foreach_nullable": true, "parameter_marker": "$"}"#).unwrap();
        assert!(options.foreach_nullable);
        assert_eq!(options.parameter_marker, "$");
        assert!(!options.preserve_whitespace);
    }

    #[test]
    fn test_injection_filter_matches_whole_value() {
        let filter = ScriptOptions::default()
            .with_injection_filter(r"\w+")
            .compile_injection_filter()
            .unwrap()
            .unwrap();
        assert!(filter.accepts("name"));
        assert!(!filter.accepts("name; drop table users"));
        assert_eq!(filter.pattern, r"\w+");
    }

    #[test]
    fn test_invalid_injection_filter() {
        let result = ScriptOptions::default()
            .with_injection_filter("(")
            .compile_injection_filter();
        assert!(matches!(result, Err(BuildError::InvalidInjectionFilter(_))));
    }
}
