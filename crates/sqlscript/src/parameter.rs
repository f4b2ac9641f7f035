/*
 * parameter.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Parameter placeholder content and the parameters collected by a render.
//!
//! The content of a `#{...}` placeholder is either a property path or a
//! parenthesized expression, optionally followed by an old-style `:jdbcType`
//! and a list of `name=value` options:
//!
//! ```text
//! #{user.id}
//! #{user.id:INTEGER}
//! #{user.id, jdbcType=INTEGER, mode=IN}
//! #{(id + 1), jdbcType=INTEGER}
//! ```

use crate::value::Value;
use serde::Serialize;

/// Where a parameter's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterSource {
    /// A property path such as `user.id`.
    Property(String),
    /// A parenthesized expression, stored without the parentheses.
    Expression(String),
}

impl ParameterSource {
    /// The expression text evaluated to obtain the value.
    pub fn expression(&self) -> &str {
        match self {
            ParameterSource::Property(text) | ParameterSource::Expression(text) => text,
        }
    }
}

/// Parsed form of one `#{...}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterMapping {
    pub source: ParameterSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jdbc_type: Option<String>,
    /// Remaining `name=value` options in declaration order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<(String, String)>,
}

impl ParameterMapping {
    /// Parse placeholder content.
    ///
    /// On failure returns a message describing the problem and its byte
    /// position within `content`.
    pub fn parse(content: &str) -> Result<Self, String> {
        ParameterParser::new(content).parse()
    }

    /// The property name, if this parameter reads a property.
    pub fn property(&self) -> Option<&str> {
        match &self.source {
            ParameterSource::Property(name) => Some(name),
            ParameterSource::Expression(_) => None,
        }
    }

    /// Look up an option by name.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// A copy of this mapping reading `property` instead.
    pub(crate) fn with_property(&self, property: String) -> Self {
        Self {
            source: ParameterSource::Property(property),
            jdbc_type: self.jdbc_type.clone(),
            options: self.options.clone(),
        }
    }
}

/// A parameter mapping together with the value collected for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundParameter {
    pub mapping: ParameterMapping,
    pub value: Value,
}

fn is_space(c: u8) -> bool {
    c <= b' '
}

struct ParameterParser<'a> {
    content: &'a str,
    bytes: &'a [u8],
}

impl<'a> ParameterParser<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            content,
            bytes: content.as_bytes(),
        }
    }

    fn error<T>(&self, position: usize, message: &str) -> Result<T, String> {
        Err(format!("{} at position {}", message, position))
    }

    fn skip_ws(&self, mut p: usize) -> usize {
        while p < self.bytes.len() && is_space(self.bytes[p]) {
            p += 1;
        }
        p
    }

    fn skip_until(&self, p: usize, stops: &[u8]) -> usize {
        self.bytes[p..]
            .iter()
            .position(|b| stops.contains(b))
            .map_or(self.bytes.len(), |offset| p + offset)
    }

    fn trimmed(&self, start: usize, end: usize) -> &'a str {
        self.content[start..end].trim_matches(|c: char| c <= ' ')
    }

    fn parse(&self) -> Result<ParameterMapping, String> {
        let p = self.skip_ws(0);
        if p >= self.bytes.len() {
            return self.error(p, "empty parameter");
        }

        let (source, p) = if self.bytes[p] == b'(' {
            self.expression(p + 1)?
        } else {
            let end = self.skip_until(p, b",:");
            let property = self.trimmed(p, end);
            if property.is_empty() {
                return self.error(p, "missing property name");
            }
            (ParameterSource::Property(property.to_string()), end)
        };

        let mut mapping = ParameterMapping {
            source,
            jdbc_type: None,
            options: Vec::new(),
        };

        let p = self.skip_ws(p);
        if p < self.bytes.len() {
            match self.bytes[p] {
                b':' => {
                    let left = self.skip_ws(p + 1);
                    let right = self.skip_until(left, b",");
                    let jdbc_type = self.trimmed(left, right);
                    if jdbc_type.is_empty() {
                        return self.error(p + 1, "missing jdbc type");
                    }
                    mapping.jdbc_type = Some(jdbc_type.to_string());
                    self.options(right + 1, &mut mapping)?;
                }
                b',' => self.options(p + 1, &mut mapping)?,
                _ => return self.error(p, "expected ':' or ','"),
            }
        }

        Ok(mapping)
    }

    fn expression(&self, left: usize) -> Result<(ParameterSource, usize), String> {
        let mut depth = 1;
        let mut right = left;
        while depth > 0 {
            match self.bytes.get(right) {
                Some(b')') => depth -= 1,
                Some(b'(') => depth += 1,
                Some(_) => {}
                None => return self.error(left - 1, "unbalanced parentheses"),
            }
            right += 1;
        }
        let text = self.trimmed(left, right - 1);
        if text.is_empty() {
            return self.error(left, "empty expression");
        }
        Ok((ParameterSource::Expression(text.to_string()), right))
    }

    fn options(&self, mut p: usize, mapping: &mut ParameterMapping) -> Result<(), String> {
        while p < self.bytes.len() {
            let left = self.skip_ws(p);
            if left >= self.bytes.len() {
                break;
            }
            let eq = self.skip_until(left, b"=");
            if eq >= self.bytes.len() {
                return self.error(left, "expected '=' in option");
            }
            let name = self.trimmed(left, eq);
            let end = self.skip_until(eq + 1, b",");
            let value = self.trimmed(eq + 1, end);
            if name.is_empty() {
                return self.error(left, "missing option name");
            }
            if name == "jdbcType" {
                mapping.jdbc_type = Some(value.to_string());
            } else {
                mapping.options.push((name.to_string(), value.to_string()));
            }
            p = end + 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn property(name: &str) -> ParameterSource {
        ParameterSource::Property(name.to_string())
    }

    #[test]
    fn test_parse_property() {
        let mapping = ParameterMapping::parse(" user.id ").unwrap();
        assert_eq!(mapping.source, property("user.id"));
        assert_eq!(mapping.jdbc_type, None);
        assert!(mapping.options.is_empty());
    }

    #[test]
    fn test_parse_old_style_jdbc_type() {
        let mapping = ParameterMapping::parse("id:INTEGER, mode=IN").unwrap();
        assert_eq!(mapping.property(), Some("id"));
        assert_eq!(mapping.jdbc_type.as_deref(), Some("INTEGER"));
        assert_eq!(mapping.option("mode"), Some("IN"));
    }

    #[test]
    fn test_parse_options() {
        let mapping =
            ParameterMapping::parse("name, jdbcType=VARCHAR, typeHandler=Trim, mode = OUT").unwrap();
        assert_eq!(mapping.jdbc_type.as_deref(), Some("VARCHAR"));
        assert_eq!(
            mapping.options,
            vec![
                ("typeHandler".to_string(), "Trim".to_string()),
                ("mode".to_string(), "OUT".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_expression() {
        let mapping = ParameterMapping::parse("(id + (1 * 2)), jdbcType=INTEGER").unwrap();
        assert_eq!(
            mapping.source,
            ParameterSource::Expression("id + (1 * 2)".to_string())
        );
        assert_eq!(mapping.source.expression(), "id + (1 * 2)");
        assert_eq!(mapping.property(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            ParameterMapping::parse("  "),
            Err("empty parameter at position 2".to_string())
        );
        assert_eq!(
            ParameterMapping::parse("(a"),
            Err("unbalanced parentheses at position 0".to_string())
        );
        assert_eq!(
            ParameterMapping::parse("(a) x"),
            Err("expected ':' or ',' at position 4".to_string())
        );
        assert_eq!(
            ParameterMapping::parse("id:"),
            Err("missing jdbc type at position 3".to_string())
        );
        assert_eq!(
            ParameterMapping::parse("id, mode"),
            Err("expected '=' in option at position 4".to_string())
        );
    }

    #[test]
    fn test_serialize_mapping() {
        let mapping = ParameterMapping::parse("id:INTEGER").unwrap();
        assert_eq!(
            serde_json::to_value(&mapping).unwrap(),
            serde_json::json!({"source": {"property": "id"}, "jdbc_type": "INTEGER"})
        );
    }
}
