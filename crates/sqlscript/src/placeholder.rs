/*
 * placeholder.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Splitting text runs into literal text and `${...}` / `#{...}` placeholders.

/// One piece of a text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, with escapes already resolved.
    Literal(String),
    /// `${expr}`: substituted into the output as text.
    Interpolation(String),
    /// `#{expr}`: replaced by a marker and collected as a parameter.
    Parameter(String),
}

const INTERPOLATION_OPEN: &str = "${";
const PARAMETER_OPEN: &str = "#{";

/// Split `text` into segments.
///
/// A backslash directly before `${` or `#{` emits the opening token
/// literally. Inside a placeholder, `\}` stands for a literal `}`. An opening
/// token with no closing brace is kept as literal text.
pub fn split_placeholders(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some((start, is_parameter)) = find_open(rest) {
        if start > 0 && rest.as_bytes()[start - 1] == b'\\' {
            literal.push_str(&rest[..start - 1]);
            literal.push_str(&rest[start..start + 2]);
            rest = &rest[start + 2..];
            continue;
        }

        literal.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        match find_close(body) {
            Some((content, consumed)) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(if is_parameter {
                    Segment::Parameter(content)
                } else {
                    Segment::Interpolation(content)
                });
                rest = &body[consumed..];
            }
            None => {
                literal.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Position of the next opening token and whether it opens a parameter.
fn find_open(text: &str) -> Option<(usize, bool)> {
    let interpolation = text.find(INTERPOLATION_OPEN);
    let parameter = text.find(PARAMETER_OPEN);
    match (interpolation, parameter) {
        (Some(i), Some(p)) if p < i => Some((p, true)),
        (Some(i), _) => Some((i, false)),
        (None, Some(p)) => Some((p, true)),
        (None, None) => None,
    }
}

/// Placeholder content up to the first unescaped `}` and the number of bytes
/// consumed including that brace.
fn find_close(body: &str) -> Option<(String, usize)> {
    let mut content = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' if chars.peek().is_some_and(|(_, next)| *next == '}') => {
                content.push('}');
                chars.next();
            }
            '}' => return Some((content, offset + 1)),
            c => content.push(c),
        }
    }
    None
}

/// Whether any segment is an interpolation.
pub fn has_interpolation(segments: &[Segment]) -> bool {
    segments
        .iter()
        .any(|segment| matches!(segment, Segment::Interpolation(_)))
}

/// Whether any segment is a parameter.
pub fn has_parameter(segments: &[Segment]) -> bool {
    segments
        .iter()
        .any(|segment| matches!(segment, Segment::Parameter(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lit(s: &str) -> Segment {
        Segment::Literal(s.to_string())
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(split_placeholders("select 1"), vec![lit("select 1")]);
        assert_eq!(split_placeholders(""), vec![]);
    }

    #[test]
    fn test_mixed_placeholders() {
        assert_eq!(
            split_placeholders("where ${col} = #{id} and x = #{ y }"),
            vec![
                lit("where "),
                Segment::Interpolation("col".to_string()),
                lit(" = "),
                Segment::Parameter("id".to_string()),
                lit(" and x = "),
                Segment::Parameter(" y ".to_string()),
            ]
        );
    }

    #[test]
    fn test_escaped_open_token() {
        assert_eq!(
            split_placeholders(r"a \${b} #{c}"),
            vec![lit("a ${b} "), Segment::Parameter("c".to_string())]
        );
        assert_eq!(split_placeholders(r"\#{x}"), vec![lit("#{x}")]);
    }

    #[test]
    fn test_escaped_close_brace() {
        assert_eq!(
            split_placeholders(r"${m['\}']}!"),
            vec![Segment::Interpolation("m['}']".to_string()), lit("!")]
        );
    }

    #[test]
    fn test_unclosed_placeholder_is_literal() {
        assert_eq!(split_placeholders("a ${b"), vec![lit("a ${b")]);
    }

    #[test]
    fn test_classification() {
        let segments = split_placeholders("#{a}");
        assert!(has_parameter(&segments));
        assert!(!has_interpolation(&segments));
        let segments = split_placeholders("${a}");
        assert!(has_interpolation(&segments));
    }
}
