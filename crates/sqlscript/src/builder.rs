/*
 * builder.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiling a tagged input tree into the script AST.
//!
//! The builder walks the tree depth-first. Text and CDATA become text nodes;
//! elements are dispatched by tag name. `<else-if>` and `<else>` are
//! collected onto the most recent `<if>` of the same sibling list and the
//! chain is assembled once the next unrelated sibling (or the end of the
//! list) is reached.

use crate::ast::{
    BindNode, Body, CaseNode, ChooseNode, ElseBranch, ForeachNode, IfNode, SqlNode, TextPiece,
    TextTemplate,
};
use crate::error::{BuildError, BuildResult};
use crate::options::ScriptOptions;
use crate::parameter::ParameterMapping;
use crate::placeholder::{Segment, has_interpolation, has_parameter, split_placeholders};
use crate::tree::{NodeKind, ScriptNode};
use sqlscript_xml::Span;

/// Tags the builder knows, resolved from element names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Bind,
    If,
    ElseIf,
    Else,
    Choose,
    Foreach,
    Otherwise,
}

impl Tag {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bind" => Tag::Bind,
            "if" | "when" => Tag::If,
            "else-if" => Tag::ElseIf,
            "else" => Tag::Else,
            "choose" => Tag::Choose,
            "foreach" => Tag::Foreach,
            "otherwise" => Tag::Otherwise,
            _ => return None,
        })
    }
}

pub(crate) struct Builder<'o> {
    options: &'o ScriptOptions,
}

/// One `if`/`else-if` link waiting for its chain to be closed.
struct PendingLink {
    tag: &'static str,
    test: String,
    body: Body,
    span: Option<Span>,
}

impl PendingLink {
    fn into_node(self, otherwise: Option<ElseBranch>) -> IfNode {
        IfNode {
            tag: self.tag,
            test: self.test,
            body: self.body,
            otherwise,
            span: self.span,
        }
    }
}

/// An open conditional chain: the `if`, any `else-if`s and maybe an `else`.
struct PendingIf {
    head: PendingLink,
    else_ifs: Vec<PendingLink>,
    else_body: Option<Body>,
}

impl PendingIf {
    /// Assemble the chain from its last link backwards.
    fn finish(self) -> SqlNode {
        let mut otherwise = self.else_body.map(ElseBranch::Else);
        for link in self.else_ifs.into_iter().rev() {
            otherwise = Some(ElseBranch::ElseIf(Box::new(link.into_node(otherwise))));
        }
        SqlNode::If(self.head.into_node(otherwise))
    }
}

/// Nodes built so far for one list of siblings.
#[derive(Default)]
struct SiblingList {
    nodes: Vec<SqlNode>,
    pending: Option<PendingIf>,
}

impl SiblingList {
    fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.nodes.push(pending.finish());
        }
    }

    fn push(&mut self, node: SqlNode) {
        self.flush();
        self.nodes.push(node);
    }

    fn finish(mut self) -> Vec<SqlNode> {
        self.flush();
        self.nodes
    }
}

fn body(nodes: Vec<SqlNode>) -> Body {
    let node = into_node(nodes);
    Body {
        scoped: node.contains_bind(),
        node: Box::new(node),
    }
}

/// A single node stays as it is; anything else becomes a sequence.
fn into_node(mut nodes: Vec<SqlNode>) -> SqlNode {
    if nodes.len() == 1
        && let Some(node) = nodes.pop()
    {
        return node;
    }
    SqlNode::Sequence(nodes)
}

fn tag_of<N: ScriptNode>(node: &N) -> String {
    node.tag_name().unwrap_or_default().to_string()
}

fn required<'n, N: ScriptNode>(node: &'n N, attribute: &'static str) -> BuildResult<&'n str> {
    node.attribute(attribute)
        .ok_or_else(|| BuildError::MissingAttribute {
            tag: tag_of(node),
            attribute,
            span: node.span(),
        })
}

fn bool_attribute<N: ScriptNode>(
    node: &N,
    attribute: &'static str,
    default: bool,
) -> BuildResult<bool> {
    node.bool_attribute(attribute, default)
        .map_err(|value| BuildError::InvalidBoolean {
            tag: tag_of(node),
            attribute,
            value,
            span: node.span(),
        })
}

impl<'o> Builder<'o> {
    pub(crate) fn new(options: &'o ScriptOptions) -> Self {
        Self { options }
    }

    /// Build a list of sibling nodes.
    pub(crate) fn build_children<N: ScriptNode>(&self, children: &[N]) -> BuildResult<Vec<SqlNode>> {
        let mut list = SiblingList::default();
        for child in children {
            match child.kind() {
                NodeKind::Text | NodeKind::CData => {
                    self.handle_text(child.text().unwrap_or_default(), child.span(), &mut list)?
                }
                NodeKind::Element => {
                    let name = child.tag_name().unwrap_or_default();
                    let tag = Tag::from_name(name).ok_or_else(|| BuildError::UnknownTag {
                        tag: name.to_string(),
                        span: child.span(),
                    })?;
                    match tag {
                        Tag::Bind => self.handle_bind(child, &mut list)?,
                        Tag::If => self.handle_if(child, &mut list)?,
                        Tag::ElseIf => self.handle_else_if(child, &mut list)?,
                        Tag::Else => self.handle_else(child, &mut list)?,
                        Tag::Choose => self.handle_choose(child, &mut list)?,
                        Tag::Foreach => self.handle_foreach(child, &mut list)?,
                        Tag::Otherwise => {
                            return Err(BuildError::MisplacedOtherwise { span: child.span() });
                        }
                    }
                }
            }
        }
        Ok(list.finish())
    }

    fn handle_text(&self, raw: &str, span: Option<Span>, list: &mut SiblingList) -> BuildResult<()> {
        if raw.trim().is_empty() {
            return Ok(());
        }
        let text = if self.options.preserve_whitespace {
            raw.to_string()
        } else {
            raw.split_whitespace().collect::<Vec<_>>().join(" ")
        };

        let segments = split_placeholders(&text);
        let node = if has_interpolation(&segments) || has_parameter(&segments) {
            let mut pieces = Vec::with_capacity(segments.len());
            for segment in segments {
                pieces.push(match segment {
                    Segment::Literal(literal) => TextPiece::Literal(literal),
                    Segment::Interpolation(expression) => TextPiece::Interpolation(expression),
                    Segment::Parameter(content) => {
                        let mapping = ParameterMapping::parse(&content).map_err(|message| {
                            BuildError::InvalidParameter {
                                content: content.clone(),
                                message,
                                span,
                            }
                        })?;
                        TextPiece::Parameter(mapping)
                    }
                });
            }
            SqlNode::Template(TextTemplate { pieces, span })
        } else {
            let literal: String = segments
                .into_iter()
                .filter_map(|segment| match segment {
                    Segment::Literal(literal) => Some(literal),
                    _ => None,
                })
                .collect();
            SqlNode::Text(literal)
        };

        list.flush();
        let joiner = if self.options.preserve_whitespace { "" } else { " " };
        let unmerged = match list.nodes.last_mut() {
            Some(last) => merge_text(last, node, joiner),
            None => Some(node),
        };
        if let Some(node) = unmerged {
            list.nodes.push(node);
        }
        Ok(())
    }

    fn handle_bind<N: ScriptNode>(&self, node: &N, list: &mut SiblingList) -> BuildResult<()> {
        let name = required(node, "name")?;
        let value = required(node, "value")?;
        list.push(SqlNode::Bind(BindNode {
            name: name.to_string(),
            value: value.to_string(),
            span: node.span(),
        }));
        Ok(())
    }

    fn handle_if<N: ScriptNode>(&self, node: &N, list: &mut SiblingList) -> BuildResult<()> {
        let link = self.link(node, "if")?;
        list.flush();
        list.pending = Some(PendingIf {
            head: link,
            else_ifs: Vec::new(),
            else_body: None,
        });
        Ok(())
    }

    fn handle_else_if<N: ScriptNode>(&self, node: &N, list: &mut SiblingList) -> BuildResult<()> {
        let link = self.link(node, "else-if")?;
        match &mut list.pending {
            Some(pending) if pending.else_body.is_none() => {
                pending.else_ifs.push(link);
                Ok(())
            }
            _ => Err(BuildError::DanglingElse {
                tag: "else-if".to_string(),
                span: node.span(),
            }),
        }
    }

    fn handle_else<N: ScriptNode>(&self, node: &N, list: &mut SiblingList) -> BuildResult<()> {
        let else_body = body(self.build_children(node.children())?);
        match &mut list.pending {
            Some(pending) if pending.else_body.is_none() => {
                pending.else_body = Some(else_body);
                Ok(())
            }
            _ => Err(BuildError::DanglingElse {
                tag: "else".to_string(),
                span: node.span(),
            }),
        }
    }

    /// Build an `if`/`when`/`else-if` element into a chain link.
    fn link<N: ScriptNode>(&self, node: &N, tag: &'static str) -> BuildResult<PendingLink> {
        let test = required(node, "test")?;
        let tag = if tag == "if" && node.tag_name() == Some("when") {
            "when"
        } else {
            tag
        };
        Ok(PendingLink {
            tag,
            test: test.to_string(),
            body: body(self.build_children(node.children())?),
            span: node.span(),
        })
    }

    fn handle_choose<N: ScriptNode>(&self, node: &N, list: &mut SiblingList) -> BuildResult<()> {
        let mut cases = Vec::new();
        let mut otherwise = None;

        for child in node.children() {
            if child.kind() != NodeKind::Element {
                continue;
            }
            match child.tag_name().unwrap_or_default() {
                "when" | "if" => cases.push(CaseNode {
                    test: required(child, "test")?.to_string(),
                    breaks: bool_attribute(child, "break", false)?,
                    body: body(self.build_children(child.children())?),
                    span: child.span(),
                }),
                "otherwise" => {
                    if otherwise.is_some() {
                        return Err(BuildError::DuplicateOtherwise { span: child.span() });
                    }
                    otherwise = Some(body(self.build_children(child.children())?));
                }
                other => {
                    return Err(BuildError::InvalidChooseChild {
                        tag: other.to_string(),
                        span: child.span(),
                    });
                }
            }
        }

        list.push(SqlNode::Choose(ChooseNode {
            cases,
            otherwise,
            span: node.span(),
        }));
        Ok(())
    }

    fn handle_foreach<N: ScriptNode>(&self, node: &N, list: &mut SiblingList) -> BuildResult<()> {
        let collection = required(node, "collection")?;
        let nullable = match node.attribute("nullable") {
            Some(_) => Some(bool_attribute(node, "nullable", false)?),
            None => None,
        };
        let attribute = |name: &str| node.attribute(name).map(str::to_string);

        list.push(SqlNode::Foreach(ForeachNode {
            collection: collection.to_string(),
            nullable,
            item: attribute("item"),
            index: attribute("index"),
            open: attribute("open"),
            close: attribute("close"),
            separator: attribute("separator"),
            body: Box::new(into_node(self.build_children(node.children())?)),
            span: node.span(),
        }));
        Ok(())
    }
}

/// Append `next` to `last` when both are text of the same class.
///
/// Returns `next` back when the two cannot be merged.
fn merge_text(last: &mut SqlNode, next: SqlNode, joiner: &str) -> Option<SqlNode> {
    match (last, next) {
        (SqlNode::Text(text), SqlNode::Text(more)) => {
            text.push_str(joiner);
            text.push_str(&more);
            None
        }
        (SqlNode::Template(template), SqlNode::Template(more))
            if template.is_interpolated() == more.is_interpolated() =>
        {
            let joiner = TextPiece::Literal(joiner.to_string());
            for piece in std::iter::once(joiner).chain(more.pieces) {
                if let (Some(TextPiece::Literal(text)), TextPiece::Literal(more)) =
                    (template.pieces.last_mut(), &piece)
                {
                    text.push_str(more);
                    continue;
                }
                template.pieces.push(piece);
            }
            template.span = match (template.span, more.span) {
                (Some(first), Some(second)) => Some(Span::new(first.start, second.end)),
                (first, second) => first.or(second),
            };
            None
        }
        (_, next) => Some(next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlscript_xml::XmlNode;

    fn build_with(xml: &str, options: &ScriptOptions) -> BuildResult<Vec<SqlNode>> {
        let document = sqlscript_xml::parse(xml)?;
        let root = XmlNode::Element(document.root);
        Builder::new(options).build_children(root.children())
    }

    fn build(xml: &str) -> BuildResult<Vec<SqlNode>> {
        build_with(xml, &ScriptOptions::default())
    }

    #[test]
    fn test_static_text_is_collapsed() {
        let nodes = build("<script>\n  select *\n    from t\n</script>").unwrap();
        assert_eq!(nodes, vec![SqlNode::Text("select * from t".to_string())]);
    }

    #[test]
    fn test_preserve_whitespace() {
        let options = ScriptOptions {
            preserve_whitespace: true,
            ..Default::default()
        };
        let nodes = build_with("<script>select *\n  from t</script>", &options).unwrap();
        assert_eq!(nodes, vec![SqlNode::Text("select *\n  from t".to_string())]);
    }

    #[test]
    fn test_text_classes_merge_with_like_neighbours() {
        let nodes = build("<script>a <![CDATA[b < c]]> #{x} <bind name=\"n\" value=\"1\"/> d</script>")
            .unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0], SqlNode::Text("a b < c".to_string()));
        assert!(matches!(&nodes[1], SqlNode::Template(t) if t.has_parameters()));
        assert!(matches!(&nodes[2], SqlNode::Bind(_)));
        assert_eq!(nodes[3], SqlNode::Text("d".to_string()));
    }

    #[test]
    fn test_static_runs_merge() {
        let nodes = build("<script>a <![CDATA[ b < c ]]>d</script>").unwrap();
        assert_eq!(nodes, vec![SqlNode::Text("a b < c d".to_string())]);
    }

    #[test]
    fn test_parameter_is_parsed_at_build() {
        let nodes = build("<script>id = #{id:INTEGER}</script>").unwrap();
        let SqlNode::Template(template) = &nodes[0] else {
            panic!("expected template");
        };
        let TextPiece::Parameter(mapping) = &template.pieces[1] else {
            panic!("expected parameter");
        };
        assert_eq!(mapping.jdbc_type.as_deref(), Some("INTEGER"));
    }

    #[test]
    fn test_invalid_parameter_is_a_build_error() {
        let err = build("<script>#{id:}</script>").unwrap_err();
        assert!(matches!(err, BuildError::InvalidParameter { ref content, .. } if content == "id:"));
    }

    #[test]
    fn test_else_chain() {
        let nodes = build(
            r#"<script>
                <if test="a">A</if>
                <else-if test="b">B</else-if>
                <else-if test="c">C</else-if>
                <else>D</else>
                tail
            </script>"#,
        )
        .unwrap();
        assert_eq!(nodes.len(), 2);
        let SqlNode::If(first) = &nodes[0] else {
            panic!("expected if");
        };
        assert_eq!(first.test, "a");
        let Some(ElseBranch::ElseIf(second)) = &first.otherwise else {
            panic!("expected else-if");
        };
        assert_eq!((second.tag, second.test.as_str()), ("else-if", "b"));
        let Some(ElseBranch::ElseIf(third)) = &second.otherwise else {
            panic!("expected else-if");
        };
        assert_eq!(third.test, "c");
        assert!(matches!(&third.otherwise, Some(ElseBranch::Else(_))));
        assert_eq!(nodes[1], SqlNode::Text("tail".to_string()));
    }

    #[test]
    fn test_dangling_else() {
        let err = build("<script>x<else>y</else></script>").unwrap_err();
        assert!(matches!(err, BuildError::DanglingElse { ref tag, .. } if tag == "else"));

        let err = build("<script><if test=\"a\"/>text<else-if test=\"b\"/></script>").unwrap_err();
        assert!(matches!(err, BuildError::DanglingElse { ref tag, .. } if tag == "else-if"));

        let err = build("<script><if test=\"a\"/><else/><else/></script>").unwrap_err();
        assert!(matches!(err, BuildError::DanglingElse { .. }));
    }

    #[test]
    fn test_choose() {
        let nodes = build(
            r#"<script><choose>
                <when test="a" break="true">A</when>
                <when test="b">B</when>
                <otherwise>C</otherwise>
            </choose></script>"#,
        )
        .unwrap();
        let SqlNode::Choose(choose) = &nodes[0] else {
            panic!("expected choose");
        };
        assert_eq!(choose.cases.len(), 2);
        assert!(choose.cases[0].breaks);
        assert!(!choose.cases[1].breaks);
        assert!(choose.otherwise.is_some());
    }

    #[test]
    fn test_if_is_a_case_inside_choose() {
        let nodes = build(
            r#"<script><choose><if test="a" break="true">A</if><when test="b">B</when></choose></script>"#,
        )
        .unwrap();
        let SqlNode::Choose(choose) = &nodes[0] else {
            panic!("expected choose");
        };
        assert_eq!(choose.cases.len(), 2);
        assert_eq!(choose.cases[0].test, "a");
        assert!(choose.cases[0].breaks);
    }

    #[test]
    fn test_choose_errors() {
        let err = build("<script><choose><otherwise/><otherwise/></choose></script>").unwrap_err();
        assert!(matches!(err, BuildError::DuplicateOtherwise { .. }));

        let err = build("<script><choose><bind name=\"a\" value=\"1\"/></choose></script>")
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidChooseChild { ref tag, .. } if tag == "bind"));

        let err = build("<script><otherwise/></script>").unwrap_err();
        assert!(matches!(err, BuildError::MisplacedOtherwise { .. }));

        let err = build("<script><choose><when test=\"a\" break=\"maybe\"/></choose></script>")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid boolean 'maybe' for attribute 'break' on <when>"
        );
    }

    #[test]
    fn test_unknown_tag_and_missing_attribute() {
        let source = "<script>\n<where>x</where></script>";
        let err = build(source).unwrap_err();
        assert!(matches!(err, BuildError::UnknownTag { ref tag, .. } if tag == "where"));
        let location = err.location(source).unwrap();
        assert_eq!((location.line, location.column), (2, 1));

        let err = build("<script><bind name=\"x\"/></script>").unwrap_err();
        assert_eq!(err.to_string(), "<bind> is missing required attribute 'value'");
    }

    #[test]
    fn test_bind_marks_enclosing_branch_scoped() {
        let nodes = build(
            r#"<script>
                <if test="a"><if test="b"><bind name="x" value="1"/></if></if>
                <if test="c">plain</if>
            </script>"#,
        )
        .unwrap();
        let [SqlNode::If(outer), SqlNode::If(plain)] = nodes.as_slice() else {
            panic!("expected two ifs");
        };
        assert!(outer.body.scoped);
        assert!(!plain.body.scoped);
    }

    #[test]
    fn test_foreach_attributes() {
        let nodes = build(
            r#"<script><foreach collection="ids" item="id" open="(" close=")" separator="," nullable="true">#{id}</foreach></script>"#,
        )
        .unwrap();
        let SqlNode::Foreach(each) = &nodes[0] else {
            panic!("expected foreach");
        };
        assert_eq!(each.collection, "ids");
        assert_eq!(each.item.as_deref(), Some("id"));
        assert_eq!(each.index, None);
        assert_eq!(each.nullable, Some(true));
        assert_eq!(each.separator.as_deref(), Some(","));
        assert!(matches!(*each.body, SqlNode::Template(_)));
    }
}
