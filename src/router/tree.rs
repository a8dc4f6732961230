//! Segment tree for route matching
//!
//! Each node is one path segment. Literal children are tried first, in the
//! order they were inserted, then the parameter child, then a trailing
//! wildcard. A branch that fails deeper down backtracks to the next
//! candidate, so `/users/active/posts` can still reach `/users/:id/posts`.

use crate::error::{Result, TrellisError};
use axum::http::Method;
use std::borrow::Cow;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

/// Split a route path into segments, dropping empty ones.
///
/// `:id` and `{id}` are parameters; `*` or `*rest` as the last segment is a
/// wildcard.
pub(crate) fn parse(path: &str) -> Result<Vec<Segment>> {
    let raw: Vec<&str> = split(path).collect();
    let mut segments = Vec::with_capacity(raw.len());
    for (i, segment) in raw.iter().enumerate() {
        let parsed = if let Some(name) = segment.strip_prefix(':') {
            Segment::Param(param_name(path, name)?)
        } else if let Some(name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            Segment::Param(param_name(path, name)?)
        } else if let Some(name) = segment.strip_prefix('*') {
            if i + 1 != raw.len() {
                return Err(TrellisError::InvalidRoute {
                    path: path.to_string(),
                    reason: "a wildcard must be the last segment".to_string(),
                });
            }
            Segment::Wildcard(if name.is_empty() { "*".to_string() } else { name.to_string() })
        } else {
            Segment::Literal(segment.to_string())
        };
        segments.push(parsed);
    }
    Ok(segments)
}

fn param_name(path: &str, name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(TrellisError::InvalidRoute {
            path: path.to_string(),
            reason: "a path parameter needs a name".to_string(),
        });
    }
    Ok(name.to_string())
}

pub(crate) fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// `/` followed by the segments; parameter names are kept as written.
pub(crate) fn display(segments: &[Segment]) -> String {
    let parts: Vec<String> = segments
        .iter()
        .map(|s| match s {
            Segment::Literal(l) => l.clone(),
            Segment::Param(name) => format!(":{name}"),
            Segment::Wildcard(name) if name == "*" => "*".to_string(),
            Segment::Wildcard(name) => format!("*{name}"),
        })
        .collect();
    format!("/{}", parts.join("/"))
}

#[derive(Default)]
struct Node {
    literals: Vec<(String, Node)>,
    param: Option<Box<Node>>,
    wildcard: HashMap<Method, usize>,
    routes: HashMap<Method, usize>,
}

/// Maps (method, segments) to a route index.
#[derive(Default)]
pub(crate) struct SegmentTree {
    root: Node,
}

impl SegmentTree {
    /// Insert a route; returns the index already stored for the same shape, if any.
    pub(crate) fn insert(&mut self, method: &Method, segments: &[Segment], index: usize) -> Option<usize> {
        let mut node = &mut self.root;
        for segment in segments {
            match segment {
                Segment::Literal(literal) => {
                    let position = node.literals.iter().position(|(l, _)| l == literal);
                    let position = match position {
                        Some(p) => p,
                        None => {
                            node.literals.push((literal.clone(), Node::default()));
                            node.literals.len() - 1
                        }
                    };
                    node = &mut node.literals[position].1;
                }
                Segment::Param(_) => {
                    node = node.param.get_or_insert_with(Box::default);
                }
                Segment::Wildcard(_) => {
                    return insert_unique(&mut node.wildcard, method, index);
                }
            }
        }
        insert_unique(&mut node.routes, method, index)
    }

    /// Find the route for `path`, collecting parameter values in path order.
    ///
    /// Segments are percent-decoded after splitting, so `%2F` stays inside its segment.
    pub(crate) fn find(&self, method: &Method, path: &str) -> Option<(usize, Vec<String>)> {
        let decoded: Vec<Cow<'_, str>> = split(path).map(decode_segment).collect();
        let segments: Vec<&str> = decoded.iter().map(AsRef::as_ref).collect();
        let mut captured = Vec::new();
        find(&self.root, method, &segments, &mut captured).map(|index| (index, captured))
    }
}

/// Invalid UTF-8 after decoding leaves the segment as sent.
fn decode_segment(segment: &str) -> Cow<'_, str> {
    urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment))
}

fn insert_unique(routes: &mut HashMap<Method, usize>, method: &Method, index: usize) -> Option<usize> {
    match routes.get(method) {
        Some(&existing) => Some(existing),
        None => {
            routes.insert(method.clone(), index);
            None
        }
    }
}

fn find(node: &Node, method: &Method, segments: &[&str], captured: &mut Vec<String>) -> Option<usize> {
    let Some((head, rest)) = segments.split_first() else {
        return node.routes.get(method).copied();
    };

    for (literal, child) in &node.literals {
        if literal == head {
            if let Some(index) = find(child, method, rest, captured) {
                return Some(index);
            }
        }
    }

    if let Some(child) = &node.param {
        captured.push((*head).to_string());
        if let Some(index) = find(child, method, rest, captured) {
            return Some(index);
        }
        captured.pop();
    }

    if let Some(&index) = node.wildcard.get(method) {
        captured.push(segments.join("/"));
        return Some(index);
    }

    None
}
