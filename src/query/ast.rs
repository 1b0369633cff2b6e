//! Boolean query tree and its evaluation

use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of a parsed boolean query.
///
/// Term text is stored case-folded, so evaluation only has to fold the haystack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryNode {
    /// Substring match; `exact` marks a quoted phrase
    Term { text: String, exact: bool },
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

impl QueryNode {
    pub fn term(text: impl Into<String>) -> Self {
        QueryNode::Term {
            text: text.into().to_lowercase(),
            exact: false,
        }
    }

    pub fn phrase(text: impl Into<String>) -> Self {
        QueryNode::Term {
            text: text.into().to_lowercase(),
            exact: true,
        }
    }

    /// Build an AND node, flattening nested ANDs and collapsing a single child
    pub fn and(children: Vec<QueryNode>) -> Self {
        Self::combine(children, true)
    }

    /// Build an OR node, flattening nested ORs and collapsing a single child
    pub fn or(children: Vec<QueryNode>) -> Self {
        Self::combine(children, false)
    }

    pub fn negate(child: QueryNode) -> Self {
        QueryNode::Not(Box::new(child))
    }

    fn combine(children: Vec<QueryNode>, conjunction: bool) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                QueryNode::And(inner) if conjunction => flat.extend(inner),
                QueryNode::Or(inner) if !conjunction => flat.extend(inner),
                other => flat.push(other),
            }
        }

        if flat.len() == 1 {
            if let Some(only) = flat.pop() {
                return only;
            }
        }

        if conjunction {
            QueryNode::And(flat)
        } else {
            QueryNode::Or(flat)
        }
    }

    /// Evaluate against text that is already lowercased.
    ///
    /// AND and OR short-circuit left to right.
    pub fn matches_folded(&self, haystack: &str) -> bool {
        match self {
            QueryNode::Term { text, .. } => haystack.contains(text.as_str()),
            QueryNode::And(children) => children.iter().all(|c| c.matches_folded(haystack)),
            QueryNode::Or(children) => children.iter().any(|c| c.matches_folded(haystack)),
            QueryNode::Not(child) => !child.matches_folded(haystack),
        }
    }

    /// Evaluate against arbitrary text
    pub fn matches(&self, text: &str) -> bool {
        self.matches_folded(&text.to_lowercase())
    }

    /// Terms that must be present for a match, in query order.
    ///
    /// Terms under a NOT are skipped; OR branches all contribute.
    pub fn positive_terms(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_positive(&mut out, false);
        out
    }

    fn collect_positive<'a>(&'a self, out: &mut Vec<&'a str>, negated: bool) {
        match self {
            QueryNode::Term { text, .. } => {
                if !negated && !out.contains(&text.as_str()) {
                    out.push(text);
                }
            }
            QueryNode::And(children) | QueryNode::Or(children) => {
                for child in children {
                    child.collect_positive(out, negated);
                }
            }
            QueryNode::Not(child) => child.collect_positive(out, !negated),
        }
    }

    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        match self {
            QueryNode::Term { .. } => 1,
            QueryNode::And(children) | QueryNode::Or(children) => {
                1 + children.iter().map(QueryNode::size).sum::<usize>()
            }
            QueryNode::Not(child) => 1 + child.size(),
        }
    }
}

/// Renders a canonical query that parses back to an equivalent tree
impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Term { text, exact } => {
                let needs_quotes = *exact
                    || text.chars().any(|c| c.is_whitespace() || "()|&\"".contains(c))
                    || text.starts_with('-')
                    || matches!(text.as_str(), "and" | "or" | "not");
                if needs_quotes {
                    write!(f, "\"{}\"", text)
                } else {
                    write!(f, "{}", text)
                }
            }
            QueryNode::And(children) => write_joined(f, children, " AND "),
            QueryNode::Or(children) => write_joined(f, children, " OR "),
            QueryNode::Not(child) => match child.as_ref() {
                QueryNode::Term { .. } | QueryNode::Not(_) => write!(f, "NOT {}", child),
                _ => write!(f, "NOT ({})", child),
            },
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[QueryNode], sep: &str) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match child {
            QueryNode::And(_) | QueryNode::Or(_) => write!(f, "({})", child)?,
            _ => write!(f, "{}", child)?,
        }
    }
    Ok(())
}
