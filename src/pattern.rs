//! Path patterns and the segment matcher.
//!
//! A pattern is a `/`-separated list of segments. Each segment is either a
//! literal, compared byte-for-byte, or a `{name}` placeholder that matches any
//! single segment and binds it. There are no wildcards spanning segments and
//! no backtracking: a path matches when it has the same number of segments and
//! every literal lines up.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Variables captured by a successful match, keyed by placeholder name.
pub type PathVars = HashMap<String, String>;

/// One segment of a [`PathPattern`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

impl Segment {
    fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum PatternError {
    #[error("empty placeholder name in `{pattern}`")]
    EmptyPlaceholder { pattern: String },

    #[error("malformed segment `{segment}` in `{pattern}`: placeholders must span the whole segment")]
    MalformedSegment { pattern: String, segment: String },

    #[error("placeholder `{name}` appears more than once in `{pattern}`")]
    DuplicatePlaceholder { pattern: String, name: String },
}

/// A parsed route template such as `/users/{id}/posts`.
#[derive(Clone, Debug)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();

        for part in split(raw) {
            let segment = match part.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some("") => {
                    return Err(PatternError::EmptyPlaceholder { pattern: raw.to_owned() });
                }
                Some(name) if !name.contains(['{', '}']) => {
                    if segments.iter().any(|s| matches!(s, Segment::Placeholder(n) if n == name)) {
                        return Err(PatternError::DuplicatePlaceholder {
                            pattern: raw.to_owned(),
                            name: name.to_owned(),
                        });
                    }
                    Segment::Placeholder(name.to_owned())
                }
                _ if part.contains(['{', '}']) => {
                    return Err(PatternError::MalformedSegment {
                        pattern: raw.to_owned(),
                        segment: part.to_owned(),
                    });
                }
                _ => Segment::Literal(part.to_owned()),
            };
            segments.push(segment);
        }

        Ok(Self { raw: raw.to_owned(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholder names in left-to-right order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_placeholder(&self, name: &str) -> bool {
        self.placeholders().any(|p| p == name)
    }

    /// `true` when the pattern has no placeholders.
    pub fn is_static(&self) -> bool {
        self.segments.iter().all(Segment::is_literal)
    }

    /// Matches a concrete request path, returning the bound placeholders.
    pub fn matches(&self, path: &str) -> Option<PathVars> {
        let parts: Vec<&str> = split(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut vars = PathVars::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit != part => return None,
                Segment::Literal(_) => {}
                Segment::Placeholder(name) => {
                    vars.insert(name.clone(), part.to_owned());
                }
            }
        }
        Some(vars)
    }

    /// Two patterns have the same shape when no path could tell them apart:
    /// equal literals and placeholders at the same positions, names ignored.
    pub(crate) fn same_shape(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|pair| match pair {
                (Segment::Literal(a), Segment::Literal(b)) => a == b,
                (Segment::Placeholder(_), Segment::Placeholder(_)) => true,
                _ => false,
            })
    }

    /// Orders patterns by specificity: the leftmost position where one has a
    /// literal and the other a placeholder decides, literal first.
    pub(crate) fn specificity_cmp(&self, other: &Self) -> Ordering {
        self.segments
            .iter()
            .zip(&other.segments)
            .map(|(a, b)| match (a.is_literal(), b.is_literal()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => Ordering::Equal,
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split(path: &str) -> std::str::Split<'_, char> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}
