//! Route pattern parsing and matching.

use std::fmt;

use tandem_core::RouteParams;

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegment {
    /// Must equal the path segment exactly.
    Literal(String),
    /// `:name` - captures one path segment.
    Param(String),
    /// `*` or `*name` - captures the rest of the path (possibly empty).
    Wildcard(Option<String>),
}

/// Errors in a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern must start with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("empty parameter name in pattern: {0}")]
    EmptyParam(String),

    #[error("duplicate parameter '{name}' in pattern: {pattern}")]
    DuplicateParam { name: String, pattern: String },

    #[error("wildcard must be the last segment: {0}")]
    WildcardNotLast(String),
}

/// Captures produced by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    /// Named `:param` captures (and a named wildcard, if any).
    pub params: RouteParams,
    /// Remaining path captured by a wildcard.
    pub wildcard: Option<String>,
}

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

impl RoutePattern {
    /// Parse a pattern such as `/items/:id` or `/docs/*path`.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        }

        let parts: Vec<&str> = split_path(pattern).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<&str> = Vec::new();

        for (index, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParam(pattern.to_string()));
                }
                if names.contains(&name) {
                    return Err(PatternError::DuplicateParam {
                        name: name.to_string(),
                        pattern: pattern.to_string(),
                    });
                }
                names.push(name);
                PatternSegment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if index + 1 != parts.len() {
                    return Err(PatternError::WildcardNotLast(pattern.to_string()));
                }
                PatternSegment::Wildcard((!name.is_empty()).then(|| name.to_string()))
            } else {
                PatternSegment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed segments.
    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    /// Number of segments (a trailing wildcard counts as one).
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Match the whole path.
    pub fn matches(&self, path: &str) -> Option<Captures> {
        let parts: Vec<&str> = split_path(path).collect();
        let (captures, consumed) = self.match_parts(&parts)?;
        (consumed == parts.len()).then_some(captures)
    }

    /// Match a leading prefix of the path, as layouts do.
    ///
    /// Returns the captures plus the concrete prefix that matched.
    pub fn matches_prefix(&self, path: &str) -> Option<(Captures, String)> {
        let parts: Vec<&str> = split_path(path).collect();
        let (captures, consumed) = self.match_parts(&parts)?;
        Some((captures, format!("/{}", parts[..consumed].join("/"))))
    }

    fn match_parts(&self, parts: &[&str]) -> Option<(Captures, usize)> {
        let mut captures = Captures::default();
        let mut consumed = 0;

        for segment in &self.segments {
            match segment {
                PatternSegment::Literal(lit) => {
                    if parts.get(consumed) != Some(&lit.as_str()) {
                        return None;
                    }
                    consumed += 1;
                }
                PatternSegment::Param(name) => {
                    let value = parts.get(consumed)?;
                    captures.params.insert(name.clone(), value.to_string());
                    consumed += 1;
                }
                PatternSegment::Wildcard(name) => {
                    let rest = parts[consumed..].join("/");
                    if let Some(name) = name {
                        captures.params.insert(name.clone(), rest.clone());
                    }
                    captures.wildcard = Some(rest);
                    consumed = parts.len();
                }
            }
        }

        Some((captures, consumed))
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a path into non-empty segments, ignoring any query string.
pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty())
}
