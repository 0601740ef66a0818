//! Topic pattern compiler and matcher.
//!
//! A [`Pattern`] is compiled from a delimiter-separated template such as
//! `orders.:region.*`. Each segment is one of:
//!
//! - a literal, compared against the input segment (ASCII case-insensitive
//!   unless [`PatternOptions::sensitive`] is set),
//! - a named parameter (`:region`), which binds exactly one non-empty segment,
//! - a wildcard (`*`), which must be last and binds every remaining segment
//!   (at least one) under the parameter name `0`.
//!
//! Matching is purely structural: the literal/parameter prefix is checked
//! segment by segment and an optional wildcard absorbs the tail, so there is
//! never any backtracking.
//!
//! ```rust,ignore
//! use brook_core::{Pattern, PatternOptions};
//!
//! let pattern = Pattern::compile("a.:id.*", PatternOptions::default())?;
//! let m = pattern.matches("a.7.x.y").unwrap();
//! assert_eq!(m.params["id"], "7");
//! assert_eq!(m.params["0"], "x.y");
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::PatternError;

/// Parameters extracted from a topic name.
pub type Params = HashMap<String, String>;

/// Parameter name under which a wildcard binds the remaining segments.
pub const WILDCARD_PARAM: &str = "0";

/// Options that control how a pattern is compiled and matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternOptions {
    /// Segment delimiter. Defaults to `.`.
    pub delimiter: char,
    /// Compare literal segments case-sensitively. Defaults to `false`.
    pub sensitive: bool,
    /// Reject a trailing delimiter mismatch between pattern and input.
    /// Defaults to `false`, which ignores one trailing delimiter on either side.
    pub strict: bool,
    /// Require the pattern to consume the entire input. Defaults to `true`.
    /// With `end = false` the pattern may match a segment-aligned prefix.
    pub end: bool,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            delimiter: '.',
            sensitive: false,
            strict: false,
            end: true,
        }
    }
}

impl PatternOptions {
    /// Sets the segment delimiter.
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets case sensitivity for literal segments.
    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }

    /// Sets strict trailing-delimiter handling.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets whether the whole input must be consumed.
    pub fn end(mut self, end: bool) -> Self {
        self.end = end;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// The result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch<'a> {
    /// Bound parameters, including `0` for a wildcard.
    pub params: Params,
    /// The part of the input consumed by the pattern.
    pub prefix: &'a str,
    /// The unconsumed remainder. Empty on a full match.
    pub rest: &'a str,
}

impl PathMatch<'_> {
    /// Returns `true` if the pattern consumed the entire input.
    pub fn is_full(&self) -> bool {
        self.rest.is_empty()
    }
}

/// What a broker client should subscribe with to receive a pattern's topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subscription {
    /// A single concrete topic name.
    Exact(String),
    /// An anchored regular expression over topic names.
    Regex(String),
}

impl Subscription {
    /// The topic name or regex source.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(topic) => topic,
            Self::Regex(source) => source,
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled topic pattern. Immutable once compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
    trailing: bool,
    options: PatternOptions,
}

impl Pattern {
    /// Compiles `source` with the given options.
    pub fn compile(source: &str, options: PatternOptions) -> Result<Self, PatternError> {
        if source.is_empty() {
            return Err(PatternError::Empty);
        }

        let delimiter = options.delimiter;
        let (body, trailing) = match source.strip_suffix(delimiter) {
            Some(body) if !body.is_empty() => (body, true),
            _ => (source, false),
        };

        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        let mut parts = body.split(delimiter).enumerate().peekable();

        while let Some((position, part)) = parts.next() {
            let segment = if part == "*" {
                if parts.peek().is_some() {
                    return Err(PatternError::WildcardNotTerminal {
                        pattern: source.to_string(),
                    });
                }
                Segment::Wildcard
            } else if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParam {
                        pattern: source.to_string(),
                        position,
                    });
                }
                if !seen.insert(name) {
                    return Err(PatternError::DuplicateParam {
                        pattern: source.to_string(),
                        name: name.to_string(),
                    });
                }
                Segment::Param(name.to_string())
            } else if part.is_empty() {
                return Err(PatternError::EmptySegment {
                    pattern: source.to_string(),
                    position,
                });
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
            trailing,
            options,
        })
    }

    /// Compiles `source` with default options.
    pub fn new(source: &str) -> Result<Self, PatternError> {
        Self::compile(source, PatternOptions::default())
    }

    /// The source text this pattern was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The options this pattern was compiled with.
    pub fn options(&self) -> PatternOptions {
        self.options
    }

    /// Returns `true` for the `*` pattern, which matches every topic.
    pub fn is_catch_all(&self) -> bool {
        matches!(self.segments.as_slice(), [Segment::Wildcard])
    }

    /// Returns `true` if the pattern ends in a wildcard.
    pub fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard))
    }

    /// Returns `true` if every segment is a literal.
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Names of the parameters this pattern binds, in order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Wildcard => Some(WILDCARD_PARAM),
            Segment::Literal(_) => None,
        })
    }

    /// Returns `true` if `path` matches.
    pub fn is_match(&self, path: &str) -> bool {
        self.matches(path).is_some()
    }

    /// Tests `path` against this pattern and extracts its parameters.
    pub fn matches<'a>(&self, path: &'a str) -> Option<PathMatch<'a>> {
        if path.is_empty() {
            return None;
        }

        if self.is_catch_all() {
            let mut params = Params::new();
            params.insert(WILDCARD_PARAM.to_string(), path.to_string());
            return Some(PathMatch {
                params,
                prefix: path,
                rest: "",
            });
        }

        let delimiter = self.options.delimiter;
        let (input, trailing) = match path.strip_suffix(delimiter) {
            Some(input) if !input.is_empty() => (input, true),
            _ => (path, false),
        };

        let mut params = Params::new();
        let mut remaining = Some(input);

        for segment in &self.segments {
            let current = remaining?;
            if current.is_empty() {
                return None;
            }

            match segment {
                Segment::Wildcard => {
                    params.insert(WILDCARD_PARAM.to_string(), current.to_string());
                    remaining = None;
                }
                Segment::Literal(literal) => {
                    let (head, tail) = split_segment(current, delimiter);
                    if !self.literal_eq(literal, head) {
                        return None;
                    }
                    remaining = tail;
                }
                Segment::Param(name) => {
                    let (head, tail) = split_segment(current, delimiter);
                    if head.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), head.to_string());
                    remaining = tail;
                }
            }
        }

        match remaining {
            None => {
                if self.options.strict && trailing != self.trailing {
                    return None;
                }
                Some(PathMatch {
                    params,
                    prefix: path,
                    rest: "",
                })
            }
            Some(rest) if !self.options.end && !rest.is_empty() => {
                let prefix_len = input.len() - rest.len() - delimiter.len_utf8();
                Some(PathMatch {
                    params,
                    prefix: &input[..prefix_len],
                    rest,
                })
            }
            Some(_) => None,
        }
    }

    fn literal_eq(&self, literal: &str, segment: &str) -> bool {
        if self.options.sensitive {
            literal == segment
        } else {
            literal.eq_ignore_ascii_case(segment)
        }
    }

    /// Returns a copy that must consume the entire input.
    pub fn anchored(&self) -> Pattern {
        Pattern {
            options: self.options.end(true),
            ..self.clone()
        }
    }

    /// Appends `child` to this pattern, producing the fully-qualified pattern
    /// of a router mounted below this one. The result takes `child`'s options
    /// and is anchored.
    pub fn join(&self, child: &Pattern) -> Pattern {
        let delimiter = child.options.delimiter;
        let parent = self.source.strip_suffix(delimiter).unwrap_or(&self.source);

        let mut segments = self.segments.clone();
        segments.extend(child.segments.iter().cloned());

        Pattern {
            source: format!("{parent}{delimiter}{}", child.source),
            segments,
            trailing: child.trailing,
            options: child.options.end(true),
        }
    }

    /// Renders the equivalent anchored regular expression.
    ///
    /// Literals are escaped and parameters become `[^d]+`. Case-insensitive
    /// patterns carry an inline `(?i)` flag. The regex accepts exactly the
    /// topics [`is_match`](Self::is_match) accepts.
    pub fn to_regex(&self) -> String {
        if self.is_catch_all() {
            return "^.+$".to_string();
        }

        let d = regex::escape(self.options.delimiter.encode_utf8(&mut [0; 4]));
        // A non-empty tail that is not a lone delimiter; one trailing
        // delimiter is stripped before matching and the rest must remain.
        let tail = format!("(?:[^{d}]|.{{2,}})");

        let mut out = String::from("^");
        if !self.options.sensitive {
            out.push_str("(?i)");
        }

        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push_str(&d);
            }
            match segment {
                Segment::Literal(literal) => out.push_str(&regex::escape(literal)),
                Segment::Param(_) => out.push_str(&format!("[^{d}]+")),
                Segment::Wildcard => match (self.options.strict, self.trailing) {
                    (false, _) => out.push_str(&tail),
                    (true, false) => out.push_str(&format!(".*[^{d}]")),
                    (true, true) => out.push_str(&format!(".+{d}")),
                },
            }
        }

        if !self.has_wildcard() {
            let full = match (self.options.strict, self.trailing) {
                (false, _) => format!("(?:{d})?"),
                (true, false) => String::new(),
                (true, true) => d.clone(),
            };
            if self.options.end {
                out.push_str(&full);
            } else {
                out.push_str(&format!("(?:{full}|{d}{tail})"));
            }
        }
        out.push('$');
        out
    }

    /// What a broker client should subscribe with for this pattern.
    ///
    /// Only case-sensitive, all-literal patterns map to an exact topic name;
    /// everything else is expressed as a regex.
    pub fn subscription(&self) -> Subscription {
        if self.options.sensitive && self.is_literal() {
            let delimiter = self.options.delimiter;
            let topic = self
                .source
                .strip_suffix(delimiter)
                .filter(|_| !self.options.strict)
                .unwrap_or(&self.source);
            Subscription::Exact(topic.to_string())
        } else {
            Subscription::Regex(self.to_regex())
        }
    }
}

fn split_segment(input: &str, delimiter: char) -> (&str, Option<&str>) {
    match input.split_once(delimiter) {
        Some((head, tail)) => (head, Some(tail)),
        None => (input, None),
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn params(m: &PathMatch<'_>) -> Vec<(String, String)> {
        let mut out: Vec<_> = m
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_param_and_wildcard() {
        let pattern = Pattern::new("a.:id.*").unwrap();

        let m = pattern.matches("a.7.x.y").unwrap();
        assert_eq!(
            params(&m),
            vec![
                ("0".to_string(), "x.y".to_string()),
                ("id".to_string(), "7".to_string()),
            ]
        );
        assert!(m.is_full());

        assert!(pattern.matches("a.7").is_none());
        assert!(pattern.matches("b.7.x").is_none());
    }

    #[test]
    fn test_catch_all_matches_everything() {
        let pattern = Pattern::new("*").unwrap();
        assert!(pattern.is_catch_all());

        for topic in ["my.topic.138", "test.test", "notatopic"] {
            let m = pattern.matches(topic).unwrap();
            assert_eq!(m.params[WILDCARD_PARAM], topic);
        }
        assert!(pattern.matches("").is_none());
    }

    #[test]
    fn test_literal_requires_all_segments() {
        let pattern = Pattern::new("my.topic.kafka").unwrap();
        assert!(pattern.is_match("my.topic.kafka"));
        assert!(!pattern.is_match("not.my.topic.kafka"));
        assert!(!pattern.is_match("my.topic.kafka.extra"));
        assert!(!pattern.is_match("my.topic"));
    }

    #[test]
    fn test_case_sensitivity() {
        let insensitive = Pattern::new("Orders.Created").unwrap();
        assert!(insensitive.is_match("orders.created"));

        let sensitive =
            Pattern::compile("Orders.Created", PatternOptions::default().sensitive(true)).unwrap();
        assert!(!sensitive.is_match("orders.created"));
        assert!(sensitive.is_match("Orders.Created"));
    }

    #[test]
    fn test_trailing_delimiter() {
        let loose = Pattern::new("a.b").unwrap();
        assert!(loose.is_match("a.b."));

        let strict = Pattern::compile("a.b", PatternOptions::default().strict(true)).unwrap();
        assert!(strict.is_match("a.b"));
        assert!(!strict.is_match("a.b."));

        let strict_trailing =
            Pattern::compile("a.b.", PatternOptions::default().strict(true)).unwrap();
        assert!(strict_trailing.is_match("a.b."));
        assert!(!strict_trailing.is_match("a.b"));
    }

    #[test]
    fn test_prefix_mode() {
        let pattern = Pattern::compile("topic", PatternOptions::default().end(false)).unwrap();

        let m = pattern.matches("topic.user.created").unwrap();
        assert_eq!(m.prefix, "topic");
        assert_eq!(m.rest, "user.created");
        assert!(!m.is_full());

        let m = pattern.matches("topic").unwrap();
        assert!(m.is_full());

        assert!(pattern.matches("topics.user").is_none());
    }

    #[test]
    fn test_params_need_non_empty_segments() {
        let pattern = Pattern::new("my.topic.:id").unwrap();
        assert_eq!(pattern.matches("my.topic.138").unwrap().params["id"], "138");
        assert!(pattern.matches("my..138").is_none());
        assert!(pattern.matches("my.topic").is_none());
    }

    #[test]
    fn test_custom_delimiter() {
        let options = PatternOptions::default().delimiter('/');
        let pattern = Pattern::compile("devices/:id/*", options).unwrap();
        let m = pattern.matches("devices/42/temp/celsius").unwrap();
        assert_eq!(m.params["id"], "42");
        assert_eq!(m.params["0"], "temp/celsius");
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(Pattern::new(""), Err(PatternError::Empty));
        assert!(matches!(
            Pattern::new("a.*.b"),
            Err(PatternError::WildcardNotTerminal { .. })
        ));
        assert!(matches!(
            Pattern::new("a.:"),
            Err(PatternError::EmptyParam { position: 1, .. })
        ));
        assert!(matches!(
            Pattern::new("a.:id.:id"),
            Err(PatternError::DuplicateParam { .. })
        ));
        assert!(matches!(
            Pattern::new("a..b"),
            Err(PatternError::EmptySegment { position: 1, .. })
        ));
    }

    #[test]
    fn test_join_builds_qualified_pattern() {
        let parent = Pattern::compile("effort", PatternOptions::default().end(false)).unwrap();
        let child = Pattern::compile("times.:n", PatternOptions::default().end(false)).unwrap();
        let joined = parent.join(&child);

        assert_eq!(joined.source(), "effort.times.:n");
        assert!(joined.options().end);
        assert!(joined.is_match("effort.times.3"));
        assert!(!joined.is_match("effort.times.3.more"));
    }

    #[test]
    fn test_regex_rendering() {
        assert_eq!(
            Pattern::new("effort.times").unwrap().to_regex(),
            r"^(?i)effort\.times(?:\.)?$"
        );
        assert_eq!(Pattern::new("*").unwrap().to_regex(), "^.+$");
    }

    #[test]
    fn test_regex_agrees_with_matcher() {
        let sources = [
            "a", "a.b", "a.b.", "a.:id", "orders.:region", "a.*", "a.*.", "a.:id.*", "*",
        ];
        let inputs = [
            "a", "A", "a.", "a..", "a...", "a.b", "A.B", "a.b.", "a.b..", "a.b.c", "a.b.c.",
            "a.b.c..", "a..b", "a.7.x.y", "b.a", ".", ".a", "orders.eu", "orders.eu.x",
        ];

        for source in sources {
            for strict in [false, true] {
                for sensitive in [false, true] {
                    for end in [true, false] {
                        let options = PatternOptions::default()
                            .strict(strict)
                            .sensitive(sensitive)
                            .end(end);
                        let pattern = Pattern::compile(source, options).unwrap();
                        let regex = Regex::new(&pattern.to_regex()).unwrap();
                        for input in inputs {
                            assert_eq!(
                                pattern.is_match(input),
                                regex.is_match(input),
                                "'{source}' (strict={strict}, sensitive={sensitive}, end={end}) \
                                 disagrees with {} on '{input}'",
                                pattern.to_regex()
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_strict_wildcard_rejects_trailing_delimiter() {
        let pattern = Pattern::compile("a.*", PatternOptions::default().strict(true)).unwrap();
        let regex = Regex::new(&pattern.to_regex()).unwrap();
        assert!(!pattern.is_match("a.b."));
        assert!(!regex.is_match("a.b."));
        assert!(regex.is_match("a.b.c"));

        let loose = Pattern::new("a.:id.*").unwrap();
        let regex = Regex::new(&loose.to_regex()).unwrap();
        assert!(!loose.is_match("a.b.."));
        assert!(!regex.is_match("a.b.."));
    }

    #[test]
    fn test_subscription_kinds() {
        let exact =
            Pattern::compile("orders.created", PatternOptions::default().sensitive(true)).unwrap();
        assert_eq!(
            exact.subscription(),
            Subscription::Exact("orders.created".to_string())
        );

        let regex = Pattern::new("orders.:id").unwrap();
        assert!(matches!(regex.subscription(), Subscription::Regex(_)));
    }
}
