//! Rule compilation: templates to matcher + renderer pairs.
//!
//! A template is literal text interleaved with placeholders:
//!
//! - `{name}` captures a run of ASCII digits on the matching side and is
//!   replaced by that run on the rendering side.
//! - `{(expr)}` is an arithmetic block, recognised only on the rendering
//!   side. Capture names inside `expr` are replaced textually by their digit
//!   strings and the result is evaluated by [`crate::expr`].
//!
//! Matching is delegated to a [`regex::Regex`] built from the escaped
//! literal segments and one named `[0-9]+` group per capture.

use std::fmt;
use std::fmt::Write as _;

use regex::{Captures, Regex};

use crate::error::{BridgeError, ExprError, Result};
use crate::expr;
use crate::options::{Direction, MatchMode};

/// Opening delimiter of an arithmetic block.
const ARITHMETIC_OPEN: &str = "{(";

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
    /// Text between the braces of `{(...)}`, parentheses included.
    Arithmetic(String),
}

/// A compiled `source, destination` rule.
///
/// Immutable once built; compiling the same text in the same direction
/// always yields a rule with identical behaviour.
///
/// ```
/// use state_bridge::CompiledRule;
///
/// let rule = CompiledRule::compile("layer.{n}.weight", "block.{(n + 1)}.w", false).unwrap();
/// assert_eq!(rule.apply("layer.3.weight").unwrap(), "block.4.w");
/// assert_eq!(rule.apply("head.bias").unwrap(), "head.bias");
/// ```
#[derive(Debug, Clone)]
pub struct CompiledRule {
    source: String,
    destination: String,
    direction: Direction,
    match_mode: MatchMode,
    matcher: Regex,
    captures: Vec<String>,
    template: Vec<Segment>,
}

impl CompiledRule {
    /// Compiles one rule with substring matching.
    ///
    /// With `reverse` set, the destination template becomes the matching
    /// side and the source template is rendered.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Configuration`] if a template is empty, a
    /// capture name is unusable or repeated on the matching side, an
    /// arithmetic block is unterminated, or `reverse` is set while the
    /// destination contains an arithmetic block.
    pub fn compile(source: &str, destination: &str, reverse: bool) -> Result<Self> {
        Self::compile_with(
            source,
            destination,
            Direction::from_reverse(reverse),
            MatchMode::Substring,
        )
    }

    /// Compiles one rule with an explicit direction and match mode.
    ///
    /// # Errors
    ///
    /// See [`CompiledRule::compile`].
    pub fn compile_with(
        source: &str,
        destination: &str,
        direction: Direction,
        match_mode: MatchMode,
    ) -> Result<Self> {
        if source.is_empty() || destination.is_empty() {
            return Err(BridgeError::config(format!(
                "empty template in rule `{source}, {destination}`"
            )));
        }

        let (match_side, render_side) = match direction {
            Direction::Forward => (source, destination),
            Direction::Reverse => {
                if has_arithmetic(destination) {
                    return Err(BridgeError::config(format!(
                        "reverse mapping not allowed with arithmetic: `{destination}`"
                    )));
                }
                (destination, source)
            }
        };

        let (matcher, captures) = build_matcher(match_side, match_mode)?;
        let template = scan(render_side, true)?;

        tracing::debug!(
            source,
            destination,
            reverse = direction.is_reverse(),
            matcher = matcher.as_str(),
            "compiled rule"
        );

        Ok(Self {
            source: source.to_string(),
            destination: destination.to_string(),
            direction,
            match_mode,
            matcher,
            captures,
            template,
        })
    }

    /// Source template as written in the rule text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Destination template as written in the rule text.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Direction the rule was compiled for.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Match mode the rule was compiled for.
    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }

    /// The generated regular expression.
    pub fn matcher_pattern(&self) -> &str {
        self.matcher.as_str()
    }

    /// Capture names of the matching side, in template order.
    pub fn capture_names(&self) -> &[String] {
        &self.captures
    }

    /// Returns true if the matcher occurs in `key`.
    pub fn is_match(&self, key: &str) -> bool {
        self.matcher.is_match(key)
    }

    /// Replaces every occurrence of the matcher in `key` with its rendering.
    ///
    /// A key without any occurrence is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Expression`] if an arithmetic block fails to
    /// parse or evaluate for one of the occurrences.
    pub fn apply(&self, key: &str) -> Result<String> {
        let mut out = String::with_capacity(key.len());
        let mut last = 0;
        for caps in self.matcher.captures_iter(key) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_str(&key[last..whole.start()]);
            let rendered = self.render(&caps).map_err(|(expression, source)| {
                BridgeError::Expression {
                    key: key.to_string(),
                    rule: self.to_string(),
                    expression,
                    source,
                }
            })?;
            out.push_str(&rendered);
            last = whole.end();
        }
        out.push_str(&key[last..]);
        Ok(out)
    }

    fn render(&self, caps: &Captures<'_>) -> std::result::Result<String, (String, ExprError)> {
        let values: Vec<(&str, &str)> = self
            .captures
            .iter()
            .map(|name| {
                let value = caps.name(name).map_or("", |m| m.as_str());
                (name.as_str(), value)
            })
            .collect();

        let mut out = String::new();
        for segment in &self.template {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Capture(name) => match lookup(&values, name) {
                    Some(value) => out.push_str(value),
                    // Unknown names are left in place.
                    None => {
                        let _ = write!(out, "{{{name}}}");
                    }
                },
                Segment::Arithmetic(text) => {
                    let expression = substitute(text, &values);
                    match expr::eval_math_expr(&expression) {
                        Ok(value) => {
                            let _ = write!(out, "{value}");
                        }
                        Err(err) => return Err((expression, err)),
                    }
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)?;
        if self.direction.is_reverse() {
            write!(f, " (reverse)")?;
        }
        Ok(())
    }
}

fn lookup<'v>(values: &[(&str, &'v str)], name: &str) -> Option<&'v str> {
    values
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, value)| *value)
}

/// Plain textual substitution, `{name}` first and then bare `name`, in
/// capture order. Names that are substrings of other names are not
/// disambiguated.
fn substitute(text: &str, values: &[(&str, &str)]) -> String {
    let mut expression = text.to_string();
    for (name, value) in values {
        expression = expression.replace(&format!("{{{name}}}"), value);
    }
    for (name, value) in values {
        expression = expression.replace(name, value);
    }
    expression
}

fn build_matcher(template: &str, match_mode: MatchMode) -> Result<(Regex, Vec<String>)> {
    let mut pattern = String::new();
    let mut captures: Vec<String> = Vec::new();

    for segment in scan(template, false)? {
        match segment {
            Segment::Literal(text) => pattern.push_str(&regex::escape(&text)),
            Segment::Capture(name) => {
                if name.starts_with(|c: char| c.is_ascii_digit()) {
                    return Err(BridgeError::config(format!(
                        "capture name `{name}` in `{template}` must not start with a digit"
                    )));
                }
                if captures.contains(&name) {
                    return Err(BridgeError::config(format!(
                        "capture name `{name}` appears twice in `{template}`"
                    )));
                }
                let _ = write!(pattern, "(?P<{name}>[0-9]+)");
                captures.push(name);
            }
            Segment::Arithmetic(_) => {}
        }
    }

    if match_mode == MatchMode::WholeKey {
        pattern = format!(r"\A(?:{pattern})\z");
    }

    let matcher = Regex::new(&pattern).map_err(|err| {
        BridgeError::config(format!("cannot build matcher for `{template}`: {err}"))
    })?;
    Ok((matcher, captures))
}

/// Splits a template into segments. Arithmetic blocks are recognised only
/// when `arithmetic` is set; otherwise `{(` is literal text.
fn scan(template: &str, arithmetic: bool) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let tail = &rest[open..];

        if let Some(name) = capture_name(tail) {
            flush_literal(&mut literal, &mut segments);
            segments.push(Segment::Capture(name.to_string()));
            rest = &tail[name.len() + 2..];
        } else if arithmetic && tail.starts_with(ARITHMETIC_OPEN) {
            match arithmetic_close(tail) {
                BlockEnd::Closed(close) => {
                    flush_literal(&mut literal, &mut segments);
                    segments.push(Segment::Arithmetic(tail[1..close].to_string()));
                    rest = &tail[close + 1..];
                }
                BlockEnd::NotABlock => {
                    literal.push('{');
                    rest = &tail[1..];
                }
                BlockEnd::Unterminated => {
                    return Err(BridgeError::config(format!(
                        "unterminated arithmetic block in `{template}`"
                    )));
                }
            }
        } else {
            literal.push('{');
            rest = &tail[1..];
        }
    }
    literal.push_str(rest);
    flush_literal(&mut literal, &mut segments);
    Ok(segments)
}

fn flush_literal(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

fn is_name_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Returns `name` when `tail` starts with `{name}`.
fn capture_name(tail: &str) -> Option<&str> {
    let body = tail.strip_prefix('{')?;
    let len = body
        .char_indices()
        .find(|&(_, c)| !is_name_char(c))
        .map(|(i, _)| i)?;
    if len == 0 || !body[len..].starts_with('}') {
        return None;
    }
    Some(&body[..len])
}

/// True when `template` holds at least one complete `{(…)}` block.
fn has_arithmetic(template: &str) -> bool {
    scan(template, true).is_ok_and(|segments| {
        segments
            .iter()
            .any(|segment| matches!(segment, Segment::Arithmetic(_)))
    })
}

/// How a `{(` at the start of a tail ends.
#[derive(Debug, PartialEq, Eq)]
enum BlockEnd {
    /// Byte offset of the closing `}`.
    Closed(usize),
    /// The outer parenthesis closes without a `}` right after it.
    NotABlock,
    /// The outer parenthesis never closes.
    Unterminated,
}

/// Finds the `)}` that closes the outer parenthesis of the block at the
/// start of `tail`.
fn arithmetic_close(tail: &str) -> BlockEnd {
    let mut depth = 0usize;
    for (i, c) in tail.char_indices().skip(1) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return if tail[i + 1..].starts_with('}') {
                        BlockEnd::Closed(i + 1)
                    } else {
                        BlockEnd::NotABlock
                    };
                }
            }
            _ => {}
        }
    }
    BlockEnd::Unterminated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward(source: &str, destination: &str) -> CompiledRule {
        CompiledRule::compile(source, destination, false).unwrap()
    }

    #[test]
    fn scan_splits_captures_and_literals() {
        assert_eq!(
            scan("layer.{n}.w{m}", false).unwrap(),
            vec![
                Segment::Literal("layer.".into()),
                Segment::Capture("n".into()),
                Segment::Literal(".w".into()),
                Segment::Capture("m".into()),
            ]
        );
    }

    #[test]
    fn scan_keeps_stray_braces_literal() {
        assert_eq!(
            scan("a{b.c}{}{", false).unwrap(),
            vec![Segment::Literal("a{b.c}{}{".into())]
        );
    }

    #[test]
    fn scan_recognises_nested_arithmetic() {
        assert_eq!(
            scan("b.{((n + 1) * 2)}.w", true).unwrap(),
            vec![
                Segment::Literal("b.".into()),
                Segment::Arithmetic("((n + 1) * 2)".into()),
                Segment::Literal(".w".into()),
            ]
        );
    }

    #[test]
    fn block_ends_only_at_outer_close() {
        assert_eq!(arithmetic_close("{(n)}"), BlockEnd::Closed(4));
        assert_eq!(arithmetic_close("{((n) + 1)}.w"), BlockEnd::Closed(10));
        assert_eq!(arithmetic_close("{(1)+(n)}"), BlockEnd::NotABlock);
        assert_eq!(arithmetic_close("{(n)x}"), BlockEnd::NotABlock);
        assert_eq!(arithmetic_close("{(n + 1}"), BlockEnd::Unterminated);
    }

    #[test]
    fn malformed_blocks_render_as_literal_text() {
        let rule = forward("a.{n}", "b.{(1)+(n)}");
        assert_eq!(rule.apply("a.3").unwrap(), "b.{(1)+(n)}");

        let rule = forward("a.{n}", "b.{(n)x}");
        assert_eq!(rule.apply("a.3").unwrap(), "b.{(n)x}");

        let rule = forward("a.{n}", "b.{(n)}.{(n)x}.{n}");
        assert_eq!(rule.apply("a.3").unwrap(), "b.3.{(n)x}.3");
    }

    #[test]
    fn arithmetic_is_literal_on_matching_side() {
        let rule = forward("x.{(n)}", "y");
        assert_eq!(rule.apply("x.{(n)}").unwrap(), "y");
    }

    #[test]
    fn unterminated_arithmetic_is_configuration_error() {
        let err = CompiledRule::compile("a.{n}", "b.{(n + 1}", false).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration { .. }), "{err}");
    }

    #[test]
    fn literal_text_is_escaped() {
        let rule = forward("a.{n}.w", "b.{n}");
        assert_eq!(rule.apply("a.1.w").unwrap(), "b.1");
        // `.` must not match arbitrary characters.
        assert_eq!(rule.apply("aX1Xw").unwrap(), "aX1Xw");

        let rule = forward("m(+{n})*", "k{n}");
        assert_eq!(rule.apply("m(+12)*").unwrap(), "k12");
    }

    #[test]
    fn captures_match_ascii_digits_only() {
        let rule = forward("l.{n}", "b.{n}");
        assert_eq!(rule.apply("l.x").unwrap(), "l.x");
        assert_eq!(rule.apply("l.\u{0663}").unwrap(), "l.\u{0663}");
        assert_eq!(rule.apply("l.42").unwrap(), "b.42");
    }

    #[test]
    fn every_occurrence_is_replaced() {
        let rule = forward("h{n}", "H{(n * 10)}");
        assert_eq!(rule.apply("h1.h2.x").unwrap(), "H10.H20.x");
    }

    #[test]
    fn substring_occurrence_inside_longer_key() {
        let rule = forward("layer.{n}.weight", "block.{n}.w");
        assert_eq!(rule.apply("model.layer.3.weight").unwrap(), "model.block.3.w");
    }

    #[test]
    fn whole_key_mode_requires_full_span() {
        let rule = CompiledRule::compile_with(
            "layer.{n}.weight",
            "block.{n}.w",
            Direction::Forward,
            MatchMode::WholeKey,
        )
        .unwrap();
        assert_eq!(rule.apply("layer.3.weight").unwrap(), "block.3.w");
        assert_eq!(
            rule.apply("model.layer.3.weight").unwrap(),
            "model.layer.3.weight"
        );
    }

    #[test]
    fn reused_names_render_same_value() {
        let rule = forward("p.{n}", "q.{n}.{n}.{(n + n)}");
        assert_eq!(rule.apply("p.4").unwrap(), "q.4.4.8");
    }

    #[test]
    fn unknown_render_names_stay_literal() {
        let rule = forward("p.{n}", "q.{m}.{n}");
        assert_eq!(rule.apply("p.4").unwrap(), "q.{m}.4");
    }

    #[test]
    fn braced_names_inside_arithmetic_are_substituted() {
        let rule = forward("p.{n}", "q.{({n} - 1)}");
        assert_eq!(rule.apply("p.4").unwrap(), "q.3");
    }

    #[test]
    fn reverse_swaps_sides() {
        let rule = CompiledRule::compile("layer.{n}.weight", "block.{n}.w", true).unwrap();
        assert_eq!(rule.direction(), Direction::Reverse);
        assert_eq!(rule.apply("block.9.w").unwrap(), "layer.9.weight");
        assert_eq!(rule.apply("layer.9.weight").unwrap(), "layer.9.weight");
    }

    #[test]
    fn reverse_rejects_destination_arithmetic() {
        let err = CompiledRule::compile("layer.{n}.weight", "block.{(n+1)}.w", true).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration { .. }), "{err}");
    }

    #[test]
    fn reverse_allows_destination_without_a_block() {
        let rule = CompiledRule::compile("a", "b{(c", true).unwrap();
        assert_eq!(rule.apply("b{(c").unwrap(), "a");

        let rule = CompiledRule::compile("a.{n}", "b.{(n)x}.{n}", true).unwrap();
        assert_eq!(rule.apply("b.{(n)x}.7").unwrap(), "a.7");
    }

    #[test]
    fn reverse_allows_source_arithmetic() {
        let rule = CompiledRule::compile("old.{(n - 1)}", "new.{n}", true).unwrap();
        assert_eq!(rule.apply("new.5").unwrap(), "old.4");
    }

    #[test]
    fn invalid_capture_names_are_rejected() {
        for (source, destination) in [("a.{1n}", "b"), ("a.{n}.{n}", "b.{n}"), ("", "b"), ("a", "")] {
            let err = CompiledRule::compile(source, destination, false).unwrap_err();
            assert!(
                matches!(err, BridgeError::Configuration { .. }),
                "`{source}, {destination}`: {err}"
            );
        }
    }

    #[test]
    fn expression_failure_names_key_and_rule() {
        let rule = forward("l.{n}", "b.{(n // 0)}");
        let err = rule.apply("l.3").unwrap_err();
        assert_eq!(
            err,
            BridgeError::Expression {
                key: "l.3".into(),
                rule: "l.{n} -> b.{(n // 0)}".into(),
                expression: "(3 // 0)".into(),
                source: ExprError::DivisionByZero,
            }
        );
    }

    #[test]
    fn non_whitelisted_arithmetic_fails_at_apply_time() {
        let rule = forward("l.{n}", "b.{(max(n, 2))}");
        assert!(matches!(
            rule.apply("l.3"),
            Err(BridgeError::Expression {
                source: ExprError::Invalid { .. },
                ..
            })
        ));
        // Keys the rule does not touch never evaluate the block.
        assert_eq!(rule.apply("other").unwrap(), "other");
    }

    #[test]
    fn display_and_accessors() {
        let rule = forward("a.{n}", "b.{n}");
        assert_eq!(rule.to_string(), "a.{n} -> b.{n}");
        assert_eq!(rule.capture_names(), ["n".to_string()]);
        assert_eq!(rule.matcher_pattern(), r"a\.(?P<n>[0-9]+)");
        assert!(rule.is_match("x.a.1"));
    }
}
