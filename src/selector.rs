use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A parsed, validated selector.
///
/// Parsing happens once, at registration time, so that a malformed selector is
/// reported to whoever wrote it instead of surfacing later during a scan.
#[derive(Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<SelectorChain>,
}

pub(crate) type SelectorChain = Vec<SelectorPart>;

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        let groups = parse_selector_groups(source)?;
        Ok(Self {
            source: source.to_string(),
            groups,
        })
    }

    /// The trimmed source text this selector was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub(crate) fn groups(&self) -> &[SelectorChain] {
        &self.groups
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(source: &str) -> Result<Self> {
        Self::parse(source)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.source).finish()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttrOp {
    Exists,
    Equals,
    Prefix,
    Suffix,
    Substring,
    Includes,
    DashMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttrMatcher {
    pub(crate) name: String,
    pub(crate) op: AttrOp,
    pub(crate) value: String,
    pub(crate) case_insensitive: bool,
}

/// `An+B` in 1-based sibling positions. `odd`, `even` and plain integers are
/// normalised into this form while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Nth {
    pub(crate) a: i64,
    pub(crate) b: i64,
}

impl Nth {
    pub(crate) fn matches(self, index: usize) -> bool {
        // Widened so that any parsed `a` and `b` stay in range.
        let diff = index as i128 - i128::from(self.b);
        let a = i128::from(self.a);
        if a == 0 {
            return diff == 0;
        }
        diff % a == 0 && diff / a >= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PseudoClass {
    FirstChild,
    LastChild,
    OnlyChild,
    FirstOfType,
    LastOfType,
    OnlyOfType,
    Empty,
    Root,
    NthChild(Nth),
    NthLastChild(Nth),
    NthOfType(Nth),
    NthLastOfType(Nth),
    Not(Vec<SelectorChain>),
    // :is() and :where() only differ in specificity, which nothing here uses.
    Is(Vec<SelectorChain>),
    Has(Vec<SelectorChain>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Compound {
    pub(crate) tag: Option<String>,
    pub(crate) universal: bool,
    pub(crate) id: Option<String>,
    pub(crate) classes: Vec<String>,
    pub(crate) attrs: Vec<AttrMatcher>,
    pub(crate) pseudo_classes: Vec<PseudoClass>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && !self.universal
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.pseudo_classes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorPart {
    pub(crate) compound: Compound,
    // Relation to the part on the left; `None` for the first part.
    pub(crate) combinator: Option<Combinator>,
}

fn unsupported(source: &str) -> Error {
    Error::UnsupportedSelector(source.to_string())
}

/// Bracket, parenthesis and quote nesting while walking selector text.
#[derive(Default)]
struct Nesting {
    brackets: usize,
    parens: usize,
    quote: Option<char>,
    escaped: bool,
}

impl Nesting {
    /// Feeds one character. Returns whether it sits at top level, or `None`
    /// for an unbalanced closing bracket or parenthesis.
    fn step(&mut self, ch: char) -> Option<bool> {
        if let Some(quote) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == quote {
                self.quote = None;
            }
            return Some(false);
        }

        let top_level = self.brackets == 0 && self.parens == 0;
        match ch {
            '"' | '\'' => self.quote = Some(ch),
            '[' => self.brackets += 1,
            ']' => self.brackets = self.brackets.checked_sub(1)?,
            '(' => self.parens += 1,
            ')' => self.parens = self.parens.checked_sub(1)?,
            _ => {}
        }
        Some(top_level)
    }

    fn is_balanced(&self) -> bool {
        self.brackets == 0 && self.parens == 0 && self.quote.is_none()
    }
}

pub(crate) fn parse_selector_groups(source: &str) -> Result<Vec<SelectorChain>> {
    split_selector_groups(source)?
        .into_iter()
        .map(parse_selector_chain)
        .collect()
}

fn split_selector_groups(source: &str) -> Result<Vec<&str>> {
    let mut nesting = Nesting::default();
    let mut groups = Vec::new();
    let mut start = 0usize;

    for (idx, ch) in source.char_indices() {
        let top_level = nesting.step(ch).ok_or_else(|| unsupported(source))?;
        if top_level && ch == ',' {
            groups.push(source[start..idx].trim());
            start = idx + 1;
        }
    }
    if !nesting.is_balanced() {
        return Err(unsupported(source));
    }
    groups.push(source[start..].trim());

    if groups.iter().any(|group| group.is_empty()) {
        return Err(unsupported(source));
    }
    Ok(groups)
}

enum ChainToken<'a> {
    Compound(&'a str),
    Combinator(Combinator),
}

fn tokenize_selector_chain(source: &str) -> Result<Vec<ChainToken<'_>>> {
    let mut nesting = Nesting::default();
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, ch) in source.char_indices() {
        let top_level = nesting.step(ch).ok_or_else(|| unsupported(source))?;
        let combinator = match ch {
            '>' => Some(Combinator::Child),
            '+' => Some(Combinator::AdjacentSibling),
            '~' => Some(Combinator::GeneralSibling),
            _ => None,
        };
        if top_level && (ch.is_ascii_whitespace() || combinator.is_some()) {
            if let Some(begin) = start.take() {
                tokens.push(ChainToken::Compound(&source[begin..idx]));
            }
            if let Some(combinator) = combinator {
                tokens.push(ChainToken::Combinator(combinator));
            }
            continue;
        }
        if start.is_none() {
            start = Some(idx);
        }
    }
    if !nesting.is_balanced() {
        return Err(unsupported(source));
    }
    if let Some(begin) = start {
        tokens.push(ChainToken::Compound(&source[begin..]));
    }
    Ok(tokens)
}

fn parse_selector_chain(source: &str) -> Result<SelectorChain> {
    let mut parts: SelectorChain = Vec::new();
    let mut pending: Option<Combinator> = None;

    for token in tokenize_selector_chain(source)? {
        match token {
            ChainToken::Combinator(combinator) => {
                if pending.is_some() || parts.is_empty() {
                    return Err(unsupported(source));
                }
                pending = Some(combinator);
            }
            ChainToken::Compound(text) => {
                let compound = parse_compound(text)?;
                let combinator = if parts.is_empty() {
                    None
                } else {
                    Some(pending.take().unwrap_or(Combinator::Descendant))
                };
                parts.push(SelectorPart {
                    compound,
                    combinator,
                });
            }
        }
    }

    if parts.is_empty() || pending.is_some() {
        return Err(unsupported(source));
    }
    Ok(parts)
}

fn parse_compound(text: &str) -> Result<Compound> {
    let bytes = text.as_bytes();
    let mut i = 0usize;
    let mut compound = Compound::default();

    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                if i != 0 {
                    return Err(unsupported(text));
                }
                compound.universal = true;
                i += 1;
            }
            b'#' => {
                let (id, next) = parse_ident(text, i + 1).ok_or_else(|| unsupported(text))?;
                if compound.id.replace(id).is_some() {
                    return Err(unsupported(text));
                }
                i = next;
            }
            b'.' => {
                let (class_name, next) =
                    parse_ident(text, i + 1).ok_or_else(|| unsupported(text))?;
                compound.classes.push(class_name);
                i = next;
            }
            b'[' => {
                let (attr, next) = parse_attr_matcher(text, i)?;
                compound.attrs.push(attr);
                i = next;
            }
            b':' => {
                let (pseudo, next) = parse_pseudo_class(text, i)?;
                compound.pseudo_classes.push(pseudo);
                i = next;
            }
            _ => {
                // A type selector can only lead the compound.
                if i != 0 {
                    return Err(unsupported(text));
                }
                let (tag, next) = parse_ident(text, i).ok_or_else(|| unsupported(text))?;
                compound.tag = Some(tag.to_ascii_lowercase());
                i = next;
            }
        }
    }

    if compound.is_empty() {
        return Err(unsupported(text));
    }
    Ok(compound)
}

fn is_ident_byte(b: u8) -> bool {
    // Bytes >= 0x80 belong to multi-byte UTF-8 sequences, so slicing on ident
    // boundaries stays on char boundaries.
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b >= 0x80
}

fn parse_ident(src: &str, start: usize) -> Option<(String, usize)> {
    let bytes = src.as_bytes();
    let mut end = start;
    while end < bytes.len() && is_ident_byte(bytes[end]) {
        end += 1;
    }
    if end == start {
        return None;
    }
    Some((src.get(start..end)?.to_string(), end))
}

fn find_closing(src: &str, open: usize) -> Option<usize> {
    let mut nesting = Nesting::default();
    for (idx, ch) in src[open..].char_indices() {
        nesting.step(ch)?;
        if idx > 0 && nesting.brackets == 0 && nesting.parens == 0 && nesting.quote.is_none() {
            return Some(open + idx);
        }
    }
    None
}

fn parse_attr_matcher(src: &str, open: usize) -> Result<(AttrMatcher, usize)> {
    let close = find_closing(src, open).ok_or_else(|| unsupported(src))?;
    let body = src[open + 1..close].trim();
    let bytes = body.as_bytes();

    let mut i = 0usize;
    while i < bytes.len() && is_attr_name_byte(bytes[i]) {
        i += 1;
    }
    if i == 0 {
        return Err(unsupported(src));
    }
    let name = body[..i].to_ascii_lowercase();
    let rest = body[i..].trim_start();

    if rest.is_empty() {
        let matcher = AttrMatcher {
            name,
            op: AttrOp::Exists,
            value: String::new(),
            case_insensitive: false,
        };
        return Ok((matcher, close + 1));
    }

    let (op, rest) = [
        ("^=", AttrOp::Prefix),
        ("$=", AttrOp::Suffix),
        ("*=", AttrOp::Substring),
        ("~=", AttrOp::Includes),
        ("|=", AttrOp::DashMatch),
        ("=", AttrOp::Equals),
    ]
    .into_iter()
    .find_map(|(token, op)| rest.strip_prefix(token).map(|tail| (op, tail.trim_start())))
    .ok_or_else(|| unsupported(src))?;

    let (value, tail) = parse_attr_value(rest).ok_or_else(|| unsupported(src))?;
    let case_insensitive = match tail.trim() {
        "" => false,
        "i" | "I" => true,
        "s" | "S" => false,
        _ => return Err(unsupported(src)),
    };

    let matcher = AttrMatcher {
        name,
        op,
        value,
        case_insensitive,
    };
    Ok((matcher, close + 1))
}

fn is_attr_name_byte(b: u8) -> bool {
    is_ident_byte(b) || b == b':'
}

fn parse_attr_value(src: &str) -> Option<(String, &str)> {
    let mut chars = src.char_indices();
    let (_, first) = chars.next()?;

    if first == '"' || first == '\'' {
        let mut escaped = false;
        for (idx, ch) in chars {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == first {
                return Some((unescape_css(&src[1..idx]), &src[idx + 1..]));
            }
        }
        return None;
    }

    let end = src
        .char_indices()
        .find(|(_, ch)| ch.is_ascii_whitespace())
        .map_or(src.len(), |(idx, _)| idx);
    let raw = &src[..end];
    if raw.is_empty() || !raw.bytes().all(|b| is_ident_byte(b) || b == b'\\') {
        return None;
    }
    Some((unescape_css(raw), &src[end..]))
}

fn unescape_css(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn parse_pseudo_class(src: &str, colon: usize) -> Result<(PseudoClass, usize)> {
    let start = colon + 1;
    if src.as_bytes().get(start) == Some(&b':') {
        // Pseudo-elements never match an element node.
        return Err(unsupported(src));
    }
    let (name, after_name) = parse_ident(src, start).ok_or_else(|| unsupported(src))?;
    let name = name.to_ascii_lowercase();

    if src.as_bytes().get(after_name) != Some(&b'(') {
        let pseudo = match name.as_str() {
            "first-child" => PseudoClass::FirstChild,
            "last-child" => PseudoClass::LastChild,
            "only-child" => PseudoClass::OnlyChild,
            "first-of-type" => PseudoClass::FirstOfType,
            "last-of-type" => PseudoClass::LastOfType,
            "only-of-type" => PseudoClass::OnlyOfType,
            "empty" => PseudoClass::Empty,
            "root" => PseudoClass::Root,
            _ => return Err(unsupported(src)),
        };
        return Ok((pseudo, after_name));
    }

    let close = find_closing(src, after_name).ok_or_else(|| unsupported(src))?;
    let argument = src[after_name + 1..close].trim();
    if argument.is_empty() {
        return Err(unsupported(src));
    }

    let pseudo = match name.as_str() {
        "not" => PseudoClass::Not(parse_selector_groups(argument)?),
        "is" | "where" => PseudoClass::Is(parse_selector_groups(argument)?),
        "has" => PseudoClass::Has(parse_selector_groups(argument)?),
        "nth-child" => PseudoClass::NthChild(parse_nth(argument).ok_or_else(|| unsupported(src))?),
        "nth-last-child" => {
            PseudoClass::NthLastChild(parse_nth(argument).ok_or_else(|| unsupported(src))?)
        }
        "nth-of-type" => {
            PseudoClass::NthOfType(parse_nth(argument).ok_or_else(|| unsupported(src))?)
        }
        "nth-last-of-type" => {
            PseudoClass::NthLastOfType(parse_nth(argument).ok_or_else(|| unsupported(src))?)
        }
        _ => return Err(unsupported(src)),
    };
    Ok((pseudo, close + 1))
}

pub(crate) fn parse_nth(raw: &str) -> Option<Nth> {
    let compact = raw
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    match compact.as_str() {
        "" => None,
        "odd" => Some(Nth { a: 2, b: 1 }),
        "even" => Some(Nth { a: 2, b: 0 }),
        expr => match expr.split_once('n') {
            None => Some(Nth {
                a: 0,
                b: parse_signed(expr)?,
            }),
            Some((a_part, b_part)) => {
                let a = match a_part {
                    "" | "+" => 1,
                    "-" => -1,
                    _ => parse_signed(a_part)?,
                };
                let b = if b_part.is_empty() {
                    0
                } else {
                    // The offset must carry an explicit sign: `2n+1`, `-n-3`.
                    if !(b_part.starts_with('+') || b_part.starts_with('-')) {
                        return None;
                    }
                    parse_signed(b_part)?
                };
                Some(Nth { a, b })
            }
        },
    }
}

fn parse_signed(raw: &str) -> Option<i64> {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<i64>().ok()
}
