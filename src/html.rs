use std::collections::HashMap;

use crate::dom::{Dom, NodeId, NodeType};
use crate::{Error, Result};

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROWTH: usize = 1024 * 1024;

/// Parses `html` and appends the resulting nodes under `parent`. Returns the
/// nodes inserted directly under `parent`.
pub(crate) fn parse_into(dom: &mut Dom, parent: NodeId, html: &str) -> Result<Vec<NodeId>> {
    dom.live_node(parent)?;
    if dom.tag_name(parent).is_none() && parent != dom.document() {
        return Err(Error::TreeMutation(format!("{parent} cannot have children")));
    }

    let mut inserted = Vec::new();
    let mut stack = vec![parent];
    let bytes = html.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if starts_with_at(bytes, i, b"<!--") {
            let end = find_subslice(bytes, i + 4, b"-->")
                .ok_or_else(|| Error::HtmlParse("unclosed HTML comment".into()))?;
            i = end + 3;
            continue;
        }

        if bytes[i] == b'<' && starts_with_at(bytes, i, b"</") {
            let (tag, next) = parse_end_tag(html, i)?;
            i = next;
            // Stray end tags without a matching open element are ignored.
            if let Some(index) = stack
                .iter()
                .skip(1)
                .rposition(|node| dom.tag_name(*node) == Some(tag.as_str()))
            {
                stack.truncate(index + 1);
            }
            continue;
        }

        if bytes[i] == b'<' && starts_with_at(bytes, i, b"<!") {
            i = parse_declaration_tag(html, i)?;
            continue;
        }

        if bytes[i] == b'<' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
            let (tag, attrs, self_closing, next) = parse_start_tag(html, i)?;
            i = next;
            close_implied_end_tags(dom, &mut stack, &tag);

            let current = *stack
                .last()
                .ok_or_else(|| Error::HtmlParse("missing parent element".into()))?;
            let node = dom.create_element_with_attrs(Some(current), &tag, attrs);
            if current == parent {
                inserted.push(node);
            }

            if is_raw_text_tag(&tag) && !self_closing {
                let close = find_case_insensitive_end_tag(bytes, i, tag.as_bytes())
                    .ok_or_else(|| Error::HtmlParse(format!("unclosed <{tag}>")))?;
                let body = html
                    .get(i..close)
                    .ok_or_else(|| Error::HtmlParse(format!("invalid <{tag}> body")))?;
                if !body.is_empty() {
                    let text = if tag == "script" || tag == "style" {
                        body.to_string()
                    } else {
                        decode_html_character_references(body)
                    };
                    dom.append_text(node, text);
                }
                let (_, after_end) = parse_end_tag(html, close)?;
                i = after_end;
                continue;
            }

            if !self_closing && !is_void_tag(&tag) {
                stack.push(node);
            }
            continue;
        }

        let text_start = i;
        i += 1;
        while i < bytes.len() && bytes[i] != b'<' {
            i += 1;
        }
        let text = html
            .get(text_start..i)
            .ok_or_else(|| Error::HtmlParse("invalid text boundary".into()))?;
        if !text.is_empty() {
            let current = *stack
                .last()
                .ok_or_else(|| Error::HtmlParse("missing parent element".into()))?;
            let node = dom.append_text(current, decode_html_character_references(text));
            if current == parent {
                inserted.push(node);
            }
        }
    }

    Ok(inserted)
}

/// Pops open elements that a new start tag implicitly closes (`<li>` closes an
/// open `<li>` within the same list, block elements close an open `<p>`).
/// Never pops the insertion parent.
fn close_implied_end_tags(dom: &Dom, stack: &mut Vec<NodeId>, tag: &str) {
    let (closes, boundaries): (&[&str], &[&str]) = match tag {
        "li" => (&["li"], &["ul", "ol", "menu"]),
        "dt" | "dd" => (&["dt", "dd"], &["dl"]),
        "option" => (&["option"], &["select", "datalist", "optgroup"]),
        "optgroup" => (&["option", "optgroup"], &["select"]),
        "tr" => (&["tr"], &["table", "thead", "tbody", "tfoot"]),
        "td" | "th" => (&["td", "th"], &["tr", "table"]),
        _ if closes_paragraph(tag) => (&["p"], &["div", "section", "article", "button", "td", "li"]),
        _ => return,
    };

    for index in (1..stack.len()).rev() {
        let Some(open_tag) = dom.tag_name(stack[index]) else {
            continue;
        };
        if closes.contains(&open_tag) {
            stack.truncate(index);
            return;
        }
        if boundaries.contains(&open_tag) {
            return;
        }
    }
}

fn closes_paragraph(tag: &str) -> bool {
    matches!(
        tag,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "details"
            | "div"
            | "dl"
            | "fieldset"
            | "figure"
            | "footer"
            | "form"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "main"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "table"
            | "ul"
    )
}

fn parse_start_tag(html: &str, at: usize) -> Result<(String, HashMap<String, String>, bool, usize)> {
    let bytes = html.as_bytes();
    let mut i = at + 1;

    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html
        .get(tag_start..i)
        .ok_or_else(|| Error::HtmlParse("invalid tag name".into()))?
        .to_ascii_lowercase();
    if tag.is_empty() {
        return Err(Error::HtmlParse("empty tag name".into()));
    }

    let mut attrs = HashMap::new();
    let mut self_closing = false;

    loop {
        skip_ws(bytes, &mut i);
        if i >= bytes.len() {
            return Err(Error::HtmlParse(format!("unclosed start tag <{tag}")));
        }
        if bytes[i] == b'>' {
            i += 1;
            break;
        }
        if starts_with_at(bytes, i, b"/>") {
            self_closing = true;
            i += 2;
            break;
        }

        if !is_attr_name_char(bytes[i]) {
            // Skip junk such as a lone `/` or stray quotes, like browsers do.
            i += 1;
            continue;
        }

        let name_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        let name = html
            .get(name_start..i)
            .ok_or_else(|| Error::HtmlParse("invalid attribute name".into()))?
            .to_ascii_lowercase();

        skip_ws(bytes, &mut i);
        let value = if bytes.get(i) == Some(&b'=') {
            i += 1;
            skip_ws(bytes, &mut i);
            parse_attr_value(html, &mut i)?
        } else {
            String::new()
        };

        // The first occurrence of a duplicated attribute wins.
        attrs.entry(name).or_insert(value);
    }

    Ok((tag, attrs, self_closing, i))
}

fn parse_attr_value(html: &str, i: &mut usize) -> Result<String> {
    let bytes = html.as_bytes();
    if *i >= bytes.len() {
        return Err(Error::HtmlParse("missing attribute value".into()));
    }

    if bytes[*i] == b'\'' || bytes[*i] == b'"' {
        let quote = bytes[*i];
        let start = *i + 1;
        let end = bytes[start..]
            .iter()
            .position(|b| *b == quote)
            .map(|offset| start + offset)
            .ok_or_else(|| Error::HtmlParse("unclosed quoted attribute value".into()))?;
        *i = end + 1;
        let raw = html
            .get(start..end)
            .ok_or_else(|| Error::HtmlParse("invalid attribute value".into()))?;
        return Ok(decode_html_character_references(raw));
    }

    let start = *i;
    while *i < bytes.len()
        && !bytes[*i].is_ascii_whitespace()
        && bytes[*i] != b'>'
        && !starts_with_at(bytes, *i, b"/>")
    {
        *i += 1;
    }
    let raw = html
        .get(start..*i)
        .ok_or_else(|| Error::HtmlParse("invalid attribute value".into()))?;
    Ok(decode_html_character_references(raw))
}

fn parse_end_tag(html: &str, at: usize) -> Result<(String, usize)> {
    let bytes = html.as_bytes();
    let mut i = at + 2;
    skip_ws(bytes, &mut i);

    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = html
        .get(tag_start..i)
        .ok_or_else(|| Error::HtmlParse("invalid end tag".into()))?
        .to_ascii_lowercase();

    let close = bytes[i..]
        .iter()
        .position(|b| *b == b'>')
        .ok_or_else(|| Error::HtmlParse(format!("unclosed end tag </{tag}")))?;
    Ok((tag, i + close + 1))
}

fn parse_declaration_tag(html: &str, at: usize) -> Result<usize> {
    let bytes = html.as_bytes();
    let mut quote: Option<u8> = None;

    for (offset, b) in bytes[at + 2..].iter().enumerate() {
        match quote {
            Some(q) if *b == q => quote = None,
            Some(_) => {}
            None if *b == b'\'' || *b == b'"' => quote = Some(*b),
            None if *b == b'>' => return Ok(at + 2 + offset + 1),
            None => {}
        }
    }
    Err(Error::HtmlParse("unclosed declaration tag".into()))
}

fn find_case_insensitive_end_tag(bytes: &[u8], from: usize, tag: &[u8]) -> Option<usize> {
    let mut i = from;
    while i + 2 + tag.len() <= bytes.len() {
        if bytes[i] == b'<'
            && bytes[i + 1] == b'/'
            && bytes[i + 2..i + 2 + tag.len()].eq_ignore_ascii_case(tag)
            && bytes
                .get(i + 2 + tag.len())
                .is_none_or(|b| b.is_ascii_whitespace() || *b == b'>')
        {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn is_attr_name_char(b: u8) -> bool {
    !(b.is_ascii_whitespace() || matches!(b, b'"' | b'\'' | b'>' | b'/' | b'=' | b'<'))
}

pub(crate) fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "textarea" | "title")
}

fn starts_with_at(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    bytes.get(at..at + needle.len()) == Some(needle)
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

pub(crate) fn decode_html_character_references(src: &str) -> String {
    if !src.contains('&') {
        return src.to_string();
    }

    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let decoded = tail.find(';').and_then(|semi| {
            let name = &tail[..semi];
            let well_formed = !name.is_empty()
                && name.len() <= 10
                && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'#');
            if !well_formed {
                return None;
            }
            decode_reference(name).map(|ch| (ch, semi + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let codepoint = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(codepoint);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{00A0}'),
        "copy" => Some('©'),
        "reg" => Some('®'),
        "trade" => Some('™'),
        "hellip" => Some('…'),
        "mdash" => Some('—'),
        "ndash" => Some('–'),
        "laquo" => Some('«'),
        "raquo" => Some('»'),
        "times" => Some('×'),
        "middot" => Some('·'),
        _ => None,
    }
}

pub(crate) fn serialize_node(dom: &Dom, node_id: NodeId, out: &mut String) {
    let Some(node) = dom.nodes.get(node_id.index()).filter(|node| node.alive) else {
        return;
    };

    match &node.node_type {
        NodeType::Document => {
            for child in &node.children {
                serialize_node(dom, *child, out);
            }
        }
        NodeType::Text(text) => {
            let raw = node
                .parent
                .and_then(|parent| dom.tag_name(parent))
                .is_some_and(|tag| tag == "script" || tag == "style");
            if raw {
                out.push_str(text);
            } else {
                escape_text_into(text, out);
            }
        }
        NodeType::Element(element) => {
            out.push('<');
            out.push_str(&element.tag_name);
            let mut attrs = element.attrs.iter().collect::<Vec<_>>();
            attrs.sort_by(|(left, _), (right, _)| left.cmp(right));
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_attr_into(value, out);
                out.push('"');
            }
            out.push('>');
            if is_void_tag(&element.tag_name) {
                return;
            }
            stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
                for child in &node.children {
                    serialize_node(dom, *child, out);
                }
            });
            out.push_str("</");
            out.push_str(&element.tag_name);
            out.push('>');
        }
    }
}

fn escape_text_into(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr_into(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}
