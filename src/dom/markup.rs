//! Markup fragments - a small, forgiving parser and a serializer.
//!
//! Covers what inner-markup bindings need: elements with quoted, unquoted and
//! bare attributes, void elements, raw-text `script`/`style` bodies, comments
//! and the common character references. Unclosed elements are closed at the
//! end of input; stray end tags are ignored.

use super::tree::{self, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

// =============================================================================
// Parsing
// =============================================================================

/// Parse markup into a new, detached fragment.
pub fn parse_fragment(markup: &str) -> NodeId {
    let fragment = tree::create_fragment();
    let mut stack = vec![fragment];
    let mut rest = markup;

    while !rest.is_empty() {
        let top = stack.last().copied().unwrap_or(fragment);

        if let Some(after) = rest.strip_prefix("<!--") {
            let (comment, tail) = after.split_once("-->").unwrap_or((after, ""));
            tree::append_child(top, tree::create_comment(comment));
            rest = tail;
            continue;
        }

        if let Some(after) = rest.strip_prefix("</") {
            let end = after.find('>').unwrap_or(after.len());
            let name = after[..end].trim().to_ascii_lowercase();
            if let Some(pos) = stack
                .iter()
                .rposition(|n| tree::tag_name(*n).as_deref() == Some(name.as_str()))
            {
                stack.truncate(pos.max(1));
            }
            rest = after.get(end + 1..).unwrap_or("");
            continue;
        }

        let opens_tag = rest
            .strip_prefix('<')
            .is_some_and(|s| s.starts_with(|c: char| c.is_ascii_alphabetic()));
        if opens_tag {
            let (element, tail, self_closing) = parse_start_tag(&rest[1..]);
            tree::append_child(top, element);
            let tag = tree::tag_name(element).unwrap_or_default();
            rest = tail;

            if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                let close = format!("</{tag}");
                let end = find_ignore_case(rest, &close).unwrap_or(rest.len());
                if end > 0 {
                    tree::append_child(element, tree::create_text(&rest[..end]));
                }
                rest = &rest[end..];
                if let Some(gt) = rest.find('>') {
                    rest = &rest[gt + 1..];
                }
            } else if !self_closing && !VOID_ELEMENTS.contains(&tag.as_str()) {
                stack.push(element);
            }
            continue;
        }

        // Text runs to the next `<` that is not the first character.
        let first = rest.chars().next().map(char::len_utf8).unwrap_or(1);
        let end = rest[first..].find('<').map(|i| i + first).unwrap_or(rest.len());
        tree::append_child(top, tree::create_text(&decode_entities(&rest[..end])));
        rest = &rest[end..];
    }

    fragment
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// Parse `name attrs...>` (the leading `<` already consumed).
/// Returns the element, the remaining input and whether it was self-closing.
fn parse_start_tag(input: &str) -> (NodeId, &str, bool) {
    let name_end = input
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(input.len());
    let element = tree::create_element(&input[..name_end]);
    let mut rest = &input[name_end..];

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return (element, rest, false);
        }
        if let Some(tail) = rest.strip_prefix("/>") {
            return (element, tail, true);
        }
        if let Some(tail) = rest.strip_prefix('>') {
            return (element, tail, false);
        }

        let name_end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/'))
            .unwrap_or(rest.len());
        if name_end == 0 {
            // Stray character such as a lone `/`.
            let skip = rest.chars().next().map(char::len_utf8).unwrap_or(1);
            rest = &rest[skip..];
            continue;
        }
        let name = &rest[..name_end];
        rest = rest[name_end..].trim_start();

        let mut value = String::new();
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let end = body.find(quote).unwrap_or(body.len());
                    value = decode_entities(&body[..end]);
                    rest = body.get(end + 1..).unwrap_or("");
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_whitespace() || c == '>')
                        .unwrap_or(after_eq.len());
                    value = decode_entities(&after_eq[..end]);
                    rest = &after_eq[end..];
                }
            }
        }
        if !tree::has_attribute(element, name) {
            tree::set_attribute(element, name, &value);
        }
    }
}

/// Decode the named references markup commonly carries plus numeric ones.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// =============================================================================
// Serialization
// =============================================================================

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// Outer markup of a node.
pub fn serialize(node: NodeId) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

fn write_node(node: NodeId, out: &mut String) {
    if tree::is_text(node) {
        let text = tree::node_data(node).unwrap_or_default();
        let raw_parent = tree::parent(node)
            .and_then(tree::tag_name)
            .is_some_and(|t| RAW_TEXT_ELEMENTS.contains(&t.as_str()));
        if raw_parent {
            out.push_str(&text);
        } else {
            out.push_str(&escape_text(&text));
        }
        return;
    }
    if tree::is_comment(node) {
        out.push_str("<!--");
        out.push_str(&tree::node_data(node).unwrap_or_default());
        out.push_str("-->");
        return;
    }
    let Some(tag) = tree::tag_name(node) else {
        // Fragment
        for child in tree::children(node) {
            write_node(child, out);
        }
        return;
    };

    out.push('<');
    out.push_str(&tag);
    for name in tree::attribute_names(node) {
        let value = tree::get_attribute(node, &name).unwrap_or_default();
        out.push(' ');
        out.push_str(&name);
        if !value.is_empty() {
            out.push_str("=\"");
            out.push_str(&escape_attribute(&value));
            out.push('"');
        }
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&tag.as_str()) {
        return;
    }
    for child in tree::children(node) {
        write_node(child, out);
    }
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

/// Markup of a node's children.
pub fn inner_html(node: NodeId) -> String {
    let mut out = String::new();
    for child in tree::children(node) {
        write_node(child, &mut out);
    }
    out
}

/// Replace a node's children with parsed markup.
pub fn set_inner_html(node: NodeId, markup: &str) {
    let fragment = parse_fragment(markup);
    tree::clear_children(node);
    tree::append_child(node, fragment);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::reset_dom;

    #[test]
    fn test_parse_and_serialize() {
        reset_dom();
        let markup = r#"<ul class="list"><li data-id=1>One &amp; two</li><li hidden>Three</li></ul><!-- note --><br>"#;
        let fragment = parse_fragment(markup);
        assert_eq!(tree::children(fragment).len(), 3);
        assert_eq!(
            inner_html(fragment),
            r#"<ul class="list"><li data-id="1">One &amp; two</li><li hidden>Three</li></ul><!-- note --><br>"#
        );
    }

    #[test]
    fn test_raw_text_and_self_closing() {
        reset_dom();
        let fragment = parse_fragment("<script>if (a < b) {}</script><my-el/><p>x</p>");
        let kids = tree::children(fragment);
        assert_eq!(kids.len(), 3);
        assert_eq!(tree::text_content(kids[0]), "if (a < b) {}");
        assert!(tree::children(kids[1]).is_empty());
        assert_eq!(serialize(kids[0]), "<script>if (a < b) {}</script>");
    }

    #[test]
    fn test_forgiving() {
        reset_dom();
        let fragment = parse_fragment("<div><span>open</div></b>tail a < b");
        assert_eq!(inner_html(fragment), "<div><span>open</span></div>tail a &lt; b");
    }

    #[test]
    fn test_set_inner_html() {
        reset_dom();
        let host = tree::create_element("div");
        tree::append_child(host, tree::create_text("old"));
        set_inner_html(host, "<b>new</b>");
        assert_eq!(inner_html(host), "<b>new</b>");
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &#65;&#x42; &bogus; &"), "a <b> AB &bogus; &");
    }
}
