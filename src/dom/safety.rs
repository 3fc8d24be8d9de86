//! Attribute write safety.
//!
//! Writes of author-controlled values fail closed: event-handler attribute
//! names and script-bearing URLs are rejected with
//! [`Error::UnsafeAttribute`] and nothing is written.

use super::tree::{self, NodeId};
use crate::error::{Error, Result};

/// Attributes whose value is interpreted as a URL (or URL list).
const URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "action",
    "formaction",
    "poster",
    "cite",
    "background",
    "xlink:href",
    "srcset",
    "ping",
    "manifest",
    "codebase",
    "data",
];

const SAFE_SCHEMES: &[&str] = &["http", "https", "ftp", "mailto", "tel"];

/// Schemes rejected on every attribute, URL-valued or not.
const SCRIPT_SCHEMES: &[&str] = &["javascript", "vbscript"];

/// `onclick`, `onLoad`, ...
pub fn is_event_handler_name(name: &str) -> bool {
    name.len() > 2 && name.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on"))
}

pub fn is_url_attribute(name: &str) -> bool {
    URL_ATTRIBUTES.iter().any(|a| a.eq_ignore_ascii_case(name))
}

/// Scheme of a URL, lowercased, with whitespace and control characters
/// removed first. `None` for relative URLs.
fn scheme_of(url: &str) -> Option<String> {
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    let colon = cleaned.find(':')?;
    let candidate = &cleaned[..colon];
    // A path, query or fragment before the colon makes it relative.
    if candidate.is_empty() || candidate.contains(['/', '?', '#']) {
        return None;
    }
    let valid = candidate.starts_with(|c: char| c.is_ascii_alphabetic())
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| candidate.to_ascii_lowercase())
}

/// Relative URLs and allowlisted schemes only.
pub fn is_safe_url(url: &str) -> bool {
    match scheme_of(url) {
        None => true,
        Some(scheme) => SAFE_SCHEMES.contains(&scheme.as_str()),
    }
}

/// Check an attribute write without performing it.
pub fn check_attribute(name: &str, value: &str) -> Result<()> {
    let unsafe_attr = |reason: String| Error::UnsafeAttribute {
        name: name.to_string(),
        reason,
    };

    if is_event_handler_name(name) {
        return Err(unsafe_attr("event handler attributes cannot be set".to_string()));
    }

    if let Some(scheme) = scheme_of(value).filter(|s| SCRIPT_SCHEMES.contains(&s.as_str())) {
        return Err(unsafe_attr(format!("`{scheme}:` URLs are not allowed")));
    }

    if is_url_attribute(name) {
        let urls: Vec<&str> = if name.eq_ignore_ascii_case("srcset") {
            value
                .split(',')
                .filter_map(|candidate| candidate.split_whitespace().next())
                .collect()
        } else if name.eq_ignore_ascii_case("ping") {
            value.split_whitespace().collect()
        } else {
            vec![value]
        };
        if let Some(bad) = urls.into_iter().find(|url| !is_safe_url(url)) {
            return Err(unsafe_attr(format!("unsafe URL `{bad}`")));
        }
    }
    Ok(())
}

/// Set an attribute after [`check_attribute`] passes.
pub fn safe_set_attribute(element: NodeId, name: &str, value: &str) -> Result<()> {
    if let Err(e) = check_attribute(name, value) {
        tracing::warn!(element = %tree::describe(element), name, error = %e, "rejected attribute write");
        return Err(e);
    }
    tree::set_attribute(element, name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{self, reset_dom};

    #[test]
    fn test_event_handler_names() {
        assert!(check_attribute("onclick", "alert(1)").is_err());
        assert!(check_attribute("OnLoad", "x").is_err());
        assert!(check_attribute("on", "x").is_ok());
        assert!(check_attribute("title", "onclick").is_ok());
    }

    #[test]
    fn test_script_schemes_everywhere() {
        assert!(check_attribute("title", "javascript:alert(1)").is_err());
        assert!(check_attribute("href", " JavaScript:alert(1)").is_err());
        assert!(check_attribute("href", "java\nscript:alert(1)").is_err());
        assert!(check_attribute("data-x", "vbscript:x").is_err());
    }

    #[test]
    fn test_url_allowlist() {
        assert!(check_attribute("href", "https://example.com").is_ok());
        assert!(check_attribute("href", "mailto:a@b.c").is_ok());
        assert!(check_attribute("href", "/path?x=a:b").is_ok());
        assert!(check_attribute("href", "#frag").is_ok());
        assert!(check_attribute("src", "data:text/html,hi").is_err());
        assert!(check_attribute("srcset", "a.png 1x, https://x/b.png 2x").is_ok());
        assert!(check_attribute("srcset", "a.png 1x, data:x 2x").is_err());
        assert!(check_attribute("title", "data:fine-here").is_ok());
    }

    #[test]
    fn test_rejection_writes_nothing() {
        reset_dom();
        let a = dom::create_element("a");
        assert!(safe_set_attribute(a, "href", "javascript:void(0)").is_err());
        assert!(!dom::has_attribute(a, "href"));
        assert!(safe_set_attribute(a, "href", "/ok").is_ok());
        assert_eq!(dom::get_attribute(a, "href").as_deref(), Some("/ok"));
    }
}
