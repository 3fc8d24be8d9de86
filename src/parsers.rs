//! Attribute parsers for component property initializers.
//!
//! A parser receives the UI record, the new attribute value and the old one
//! (`None` when absent) and produces the property value.

use std::rc::Rc;

use crate::component::ui::Ui;
use crate::types::Value;

pub type AttributeParser = Rc<dyn Fn(&Ui, Option<&str>, Option<&str>) -> Value>;

/// Present and not `"false"`.
pub fn as_boolean() -> AttributeParser {
    Rc::new(|_: &Ui, value: Option<&str>, _: Option<&str>| Value::Bool(value.is_some_and(|v| v.trim() != "false")))
}

/// Integer, accepting a fractional number (truncated) and `0x` hex.
pub fn as_integer(default: i64) -> AttributeParser {
    Rc::new(move |_: &Ui, value: Option<&str>, _: Option<&str>| {
        let Some(raw) = value.map(str::trim) else {
            return Value::Int(default);
        };
        let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(hex, 16).ok(),
            None => raw
                .parse::<i64>()
                .ok()
                .or_else(|| raw.parse::<f64>().ok().filter(|n| n.is_finite()).map(|n| n.trunc() as i64)),
        };
        Value::Int(parsed.unwrap_or(default))
    })
}

pub fn as_number(default: f64) -> AttributeParser {
    Rc::new(move |_: &Ui, value: Option<&str>, _: Option<&str>| {
        Value::Number(
            value
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|n| n.is_finite())
                .unwrap_or(default),
        )
    })
}

pub fn as_string(default: &str) -> AttributeParser {
    let default = default.to_string();
    Rc::new(move |_: &Ui, value: Option<&str>, _: Option<&str>| Value::Str(value.map(str::to_string).unwrap_or_else(|| default.clone())))
}

/// One of `allowed` (case-insensitive); the first entry is the default.
pub fn as_enum(allowed: &[&str]) -> AttributeParser {
    let allowed: Vec<String> = allowed.iter().map(|a| a.to_string()).collect();
    Rc::new(move |_: &Ui, value: Option<&str>, _: Option<&str>| {
        let matched = value.and_then(|v| {
            let v = v.trim();
            allowed.iter().find(|a| a.eq_ignore_ascii_case(v))
        });
        matched
            .or_else(|| allowed.first())
            .map(|a| Value::Str(a.clone()))
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{self, reset_dom};

    fn ui() -> Ui {
        reset_dom();
        Ui::new("x-test", dom::create_element("x-test"), Vec::new()).unwrap()
    }

    #[test]
    fn test_boolean() {
        let ui = ui();
        let parse = as_boolean();
        assert_eq!(parse(&ui, Some(""), None), Value::Bool(true));
        assert_eq!(parse(&ui, Some("false"), None), Value::Bool(false));
        assert_eq!(parse(&ui, None, Some("")), Value::Bool(false));
    }

    #[test]
    fn test_numbers() {
        let ui = ui();
        assert_eq!(as_integer(0)(&ui, Some(" 42 "), None), Value::Int(42));
        assert_eq!(as_integer(0)(&ui, Some("3.9"), None), Value::Int(3));
        assert_eq!(as_integer(0)(&ui, Some("0x1f"), None), Value::Int(31));
        assert_eq!(as_integer(7)(&ui, Some("nope"), None), Value::Int(7));
        assert_eq!(as_number(1.5)(&ui, Some("2.25"), None), Value::Number(2.25));
        assert_eq!(as_number(1.5)(&ui, None, None), Value::Number(1.5));
    }

    #[test]
    fn test_string_and_enum() {
        let ui = ui();
        assert_eq!(as_string("d")(&ui, None, None), Value::from("d"));
        assert_eq!(as_string("d")(&ui, Some("v"), None), Value::from("v"));
        let size = as_enum(&["medium", "small", "large"]);
        assert_eq!(size(&ui, Some("LARGE"), None), Value::from("large"));
        assert_eq!(size(&ui, Some("huge"), None), Value::from("medium"));
    }
}
