//! Minimal `{key}` substitution against a state bag.
//!
//! Placeholders are `{ident}` where ident is alphanumeric or underscore.
//! A placeholder whose key is absent from the bag stays verbatim, which
//! makes a half-filled template obvious in the delivered text. Strings
//! render raw (no quotes), null renders empty, everything else renders as
//! compact JSON.

use serde_json::Value;

use crate::state::StateBag;

pub fn render(template: &str, bag: &StateBag) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let key = &after[..close];
        let value = if is_ident(key) { bag.get(key) } else { None };
        match value {
            Some(v) => out.push_str(&value_text(v)),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn is_ident(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
