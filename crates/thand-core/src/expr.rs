//! Expression evaluator (spec §4.1)
//!
//! Walks a `serde_json::Value` tree. Any string matching the strict `${ … }`
//! form gets its interior evaluated as a small dot-path + `+`-merge
//! expression against an input document and a set of named variables;
//! everything else recurses unchanged (strings are trimmed). No jq engine
//! dependency is present in any teacher crate in the corpus - this is a
//! small hand-written walker rather than a heavyweight parser, matching how
//! the rest of this crate stays dependency-light where nothing upstream
//! already pulls a parser in.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ThandError;

/// Evaluates `${ … }` expressions embedded anywhere in `input`, against
/// `doc` (bound to `.`/`$context`-style root access) and `variables`
/// (`$name` lookups). Returns a new tree with every expression replaced by
/// its (possibly null) result.
pub fn interpolate(
    input: &Value,
    doc: &Value,
    variables: &HashMap<String, Value>,
) -> Result<Value, ThandError> {
    match input {
        Value::String(s) => {
            if let Some(expr) = strict_expr(s) {
                evaluate(expr, doc, variables)
            } else {
                Ok(Value::String(s.trim().to_string()))
            }
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(interpolate(item, doc, variables)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), interpolate(v, doc, variables)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Returns the trimmed interior of a string in the strict `${ … }` form, or
/// `None` if the string isn't an expression (a plain scalar).
fn strict_expr(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("${")?.strip_suffix('}')?;
    Some(inner.trim())
}

/// Evaluates the interior of a `${ … }` expression.
///
/// Supported grammar (sufficient for every expression in §4.1/§4.6/§8):
///   - `.`                      the whole document
///   - `$name`                  a bound variable
///   - `$name.a.b`, `.a.b`      dot-path field/array-index access
///   - `lhs + rhs`              shallow-merges two object results (rhs wins
///                              on key conflicts); used for
///                              `${ $context + . }` style splicing
fn evaluate(
    expr: &str,
    doc: &Value,
    variables: &HashMap<String, Value>,
) -> Result<Value, ThandError> {
    if let Some(plus_idx) = top_level_plus(expr) {
        let lhs = evaluate(expr[..plus_idx].trim(), doc, variables)?;
        let rhs = evaluate(expr[plus_idx + 1..].trim(), doc, variables)?;
        return Ok(merge(lhs, rhs));
    }

    eval_path(expr, doc, variables)
}

/// Finds a `+` that isn't inside a quoted literal, for minimal splicing
/// support. Good enough for the expressions this evaluator needs to support;
/// it is not a general arithmetic grammar.
fn top_level_plus(expr: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in expr.char_indices() {
        match c {
            '"' | '\'' => in_quotes = !in_quotes,
            '+' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn eval_path(
    path: &str,
    doc: &Value,
    variables: &HashMap<String, Value>,
) -> Result<Value, ThandError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(ThandError::expression("empty expression"));
    }

    if path == "." {
        return Ok(doc.clone());
    }

    // Quoted string literal
    if (path.starts_with('"') && path.ends_with('"') && path.len() >= 2)
        || (path.starts_with('\'') && path.ends_with('\'') && path.len() >= 2)
    {
        return Ok(Value::String(path[1..path.len() - 1].to_string()));
    }

    let (root, rest) = if let Some(stripped) = path.strip_prefix('$') {
        let end = stripped
            .find(|c: char| c == '.' || c == '[')
            .unwrap_or(stripped.len());
        let name = &stripped[..end];
        let value = variables
            .get(name)
            .cloned()
            .unwrap_or(Value::Null);
        (value, &stripped[end..])
    } else if let Some(stripped) = path.strip_prefix('.') {
        (doc.clone(), stripped)
    } else {
        return Err(ThandError::expression(format!(
            "unsupported expression form: {path:?}"
        )));
    };

    Ok(walk(&root, rest))
}

/// Walks a `.field` / `[index]` chain. Missing paths yield `Value::Null`,
/// never an error (spec §4.1: "Missing jq paths yield a null result").
fn walk(root: &Value, rest: &str) -> Value {
    let mut current = root.clone();
    let mut chars = rest.chars().peekable();
    let mut token = String::new();
    let mut in_brackets = false;

    let mut flush = |tok: &mut String, cur: &mut Value, bracket: bool| {
        if tok.is_empty() {
            return;
        }
        *cur = if bracket {
            match tok.parse::<usize>() {
                Ok(idx) => cur.get(idx).cloned().unwrap_or(Value::Null),
                Err(_) => Value::Null,
            }
        } else {
            cur.get(tok.as_str()).cloned().unwrap_or(Value::Null)
        };
        tok.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '.' => flush(&mut token, &mut current, false),
            '[' => {
                flush(&mut token, &mut current, false);
                in_brackets = true;
            }
            ']' => {
                flush(&mut token, &mut current, true);
                in_brackets = false;
            }
            other => token.push(other),
        }
    }
    flush(&mut token, &mut current, in_brackets);
    current
}

/// `${ $context + . }` style splice: shallow object merge, rhs wins.
/// Non-object operands fall back to "rhs replaces lhs".
fn merge(lhs: Value, rhs: Value) -> Value {
    match (lhs, rhs) {
        (Value::Object(mut a), Value::Object(b)) => {
            for (k, v) in b {
                a.insert(k, v);
            }
            Value::Object(a)
        }
        (_, rhs) => rhs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn non_expression_scalars_pass_through_trimmed() {
        let doc = json!({});
        let out = interpolate(&json!("  plain value  "), &doc, &HashMap::new()).unwrap();
        assert_eq!(out, json!("plain value"));
    }

    #[test]
    fn dot_path_reads_context_field() {
        let doc = json!({"role": {"name": "billing-reader"}});
        let out = interpolate(&json!("${ .role.name }"), &doc, &HashMap::new()).unwrap();
        assert_eq!(out, json!("billing-reader"));
    }

    #[test]
    fn missing_path_yields_null_not_error() {
        let doc = json!({"role": {}});
        let out = interpolate(&json!("${ .role.missing.deeper }"), &doc, &HashMap::new()).unwrap();
        assert_eq!(out, Value::Null);
    }

    #[test]
    fn variable_lookup() {
        let doc = json!({});
        let variables = vars(&[("task", json!({"output": {"url": "https://x"}}))]);
        let out = interpolate(&json!("${ $task.output.url }"), &doc, &variables).unwrap();
        assert_eq!(out, json!("https://x"));
    }

    #[test]
    fn context_merge_splice() {
        let doc = json!({"a": 1});
        let variables = vars(&[("context", json!({"a": 1, "b": 2}))]);
        let out = interpolate(
            &json!("${ $context + . }"),
            &json!({"b": 99, "c": 3}),
            &variables,
        )
        .unwrap();
        let _ = doc;
        assert_eq!(out, json!({"a": 1, "b": 99, "c": 3}));
    }

    #[test]
    fn recurses_into_maps_and_lists() {
        let doc = json!({"x": 42});
        let input = json!({"items": ["${ .x }", "plain"]});
        let out = interpolate(&input, &doc, &HashMap::new()).unwrap();
        assert_eq!(out, json!({"items": [42, "plain"]}));
    }

    #[test]
    fn parse_failure_on_unsupported_form() {
        let doc = json!({});
        let err = evaluate("1 * 2", &doc, &HashMap::new()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Expression);
    }
}
