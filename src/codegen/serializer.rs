//! Raw user-entered values → target-language literals.
//!
//! Classification is the same for every backend; only the literal syntax in
//! [`LiteralRules`] differs. First match wins:
//!
//! | input                    | output                              |
//! |--------------------------|-------------------------------------|
//! | empty                    | no argument                         |
//! | `"ON"` / `'ON'`          | unchanged                           |
//! | `1.0`, `-3`, `2e-6`      | unchanged numeric literal           |
//! | `true` / `none` / `null` | boolean or null literal             |
//! | `[1, 2]`                 | unchanged sequence literal          |
//! | `{expr}`                 | the expression itself               |
//! | `CH{n}`                  | interpolated string                 |
//! | anything else            | quoted string, escapes applied      |

use crate::backend::LiteralRules;
use itertools::Itertools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'a> {
    Text(&'a str),
    Expr(&'a str),
}

/// Splits text into literal runs and `{expr}` placeholders. A brace without a
/// closing partner, or with nothing inside, is plain text.
fn pieces(raw: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut last = 0;
    let mut cursor = 0;
    while let Some(open) = raw[cursor..].find('{').map(|at| at + cursor) {
        let Some(close) = raw[open + 1..].find('}').map(|at| at + open + 1) else {
            break;
        };
        let inner = &raw[open + 1..close];
        if inner.contains('{') || inner.trim().is_empty() {
            cursor = open + 1;
            continue;
        }
        if open > last {
            out.push(Piece::Text(&raw[last..open]));
        }
        out.push(Piece::Expr(inner.trim()));
        last = close + 1;
        cursor = close + 1;
    }
    if last < raw.len() {
        out.push(Piece::Text(&raw[last..]));
    }
    out
}

pub fn has_placeholders(raw: &str) -> bool {
    pieces(raw).iter().any(|p| matches!(p, Piece::Expr(_)))
}

fn escape(raw: &str, quote: char) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// `raw` as a plain string literal.
pub fn quote(raw: &str, rules: &LiteralRules) -> String {
    let q = rules.quote;
    format!("{}{}{}", q, escape(raw, q), q)
}

fn is_delimited_string(raw: &str) -> bool {
    let mut chars = raw.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => first == last && matches!(first, '"' | '\''),
        _ => false,
    }
}

/// Integer, decimal or scientific notation, as the target language reads it.
fn is_numeral(raw: &str) -> bool {
    let body = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(at) => (&body[..at], Some(&body[at + 1..])),
        None => (body, None),
    };
    let has_digit = mantissa.chars().any(|c| c.is_ascii_digit());
    let well_formed = mantissa.chars().all(|c| c.is_ascii_digit() || c == '.')
        && mantissa.matches('.').count() <= 1;
    let exponent_ok = exponent.is_none_or(|e| {
        let digits = e.strip_prefix(['+', '-']).unwrap_or(e);
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    });
    // `007` is not a valid integer literal.
    let leading_zero = exponent.is_none()
        && !mantissa.contains('.')
        && mantissa.len() > 1
        && mantissa.starts_with('0')
        && mantissa.chars().any(|c| c != '0');
    has_digit && well_formed && exponent_ok && !leading_zero
}

fn keyword(raw: &str, rules: &LiteralRules) -> Option<&'static str> {
    match raw.to_ascii_lowercase().as_str() {
        "true" => Some(rules.true_literal),
        "false" => Some(rules.false_literal),
        "none" | "null" => Some(rules.null_literal),
        _ => None,
    }
}

fn interpolate(parts: &[Piece<'_>], rules: &LiteralRules, rewrite: &dyn Fn(&str) -> String) -> String {
    let q = rules.quote;
    let nests_cleanly = parts.iter().all(|p| match p {
        Piece::Expr(e) => !e.contains(q) && !e.contains('\\'),
        Piece::Text(_) => true,
    });

    if nests_cleanly {
        let mut body = String::new();
        for part in parts {
            match part {
                Piece::Text(text) => {
                    body.push_str(&escape(text, q).replace('{', "{{").replace('}', "}}"))
                }
                Piece::Expr(expr) => {
                    body.push('{');
                    body.push_str(&rewrite(expr));
                    body.push('}');
                }
            }
        }
        format!("{}{}{}{}", rules.interpolation_prefix, q, body, q)
    } else {
        parts
            .iter()
            .map(|part| match part {
                Piece::Text(text) => quote(text, rules),
                Piece::Expr(expr) => format!("str({})", rewrite(expr)),
            })
            .join(" + ")
    }
}

/// Serializes one argument value. `None` means "no argument".
pub fn serialize(raw: &str, rules: &LiteralRules) -> Option<String> {
    serialize_with(raw, rules, &|expr| expr.to_string())
}

/// Like [`serialize`], passing placeholder expressions through `rewrite`
/// (variable renaming) on their way into the output.
pub fn serialize_with(
    raw: &str,
    rules: &LiteralRules,
    rewrite: &dyn Fn(&str) -> String,
) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if is_delimited_string(value) || is_numeral(value) {
        return Some(value.to_string());
    }
    if let Some(literal) = keyword(value, rules) {
        return Some(literal.to_string());
    }
    if value.starts_with('[') && value.ends_with(']') {
        return Some(value.to_string());
    }

    let parts = pieces(value);
    Some(match parts.as_slice() {
        [Piece::Expr(expr)] => rewrite(expr),
        parts if parts.iter().any(|p| matches!(p, Piece::Expr(_))) => {
            interpolate(parts, rules, rewrite)
        }
        _ => quote(value, rules),
    })
}

/// Text that must end up as a string no matter what it looks like (whole
/// commands, hosts, paths). Placeholders are interpolated.
pub fn string_literal(raw: &str, rules: &LiteralRules, rewrite: &dyn Fn(&str) -> String) -> String {
    let value = raw.trim();
    let parts = pieces(value);
    if parts.iter().any(|p| matches!(p, Piece::Expr(_))) {
        interpolate(&parts, rules, rewrite)
    } else {
        quote(value, rules)
    }
}

/// A condition or other bare expression: `{expr}` placeholders become
/// parenthesised sub-expressions, and names are rewritten throughout.
pub fn expression(raw: &str, rewrite: &dyn Fn(&str) -> String) -> String {
    pieces(raw.trim())
        .into_iter()
        .map(|part| match part {
            Piece::Text(text) => rewrite(text),
            Piece::Expr(expr) => format!("({})", rewrite(expr)),
        })
        .collect()
}
