//! Display name → target identifier resolution.
//!
//! Globals get one identifier for the whole script. A loop index that reuses
//! the name of an enclosing loop's index shadows it for the loop body and gets
//! a fresh identifier (`i_1`), so the two never collide.

use ahash::{AHashMap, AHashSet};

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Names the generated script itself binds or calls.
const RESERVED: &[&str] = &[
    "time", "socket", "pyvisa", "rm", "device_manager", "exc", "print", "range", "int", "str",
    "open", "round", "bytes", "ScpiSocket", "DeviceManager", "TekHSIConnect", "_deadline",
    "_status", "_attempt", "_previous_timeout", "_data", "_file", "_k", "_n",
];

/// Maps a display name onto a valid identifier. Deterministic, but not
/// injective; [`Scope`] resolves the resulting clashes.
pub fn sanitize(name: &str) -> String {
    let mut ident: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if ident.is_empty() {
        ident.push('_');
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if KEYWORDS.contains(&ident.as_str()) || RESERVED.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

#[derive(Debug, Default)]
pub struct Scope {
    globals: AHashMap<String, String>,
    /// Active loop indices, innermost last.
    loops: Vec<(String, String)>,
    used: AHashSet<String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    fn unique(&mut self, base: String) -> String {
        let ident = if self.used.contains(&base) {
            (1..)
                .map(|n| format!("{}_{}", base, n))
                .find(|candidate| !self.used.contains(candidate))
                .unwrap_or(base)
        } else {
            base
        };
        self.used.insert(ident.clone());
        ident
    }

    /// Identifier of the global `name`, allocating it on first use.
    pub fn declare(&mut self, name: &str) -> String {
        if let Some(ident) = self.globals.get(name) {
            return ident.clone();
        }
        let ident = self.unique(sanitize(name));
        self.globals.insert(name.to_string(), ident.clone());
        ident
    }

    /// An identifier no variable can take, for generator temporaries.
    pub fn fresh(&mut self, base: &str) -> String {
        self.unique(base.to_string())
    }

    /// Binds a loop index for the duration of the loop body.
    pub fn push_loop(&mut self, name: &str) -> String {
        let shadows = self.loops.iter().any(|(bound, _)| bound == name);
        let ident = if shadows {
            self.unique(sanitize(name))
        } else {
            self.declare(name)
        };
        self.loops.push((name.to_string(), ident.clone()));
        ident
    }

    pub fn pop_loop(&mut self) {
        self.loops.pop();
    }

    /// Innermost binding of `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.loops
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, ident)| ident.as_str())
            .or_else(|| self.globals.get(name).map(String::as_str))
    }

    pub fn resolve(&mut self, name: &str) -> String {
        match self.lookup(name) {
            Some(ident) => ident.to_string(),
            None => self.declare(name),
        }
    }

    /// Replaces every bound variable name in an expression by its identifier.
    /// String literals and attribute names (`x.name`) are left alone.
    pub fn rewrite(&self, expr: &str) -> String {
        let chars: Vec<char> = expr.chars().collect();
        let mut out = String::with_capacity(expr.len());
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if let Some(q) = quote {
                out.push(c);
                if c == '\\' && i + 1 < chars.len() {
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            match c {
                '"' | '\'' => {
                    quote = Some(c);
                    out.push(c);
                    i += 1;
                }
                c if c.is_ascii_digit() => {
                    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                        out.push(chars[i]);
                        i += 1;
                    }
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = i;
                    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect();
                    let attribute = out.trim_end().ends_with('.');
                    match self.lookup(&word) {
                        Some(ident) if !attribute => out.push_str(ident),
                        _ => out.push_str(&word),
                    }
                }
                c => {
                    out.push(c);
                    i += 1;
                }
            }
        }
        out
    }
}
