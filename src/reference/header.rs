//! SCPI header handling: splitting commands, canonical keys, and matching of
//! short/long mnemonic forms (`CH1:SCA` matches `CH<x>:SCAle`).

/// Splits a command into its header and the raw argument text.
pub fn split_command(command: &str) -> (&str, &str) {
    let trimmed = command.trim();
    match trimmed.find(char::is_whitespace) {
        Some(at) => (&trimmed[..at], trimmed[at..].trim()),
        None => (trimmed, ""),
    }
}

pub fn is_query(header: &str) -> bool {
    header.trim_end().ends_with('?')
}

/// Splits argument text on commas that are outside quotes and `{...}` placeholders.
pub fn split_arguments(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in args.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), _) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '{') => {
                depth += 1;
                current.push(c);
            }
            (None, '}') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, ',') if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn strip_markers(header: &str) -> &str {
    header.trim().trim_start_matches(':').trim_end_matches('?')
}

/// Splits a trailing numeric suffix off a mnemonic: `CH12` → (`CH`, true).
fn split_index(token: &str) -> (&str, bool) {
    let stem = token.trim_end_matches(|c: char| c.is_ascii_digit());
    if stem.is_empty() {
        (token, false)
    } else {
        (stem, stem.len() != token.len())
    }
}

/// Canonical key of a header: markers stripped, uppercase, whitespace removed,
/// numeric suffixes and `<x>` placeholders folded to `<X>`.
pub fn normalize_header(header: &str) -> String {
    let compact: String = strip_markers(header)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    compact
        .split(':')
        .map(|segment| {
            let upper = segment.to_ascii_uppercase();
            if let Some(at) = upper.find('<') {
                format!("{}<X>", &upper[..at])
            } else {
                match split_index(&upper) {
                    (stem, true) => format!("{}<X>", stem),
                    (stem, false) => stem.to_string(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

/// One accepted spelling of a mnemonic.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Form {
    short: String,
    long: String,
}

impl Form {
    fn parse(raw: &str) -> Self {
        let short: String = raw
            .chars()
            .take_while(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '*')
            .collect();
        let long = raw.to_ascii_uppercase();
        let short = if short.is_empty() { long.clone() } else { short };
        Self { short, long }
    }

    /// Anything from the short form up to the full long form is accepted.
    fn accepts(&self, token: &str) -> bool {
        token.len() >= self.short.len() && self.long.starts_with(token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    forms: Vec<Form>,
    indexed: bool,
    optional: bool,
}

impl Segment {
    fn parse(raw: &str) -> Self {
        let mut body = raw.trim();
        let optional = body.starts_with('[') && body.ends_with(']');
        if optional {
            body = &body[1..body.len() - 1];
        }
        let indexed = body.contains('<');
        let body = body.split('<').next().unwrap_or_default();
        let forms = body
            .trim_start_matches('{')
            .trim_end_matches('}')
            .split('|')
            .map(Form::parse)
            .collect();
        Self {
            forms,
            indexed,
            optional,
        }
    }

    fn accepts(&self, token: &str) -> bool {
        let upper = token.to_ascii_uppercase();
        let (stem, has_index) = split_index(&upper);
        if has_index && !self.indexed {
            return self.forms.iter().any(|f| f.accepts(&upper));
        }
        self.forms.iter().any(|f| f.accepts(stem))
    }
}

/// A reference header compiled for abbreviation-aware matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPattern {
    segments: Vec<Segment>,
}

impl HeaderPattern {
    pub fn parse(header: &str) -> Self {
        let segments = strip_markers(header)
            .replace("[:", ":[")
            .split(':')
            .filter(|s| !s.trim().is_empty())
            .map(Segment::parse)
            .collect();
        Self { segments }
    }

    pub fn matches(&self, header: &str) -> bool {
        let tokens: Vec<&str> = strip_markers(header)
            .split(':')
            .filter(|s| !s.is_empty())
            .collect();
        match_segments(&self.segments, &tokens)
    }

    /// Whether the first mnemonic of `header` matches this pattern's first segment.
    pub fn matches_root(&self, header: &str) -> bool {
        let first = strip_markers(header).split(':').next().unwrap_or_default();
        self.segments.first().is_some_and(|s| s.accepts(first))
    }
}

fn match_segments(segments: &[Segment], tokens: &[&str]) -> bool {
    match (segments.split_first(), tokens.split_first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some((segment, rest)), None) => segment.optional && match_segments(rest, tokens),
        (Some((segment, rest)), Some((token, remaining))) => {
            (segment.accepts(token) && match_segments(rest, remaining))
                || (segment.optional && match_segments(rest, tokens))
        }
    }
}
