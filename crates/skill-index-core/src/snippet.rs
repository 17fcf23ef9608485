//! Highlighted excerpts around literal query matches.
//!
//! Used when the lexical engine reports a content hit without supplying its
//! own snippet. Matching is case-insensitive per term; matched text is
//! wrapped in [`HIGHLIGHT_OPEN`] / [`HIGHLIGHT_CLOSE`], the same markers the
//! SQLite FTS5 `snippet()` call uses, so excerpts look alike whichever side
//! produced them.

/// Opening highlight marker.
pub const HIGHLIGHT_OPEN: &str = ">>>";
/// Closing highlight marker.
pub const HIGHLIGHT_CLOSE: &str = "<<<";
/// Marks a window cut out of longer text.
pub const ELLIPSIS: &str = "...";

/// Snippet window tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnippetOptions {
    /// Characters of context kept on each side of a match.
    pub radius: usize,
    /// Maximum excerpts per document.
    pub max_snippets: usize,
}

impl Default for SnippetOptions {
    fn default() -> Self {
        Self {
            radius: 60,
            max_snippets: 3,
        }
    }
}

/// Split a query into lowercase search terms of two or more characters.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in query
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#' || c == '-' || c == '_'))
    {
        let token = token.trim_matches('-');
        if token.chars().count() >= 2 && !terms.iter().any(|t| t == token) {
            terms.push(token.to_string());
        }
    }
    terms
}

/// Extract up to `options.max_snippets` highlighted excerpts of `body`
/// around occurrences of the terms in `query`.
///
/// Returns an empty list when nothing matches.
pub fn extract_snippets(body: &str, query: &str, options: &SnippetOptions) -> Vec<String> {
    let terms = query_terms(query);
    if terms.is_empty() || body.is_empty() || options.max_snippets == 0 {
        return Vec::new();
    }

    // One lowercase char per source char keeps indices aligned.
    let chars: Vec<char> = body.chars().collect();
    let lower: Vec<char> = chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();

    let matches = find_matches(&lower, &terms);
    if matches.is_empty() {
        return Vec::new();
    }

    let windows = merge_windows(&matches, options.radius, chars.len());

    windows
        .into_iter()
        .take(options.max_snippets)
        .map(|(start, end)| render(&chars, start, end, &matches))
        .collect()
}

/// Non-overlapping `(start, end)` char ranges of term occurrences, sorted.
fn find_matches(haystack: &[char], terms: &[String]) -> Vec<(usize, usize)> {
    let mut found: Vec<(usize, usize)> = Vec::new();
    for term in terms {
        let needle: Vec<char> = term.chars().collect();
        if needle.len() > haystack.len() {
            continue;
        }
        let mut i = 0;
        while i + needle.len() <= haystack.len() {
            if haystack[i..i + needle.len()] == needle[..] {
                found.push((i, i + needle.len()));
                i += needle.len();
            } else {
                i += 1;
            }
        }
    }

    found.sort();
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(found.len());
    for (s, e) in found {
        match merged.last_mut() {
            Some(last) if s <= last.1 => last.1 = last.1.max(e),
            _ => merged.push((s, e)),
        }
    }
    merged
}

fn merge_windows(matches: &[(usize, usize)], radius: usize, len: usize) -> Vec<(usize, usize)> {
    let mut windows: Vec<(usize, usize)> = Vec::new();
    for &(s, e) in matches {
        let start = s.saturating_sub(radius);
        let end = (e + radius).min(len);
        match windows.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => windows.push((start, end)),
        }
    }
    windows
}

fn render(chars: &[char], start: usize, end: usize, matches: &[(usize, usize)]) -> String {
    let mut out = String::new();
    if start > 0 {
        out.push_str(ELLIPSIS);
    }

    let mut pos = start;
    for &(s, e) in matches.iter().filter(|(s, e)| *s >= start && *e <= end) {
        push_plain(&mut out, &chars[pos..s]);
        out.push_str(HIGHLIGHT_OPEN);
        push_plain(&mut out, &chars[s..e]);
        out.push_str(HIGHLIGHT_CLOSE);
        pos = e;
    }
    push_plain(&mut out, &chars[pos..end]);

    if end < chars.len() {
        out.push_str(ELLIPSIS);
    }
    out
}

/// Append text with line breaks flattened to spaces.
fn push_plain(out: &mut String, chars: &[char]) {
    out.extend(chars.iter().map(|c| if c.is_whitespace() { ' ' } else { *c }));
}
