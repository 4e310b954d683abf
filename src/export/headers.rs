//! Header derivation for the client-side export strategy
//!
//! The preferred route reads column names from result metadata: the query
//! is wrapped so that zero rows come back while the full column set is
//! still exposed, and the prepared statement's columns supply the names.
//! When metadata is unavailable this module falls back to parsing the
//! SELECT list out of the query text. The fallback is a best-effort
//! degradation: naive splitting inside expressions can mis-derive names,
//! and callers treat a `None` result as "proceed without a header".

/// Wrap a query so it exposes its column set without returning rows
pub(crate) fn zero_limit_wrapper(body: &str) -> String {
    format!("SELECT * FROM ({body}) AS header_probe LIMIT 0")
}

/// Best-effort header names parsed from the query text
///
/// Takes the expression list between `SELECT` and the top-level `FROM`,
/// splits it on top-level commas, and derives each expression's name:
/// the token after an explicit `AS`, else the final identifier token,
/// else the text after the last dot. Returns `None` when no usable
/// header can be produced (star selects, empty lists, non-SELECT
/// statements).
pub(crate) fn header_names_from_sql(sql: &str) -> Option<Vec<String>> {
    let trimmed = sql.trim();
    if !starts_with_keyword(trimmed, "select") {
        return None;
    }
    let after_select = &trimmed["select".len()..];

    let from_offset = top_level_keyword_offset(after_select, "from")?;
    let select_list = &after_select[..from_offset];

    let exprs = split_top_level(select_list, ',');
    if exprs.is_empty() {
        return None;
    }

    let mut names = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let name = derive_name(&expr)?;
        if name.is_empty() || name == "*" {
            return None;
        }
        names.push(name);
    }
    Some(names)
}

fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    let Some(head) = text.get(..keyword.len()) else {
        return false;
    };
    head.eq_ignore_ascii_case(keyword)
        && text[keyword.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace())
}

/// Scanner state shared by the top-level searches: tracks parenthesis
/// depth and string/identifier quoting so keywords and commas inside
/// nested expressions or literals are never matched.
struct Scanner {
    depth: u32,
    in_single: bool,
    in_double: bool,
    in_backtick: bool,
}

impl Scanner {
    fn new() -> Self {
        Self {
            depth: 0,
            in_single: false,
            in_double: false,
            in_backtick: false,
        }
    }

    fn step(&mut self, c: char) {
        match c {
            '\'' if !self.in_double && !self.in_backtick => self.in_single = !self.in_single,
            '"' if !self.in_single && !self.in_backtick => self.in_double = !self.in_double,
            '`' if !self.in_single && !self.in_double => self.in_backtick = !self.in_backtick,
            '(' if self.top_level_quotes() => self.depth += 1,
            ')' if self.top_level_quotes() => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
    }

    fn top_level_quotes(&self) -> bool {
        !self.in_single && !self.in_double && !self.in_backtick
    }

    fn top_level(&self) -> bool {
        self.depth == 0 && self.top_level_quotes()
    }
}

/// Byte offset of the first top-level, word-bounded occurrence of `keyword`
fn top_level_keyword_offset(text: &str, keyword: &str) -> Option<usize> {
    let mut scanner = Scanner::new();
    let mut prev: Option<char> = None;

    for (offset, c) in text.char_indices() {
        if scanner.top_level()
            && prev.is_none_or(|p| !is_ident_char(p))
            && text
                .get(offset..offset + keyword.len())
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(keyword))
        {
            let after = text
                .get(offset + keyword.len()..)
                .and_then(|rest| rest.chars().next());
            if after.is_none_or(|a| !is_ident_char(a)) {
                return Some(offset);
            }
        }
        scanner.step(c);
        prev = Some(c);
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split on `separator` at top level only
fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut scanner = Scanner::new();
    let mut parts = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c == separator && scanner.top_level() {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            scanner.step(c);
            current.push(c);
        }
    }
    let last = current.trim().to_string();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts.retain(|p| !p.is_empty());
    parts
}

/// Derive a header name from one select-list expression
fn derive_name(expr: &str) -> Option<String> {
    let tokens = split_top_level_whitespace(expr);
    if tokens.is_empty() {
        return None;
    }

    // Explicit alias wins: take the token after the last top-level AS
    let name = if let Some(pos) = tokens
        .iter()
        .rposition(|t| t.eq_ignore_ascii_case("as"))
    {
        tokens.get(pos + 1)?.clone()
    } else {
        tokens.last()?.clone()
    };

    // Qualified names keep only the final segment
    let name = name.rsplit('.').next().unwrap_or(&name);
    let name = name
        .trim_matches(|c| c == '`' || c == '"' || c == '\'' || c == '(' || c == ')')
        .to_string();
    Some(name)
}

/// Split on whitespace at top level only
fn split_top_level_whitespace(text: &str) -> Vec<String> {
    let mut scanner = Scanner::new();
    let mut parts = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_whitespace() && scanner.top_level() {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            scanner.step(c);
            current.push(c);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
