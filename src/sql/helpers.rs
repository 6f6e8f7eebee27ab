//! Shared helper functions for SQL rendering.
//!
//! Small building blocks composed by [`EngineDescriptor`](super::engine::EngineDescriptor)
//! and the filter renderer.

// =============================================================================
// Quoting
// =============================================================================

/// Wrap an identifier in the given quote pair, doubling any embedded right quote.
///
/// `quote_entity("weird`name", "`", "`")` -> `` `weird``name` ``
pub fn quote_entity(ident: &str, left: &str, right: &str) -> String {
    if right.is_empty() {
        return format!("{left}{ident}");
    }
    let doubled = format!("{right}{right}");
    format!("{left}{}{right}", ident.replace(right, &doubled))
}

/// Wrap a string literal in `quote`, replacing embedded quotes with `escaped`.
pub fn quote_value(s: &str, quote: &str, escaped: &str) -> String {
    format!("{quote}{}{quote}", s.replace(quote, escaped))
}

// =============================================================================
// Templates
// =============================================================================

/// The hole marker used by conditional-expression templates.
pub const TEMPLATE_HOLE: &str = "%s";

/// Number of `%s` holes in a template.
pub fn count_holes(template: &str) -> usize {
    template.matches(TEMPLATE_HOLE).count()
}

/// Fill `%s` holes left to right.
///
/// Returns `None` when the number of holes doesn't match the number of args.
pub fn fill_template(template: &str, args: &[&str]) -> Option<String> {
    let parts: Vec<&str> = template.split(TEMPLATE_HOLE).collect();
    if parts.len() != args.len() + 1 {
        return None;
    }
    let mut out = String::with_capacity(template.len() + args.iter().map(|a| a.len()).sum::<usize>());
    for (i, part) in parts.iter().enumerate() {
        out.push_str(part);
        if let Some(arg) = args.get(i) {
            out.push_str(arg);
        }
    }
    Some(out)
}

// =============================================================================
// Filter clauses
// =============================================================================

/// Strip a leading `WHERE` keyword (any case) from a user-supplied filter clause.
///
/// Returns `None` for clauses that are empty once trimmed.
pub fn strip_where(clause: &str) -> Option<&str> {
    let trimmed = clause.trim();
    let body = match trimmed.get(..5) {
        Some(head) if head.eq_ignore_ascii_case("where") => {
            let rest = &trimmed[5..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with('(') {
                rest.trim_start()
            } else {
                trimmed
            }
        }
        _ => trimmed,
    };
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}
