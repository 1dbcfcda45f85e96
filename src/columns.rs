//! Matching table column names against region type names and aliases.

use std::borrow::Cow;

use memchr::memchr3;

/// Case-insensitive comparison of two names.
pub(crate) fn eq_ignore_case(a: &str, b: &str) -> bool {
    if a.is_ascii() && b.is_ascii() {
        return a.eq_ignore_ascii_case(b);
    }
    a.to_lowercase() == b.to_lowercase()
}

/// Drop hyphens, underscores and whitespace.
fn strip_separators(name: &str) -> Cow<'_, str> {
    // Fast path: most headers carry none of the common separators
    if memchr3(b'-', b'_', b' ', name.as_bytes()).is_none() && !name.contains(char::is_whitespace) {
        return Cow::Borrowed(name);
    }
    Cow::Owned(
        name.chars()
            .filter(|&c| c != '-' && c != '_' && !c.is_whitespace())
            .collect(),
    )
}

/// Return the first column name matching any alias, trying aliases in order.
///
/// A first pass compares names case-insensitively; a second pass also
/// ignores `-`, `_` and whitespace on both sides.
pub fn find_variable_for_aliases<'a, C, A>(var_names: &'a [C], aliases: &[A]) -> Option<&'a str>
where
    C: AsRef<str>,
    A: AsRef<str>,
{
    for alias in aliases {
        if let Some(name) = var_names
            .iter()
            .map(|c| c.as_ref())
            .find(|name| eq_ignore_case(name, alias.as_ref()))
        {
            return Some(name);
        }
    }

    for alias in aliases {
        let alias = strip_separators(alias.as_ref());
        if alias.is_empty() {
            continue;
        }
        if let Some(name) = var_names
            .iter()
            .map(|c| c.as_ref())
            .find(|name| eq_ignore_case(&strip_separators(name), &alias))
        {
            return Some(name);
        }
    }

    None
}
