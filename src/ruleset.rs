//! Ordered text-rewrite rules applied during normalization.
//!
//! Rules are configured as `[pattern, replacement]` pairs. Patterns match
//! case-insensitively and replace every occurrence; replacements use the
//! `$1` / `$&` / `$$` template syntax of the region mapping files.

use std::fmt;

use regex::{Regex, RegexBuilder};

/// Which of an entry's rulesets to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RulesetKind {
    /// Applied to values from the user's table.
    DataSide,
    /// Applied to the known region ids of the boundary dataset.
    ServerSide,
    /// Applied to values from the table's disambiguation column.
    Disambiguation,
    /// Applied to the boundary dataset's disambiguation property.
    DisambiguationServerSide,
}

impl RulesetKind {
    pub const ALL: [RulesetKind; 4] = [
        RulesetKind::DataSide,
        RulesetKind::ServerSide,
        RulesetKind::Disambiguation,
        RulesetKind::DisambiguationServerSide,
    ];

    pub(crate) const fn index(self) -> usize {
        match self {
            RulesetKind::DataSide => 0,
            RulesetKind::ServerSide => 1,
            RulesetKind::Disambiguation => 2,
            RulesetKind::DisambiguationServerSide => 3,
        }
    }

    /// Name of the rule list in the region mapping configuration.
    pub fn config_name(self) -> &'static str {
        match self {
            RulesetKind::DataSide => "dataReplacements",
            RulesetKind::ServerSide => "serverReplacements",
            RulesetKind::Disambiguation => "disambigDataReplacements",
            RulesetKind::DisambiguationServerSide => "disambigServerReplacements",
        }
    }
}

impl fmt::Display for RulesetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

/// A single compiled rewrite rule.
#[derive(Debug, Clone)]
pub struct ReplacementRule {
    pattern: String,
    regex: Regex,
    /// Replacement in regex crate syntax, lowercased
    replacement: String,
}

impl ReplacementRule {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            replacement: translate_template(&replacement.to_lowercase()),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn apply(&self, text: &str) -> Option<String> {
        match self.regex.replace_all(text, self.replacement.as_str()) {
            std::borrow::Cow::Owned(s) => Some(s),
            std::borrow::Cow::Borrowed(_) => None,
        }
    }
}

/// Ordered list of rules. Later rules see the output of earlier ones.
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    rules: Vec<ReplacementRule>,
}

impl Ruleset {
    pub fn new(rules: Vec<ReplacementRule>) -> Self {
        Self { rules }
    }

    /// Compile `(pattern, replacement)` pairs, stopping at the first bad pattern.
    ///
    /// On failure returns the offending pattern with the compile error.
    pub fn from_pairs<P, R>(pairs: &[(P, R)]) -> Result<Self, (String, regex::Error)>
    where
        P: AsRef<str>,
        R: AsRef<str>,
    {
        let mut rules = Vec::with_capacity(pairs.len());
        for (pattern, replacement) in pairs {
            let rule = ReplacementRule::new(pattern.as_ref(), replacement.as_ref())
                .map_err(|e| (pattern.as_ref().to_string(), e))?;
            rules.push(rule);
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[ReplacementRule] {
        &self.rules
    }

    /// Run every rule in order over `text`.
    pub fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        for rule in &self.rules {
            if let Some(rewritten) = rule.apply(&current) {
                current = rewritten;
            }
        }
        current
    }
}

/// One ruleset per [`RulesetKind`].
#[derive(Debug, Clone, Default)]
pub struct Rulesets {
    by_kind: [Ruleset; 4],
}

impl Rulesets {
    pub fn get(&self, kind: RulesetKind) -> &Ruleset {
        &self.by_kind[kind.index()]
    }

    pub fn set(&mut self, kind: RulesetKind, ruleset: Ruleset) {
        self.by_kind[kind.index()] = ruleset;
    }
}

/// Rewrite a `$1` / `$&` / `$$` template into regex crate syntax.
///
/// A `$` that does not start a group reference is kept literally.
fn translate_template(template: &str) -> String {
    let mut out = String::with_capacity(template.len() + 4);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some(d) if d.is_ascii_digit() => {
                let mut group = String::new();
                while let Some(d) = chars.peek().copied() {
                    if !d.is_ascii_digit() || group.len() == 2 {
                        break;
                    }
                    group.push(d);
                    chars.next();
                }
                out.push_str("${");
                out.push_str(&group);
                out.push('}');
            }
            _ => out.push_str("$$"),
        }
    }
    out
}
