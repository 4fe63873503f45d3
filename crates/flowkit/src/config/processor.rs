//! Environment variable substitution in configuration values.
//!
//! Substitution runs on parsed string values, never on raw file text, so a
//! value holding quotes or backslashes cannot break the file's syntax.
//! [`Substitutions`] remembers each reference it resolved so saving writes
//! the reference back instead of the secret it stood for.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

/// Replace `$VAR` and `${VAR}` with values from `lookup`.
///
/// Unknown variables are left untouched so the parser reports them in
/// context.
pub fn substitute_env(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    env_pattern()
        .replace_all(raw, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match lookup(name) {
                Some(value) => value,
                None => {
                    tracing::debug!(variable = %name, "unresolved config variable");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Looks up a variable by name.
pub type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves `$VAR` references in string values and remembers them.
pub struct Substitutions {
    lookup: EnvLookup,
    /// Resolved value to the text it was written as.
    templates: HashMap<String, String>,
}

impl Substitutions {
    pub fn new(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
            templates: HashMap::new(),
        }
    }

    /// Substitutions backed by the process environment.
    pub fn from_env() -> Self {
        Self::new(|name| std::env::var(name).ok())
    }

    /// Resolve references in one string value.
    pub fn substitute(&mut self, value: &str) -> String {
        let resolved = substitute_env(value, &self.lookup);
        if resolved != value {
            self.templates.insert(resolved.clone(), value.to_string());
        }
        resolved
    }

    /// The text `value` was written as, if it came from a substitution.
    pub fn template_of(&self, value: &str) -> Option<&str> {
        self.templates.get(value).map(String::as_str)
    }
}

impl Default for Substitutions {
    fn default() -> Self {
        Self::from_env()
    }
}

impl fmt::Debug for Substitutions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Substitutions")
            .field("references", &self.templates.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "EMULATOR_KEY" => Some("abc123".to_string()),
            "HOST" => Some("127.0.0.1".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_substitutes_both_forms() {
        let raw = r#"{"key": "$EMULATOR_KEY", "host": "${HOST}:3569"}"#;
        assert_eq!(
            substitute_env(raw, lookup),
            r#"{"key": "abc123", "host": "127.0.0.1:3569"}"#
        );
    }

    #[test]
    fn test_unknown_left_untouched() {
        assert_eq!(substitute_env("$MISSING and ${ALSO}", lookup), "$MISSING and ${ALSO}");
    }

    #[test]
    fn test_no_variables() {
        assert_eq!(substitute_env("plain", lookup), "plain");
    }

    #[test]
    fn test_substitutions_remember_references() {
        let mut vars = Substitutions::new(lookup);
        assert_eq!(vars.substitute("${HOST}:3569"), "127.0.0.1:3569");
        assert_eq!(vars.substitute("plain"), "plain");

        assert_eq!(vars.template_of("127.0.0.1:3569"), Some("${HOST}:3569"));
        assert_eq!(vars.template_of("plain"), None);
    }
}
