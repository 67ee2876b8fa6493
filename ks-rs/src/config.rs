//! Compiler and runtime options.
//!
//! Options can be built in code or loaded from a small settings file:
//!
//! | Line | Action |
//! |------|--------|
//! | `name = value` or `name value` | set an option |
//! | Lines starting with `;`, `#` or `//` | comment, ignored |
//!
//! Unknown names and malformed values are reported as [`ConfigError`]s and
//! otherwise ignored, so a file written for a newer version still loads.

use std::path::Path;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading options.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Settings shared by the compiler and every script it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Maximum nesting of user-function calls before execution fails.
    pub max_call_depth: usize,
    /// Reset user terms to their compile-time values before each execution.
    pub reset_terms: bool,
    /// Tolerance used when comparing `float` and `double` values.
    pub float_epsilon: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            reset_terms: true,
            float_epsilon: 0.005,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an options string.
    ///
    /// Returns the options (defaults for anything not set) and a list of any
    /// errors on individual lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut options = Options::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty()
                || line.starts_with(';')
                || line.starts_with('#')
                || line.starts_with("//")
            {
                continue;
            }

            let (name, value) = match line.split_once('=') {
                Some((n, v)) => (n.trim(), v.trim()),
                None => line
                    .split_once(|c: char| c.is_ascii_whitespace())
                    .map(|(n, v)| (n, v.trim()))
                    .unwrap_or((line, "")),
            };

            if let Err(message) = options.set(name, value) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (options, errors)
    }

    /// Read and parse an options file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Set one option by name from its textual value.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            "max_call_depth" => {
                self.max_call_depth = value
                    .parse()
                    .map_err(|_| format!("max_call_depth: expected a count, got '{value}'"))?;
            }
            "reset_terms" => {
                self.reset_terms = parse_bool(value)
                    .ok_or_else(|| format!("reset_terms: expected a boolean, got '{value}'"))?;
            }
            "float_epsilon" => {
                let eps: f64 = value
                    .parse()
                    .map_err(|_| format!("float_epsilon: expected a number, got '{value}'"))?;
                if !(eps >= 0.0 && eps.is_finite()) {
                    return Err(format!("float_epsilon: must be a non-negative number, got '{value}'"));
                }
                self.float_epsilon = eps;
            }
            _ => return Err(format!("unknown option '{name}'")),
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Some(true),
        "0" | "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = Options::default();
        assert_eq!(o.max_call_depth, 256);
        assert!(o.reset_terms);
        assert!((o.float_epsilon - 0.005).abs() < 1e-12);
    }

    #[test]
    fn equals_syntax() {
        let (o, errs) = Options::load_str("max_call_depth = 32");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(o.max_call_depth, 32);
    }

    #[test]
    fn space_syntax() {
        let (o, errs) = Options::load_str("reset_terms off");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(!o.reset_terms);
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let src = "; comment\n# another\n// third\n\nfloat_epsilon=0.01\n";
        let (o, errs) = Options::load_str(src);
        assert!(errs.is_empty(), "{errs:?}");
        assert!((o.float_epsilon - 0.01).abs() < 1e-12);
    }

    #[test]
    fn bad_lines_reported_and_skipped() {
        let src = "max_call_depth = lots\nbogus = 1\nreset_terms = false";
        let (o, errs) = Options::load_str(src);
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[0].line, 1);
        assert_eq!(errs[1].line, 2);
        assert!(errs[1].message.contains("bogus"));
        assert_eq!(o.max_call_depth, 256);
        assert!(!o.reset_terms);
    }

    #[test]
    fn negative_epsilon_rejected() {
        let (o, errs) = Options::load_str("float_epsilon = -1");
        assert_eq!(errs.len(), 1);
        assert!((o.float_epsilon - 0.005).abs() < 1e-12);
    }

    #[test]
    fn load_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_call_depth = 8").unwrap();
        let (o, errs) = Options::load_file(file.path()).unwrap();
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(o.max_call_depth, 8);
    }
}
