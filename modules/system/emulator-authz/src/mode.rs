//! Security posture of a permission client.

use serde::{Deserialize, Deserializer, Serialize};

/// How permission checks are enforced.
///
/// | mode         | evaluator reachable | evaluator unreachable | bad request |
/// |--------------|---------------------|-----------------------|-------------|
/// | `off`        | not checked         | not checked           | not checked |
/// | `permissive` | enforce             | allow (fail-open)     | deny        |
/// | `strict`     | enforce             | deny (fail-closed)    | deny        |
///
/// Callers skip checks entirely in `off`. A client driven in `off` anyway
/// behaves like `strict`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum AuthMode {
    /// IAM checks disabled (legacy behavior).
    #[default]
    Off,
    /// Enforce permissions, allow when the evaluator is unreachable.
    /// Meant for local development where IAM may not be running.
    Permissive,
    /// Enforce permissions, deny when the evaluator is unreachable.
    /// Recommended for CI.
    Strict,
}

impl AuthMode {
    /// Parse a mode leniently: case-insensitive, surrounding whitespace
    /// ignored, anything unrecognized is [`AuthMode::Off`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("permissive") {
            Self::Permissive
        } else if s.eq_ignore_ascii_case("strict") {
            Self::Strict
        } else {
            Self::Off
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Permissive => "permissive",
            Self::Strict => "strict",
        }
    }

    /// `true` for `permissive` and `strict`.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }

    /// `true` when connectivity failures are allowed through.
    #[must_use]
    pub const fn fails_open(self) -> bool {
        matches!(self, Self::Permissive)
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AuthMode {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for AuthMode {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

/// Accepts any scalar: `IAM_MODE=1` or `IAM_MODE=true` is an unrecognized
/// mode, not a type error.
impl<'de> Deserialize<'de> for AuthMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        crate::scalar::string(deserializer).map(|s| Self::parse(&s))
    }
}

impl From<AuthMode> for String {
    fn from(mode: AuthMode) -> Self {
        mode.as_str().to_owned()
    }
}
