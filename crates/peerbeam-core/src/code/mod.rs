//! Session code generation and validation.
//!
//! A session code is the only thing two peers share out of band. It is a
//! 6-digit numeric string (`000000` - `999999`), chosen by the rendezvous
//! store when a sender creates a session.
//!
//! ## Example
//!
//! ```rust,ignore
//! use peerbeam_core::code::{CodeGenerator, CodeSource, SessionCode};
//!
//! let mut generator = CodeGenerator::new();
//! let code = generator.next_code();
//! println!("Generated code: {}", code);
//!
//! let code = SessionCode::parse(" 482913 ")?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Length of a session code
pub const CODE_LENGTH: usize = 6;

/// How many codes the store tries before giving up on a collision streak.
pub const MAX_CODE_ATTEMPTS: usize = 10;

/// A validated session code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode {
    code: String,
}

impl SessionCode {
    /// Parse and validate a session code from a string.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not exactly six ASCII digits.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim();

        if normalized.len() != CODE_LENGTH {
            return Err(Error::InvalidCodeFormat(format!(
                "code must be {} digits, got {}",
                CODE_LENGTH,
                normalized.len()
            )));
        }

        if let Some(c) = normalized.chars().find(|c| !c.is_ascii_digit()) {
            return Err(Error::InvalidCodeFormat(format!(
                "invalid character '{c}' in code"
            )));
        }

        Ok(Self {
            code: normalized.to_string(),
        })
    }

    /// Build a code from a number in `0..1_000_000`, zero padded.
    #[must_use]
    pub fn from_number(n: u32) -> Self {
        Self {
            code: format!("{:06}", n % 1_000_000),
        }
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.code
    }
}

impl std::fmt::Display for SessionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.code
    }
}

impl std::str::FromStr for SessionCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Source of candidate codes for new sessions.
///
/// The rendezvous store asks its source for codes until one is free.
pub trait CodeSource: Send {
    /// Produce the next candidate code.
    fn next_code(&mut self) -> SessionCode;
}

/// Random generator for session codes.
#[derive(Debug, Default)]
pub struct CodeGenerator;

impl CodeGenerator {
    /// Create a new code generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CodeSource for CodeGenerator {
    fn next_code(&mut self) -> SessionCode {
        use rand::Rng;

        SessionCode::from_number(rand::thread_rng().gen_range(0..1_000_000))
    }
}
