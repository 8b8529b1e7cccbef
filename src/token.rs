//! Random token generation
//!
//! Tokens are drawn from the alphanumeric alphabet using the thread-local
//! CSPRNG and may be split into dash-separated pieces for readability.

use std::fmt;
use std::str::FromStr;

use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Shortest token length accepted by the generator
pub const TOKEN_MIN_SIZE: i64 = 8;

/// Longest token length accepted by the generator
pub const TOKEN_MAX_SIZE: i64 = 64;

/// Requested token length: a fixed size or an inclusive `(min, max)` range
///
/// In JSON this is either an integer (`50`) or a two-element array (`[8, 64]`).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum TokenSize {
    Fixed(i64),
    Range(i64, i64),
}

impl TokenSize {
    fn bounds(self) -> (i64, i64) {
        match self {
            TokenSize::Fixed(size) => (size, size),
            TokenSize::Range(min, max) => (min, max),
        }
    }
}

impl Default for TokenSize {
    fn default() -> Self {
        TokenSize::Range(TOKEN_MIN_SIZE, TOKEN_MAX_SIZE)
    }
}

impl fmt::Display for TokenSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSize::Fixed(size) => write!(f, "{}", size),
            TokenSize::Range(min, max) => write!(f, "({}, {})", min, max),
        }
    }
}

/// Parses `"50"` or `"8,64"` (as found in environment variables)
impl FromStr for TokenSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| Error::validation(format!("Token size must be an integer, got {:?}.", part)))
        };

        let parts: Vec<&str> = s.split(',').collect();
        match parts.as_slice() {
            [size] => Ok(TokenSize::Fixed(parse(size)?)),
            [min, max] => Ok(TokenSize::Range(parse(min)?, parse(max)?)),
            _ => Err(Error::validation("Token size must contain one or two values.")),
        }
    }
}

/// Validated generator parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpec {
    size: TokenSize,
    min: usize,
    max: usize,
    dashed_piece_size: usize,
}

impl TokenSpec {
    /// Validates a size and dash piece size.
    ///
    /// Both bounds must lie in `[TOKEN_MIN_SIZE, TOKEN_MAX_SIZE]` with
    /// `min <= max`; the piece size must not be negative (`0` disables dashes).
    pub fn new(size: TokenSize, dashed_piece_size: i64) -> Result<Self> {
        let (min, max) = size.bounds();

        for value in [min, max] {
            if !(TOKEN_MIN_SIZE..=TOKEN_MAX_SIZE).contains(&value) {
                return Err(Error::validation(format!(
                    "Token size must contain values between {} and {}.",
                    TOKEN_MIN_SIZE, TOKEN_MAX_SIZE
                )));
            }
        }

        if min > max {
            return Err(Error::validation(
                "Token size has incorrect values: first value must be less than second one.",
            ));
        }

        if dashed_piece_size < 0 {
            return Err(Error::validation(
                "Dashed piece size must be greater or equal 0.",
            ));
        }

        Ok(Self {
            size,
            min: min as usize,
            max: max as usize,
            dashed_piece_size: dashed_piece_size as usize,
        })
    }

    pub fn size(&self) -> TokenSize {
        self.size
    }

    pub fn dashed_piece_size(&self) -> usize {
        self.dashed_piece_size
    }
}

/// Source of candidate tokens for the lifecycle manager
pub trait TokenSource: Send + Sync {
    fn next_token(&self, spec: &TokenSpec) -> String;
}

/// Default token source backed by `rand::rng()`
///
/// The thread-local generator is a CSPRNG seeded from the OS, so a uniform
/// length pick needs no re-seeding between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn next_token(&self, spec: &TokenSpec) -> String {
        let mut rng = rand::rng();

        let length = if spec.min == spec.max {
            spec.min
        } else {
            rng.random_range(spec.min..=spec.max)
        };

        let token: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();

        split_with_dashes(token, length, spec.dashed_piece_size)
    }
}

/// Generates a token with validated parameters
pub fn generate(size: TokenSize, dashed_piece_size: i64) -> Result<String> {
    let spec = TokenSpec::new(size, dashed_piece_size)?;
    Ok(RandomTokens.next_token(&spec))
}

/// Inserts a dash every `piece` characters, then cuts the result back to
/// `length` and strips trailing dashes.
///
/// The dashes count towards `length`, so a dashed token carries fewer random
/// characters than an undashed one of the same nominal size.
fn split_with_dashes(mut token: String, length: usize, piece: usize) -> String {
    if piece == 0 {
        return token;
    }

    let mut n = piece;
    while n < token.len() {
        token.insert(n, '-');
        n += piece + 1;
    }

    token.truncate(length);
    let trimmed = token.trim_end_matches('-').len();
    token.truncate(trimmed);
    token
}
