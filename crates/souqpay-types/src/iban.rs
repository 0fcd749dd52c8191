//! IBAN parsing and MOD-97 checksum validation.
//!
//! An [`Iban`] can only be constructed through [`Iban::parse`], so every
//! value in the system has already passed structural and checksum
//! validation. `Display` and `Debug` redact the account body — only the
//! first and last four characters ever reach logs. Use [`Iban::as_str`]
//! when handing the full value to the bank-transfer provider.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, SouqpayError};

/// Expected total IBAN length per country code. Countries outside this
/// table are accepted when within the ISO 13616 bounds and the checksum
/// verifies.
const COUNTRY_LENGTHS: &[(&str, usize)] = &[
    ("AE", 23),
    ("BH", 22),
    ("DE", 22),
    ("EG", 29),
    ("FR", 27),
    ("GB", 22),
    ("JO", 30),
    ("KW", 30),
    ("OM", 23),
    ("QA", 29),
    ("SA", 24),
];

/// Minimum / maximum IBAN length per ISO 13616.
const MIN_LEN: usize = 15;
const MAX_LEN: usize = 34;

/// A structurally valid, checksum-verified IBAN.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Iban(String);

impl Iban {
    /// Parse and validate an IBAN.
    ///
    /// Accepts mixed case and embedded spaces. Validation steps:
    /// 1. Normalize (uppercase, strip spaces)
    /// 2. Structure: two letters, two digits, alphanumeric body
    /// 3. Length: exact per-country length where known, ISO bounds otherwise
    /// 4. MOD-97 checksum — remainder must equal 1
    ///
    /// # Errors
    /// Returns [`SouqpayError::InvalidIban`] describing the first failed step.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.len() < MIN_LEN || normalized.len() > MAX_LEN {
            return Err(SouqpayError::InvalidIban {
                reason: format!("length {} outside {MIN_LEN}..={MAX_LEN}", normalized.len()),
            });
        }

        let bytes = normalized.as_bytes();
        if !bytes[0].is_ascii_uppercase() || !bytes[1].is_ascii_uppercase() {
            return Err(SouqpayError::InvalidIban {
                reason: "country code must be two letters".into(),
            });
        }
        if !bytes[2].is_ascii_digit() || !bytes[3].is_ascii_digit() {
            return Err(SouqpayError::InvalidIban {
                reason: "check digits must be numeric".into(),
            });
        }
        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SouqpayError::InvalidIban {
                reason: "body must be alphanumeric".into(),
            });
        }

        let country = &normalized[..2];
        if let Some((_, expected)) = COUNTRY_LENGTHS.iter().find(|(cc, _)| *cc == country) {
            if normalized.len() != *expected {
                return Err(SouqpayError::InvalidIban {
                    reason: format!(
                        "{country} IBAN must be {expected} characters, got {}",
                        normalized.len()
                    ),
                });
            }
        }

        if mod97(&normalized) != 1 {
            return Err(SouqpayError::InvalidIban {
                reason: "MOD-97 checksum failed".into(),
            });
        }

        Ok(Self(normalized))
    }

    /// The full normalized IBAN. Only for provider calls — never log this.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two-letter country code.
    #[must_use]
    pub fn country(&self) -> &str {
        &self.0[..2]
    }

    /// Redacted rendition: first four and last four characters only.
    #[must_use]
    pub fn redacted(&self) -> String {
        format!("{}****{}", &self.0[..4], &self.0[self.0.len() - 4..])
    }
}

/// MOD-97 remainder of the rearranged IBAN (ISO 7064).
///
/// The first four characters are moved to the end, letters map to two-digit
/// numbers (A=10 … Z=35), and the remainder is computed iteratively over
/// windows of at most nine digits so the intermediate value always fits.
fn mod97(iban: &str) -> u32 {
    let rearranged = format!("{}{}", &iban[4..], &iban[..4]);
    let mut digits = String::with_capacity(rearranged.len() * 2);
    for c in rearranged.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            // A=10 … Z=35
            let val = u32::from(c) - u32::from('A') + 10;
            digits.push_str(&val.to_string());
        }
    }

    let mut remainder: u64 = 0;
    let mut rest = digits.as_str();
    while !rest.is_empty() {
        let prefix = remainder.to_string();
        let take = 9_usize.saturating_sub(prefix.len()).max(1).min(rest.len());
        let window = format!("{prefix}{}", &rest[..take]);
        // Window is at most 9 digits plus a remainder < 97, always fits u64.
        remainder = window.parse::<u64>().expect("window contains only digits") % 97;
        rest = &rest[take..];
    }
    #[allow(clippy::cast_possible_truncation)]
    {
        remainder as u32
    }
}

impl fmt::Display for Iban {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl fmt::Debug for Iban {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iban({})", self.redacted())
    }
}

impl TryFrom<String> for Iban {
    type Error = SouqpayError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Iban> for String {
    fn from(iban: Iban) -> Self {
        iban.0
    }
}
