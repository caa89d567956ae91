//! Subscriber identity codec - converts between the textual IMSI form and
//! the compact integer form carried in rule metadata.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PREFIX: &str = "IMSI";
const IMSI_DIGITS: usize = 15;

// The compact encoding has two bits for the leading-zero count, which caps
// the supported id space at three leading zeros.
const MAX_LEADING_ZEROS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("subscriber id {0:?} does not start with {PREFIX}")]
    MissingPrefix(String),
    #[error("subscriber id {0:?} is not {PREFIX} followed by {IMSI_DIGITS} decimal digits")]
    BadDigitString(String),
    #[error("subscriber id {0:?} has more than {MAX_LEADING_ZEROS} leading zeros")]
    TooManyLeadingZeros(String),
    #[error("compact id {0:#x} does not have the marker bit set")]
    MarkerBitClear(u64),
    #[error("compact id {0:#x} decodes to {1} digits, not {IMSI_DIGITS}")]
    BadDigitCount(u64, usize),
}

/// Textual subscriber identity, e.g. "IMSI001010000000001".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// The digit string without the IMSI prefix.
    pub fn digits(&self) -> &str {
        &self.0[PREFIX.len()..]
    }
}

impl FromStr for SubscriberId {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, FormatError> {
        let Some(digits) = s.strip_prefix(PREFIX) else {
            return Err(FormatError::MissingPrefix(s.to_string()));
        };
        if digits.len() != IMSI_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FormatError::BadDigitString(s.to_string()));
        }
        if leading_zeros(digits) > MAX_LEADING_ZEROS {
            return Err(FormatError::TooManyLeadingZeros(s.to_string()));
        }
        Ok(SubscriberId(s.to_string()))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn leading_zeros(digits: &str) -> usize {
    digits.bytes().take_while(|b| *b == b'0').count()
}

/// Compact integer form of a subscriber id, carried opaquely in the
/// metadata field of a forwarding rule.
///
/// From the least significant bit up: bit 0 is always set (so the value is
/// never confused with unset metadata), bits 1-2 hold the leading-zero
/// count of the digit string, and the remaining bits hold the digit string
/// as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompactSubscriberId(u64);

impl CompactSubscriberId {
    pub fn encode(id: &SubscriberId) -> Self {
        let digits = id.digits();
        let mut value = 0u64;
        for b in digits.bytes() {
            value = value * 10 + u64::from(b - b'0');
        }
        CompactSubscriberId(value << 3 | (leading_zeros(digits) as u64) << 1 | 0x1)
    }

    pub fn decode(self) -> Result<SubscriberId, FormatError> {
        if self.0 & 0x1 == 0 {
            return Err(FormatError::MarkerBitClear(self.0));
        }
        let prefix_len = (self.0 >> 1) & 0x3;
        let digits = format!("{}{}", "0".repeat(prefix_len as usize), self.0 >> 3);
        if digits.len() != IMSI_DIGITS {
            return Err(FormatError::BadDigitCount(self.0, digits.len()));
        }
        Ok(SubscriberId(format!("{PREFIX}{digits}")))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for CompactSubscriberId {
    fn from(value: u64) -> Self {
        CompactSubscriberId(value)
    }
}
