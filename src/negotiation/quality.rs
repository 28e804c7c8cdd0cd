//! RFC 7231 quality values (`q=`).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced when a `q` parameter cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QualityError {
    #[error("quality value is not a number: {0:?}")]
    NotANumber(String),

    #[error("quality value {0:?} is outside the range 0..=1")]
    OutOfRange(String),
}

/// A preference weight in `[0, 1]`, stored in thousandths.
///
/// RFC 7231 allows at most three decimal digits, so every legal `q` value is
/// represented exactly and formats back to the same number.
///
/// # Examples
///
/// ```
/// use conneg::negotiation::Quality;
///
/// let q: Quality = "0.8".parse().unwrap();
/// assert_eq!(q.millis(), 800);
/// assert_eq!(q.to_string(), "0.8");
/// assert_eq!(Quality::MAX.to_string(), "1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u16);

impl Quality {
    /// `q=0`, "not acceptable".
    pub const MIN: Quality = Quality(0);

    /// `q=1`, the implicit weight of a token without a `q` parameter.
    pub const MAX: Quality = Quality(1000);

    /// Builds a quality from thousandths, clamping to `1000`.
    pub fn from_millis(millis: u16) -> Self {
        Self(millis.min(1000))
    }

    /// Returns the weight in thousandths (`0..=1000`).
    pub fn millis(self) -> u16 {
        self.0
    }

    /// Returns the weight as a float in `[0, 1]`.
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 1000.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::MAX
    }
}

impl FromStr for Quality {
    type Err = QualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| QualityError::NotANumber(trimmed.to_owned()))?;

        if !(0.0..=1.0).contains(&value) {
            return Err(QualityError::OutOfRange(trimmed.to_owned()));
        }

        Ok(Self((value * 1000.0).round() as u16))
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => f.write_str("0"),
            1000 => f.write_str("1"),
            millis => {
                let digits = format!("{millis:03}");
                write!(f, "0.{}", digits.trim_end_matches('0'))
            }
        }
    }
}
