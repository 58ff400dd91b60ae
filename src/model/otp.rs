use std::fmt::Display;

use rand::{
    distributions::{Distribution, Uniform},
    Rng,
};
use serde::{Deserialize, Serialize};

/// Shortest randomly generated code.
pub const MIN_LENGTH: usize = 5;
/// Longest randomly generated code.
pub const MAX_LENGTH: usize = 8;
/// The fixed code handed out when OTP delivery is disabled.
pub const BYPASS_CODE: &str = "0000";

/// A one-time-password code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(String);

impl Code {
    /// Generate a random code of between [`MIN_LENGTH`] and [`MAX_LENGTH`]
    /// digits. Zero is never used, so the code has no leading zeros to lose.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let length = rng.gen_range(MIN_LENGTH..=MAX_LENGTH);
        let digit_dist = Uniform::from(1..=9_u32);
        let code = (0..length)
            .map(|_| char::from_digit(digit_dist.sample(&mut rng), 10).unwrap()) // Always a single digit.
            .collect();
        Self(code)
    }

    /// The bypass code.
    pub fn bypass() -> Self {
        Self(BYPASS_CODE.to_string())
    }

    /// Does the submitted string match this code exactly?
    pub fn matches(&self, submitted: &str) -> bool {
        self.0 == submitted
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Code {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
