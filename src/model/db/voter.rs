use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::{api::sms::Sms, mongodb::Id, otp::Code};

/// Maximum number of OTP deliveries a voter may request.
pub const MAX_OTP_SENDS: u32 = 3;

/// Core voter data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    /// Display name, used to address the voter in messages.
    pub name: String,
    /// Where OTP codes are delivered.
    pub phone: Sms,
    /// The most recently issued OTP, if any.
    pub otp: Option<Code>,
    /// How many times an OTP has been successfully delivered.
    pub otp_sent: u32,
    pub verified: bool,
    /// Once set, the voter can never cast another ballot.
    pub voted: bool,
}

impl VoterCore {
    /// Create a fresh, unverified voter.
    pub fn new(name: impl Into<String>, phone: Sms) -> Self {
        Self {
            name: name.into(),
            phone,
            otp: None,
            otp_sent: 0,
            verified: false,
            voted: false,
        }
    }

    /// Has the voter used up all of their OTP deliveries?
    pub fn otp_exhausted(&self) -> bool {
        self.otp_sent >= MAX_OTP_SENDS
    }

    /// Does the voter still need to pass OTP verification?
    pub fn needs_verification(&self) -> bool {
        self.otp.is_none() || !self.verified
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl VoterCore {
        pub fn example() -> Self {
            Self::new("Ada", Sms::example())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_voter_needs_verification() {
        let voter = VoterCore::example();
        assert!(voter.needs_verification());
        assert!(!voter.otp_exhausted());
        assert!(!voter.voted);
    }

    #[test]
    fn verification_requires_code_and_flag() {
        let mut voter = VoterCore::example();
        voter.verified = true;
        assert!(voter.needs_verification());
        voter.otp = Some(Code::bypass());
        assert!(!voter.needs_verification());
    }

    #[test]
    fn three_sends_exhaust_the_quota() {
        let mut voter = VoterCore::example();
        voter.otp_sent = MAX_OTP_SENDS;
        assert!(voter.otp_exhausted());
    }
}
