//! One-time-password verification of voters.

use rocket::http::Status;
use thiserror::Error;

use crate::error::Error;
use crate::model::{
    db::voter::{Voter, MAX_OTP_SENDS},
    otp::Code,
    store::RecordStore,
};

use super::{
    locks::VoterLocks,
    sms::{SendError, SmsGateway},
};

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("You have requested OTP three times. Please use the last one sent.")]
    OtpLimitExceeded,
    #[error("Failed to send OTP. Try again.")]
    OtpDeliveryFailed(#[source] SendError),
    #[error("Invalid OTP")]
    InvalidOtp,
    #[error(transparent)]
    Store(#[from] Error),
}

impl From<OtpError> for Error {
    fn from(err: OtpError) -> Self {
        let status = match err {
            OtpError::Store(err) => return err,
            OtpError::OtpLimitExceeded => Status::TooManyRequests,
            OtpError::OtpDeliveryFailed(_) => Status::BadGateway,
            OtpError::InvalidOtp => Status::Unauthorized,
        };
        Error::Status(status, err.to_string())
    }
}

/// What happened when a voter asked for a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpOutcome {
    /// A code was delivered by SMS.
    Sent,
    /// Codes are not required; the voter was verified on the spot.
    Bypassed,
}

impl OtpOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Sent => "New OTP sent to your phone.",
            Self::Bypassed => "OTP bypassed (OTP not required)",
        }
    }
}

/// Issues and checks voters' one-time passwords.
///
/// Every operation on a single voter runs under that voter's lock and starts
/// from a fresh read of the stored voter, so overlapping requests cannot get
/// past the send limit or overwrite each other's codes.
pub struct OtpService<'a> {
    store: &'a dyn RecordStore,
    gateway: &'a dyn SmsGateway,
    locks: &'a VoterLocks,
    /// Whether codes must actually be delivered and entered. When false,
    /// everyone is verified with the fixed bypass code.
    required: bool,
}

impl<'a> OtpService<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        gateway: &'a dyn SmsGateway,
        locks: &'a VoterLocks,
        required: bool,
    ) -> Self {
        Self {
            store,
            gateway,
            locks,
            required,
        }
    }

    pub fn required(&self) -> bool {
        self.required
    }

    /// Send the voter a code, reusing any code they were already sent.
    pub async fn request(&self, voter: &mut Voter) -> Result<OtpOutcome, OtpError> {
        let _guard = self.locks.lock(voter.id).await;
        self.reload(voter).await?;

        if !self.required {
            self.verify_with_bypass(voter).await?;
            return Ok(OtpOutcome::Bypassed);
        }
        if voter.otp_exhausted() {
            return Err(OtpError::OtpLimitExceeded);
        }

        let code = voter.otp.get_or_insert_with(Code::random).clone();
        self.store.save_voter_otp(voter).await?;

        let message = format!("Dear {}, your OTP is {code}", voter.name);
        self.gateway
            .send(&voter.phone, &message)
            .await
            .map_err(|e| {
                warn!("Failed to deliver OTP to voter {}: {e}", voter.id);
                OtpError::OtpDeliveryFailed(e)
            })?;

        voter.otp_sent += 1;
        self.store.save_voter_otp(voter).await?;
        info!(
            "Sent OTP {} of {MAX_OTP_SENDS} to voter {}",
            voter.otp_sent, voter.id
        );
        Ok(OtpOutcome::Sent)
    }

    /// Check a submitted code, verifying the voter if it matches.
    pub async fn confirm(&self, voter: &mut Voter, submitted: &str) -> Result<(), OtpError> {
        let _guard = self.locks.lock(voter.id).await;
        self.reload(voter).await?;

        let matches = voter
            .otp
            .as_ref()
            .map_or(false, |code| code.matches(submitted));
        let bypassed = !self.required && Code::bypass().matches(submitted);
        if !(matches || bypassed) {
            return Err(OtpError::InvalidOtp);
        }
        voter.verified = true;
        self.store.save_voter_otp(voter).await?;
        debug!("Voter {} verified", voter.id);
        Ok(())
    }

    /// Verify the voter with the bypass code, without sending anything.
    pub async fn auto_verify(&self, voter: &mut Voter) -> Result<(), Error> {
        let _guard = self.locks.lock(voter.id).await;
        self.reload(voter).await?;
        self.verify_with_bypass(voter).await
    }

    async fn verify_with_bypass(&self, voter: &mut Voter) -> Result<(), Error> {
        voter.otp = Some(Code::bypass());
        voter.verified = true;
        self.store.save_voter_otp(voter).await
    }

    /// Replace the caller's copy of the voter with what is stored now.
    async fn reload(&self, voter: &mut Voter) -> Result<(), Error> {
        *voter = self
            .store
            .find_voter(voter.id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Voter with ID '{}'", voter.id)))?;
        Ok(())
    }

    /// Verify every voter who has not yet been issued a code.
    pub async fn bypass_all(&self) -> Result<u64, Error> {
        let changed = self.store.verify_unverified(&Code::bypass()).await?;
        info!("OTP bypassed for {changed} voters");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{api::sms::Sms, db::voter::NewVoter, store::MemoryStore};
    use crate::voting::sms::RecordingGateway;

    use super::*;

    async fn voter(store: &MemoryStore) -> Voter {
        store.insert_voter(NewVoter::example()).await.unwrap()
    }

    #[rocket::async_test]
    async fn request_sends_and_counts() {
        let store = MemoryStore::new();
        let gateway = RecordingGateway::default();
        let locks = VoterLocks::default();
        let mut voter = voter(&store).await;
        let otp = OtpService::new(&store, &gateway, &locks, true);

        assert_eq!(otp.request(&mut voter).await.unwrap(), OtpOutcome::Sent);

        let code = voter.otp.clone().unwrap();
        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, voter.phone.to_string());
        assert_eq!(sent[0].1, format!("Dear Ada, your OTP is {code}"));
        let stored = store.find_voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.otp_sent, 1);
        assert_eq!(stored.otp, Some(code));
        assert!(!stored.verified);
    }

    #[rocket::async_test]
    async fn resends_reuse_the_code_until_the_limit() {
        let store = MemoryStore::new();
        let gateway = RecordingGateway::default();
        let locks = VoterLocks::default();
        let mut voter = voter(&store).await;
        let otp = OtpService::new(&store, &gateway, &locks, true);

        for _ in 0..MAX_OTP_SENDS {
            otp.request(&mut voter).await.unwrap();
        }
        let err = otp.request(&mut voter).await.unwrap_err();

        assert!(matches!(err, OtpError::OtpLimitExceeded));
        let sent = gateway.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|(_, message)| *message == sent[0].1));
        let stored = store.find_voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.otp_sent, 3);
    }

    /// Hands control back to the runtime before every send, so overlapping
    /// requests get a chance to interleave.
    #[derive(Default)]
    struct SlowGateway(RecordingGateway);

    #[rocket::async_trait]
    impl SmsGateway for SlowGateway {
        async fn send(&self, recipient: &Sms, message: &str) -> Result<(), SendError> {
            rocket::tokio::task::yield_now().await;
            self.0.send(recipient, message).await
        }
    }

    #[rocket::async_test]
    async fn overlapping_requests_respect_the_limit() {
        let store = MemoryStore::new();
        let gateway = SlowGateway::default();
        let locks = VoterLocks::default();
        let voter = voter(&store).await;
        let otp = OtpService::new(&store, &gateway, &locks, true);
        let mut copies = [voter.clone(), voter.clone(), voter.clone(), voter];

        let [a, b, c, d] = &mut copies;
        let (a, b, c, d) = rocket::tokio::join!(
            otp.request(a),
            otp.request(b),
            otp.request(c),
            otp.request(d),
        );

        let outcomes = [a, b, c, d];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 3);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(OtpError::OtpLimitExceeded))));

        let stored = store.find_voter(copies[0].id).await.unwrap().unwrap();
        assert_eq!(stored.otp_sent, MAX_OTP_SENDS);
        let code = stored.otp.as_ref().unwrap();
        let sent = gateway.0.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent
            .iter()
            .all(|(_, message)| message.ends_with(&format!("your OTP is {code}"))));
    }

    #[rocket::async_test]
    async fn failed_delivery_does_not_count() {
        let store = MemoryStore::new();
        let gateway = RecordingGateway::default();
        let locks = VoterLocks::default();
        gateway.set_failing(true);
        let mut voter = voter(&store).await;
        let otp = OtpService::new(&store, &gateway, &locks, true);

        let err = otp.request(&mut voter).await.unwrap_err();

        assert!(matches!(err, OtpError::OtpDeliveryFailed(_)));
        let stored = store.find_voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.otp_sent, 0);
        // The code is kept so a retry sends the same one.
        assert!(stored.otp.is_some());

        gateway.set_failing(false);
        otp.request(&mut voter).await.unwrap();
        assert_eq!(voter.otp, stored.otp);
        assert_eq!(voter.otp_sent, 1);
    }

    #[rocket::async_test]
    async fn request_without_otp_verifies_immediately() {
        let store = MemoryStore::new();
        let gateway = RecordingGateway::default();
        let locks = VoterLocks::default();
        let mut voter = voter(&store).await;
        let otp = OtpService::new(&store, &gateway, &locks, false);

        assert_eq!(otp.request(&mut voter).await.unwrap(), OtpOutcome::Bypassed);

        assert!(gateway.sent().is_empty());
        let stored = store.find_voter(voter.id).await.unwrap().unwrap();
        assert_eq!(stored.otp, Some(Code::bypass()));
        assert!(stored.verified);
        assert_eq!(stored.otp_sent, 0);
    }

    #[rocket::async_test]
    async fn confirm_checks_the_code() {
        let store = MemoryStore::new();
        let gateway = RecordingGateway::default();
        let locks = VoterLocks::default();
        let mut voter = voter(&store).await;
        let otp = OtpService::new(&store, &gateway, &locks, true);
        otp.request(&mut voter).await.unwrap();
        let code = voter.otp.clone().unwrap();

        assert!(matches!(
            otp.confirm(&mut voter, "0000").await,
            Err(OtpError::InvalidOtp)
        ));
        assert!(!store.find_voter(voter.id).await.unwrap().unwrap().verified);

        otp.confirm(&mut voter, code.as_str()).await.unwrap();
        assert!(store.find_voter(voter.id).await.unwrap().unwrap().verified);
    }

    #[rocket::async_test]
    async fn confirm_without_any_code_fails() {
        let store = MemoryStore::new();
        let gateway = RecordingGateway::default();
        let locks = VoterLocks::default();
        let mut voter = voter(&store).await;
        let otp = OtpService::new(&store, &gateway, &locks, true);

        assert!(matches!(
            otp.confirm(&mut voter, "").await,
            Err(OtpError::InvalidOtp)
        ));
    }

    #[rocket::async_test]
    async fn bypass_code_works_whenever_otp_is_off() {
        let store = MemoryStore::new();
        let gateway = RecordingGateway::default();
        let locks = VoterLocks::default();
        let mut voter = voter(&store).await;
        voter.otp = Some(Code::random());
        store.save_voter_otp(&voter).await.unwrap();
        let otp = OtpService::new(&store, &gateway, &locks, false);

        otp.confirm(&mut voter, "0000").await.unwrap();

        assert!(store.find_voter(voter.id).await.unwrap().unwrap().verified);
    }

    #[rocket::async_test]
    async fn bypass_all_verifies_outstanding_voters() {
        let store = MemoryStore::new();
        let gateway = RecordingGateway::default();
        let locks = VoterLocks::default();
        let fresh = voter(&store).await;
        let mut pending = voter(&store).await;
        let otp = OtpService::new(&store, &gateway, &locks, true);
        otp.request(&mut pending).await.unwrap();

        assert_eq!(otp.bypass_all().await.unwrap(), 1);

        let fresh = store.find_voter(fresh.id).await.unwrap().unwrap();
        assert!(fresh.verified);
        assert_eq!(fresh.otp, Some(Code::bypass()));
        assert!(!store.find_voter(pending.id).await.unwrap().unwrap().verified);
    }

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(
            Error::from(OtpError::OtpLimitExceeded).status(),
            Status::TooManyRequests
        );
        assert_eq!(Error::from(OtpError::InvalidOtp).status(), Status::Unauthorized);
        assert_eq!(
            Error::from(OtpError::OtpDeliveryFailed(SendError::MissingCredentials)).status(),
            Status::BadGateway
        );
    }
}
