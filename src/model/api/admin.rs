use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::db::admin::NewAdmin;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Raw admin credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl TryFrom<AdminCredentials> for NewAdmin {
    type Error = ();

    /// Convert [`AdminCredentials`] to a new admin by hashing the password.
    /// This enforces that the username is non-empty, and the password meets minimum length.
    fn try_from(cred: AdminCredentials) -> Result<Self, Self::Error> {
        if cred.username.is_empty() || cred.password.len() < MIN_PASSWORD_LENGTH {
            return Err(());
        }

        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash = argon2::hash_encoded(cred.password.as_bytes(), &salt, &Config::default())
            .map_err(|_| ())?;
        Ok(Self {
            username: cred.username,
            password_hash,
        })
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    impl AdminCredentials {
        pub fn example() -> Self {
            Self {
                username: "returning-officer".into(),
                password: "countevery1".into(),
            }
        }

        pub fn empty() -> Self {
            Self {
                username: "".into(),
                password: "".into(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let admin = NewAdmin::try_from(AdminCredentials::example()).unwrap();
        assert!(admin.verify_password("countevery1"));
        assert!(!admin.verify_password("countevery2"));
    }

    #[test]
    fn short_credentials_are_rejected() {
        assert!(NewAdmin::try_from(AdminCredentials::empty()).is_err());
        let short = AdminCredentials {
            username: "x".into(),
            password: "short".into(),
        };
        assert!(NewAdmin::try_from(short).is_err());
    }
}
