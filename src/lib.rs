#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, SmsFairing, StoreFairing};
use crate::logging::LoggerFairing;
use crate::model::store::Store;
use crate::voting::{
    locks::{RenumberLock, VoterLocks},
    sms::Notifier,
};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod voting;

/// Build the server from `Rocket.toml` and `ROCKET_*` environment variables.
pub fn build() -> Rocket<Build> {
    with_shared_state(rocket::build())
        .attach(StoreFairing)
        .attach(SmsFairing)
}

/// Build the server on top of an already constructed store and SMS gateway.
pub fn rocket_for_store_and_notifier(
    rocket: Rocket<Build>,
    store: Store,
    notifier: Notifier,
) -> Rocket<Build> {
    with_shared_state(rocket).manage(store).manage(notifier)
}

/// Everything the server needs regardless of where its store and gateway
/// come from.
fn with_shared_state(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .manage(VoterLocks::default())
        .manage(RenumberLock::default())
}

/// The Rocket instance HTTP tests run against: the given store and gateway,
/// a fixed JWT secret, and OTP verification switched on or off.
#[cfg(test)]
pub(crate) fn test_rocket(otp_required: bool, store: Store, notifier: Notifier) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("otp_required", otp_required))
        .merge(("auth_ttl", 3600))
        .merge(("jwt_secret", "test-jwt-secret"))
        .merge(("log_level", "off"));
    rocket_for_store_and_notifier(rocket::custom(figment), store, notifier)
}
