use std::time::Duration as StdDuration;

use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    api::admin::AdminCredentials,
    db::admin::NewAdmin,
    mongodb::ensure_indexes_exist,
    store::{MemoryStore, MongoStore, RecordStore, Store},
};
use crate::voting::sms::{GatewaySettings, HttpGateway, Notifier};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_otp_required")]
    otp_required: bool,
    auth_ttl: u32,
    // secrets
    jwt_secret: String,
}

fn default_otp_required() -> bool {
    true
}

impl Config {
    /// Must voters enter an SMS code before voting?
    /// When false, every voter is verified with the fixed bypass code.
    pub fn otp_required(&self) -> bool {
        self.otp_required
    }

    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs. Shared with whoever issues voter tokens.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if !config.otp_required {
            warn!("OTP verification is disabled, voters will be verified automatically");
        }

        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which [`RecordStore`] backend to run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StoreKind {
    #[default]
    Mongodb,
    Memory,
}

/// Configuration for the record store.
#[derive(Deserialize)]
struct StoreConfig {
    // non-secrets
    #[serde(default)]
    store: StoreKind,
    db_name: Option<String>,
    admin_username: Option<String>,
    // secrets
    db_uri: Option<String>,
    admin_password: Option<String>,
}

/// A fairing that loads the store config, connects to the database if there
/// is one, performs any setup necessary, and places a [`Store`] into managed
/// state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Record store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let store = match config.store {
            StoreKind::Memory => {
                warn!("Using the in-memory store, nothing will outlive this process");
                Store::new(MemoryStore::new())
            }
            StoreKind::Mongodb => {
                let Some(uri) = config.db_uri.as_deref() else {
                    error!("`db_uri` must be set to use the MongoDB store");
                    return Err(rocket);
                };
                info!("Loaded database config, connecting...");
                let client = match MongoClient::with_uri_str(uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                let db = client.database(config.db_name.as_deref().unwrap_or("ballot"));

                // Ensure the required indexes exist.
                if let Err(e) = ensure_indexes_exist(&db).await {
                    error!("Failed to connect to database: {e}");
                    return Err(rocket);
                }
                info!("...database connection online!");
                rocket = rocket.manage(client);
                Store::new(MongoStore::new(db))
            }
        };

        if let Err(e) = seed_admin(&*store, config.admin_username, config.admin_password).await {
            error!("Failed to create the initial admin: {e}");
            return Err(rocket);
        }

        rocket = rocket.manage(store);
        Ok(rocket)
    }
}

/// Create the configured admin if there are no admins yet.
async fn seed_admin(
    store: &dyn RecordStore,
    username: Option<String>,
    password: Option<String>,
) -> crate::error::Result<()> {
    let (Some(username), Some(password)) = (username, password) else {
        return Ok(());
    };
    if store.count_admins().await? > 0 {
        return Ok(());
    }
    let admin = NewAdmin::try_from(AdminCredentials { username, password }).map_err(|_| {
        crate::error::Error::bad_request("Configured admin credentials are too weak")
    })?;
    let admin = store.insert_admin(admin).await?;
    info!("Created initial admin '{}'", admin.username);
    Ok(())
}

/// Configuration for the SMS gateway.
#[derive(Deserialize)]
struct SmsConfig {
    // non-secrets
    #[serde(default = "default_sms_endpoint")]
    sms_endpoint: String,
    #[serde(default = "default_sms_sender")]
    sms_sender: String,
    #[serde(default = "default_sms_timeout")]
    sms_timeout: u64,
    // secrets
    sms_email: Option<String>,
    sms_password: Option<String>,
}

fn default_sms_endpoint() -> String {
    "https://app.multitexter.com/v2/app/sms".to_string()
}

fn default_sms_sender() -> String {
    "OTP".to_string()
}

fn default_sms_timeout() -> u64 {
    10
}

/// A fairing that loads the SMS gateway config and places a [`Notifier`]
/// into managed state.
pub struct SmsFairing;

#[rocket::async_trait]
impl Fairing for SmsFairing {
    fn info(&self) -> Info {
        Info {
            name: "SMS gateway",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<SmsConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load SMS config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if config.sms_email.is_none() || config.sms_password.is_none() {
            warn!("SMS gateway credentials are not set, OTP delivery will fail");
        }

        let gateway = match HttpGateway::new(GatewaySettings {
            endpoint: config.sms_endpoint,
            email: config.sms_email,
            password: config.sms_password,
            sender: config.sms_sender,
            timeout: StdDuration::from_secs(config.sms_timeout),
        }) {
            Ok(gateway) => gateway,
            Err(e) => {
                error!("Failed to build SMS client: {e}");
                return Err(rocket);
            }
        };
        info!("Loaded SMS gateway config");

        rocket = rocket.manage(Notifier::new(gateway));
        Ok(rocket)
    }
}
