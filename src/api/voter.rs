use rocket::{http::Status, serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{api::auth::AuthToken, db::voter::Voter, mongodb::Id, store::Store},
    voting::{
        ballot::{render_ballot, Ballot},
        dashboard::{dashboard, Dashboard},
        locks::{RenumberLock, VoterLocks},
        otp::OtpService,
        selection::{preview, validate, BallotForm, PreviewEntry},
        sms::Notifier,
        submission::submit,
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        get_dashboard,
        resend_otp,
        verify_otp,
        get_ballot,
        preview_ballot,
        submit_ballot,
    ]
}

/// A short status message for the voter.
#[derive(Debug, Serialize, Deserialize)]
pub struct Notice {
    pub data: String,
    pub error: bool,
}

impl Notice {
    fn ok(data: impl Into<String>) -> Json<Self> {
        Json(Self {
            data: data.into(),
            error: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OtpSubmission {
    pub otp: String,
}

/// What the voter has picked, before they commit to it.
#[derive(Debug, Serialize, Deserialize)]
pub struct BallotPreview {
    pub error: bool,
    pub list: Vec<PreviewEntry>,
    pub response: String,
}

async fn load_voter(store: &Store, id: Id) -> Result<Voter> {
    store
        .find_voter(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter with ID '{id}'")))
}

/// Load a voter who is allowed to see and cast the ballot, verifying them on
/// the spot if OTPs are switched off.
async fn load_ballot_voter(store: &Store, otp: &OtpService<'_>, id: Id) -> Result<Voter> {
    let mut voter = load_voter(store, id).await?;
    if voter.voted {
        return Err(Error::conflict("You have already voted."));
    }
    if voter.needs_verification() {
        if otp.required() {
            return Err(Error::Status(
                Status::Forbidden,
                "Please verify your phone number first.".to_string(),
            ));
        }
        otp.auto_verify(&mut voter).await?;
    }
    Ok(voter)
}

#[get("/voter/dashboard")]
async fn get_dashboard(
    token: AuthToken<Voter>,
    store: Store,
    notifier: &State<Notifier>,
    renumber: &State<RenumberLock>,
    locks: &State<VoterLocks>,
    config: &State<Config>,
) -> Result<Json<Dashboard>> {
    let otp = OtpService::new(&*store, &***notifier, locks, config.otp_required());
    let mut voter = load_voter(&store, token.id).await?;
    Ok(Json(dashboard(&*store, &otp, renumber, &mut voter).await?))
}

#[post("/voter/otp/resend")]
async fn resend_otp(
    token: AuthToken<Voter>,
    store: Store,
    notifier: &State<Notifier>,
    locks: &State<VoterLocks>,
    config: &State<Config>,
) -> Result<Json<Notice>> {
    let otp = OtpService::new(&*store, &***notifier, locks, config.otp_required());
    let mut voter = load_voter(&store, token.id).await?;
    let outcome = otp.request(&mut voter).await?;
    Ok(Notice::ok(outcome.message()))
}

#[post("/voter/otp/verify", data = "<submission>", format = "json")]
async fn verify_otp(
    token: AuthToken<Voter>,
    submission: Json<OtpSubmission>,
    store: Store,
    notifier: &State<Notifier>,
    locks: &State<VoterLocks>,
    config: &State<Config>,
) -> Result<Json<Notice>> {
    let otp = OtpService::new(&*store, &***notifier, locks, config.otp_required());
    let mut voter = load_voter(&store, token.id).await?;
    otp.confirm(&mut voter, submission.otp.trim()).await?;
    Ok(Notice::ok("Verified! You can now vote."))
}

#[get("/voter/ballot")]
async fn get_ballot(
    token: AuthToken<Voter>,
    store: Store,
    notifier: &State<Notifier>,
    renumber: &State<RenumberLock>,
    locks: &State<VoterLocks>,
    config: &State<Config>,
) -> Result<Json<Ballot>> {
    let otp = OtpService::new(&*store, &***notifier, locks, config.otp_required());
    load_ballot_voter(&store, &otp, token.id).await?;
    Ok(Json(render_ballot(&*store, renumber, false).await?))
}

/// Show the voter what they picked. Nothing is written.
#[post("/voter/ballot/preview", data = "<form>", format = "json")]
async fn preview_ballot(
    _token: AuthToken<Voter>,
    form: Json<BallotForm>,
    store: Store,
) -> Result<Json<BallotPreview>> {
    let positions = store.positions_by_priority().await?;
    let body = match validate(&*store, &form, &positions).await {
        Ok(selections) => {
            let list = preview(&selections);
            let response = if list.is_empty() {
                "No votes selected".to_string()
            } else {
                String::new()
            };
            BallotPreview {
                error: false,
                list,
                response,
            }
        }
        Err(e) => BallotPreview {
            error: true,
            list: Vec::new(),
            response: e.to_string(),
        },
    };
    Ok(Json(body))
}

#[post("/voter/ballot/submit", data = "<form>", format = "json")]
async fn submit_ballot(
    token: AuthToken<Voter>,
    form: Json<BallotForm>,
    store: Store,
    notifier: &State<Notifier>,
    locks: &State<VoterLocks>,
    config: &State<Config>,
) -> Result<Json<Notice>> {
    let otp = OtpService::new(&*store, &***notifier, locks, config.otp_required());
    load_ballot_voter(&store, &otp, token.id).await?;
    submit(&*store, locks, token.id, &form).await?;
    Ok(Notice::ok("Thank you! Your vote has been recorded."))
}
