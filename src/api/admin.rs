use std::collections::HashMap;

use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::{auth::AuthToken, id::ApiId, sms::Sms},
        db::{
            admin::Admin,
            candidate::{Candidate, NewCandidate},
            position::{NewPosition, Position},
            voter::{NewVoter, Voter},
        },
        mongodb::Id,
        store::Store,
    },
    voting::{
        ballot::{move_position, render_ballot, Ballot, Direction},
        locks::{RenumberLock, VoterLocks},
        otp::OtpService,
        sms::Notifier,
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        get_positions,
        create_position,
        delete_position,
        move_position_up,
        move_position_down,
        get_candidates,
        create_candidate,
        delete_candidate,
        get_voters,
        create_voter,
        get_ballot,
        bypass_otp,
        get_tally,
    ]
}

/// A position, as listed to admins.
#[derive(Debug, Serialize, Deserialize)]
pub struct PositionSummary {
    pub id: ApiId,
    pub name: String,
    pub priority: u32,
    pub max_vote: u32,
}

impl From<Position> for PositionSummary {
    fn from(position: Position) -> Self {
        Self {
            id: position.id.into(),
            name: position.position.name,
            priority: position.position.priority,
            max_vote: position.position.max_vote,
        }
    }
}

/// A request to add a position to the end of the ballot.
#[derive(Debug, Serialize, Deserialize)]
pub struct PositionSpec {
    pub name: String,
    pub max_vote: u32,
}

/// A candidate, as listed to admins.
#[derive(Debug, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub id: ApiId,
    pub position_id: ApiId,
    pub fullname: String,
    pub bio: String,
    pub photo_url: String,
}

impl From<Candidate> for CandidateSummary {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            position_id: candidate.position_id.into(),
            photo_url: candidate.photo_url(),
            fullname: candidate.candidate.fullname,
            bio: candidate.candidate.bio,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub position_id: ApiId,
    pub fullname: String,
    #[serde(default)]
    pub bio: String,
    /// Path of the photo relative to the media root.
    #[serde(default)]
    pub photo: String,
}

/// A voter, as listed to admins. OTP codes are never shown.
#[derive(Debug, Serialize, Deserialize)]
pub struct VoterSummary {
    pub id: ApiId,
    pub name: String,
    pub phone: Sms,
    pub otp_sent: u32,
    pub verified: bool,
    pub voted: bool,
}

impl From<Voter> for VoterSummary {
    fn from(voter: Voter) -> Self {
        Self {
            id: voter.id.into(),
            name: voter.voter.name,
            phone: voter.voter.phone,
            otp_sent: voter.voter.otp_sent,
            verified: voter.voter.verified,
            voted: voter.voter.voted,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoterSpec {
    pub name: String,
    pub phone: Sms,
}

/// Vote totals for one position.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTally {
    pub position: String,
    pub candidates: Vec<CandidateTally>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub id: ApiId,
    pub fullname: String,
    pub votes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BypassReport {
    pub bypassed: u64,
}

#[get("/admin/positions")]
async fn get_positions(_token: AuthToken<Admin>, store: Store) -> Result<Json<Vec<PositionSummary>>> {
    let positions = store.positions_by_priority().await?;
    Ok(Json(positions.into_iter().map(Into::into).collect()))
}

#[post("/admin/positions", data = "<spec>", format = "json")]
async fn create_position(
    _token: AuthToken<Admin>,
    spec: Json<PositionSpec>,
    store: Store,
    renumber: &State<RenumberLock>,
) -> Result<Json<PositionSummary>> {
    let spec = spec.into_inner();
    if spec.name.trim().is_empty() {
        return Err(Error::bad_request("Position name cannot be empty"));
    }
    if spec.max_vote < 1 {
        return Err(Error::bad_request("Maximum vote must be at least 1"));
    }

    // New positions go to the end of the ballot.
    let _guard = renumber.lock().await;
    let count = store.positions_by_priority().await?.len() as u32;
    let position = store
        .insert_position(NewPosition {
            name: spec.name.trim().to_string(),
            priority: count + 1,
            max_vote: spec.max_vote,
        })
        .await?;
    info!("Created position '{}' ({})", position.name, position.id);
    Ok(Json(position.into()))
}

#[delete("/admin/positions/<position_id>")]
async fn delete_position(_token: AuthToken<Admin>, position_id: Id, store: Store) -> Result<()> {
    if !store.delete_position(position_id).await? {
        return Err(Error::not_found(format!("Position with ID '{position_id}'")));
    }
    info!("Deleted position {position_id} and its candidates");
    Ok(())
}

#[post("/admin/positions/<position_id>/up")]
async fn move_position_up(
    _token: AuthToken<Admin>,
    position_id: Id,
    store: Store,
    renumber: &State<RenumberLock>,
) -> Result<()> {
    move_position(&*store, renumber, position_id, Direction::Up).await
}

#[post("/admin/positions/<position_id>/down")]
async fn move_position_down(
    _token: AuthToken<Admin>,
    position_id: Id,
    store: Store,
    renumber: &State<RenumberLock>,
) -> Result<()> {
    move_position(&*store, renumber, position_id, Direction::Down).await
}

#[get("/admin/positions/<position_id>/candidates")]
async fn get_candidates(
    _token: AuthToken<Admin>,
    position_id: Id,
    store: Store,
) -> Result<Json<Vec<CandidateSummary>>> {
    if store.find_position(position_id).await?.is_none() {
        return Err(Error::not_found(format!("Position with ID '{position_id}'")));
    }
    let candidates = store.candidates_for_position(position_id).await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

#[post("/admin/candidates", data = "<spec>", format = "json")]
async fn create_candidate(
    _token: AuthToken<Admin>,
    spec: Json<CandidateSpec>,
    store: Store,
) -> Result<Json<CandidateSummary>> {
    let spec = spec.into_inner();
    if spec.fullname.trim().is_empty() {
        return Err(Error::bad_request("Candidate name cannot be empty"));
    }
    let position_id = *spec.position_id;
    if store.find_position(position_id).await?.is_none() {
        return Err(Error::not_found(format!("Position with ID '{position_id}'")));
    }

    let candidate = store
        .insert_candidate(NewCandidate {
            fullname: spec.fullname.trim().to_string(),
            bio: spec.bio,
            photo: spec.photo,
            position_id,
        })
        .await?;
    info!("Created candidate '{}' ({})", candidate.fullname, candidate.id);
    Ok(Json(candidate.into()))
}

#[delete("/admin/candidates/<candidate_id>")]
async fn delete_candidate(_token: AuthToken<Admin>, candidate_id: Id, store: Store) -> Result<()> {
    if !store.delete_candidate(candidate_id).await? {
        return Err(Error::not_found(format!("Candidate with ID '{candidate_id}'")));
    }
    Ok(())
}

#[get("/admin/voters")]
async fn get_voters(_token: AuthToken<Admin>, store: Store) -> Result<Json<Vec<VoterSummary>>> {
    let voters = store.voters().await?;
    Ok(Json(voters.into_iter().map(Into::into).collect()))
}

#[post("/admin/voters", data = "<spec>", format = "json")]
async fn create_voter(
    _token: AuthToken<Admin>,
    spec: Json<VoterSpec>,
    store: Store,
) -> Result<Json<VoterSummary>> {
    let spec = spec.into_inner();
    if spec.name.trim().is_empty() {
        return Err(Error::bad_request("Voter name cannot be empty"));
    }
    let voter = store
        .insert_voter(NewVoter::new(spec.name.trim(), spec.phone))
        .await?;
    info!("Registered voter {}", voter.id);
    Ok(Json(voter.into()))
}

/// The ballot as voters will see it, with reordering controls.
#[get("/admin/ballot")]
async fn get_ballot(
    _token: AuthToken<Admin>,
    store: Store,
    renumber: &State<RenumberLock>,
) -> Result<Json<Ballot>> {
    Ok(Json(render_ballot(&*store, renumber, true).await?))
}

#[post("/admin/otp/bypass")]
async fn bypass_otp(
    _token: AuthToken<Admin>,
    store: Store,
    notifier: &State<Notifier>,
    locks: &State<VoterLocks>,
    config: &State<Config>,
) -> Result<Json<BypassReport>> {
    let otp = OtpService::new(&*store, &***notifier, locks, config.otp_required());
    let bypassed = otp.bypass_all().await?;
    Ok(Json(BypassReport { bypassed }))
}

/// Vote totals per candidate, positions in display order.
#[get("/admin/tally")]
async fn get_tally(_token: AuthToken<Admin>, store: Store) -> Result<Json<Vec<PositionTally>>> {
    let mut counts: HashMap<Id, u64> = HashMap::new();
    for vote in store.votes().await? {
        *counts.entry(vote.candidate_id).or_default() += 1;
    }

    let mut tally = Vec::new();
    for position in store.positions_by_priority().await? {
        let candidates = store
            .candidates_for_position(position.id)
            .await?
            .into_iter()
            .map(|candidate| CandidateTally {
                id: candidate.id.into(),
                votes: counts.get(&candidate.id).copied().unwrap_or_default(),
                fullname: candidate.candidate.fullname,
            })
            .collect();
        tally.push(PositionTally {
            position: position.position.name,
            candidates,
        });
    }
    Ok(Json(tally))
}
