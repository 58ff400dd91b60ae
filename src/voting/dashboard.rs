//! Where a voter lands after logging in.

use serde::Serialize;

use crate::error::Result;
use crate::model::{db::voter::Voter, store::RecordStore};

use super::{
    ballot::{render_ballot, Ballot},
    locks::RenumberLock,
    otp::OtpService,
};

/// One of the voter's own recorded votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteSummary {
    pub position: String,
    pub candidate: String,
}

/// What the voter should be shown next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Dashboard {
    /// The voter must enter an OTP before seeing the ballot.
    Verify,
    /// The voter may vote.
    Ballot {
        ballot: Ballot,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The voter has voted; show them what they chose.
    Voted { votes: Vec<VoteSummary> },
}

/// Decide the voter's next step from their stored state alone.
pub async fn dashboard(
    store: &dyn RecordStore,
    otp: &OtpService<'_>,
    renumber: &RenumberLock,
    voter: &mut Voter,
) -> Result<Dashboard> {
    if voter.voted {
        return Ok(Dashboard::Voted {
            votes: my_votes(store, voter).await?,
        });
    }

    let mut message = None;
    if voter.needs_verification() {
        if otp.required() {
            return Ok(Dashboard::Verify);
        }
        otp.auto_verify(voter).await?;
        info!("Voter {} verified automatically", voter.id);
        message = Some("Verified automatically. You can now vote.".to_string());
    }

    let ballot = render_ballot(store, renumber, false).await?;
    Ok(Dashboard::Ballot { ballot, message })
}

/// The voter's votes, with names resolved. Votes naming a candidate or
/// position that has since been deleted are skipped.
pub async fn my_votes(store: &dyn RecordStore, voter: &Voter) -> Result<Vec<VoteSummary>> {
    let mut summaries = Vec::new();
    for vote in store.votes_by_voter(voter.id).await? {
        let position = store.find_position(vote.position_id).await?;
        let candidate = store.find_candidate(vote.candidate_id).await?;
        match (position, candidate) {
            (Some(position), Some(candidate)) => summaries.push(VoteSummary {
                position: position.position.name,
                candidate: candidate.candidate.fullname,
            }),
            _ => warn!("Vote {} refers to a deleted record", vote.id),
        }
    }
    Ok(summaries)
}
