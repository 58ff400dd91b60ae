//! Casting a ballot.
//!
//! The store has no multi-record transactions, so a submission writes every
//! vote, counts what actually landed, and only then flips the voter's `voted`
//! flag. If the count is off, every vote the voter has is deleted again. The
//! whole sequence runs under the voter's lock.

use rocket::http::Status;
use thiserror::Error;

use crate::error::Error;
use crate::model::{db::vote::NewVote, mongodb::Id, store::RecordStore};

use super::{
    locks::VoterLocks,
    selection::{validate, BallotForm, TooManySelections},
};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("You have already voted.")]
    AlreadyVoted,
    #[error("Please select at least one candidate.")]
    EmptySubmission,
    #[error(transparent)]
    InvalidSelection(#[from] TooManySelections),
    #[error("Vote failed. Please try again.")]
    SubmissionFailed { expected: u64, persisted: u64 },
    #[error("Vote failed and could not be undone. Please contact an administrator.")]
    RollbackFailed(#[source] Error),
    #[error(transparent)]
    Store(#[from] Error),
}

impl From<SubmissionError> for Error {
    fn from(err: SubmissionError) -> Self {
        let status = match err {
            SubmissionError::Store(err) => return err,
            SubmissionError::AlreadyVoted => Status::Conflict,
            SubmissionError::EmptySubmission | SubmissionError::InvalidSelection(_) => {
                Status::BadRequest
            }
            SubmissionError::SubmissionFailed { .. } | SubmissionError::RollbackFailed(_) => {
                Status::InternalServerError
            }
        };
        Error::Status(status, err.to_string())
    }
}

/// Cast the voter's ballot. Returns how many votes were recorded, which may
/// be zero if every pick was dropped during validation.
pub async fn submit(
    store: &dyn RecordStore,
    locks: &VoterLocks,
    voter_id: Id,
    form: &BallotForm,
) -> Result<u64, SubmissionError> {
    let _guard = locks.lock(voter_id).await;

    // Re-read under the lock so a concurrent submission is seen.
    let voter = store
        .find_voter(voter_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter with ID '{voter_id}'")))?;
    if voter.voted {
        return Err(SubmissionError::AlreadyVoted);
    }
    if form.is_empty() {
        return Err(SubmissionError::EmptySubmission);
    }

    let positions = store.positions_by_priority().await?;
    let selections = validate(store, form, &positions).await?;
    let expected = selections.len() as u64;

    for selection in selections {
        let vote = NewVote {
            voter_id,
            candidate_id: selection.candidate.id,
            position_id: selection.position.id,
        };
        if let Err(e) = store.insert_vote(vote).await {
            warn!("Failed to record vote of {voter_id} for {}: {e}", selection.candidate.id);
        }
    }

    if let Err(err) = commit(store, voter_id, expected).await {
        rollback(store, voter_id).await?;
        return Err(err);
    }

    info!("Voter {voter_id} cast {expected} votes");
    Ok(expected)
}

/// Check that every vote landed, then flip the voter's `voted` flag. Any
/// error leaves the votes in place for the caller to roll back.
async fn commit(store: &dyn RecordStore, voter_id: Id, expected: u64) -> Result<(), SubmissionError> {
    let persisted = store.count_votes_by_voter(voter_id).await?;
    if persisted != expected {
        error!("Voter {voter_id} has {persisted} votes stored but cast {expected}, rolling back");
        return Err(SubmissionError::SubmissionFailed {
            expected,
            persisted,
        });
    }

    if !store.mark_voted(voter_id).await? {
        // Someone outside this process committed first.
        error!("Voter {voter_id} was marked as voted mid-submission, rolling back");
        return Err(SubmissionError::AlreadyVoted);
    }
    Ok(())
}

/// Delete every vote the voter has.
async fn rollback(store: &dyn RecordStore, voter_id: Id) -> Result<(), SubmissionError> {
    match store.delete_votes_by_voter(voter_id).await {
        Ok(deleted) => {
            debug!("Rolled back {deleted} votes of {voter_id}");
            Ok(())
        }
        Err(e) => {
            error!("Failed to roll back votes of {voter_id}: {e}");
            Err(SubmissionError::RollbackFailed(e))
        }
    }
}
