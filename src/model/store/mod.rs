//! The record store: everything the application persists, behind one trait.
//!
//! [`MongoStore`] is the production backend. [`MemoryStore`] keeps
//! everything in process and backs the test suite and local development.

use std::{ops::Deref, sync::Arc};

use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::error::Result;
use crate::model::{
    db::{
        admin::{Admin, NewAdmin},
        candidate::{Candidate, NewCandidate},
        position::{NewPosition, Position},
        vote::{NewVote, Vote},
        voter::{NewVoter, Voter},
    },
    mongodb::Id,
    otp::Code,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Persistence operations needed by the application.
///
/// Implementations must enforce uniqueness of position names, admin
/// usernames, and (voter, candidate) pairs among votes, reporting violations
/// as `409 Conflict` errors.
#[rocket::async_trait]
pub trait RecordStore: Send + Sync {
    /// All positions, ordered by ascending priority. Ties are broken by name
    /// and then ID so that the order is total.
    async fn positions_by_priority(&self) -> Result<Vec<Position>>;
    async fn find_position(&self, id: Id) -> Result<Option<Position>>;
    async fn insert_position(&self, position: NewPosition) -> Result<Position>;
    /// Overwrite the stored priority of a position. Returns false if the
    /// position no longer exists.
    async fn set_priority(&self, id: Id, priority: u32) -> Result<bool>;
    /// Delete a position along with all of its candidates.
    async fn delete_position(&self, id: Id) -> Result<bool>;

    async fn candidates_for_position(&self, position_id: Id) -> Result<Vec<Candidate>>;
    async fn find_candidate(&self, id: Id) -> Result<Option<Candidate>>;
    /// Find a candidate only if they stand for the given position.
    async fn find_candidate_in_position(&self, id: Id, position_id: Id)
        -> Result<Option<Candidate>>;
    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate>;
    async fn delete_candidate(&self, id: Id) -> Result<bool>;

    async fn voters(&self) -> Result<Vec<Voter>>;
    async fn find_voter(&self, id: Id) -> Result<Option<Voter>>;
    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter>;
    /// Persist the OTP and verification fields of a voter.
    async fn save_voter_otp(&self, voter: &Voter) -> Result<()>;
    /// Atomically flip `voted` from false to true. Returns false if the voter
    /// was already marked as voted, or does not exist.
    async fn mark_voted(&self, id: Id) -> Result<bool>;
    /// Give every voter with no code who is unverified the given code, and
    /// mark them verified. Returns how many voters were changed.
    async fn verify_unverified(&self, code: &Code) -> Result<u64>;

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote>;
    async fn votes_by_voter(&self, voter_id: Id) -> Result<Vec<Vote>>;
    async fn count_votes_by_voter(&self, voter_id: Id) -> Result<u64>;
    async fn delete_votes_by_voter(&self, voter_id: Id) -> Result<u64>;
    async fn votes(&self) -> Result<Vec<Vote>>;

    async fn find_admin(&self, id: Id) -> Result<Option<Admin>>;
    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>>;
    async fn count_admins(&self) -> Result<u64>;
    async fn insert_admin(&self, admin: NewAdmin) -> Result<Admin>;
}

/// A shareable handle on whichever [`RecordStore`] the server was built with.
#[derive(Clone)]
pub struct Store(Arc<dyn RecordStore>);

impl Store {
    pub fn new(store: impl RecordStore + 'static) -> Self {
        Self(Arc::new(store))
    }
}

impl Deref for Store {
    type Target = dyn RecordStore;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Store {
    type Error = ();

    /// Get the store from the managed state.
    ///
    /// Panics iff the [`Store`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let store = req.guard::<&State<Store>>().await.unwrap();
        request::Outcome::Success(store.inner().clone())
    }
}
