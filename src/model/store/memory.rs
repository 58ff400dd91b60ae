use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
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

use super::RecordStore;

#[derive(Default)]
struct Tables {
    positions: Vec<Position>,
    candidates: Vec<Candidate>,
    voters: Vec<Voter>,
    votes: Vec<Vote>,
    admins: Vec<Admin>,
    /// If set, how many more votes may be inserted before inserts start failing.
    vote_insert_budget: Option<usize>,
    /// Operations that fail as if the database were unreachable.
    outages: Vec<&'static str>,
}

/// A [`RecordStore`] that lives entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // No operation leaves the tables half-updated, so a poisoned lock is still usable.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Let only the next `count` vote inserts succeed; later ones fail as if
    /// the database had rejected them.
    #[cfg(test)]
    pub fn limit_vote_inserts(&self, count: usize) {
        self.tables().vote_insert_budget = Some(count);
    }

    /// Make every later call of the named operation fail.
    #[cfg(test)]
    pub fn fail_operation(&self, operation: &'static str) {
        self.tables().outages.push(operation);
    }

    fn available(&self, operation: &str) -> Result<()> {
        if self.tables().outages.iter().any(|o| *o == operation) {
            return Err(Error::Status(
                rocket::http::Status::ServiceUnavailable,
                format!("Store is unavailable for {operation}"),
            ));
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl RecordStore for MemoryStore {
    async fn positions_by_priority(&self) -> Result<Vec<Position>> {
        let mut positions = self.tables().positions.clone();
        positions.sort_by(|a, b| {
            (a.priority, &a.name, a.id).cmp(&(b.priority, &b.name, b.id))
        });
        Ok(positions)
    }

    async fn find_position(&self, id: Id) -> Result<Option<Position>> {
        Ok(self.tables().positions.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_position(&self, position: NewPosition) -> Result<Position> {
        let mut tables = self.tables();
        if tables.positions.iter().any(|p| p.name == position.name) {
            return Err(Error::conflict(format!(
                "Position name already in use: {}",
                position.name
            )));
        }
        let position = Position {
            id: Id::new(),
            position,
        };
        tables.positions.push(position.clone());
        Ok(position)
    }

    async fn set_priority(&self, id: Id, priority: u32) -> Result<bool> {
        let mut tables = self.tables();
        match tables.positions.iter_mut().find(|p| p.id == id) {
            Some(position) => {
                position.priority = priority;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_position(&self, id: Id) -> Result<bool> {
        let mut tables = self.tables();
        let before = tables.positions.len();
        tables.positions.retain(|p| p.id != id);
        let deleted = tables.positions.len() != before;
        if deleted {
            tables.candidates.retain(|c| c.position_id != id);
        }
        Ok(deleted)
    }

    async fn candidates_for_position(&self, position_id: Id) -> Result<Vec<Candidate>> {
        Ok(self
            .tables()
            .candidates
            .iter()
            .filter(|c| c.position_id == position_id)
            .cloned()
            .collect())
    }

    async fn find_candidate(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.tables().candidates.iter().find(|c| c.id == id).cloned())
    }

    async fn find_candidate_in_position(
        &self,
        id: Id,
        position_id: Id,
    ) -> Result<Option<Candidate>> {
        Ok(self
            .tables()
            .candidates
            .iter()
            .find(|c| c.id == id && c.position_id == position_id)
            .cloned())
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let candidate = Candidate {
            id: Id::new(),
            candidate,
        };
        self.tables().candidates.push(candidate.clone());
        Ok(candidate)
    }

    async fn delete_candidate(&self, id: Id) -> Result<bool> {
        let mut tables = self.tables();
        let before = tables.candidates.len();
        tables.candidates.retain(|c| c.id != id);
        Ok(tables.candidates.len() != before)
    }

    async fn voters(&self) -> Result<Vec<Voter>> {
        Ok(self.tables().voters.clone())
    }

    async fn find_voter(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.tables().voters.iter().find(|v| v.id == id).cloned())
    }

    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter> {
        let voter = Voter {
            id: Id::new(),
            voter,
        };
        self.tables().voters.push(voter.clone());
        Ok(voter)
    }

    async fn save_voter_otp(&self, voter: &Voter) -> Result<()> {
        let mut tables = self.tables();
        let stored = tables
            .voters
            .iter_mut()
            .find(|v| v.id == voter.id)
            .ok_or_else(|| Error::not_found(format!("Voter with ID '{}'", voter.id)))?;
        stored.otp = voter.otp.clone();
        stored.otp_sent = voter.otp_sent;
        stored.verified = voter.verified;
        Ok(())
    }

    async fn mark_voted(&self, id: Id) -> Result<bool> {
        self.available("mark_voted")?;
        let mut tables = self.tables();
        match tables.voters.iter_mut().find(|v| v.id == id && !v.voted) {
            Some(voter) => {
                voter.voted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn verify_unverified(&self, code: &Code) -> Result<u64> {
        let mut changed = 0;
        for voter in self
            .tables()
            .voters
            .iter_mut()
            .filter(|v| v.otp.is_none() && !v.verified)
        {
            voter.otp = Some(code.clone());
            voter.verified = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote> {
        let mut tables = self.tables();
        if let Some(budget) = tables.vote_insert_budget.as_mut() {
            if *budget == 0 {
                return Err(Error::Status(
                    rocket::http::Status::ServiceUnavailable,
                    "Vote store rejected the write".to_string(),
                ));
            }
            *budget -= 1;
        }
        if tables
            .votes
            .iter()
            .any(|v| v.voter_id == vote.voter_id && v.candidate_id == vote.candidate_id)
        {
            return Err(Error::conflict(format!(
                "Voter '{}' already voted for candidate '{}'",
                vote.voter_id, vote.candidate_id
            )));
        }
        let vote = Vote {
            id: Id::new(),
            vote,
        };
        tables.votes.push(vote.clone());
        Ok(vote)
    }

    async fn votes_by_voter(&self, voter_id: Id) -> Result<Vec<Vote>> {
        Ok(self
            .tables()
            .votes
            .iter()
            .filter(|v| v.voter_id == voter_id)
            .cloned()
            .collect())
    }

    async fn count_votes_by_voter(&self, voter_id: Id) -> Result<u64> {
        self.available("count_votes_by_voter")?;
        Ok(self
            .tables()
            .votes
            .iter()
            .filter(|v| v.voter_id == voter_id)
            .count() as u64)
    }

    async fn delete_votes_by_voter(&self, voter_id: Id) -> Result<u64> {
        self.available("delete_votes_by_voter")?;
        let mut tables = self.tables();
        let before = tables.votes.len();
        tables.votes.retain(|v| v.voter_id != voter_id);
        Ok((before - tables.votes.len()) as u64)
    }

    async fn votes(&self) -> Result<Vec<Vote>> {
        Ok(self.tables().votes.clone())
    }

    async fn find_admin(&self, id: Id) -> Result<Option<Admin>> {
        Ok(self.tables().admins.iter().find(|a| a.id == id).cloned())
    }

    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        Ok(self
            .tables()
            .admins
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn count_admins(&self) -> Result<u64> {
        Ok(self.tables().admins.len() as u64)
    }

    async fn insert_admin(&self, admin: NewAdmin) -> Result<Admin> {
        let mut tables = self.tables();
        if tables.admins.iter().any(|a| a.username == admin.username) {
            return Err(Error::conflict(format!(
                "Admin username already in use: {}",
                admin.username
            )));
        }
        let admin = Admin { id: Id::new(), admin };
        tables.admins.push(admin.clone());
        Ok(admin)
    }
}
