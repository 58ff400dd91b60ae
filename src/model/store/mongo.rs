use mongodb::{
    bson::{doc, Bson},
    error::Error as DbError,
    options::FindOptions,
    Database,
};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    db::{
        admin::{Admin, NewAdmin},
        candidate::{Candidate, NewCandidate},
        position::{NewPosition, Position},
        vote::{NewVote, Vote},
        voter::{NewVoter, Voter},
    },
    mongodb::{is_duplicate_key_error, Coll, Id},
    otp::Code,
};

use super::RecordStore;

/// A [`RecordStore`] backed by a MongoDB database.
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn coll<T: crate::model::mongodb::MongoCollection>(&self) -> Coll<T> {
        Coll::from_db(&self.db)
    }
}

/// Turn a duplicate key error into a `409 Conflict` with the given message.
fn conflict_or_db(err: DbError, message: impl FnOnce() -> String) -> Error {
    if is_duplicate_key_error(&err) {
        Error::conflict(message())
    } else {
        err.into()
    }
}

/// Extract the ID the database assigned to a freshly inserted record.
fn inserted_id(id: Bson) -> Result<Id> {
    id.as_object_id()
        .map(Id::from)
        .ok_or_else(|| Error::Status(
            rocket::http::Status::InternalServerError,
            format!("Database returned a non-ObjectId insert ID: {id}"),
        ))
}

#[rocket::async_trait]
impl RecordStore for MongoStore {
    async fn positions_by_priority(&self) -> Result<Vec<Position>> {
        let options = FindOptions::builder()
            .sort(doc! {"priority": 1, "name": 1, "_id": 1})
            .build();
        let positions = self
            .coll::<Position>()
            .find(None, options)
            .await?
            .try_collect()
            .await?;
        Ok(positions)
    }

    async fn find_position(&self, id: Id) -> Result<Option<Position>> {
        Ok(self.coll::<Position>().find_one(id.as_doc(), None).await?)
    }

    async fn insert_position(&self, position: NewPosition) -> Result<Position> {
        let result = self
            .coll::<NewPosition>()
            .insert_one(&position, None)
            .await
            .map_err(|e| {
                conflict_or_db(e, || {
                    format!("Position name already in use: {}", position.name)
                })
            })?;
        Ok(Position {
            id: inserted_id(result.inserted_id)?,
            position,
        })
    }

    async fn set_priority(&self, id: Id, priority: u32) -> Result<bool> {
        let update = doc! {
            "$set": { "priority": i64::from(priority) }
        };
        let result = self
            .coll::<Position>()
            .update_one(id.as_doc(), update, None)
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn delete_position(&self, id: Id) -> Result<bool> {
        let result = self.coll::<Position>().delete_one(id.as_doc(), None).await?;
        if result.deleted_count == 0 {
            return Ok(false);
        }
        let orphans = self
            .coll::<Candidate>()
            .delete_many(doc! {"position_id": *id}, None)
            .await?;
        debug!(
            "Deleted {} candidates along with position {id}",
            orphans.deleted_count
        );
        Ok(true)
    }

    async fn candidates_for_position(&self, position_id: Id) -> Result<Vec<Candidate>> {
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        let candidates = self
            .coll::<Candidate>()
            .find(doc! {"position_id": *position_id}, options)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn find_candidate(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.coll::<Candidate>().find_one(id.as_doc(), None).await?)
    }

    async fn find_candidate_in_position(
        &self,
        id: Id,
        position_id: Id,
    ) -> Result<Option<Candidate>> {
        let filter = doc! {
            "_id": *id,
            "position_id": *position_id,
        };
        Ok(self.coll::<Candidate>().find_one(filter, None).await?)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let result = self
            .coll::<NewCandidate>()
            .insert_one(&candidate, None)
            .await?;
        Ok(Candidate {
            id: inserted_id(result.inserted_id)?,
            candidate,
        })
    }

    async fn delete_candidate(&self, id: Id) -> Result<bool> {
        let result = self.coll::<Candidate>().delete_one(id.as_doc(), None).await?;
        Ok(result.deleted_count == 1)
    }

    async fn voters(&self) -> Result<Vec<Voter>> {
        let voters = self
            .coll::<Voter>()
            .find(None, None)
            .await?
            .try_collect()
            .await?;
        Ok(voters)
    }

    async fn find_voter(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.coll::<Voter>().find_one(id.as_doc(), None).await?)
    }

    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter> {
        let result = self.coll::<NewVoter>().insert_one(&voter, None).await?;
        Ok(Voter {
            id: inserted_id(result.inserted_id)?,
            voter,
        })
    }

    async fn save_voter_otp(&self, voter: &Voter) -> Result<()> {
        let otp = match &voter.otp {
            Some(code) => Bson::String(code.to_string()),
            None => Bson::Null,
        };
        let update = doc! {
            "$set": {
                "otp": otp,
                "otp_sent": i64::from(voter.otp_sent),
                "verified": voter.verified,
            }
        };
        let result = self
            .coll::<Voter>()
            .update_one(voter.id.as_doc(), update, None)
            .await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Voter with ID '{}'", voter.id)));
        }
        Ok(())
    }

    async fn mark_voted(&self, id: Id) -> Result<bool> {
        let filter = doc! {
            "_id": *id,
            "voted": false,
        };
        let update = doc! {
            "$set": { "voted": true }
        };
        let result = self.coll::<Voter>().update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn verify_unverified(&self, code: &Code) -> Result<u64> {
        let filter = doc! {
            "otp": Bson::Null,
            "verified": false,
        };
        let update = doc! {
            "$set": {
                "otp": code.as_str(),
                "verified": true,
            }
        };
        let result = self.coll::<Voter>().update_many(filter, update, None).await?;
        Ok(result.modified_count)
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote> {
        let result = self
            .coll::<NewVote>()
            .insert_one(&vote, None)
            .await
            .map_err(|e| {
                conflict_or_db(e, || {
                    format!(
                        "Voter '{}' already voted for candidate '{}'",
                        vote.voter_id, vote.candidate_id
                    )
                })
            })?;
        Ok(Vote {
            id: inserted_id(result.inserted_id)?,
            vote,
        })
    }

    async fn votes_by_voter(&self, voter_id: Id) -> Result<Vec<Vote>> {
        let votes = self
            .coll::<Vote>()
            .find(doc! {"voter_id": *voter_id}, None)
            .await?
            .try_collect()
            .await?;
        Ok(votes)
    }

    async fn count_votes_by_voter(&self, voter_id: Id) -> Result<u64> {
        let count = self
            .coll::<Vote>()
            .count_documents(doc! {"voter_id": *voter_id}, None)
            .await?;
        Ok(count)
    }

    async fn delete_votes_by_voter(&self, voter_id: Id) -> Result<u64> {
        let result = self
            .coll::<Vote>()
            .delete_many(doc! {"voter_id": *voter_id}, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn votes(&self) -> Result<Vec<Vote>> {
        let votes = self
            .coll::<Vote>()
            .find(None, None)
            .await?
            .try_collect()
            .await?;
        Ok(votes)
    }

    async fn find_admin(&self, id: Id) -> Result<Option<Admin>> {
        Ok(self.coll::<Admin>().find_one(id.as_doc(), None).await?)
    }

    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let filter = doc! {
            "username": username,
        };
        Ok(self.coll::<Admin>().find_one(filter, None).await?)
    }

    async fn count_admins(&self) -> Result<u64> {
        Ok(self.coll::<Admin>().count_documents(None, None).await?)
    }

    async fn insert_admin(&self, admin: NewAdmin) -> Result<Admin> {
        let result = self
            .coll::<NewAdmin>()
            .insert_one(&admin, None)
            .await
            .map_err(|e| {
                conflict_or_db(e, || {
                    format!("Admin username already in use: {}", admin.username)
                })
            })?;
        Ok(Admin {
            id: inserted_id(result.inserted_id)?,
            admin,
        })
    }
}
