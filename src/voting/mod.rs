//! The voting core: ballot rendering, selection checking, vote submission,
//! OTP verification, and the voter dashboard flow.

pub mod ballot;
pub mod dashboard;
pub mod locks;
pub mod otp;
pub mod selection;
pub mod slug;
pub mod sms;
pub mod submission;

/// Shared data for tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::model::{
        db::{
            candidate::{Candidate, NewCandidate},
            position::{NewPosition, Position},
        },
        store::RecordStore,
    };

    /// President (pick one of Alice, Bob) and Senator (pick up to two of
    /// Carol, Dave, Erin). Candidates are returned in that order.
    pub async fn election(store: &dyn RecordStore) -> (Vec<Position>, Vec<Candidate>) {
        let president = store
            .insert_position(NewPosition::example_single())
            .await
            .unwrap();
        let senator = store
            .insert_position(NewPosition::example_multi())
            .await
            .unwrap();
        let mut candidates = Vec::new();
        for (name, position) in [
            ("Alice", &president),
            ("Bob", &president),
            ("Carol", &senator),
            ("Dave", &senator),
            ("Erin", &senator),
        ] {
            candidates.push(
                store
                    .insert_candidate(NewCandidate::example(name, position.id))
                    .await
                    .unwrap(),
            );
        }
        (vec![president, senator], candidates)
    }
}
