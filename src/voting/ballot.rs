//! Ballot rendering.
//!
//! The ballot is produced as structured data; turning it into markup is the
//! client's job. Rendering also compacts the stored position priorities to
//! `1..=N` in display order, so every render writes.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    db::{candidate::Candidate, position::Position},
    mongodb::Id,
    store::RecordStore,
};

use super::{locks::RenumberLock, slug::slugify};

/// The kind of input used to pick candidates for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    /// Mutually exclusive choice; the form field is `<slug>`.
    Radio,
    /// Independent choices up to the position's cap; the form field is `<slug>[]`.
    Checkbox,
}

/// A complete ballot, positions in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ballot {
    pub positions: Vec<BallotPosition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BallotPosition {
    pub id: ApiId,
    pub name: String,
    /// Identifier-safe form of the name; also the CSS class on each input.
    pub slug: String,
    /// The form field the selected candidate IDs must be submitted under.
    pub field: String,
    pub priority: u32,
    pub max_vote: u32,
    pub widget: Widget,
    pub instruction: String,
    pub candidates: Vec<BallotCandidate>,
    /// Reordering affordances, only present on the admin view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controls: Option<ReorderControls>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BallotCandidate {
    pub id: ApiId,
    pub fullname: String,
    pub bio: String,
    pub photo_url: String,
}

impl From<Candidate> for BallotCandidate {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            photo_url: candidate.photo_url(),
            fullname: candidate.candidate.fullname,
            bio: candidate.candidate.bio,
        }
    }
}

/// Whether the move buttons for a position are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReorderControls {
    pub move_up: bool,
    pub move_down: bool,
}

/// Which way to move a position in the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// The form field name for a position with the given slug and cap.
pub fn field_name(slug: &str, max_vote: u32) -> String {
    if max_vote > 1 {
        format!("{slug}[]")
    } else {
        slug.to_string()
    }
}

/// The voter-facing instruction for a position with the given cap.
pub fn instruction(max_vote: u32) -> String {
    if max_vote > 1 {
        format!("You may select up to {max_vote} candidates")
    } else {
        "Select only one candidate".to_string()
    }
}

/// Build the ballot, renumbering position priorities to match the
/// rendered order.
pub async fn render_ballot(
    store: &dyn RecordStore,
    renumber: &RenumberLock,
    admin_controls: bool,
) -> Result<Ballot> {
    let _guard = renumber.lock().await;

    let positions = store.positions_by_priority().await?;
    let count = positions.len();
    let mut rendered = Vec::with_capacity(count);
    for (index, position) in positions.into_iter().enumerate() {
        let rank = index as u32 + 1;
        let id = position.id;
        let candidates = store.candidates_for_position(id).await?;
        let controls = admin_controls.then_some(ReorderControls {
            move_up: rank > 1,
            move_down: index + 1 < count,
        });
        rendered.push(view_position(position, rank, candidates, controls));
        store.set_priority(id, rank).await?;
    }
    debug!("Rendered ballot with {count} positions");

    Ok(Ballot {
        positions: rendered,
    })
}

fn view_position(
    position: Position,
    rank: u32,
    candidates: Vec<Candidate>,
    controls: Option<ReorderControls>,
) -> BallotPosition {
    let slug = slugify(&position.name);
    let max_vote = position.max_vote;
    BallotPosition {
        id: position.id.into(),
        field: field_name(&slug, max_vote),
        slug,
        priority: rank,
        max_vote,
        widget: if position.is_multi_select() {
            Widget::Checkbox
        } else {
            Widget::Radio
        },
        instruction: instruction(max_vote),
        candidates: candidates.into_iter().map(Into::into).collect(),
        controls,
        name: position.position.name,
    }
}

/// Swap a position with its neighbour in display order. Priorities are
/// compacted to `1..=N` as part of the move.
pub async fn move_position(
    store: &dyn RecordStore,
    renumber: &RenumberLock,
    id: Id,
    direction: Direction,
) -> Result<()> {
    let _guard = renumber.lock().await;

    let mut positions = store.positions_by_priority().await?;
    let index = positions
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| Error::not_found(format!("Position with ID '{id}'")))?;
    let neighbour = match direction {
        Direction::Up => index.checked_sub(1),
        Direction::Down => Some(index + 1).filter(|&i| i < positions.len()),
    }
    .ok_or_else(|| {
        Error::bad_request(format!(
            "Position '{}' cannot move {}",
            positions[index].name,
            match direction {
                Direction::Up => "up",
                Direction::Down => "down",
            }
        ))
    })?;
    positions.swap(index, neighbour);

    for (index, position) in positions.iter().enumerate() {
        store.set_priority(position.id, index as u32 + 1).await?;
    }
    info!("Moved position {id} {direction:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::model::{
        db::{candidate::NewCandidate, position::NewPosition},
        store::MemoryStore,
    };

    use super::*;

    async fn position(store: &MemoryStore, name: &str, priority: u32, max_vote: u32) -> Position {
        store
            .insert_position(NewPosition {
                name: name.to_string(),
                priority,
                max_vote,
            })
            .await
            .unwrap()
    }

    async fn stored_priorities(store: &MemoryStore) -> Vec<(String, u32)> {
        store
            .positions_by_priority()
            .await
            .unwrap()
            .into_iter()
            .map(|p| (p.position.name, p.position.priority))
            .collect()
    }

    #[rocket::async_test]
    async fn renders_in_priority_order_and_renumbers() {
        let store = MemoryStore::new();
        position(&store, "Treasurer", 3, 1).await;
        position(&store, "President", 1, 1).await;
        position(&store, "Secretary", 2, 1).await;

        let ballot = render_ballot(&store, &RenumberLock::default(), false)
            .await
            .unwrap();

        let order: Vec<_> = ballot
            .positions
            .iter()
            .map(|p| (p.name.as_str(), p.priority))
            .collect();
        assert_eq!(
            order,
            [("President", 1), ("Secretary", 2), ("Treasurer", 3)]
        );
        assert_eq!(
            stored_priorities(&store).await,
            [
                ("President".to_string(), 1),
                ("Secretary".to_string(), 2),
                ("Treasurer".to_string(), 3)
            ]
        );
    }

    #[rocket::async_test]
    async fn gaps_in_priorities_are_compacted() {
        let store = MemoryStore::new();
        position(&store, "A", 10, 1).await;
        position(&store, "B", 40, 1).await;
        let lock = RenumberLock::default();

        render_ballot(&store, &lock, false).await.unwrap();
        let first = stored_priorities(&store).await;
        render_ballot(&store, &lock, false).await.unwrap();

        assert_eq!(first, [("A".to_string(), 1), ("B".to_string(), 2)]);
        assert_eq!(stored_priorities(&store).await, first);
    }

    #[rocket::async_test]
    async fn widgets_and_instructions_follow_max_vote() {
        let store = MemoryStore::new();
        let president = position(&store, "President", 1, 1).await;
        let senator = position(&store, "Senate Seat", 2, 3).await;
        for name in ["Alice", "Bob"] {
            store
                .insert_candidate(NewCandidate::example(name, president.id))
                .await
                .unwrap();
        }
        store
            .insert_candidate(NewCandidate::example("Carol", senator.id))
            .await
            .unwrap();

        let ballot = render_ballot(&store, &RenumberLock::default(), false)
            .await
            .unwrap();
        let president = &ballot.positions[0];
        assert_eq!(president.widget, Widget::Radio);
        assert_eq!(president.field, "president");
        assert_eq!(president.instruction, "Select only one candidate");
        assert_eq!(president.candidates.len(), 2);
        assert_eq!(president.candidates[0].fullname, "Alice");
        assert_eq!(president.candidates[0].photo_url, "/media/candidates/alice.jpg");

        let senator = &ballot.positions[1];
        assert_eq!(senator.widget, Widget::Checkbox);
        assert_eq!(senator.slug, "senate-seat");
        assert_eq!(senator.field, "senate-seat[]");
        assert_eq!(senator.instruction, "You may select up to 3 candidates");
        assert_eq!(senator.controls, None);
    }

    #[rocket::async_test]
    async fn empty_position_still_renders() {
        let store = MemoryStore::new();
        position(&store, "Auditor", 1, 2).await;

        let ballot = render_ballot(&store, &RenumberLock::default(), false)
            .await
            .unwrap();

        assert_eq!(ballot.positions.len(), 1);
        assert!(ballot.positions[0].candidates.is_empty());
        assert_eq!(
            ballot.positions[0].instruction,
            "You may select up to 2 candidates"
        );
    }

    #[rocket::async_test]
    async fn admin_controls_disable_edges() {
        let store = MemoryStore::new();
        for (name, priority) in [("A", 1), ("B", 2), ("C", 3)] {
            position(&store, name, priority, 1).await;
        }

        let ballot = render_ballot(&store, &RenumberLock::default(), true)
            .await
            .unwrap();
        let controls: Vec<_> = ballot
            .positions
            .iter()
            .map(|p| p.controls.unwrap())
            .map(|c| (c.move_up, c.move_down))
            .collect();
        assert_eq!(controls, [(false, true), (true, true), (true, false)]);
    }

    #[rocket::async_test]
    async fn single_position_cannot_move_either_way() {
        let store = MemoryStore::new();
        let only = position(&store, "Only", 1, 1).await;
        let lock = RenumberLock::default();

        let ballot = render_ballot(&store, &lock, true).await.unwrap();
        assert_eq!(
            ballot.positions[0].controls,
            Some(ReorderControls {
                move_up: false,
                move_down: false
            })
        );
        assert!(move_position(&store, &lock, only.id, Direction::Up)
            .await
            .is_err());
        assert!(move_position(&store, &lock, only.id, Direction::Down)
            .await
            .is_err());
    }

    #[rocket::async_test]
    async fn moving_swaps_with_neighbour() {
        let store = MemoryStore::new();
        position(&store, "A", 1, 1).await;
        let b = position(&store, "B", 5, 1).await;
        position(&store, "C", 9, 1).await;
        let lock = RenumberLock::default();

        move_position(&store, &lock, b.id, Direction::Up).await.unwrap();
        assert_eq!(
            stored_priorities(&store).await,
            [
                ("B".to_string(), 1),
                ("A".to_string(), 2),
                ("C".to_string(), 3)
            ]
        );

        move_position(&store, &lock, b.id, Direction::Down)
            .await
            .unwrap();
        move_position(&store, &lock, b.id, Direction::Down)
            .await
            .unwrap();
        assert_eq!(
            stored_priorities(&store).await,
            [
                ("A".to_string(), 1),
                ("C".to_string(), 2),
                ("B".to_string(), 3)
            ]
        );
    }

    #[rocket::async_test]
    async fn moving_unknown_position_is_not_found() {
        let store = MemoryStore::new();
        let err = move_position(&store, &RenumberLock::default(), Id::new(), Direction::Up)
            .await
            .unwrap_err();
        assert_eq!(err.status(), rocket::http::Status::NotFound);
    }
}
