//! Checking a submitted ballot against the positions on offer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    db::{candidate::Candidate, position::Position},
    mongodb::Id,
    store::RecordStore,
};

use super::{ballot::field_name, slug::slugify};

/// A single submitted form field: either one value or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    One(String),
    Many(Vec<String>),
}

impl FieldValue {
    /// Every submitted value, in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(value) => vec![value.as_str()],
            Self::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// The first submitted value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(value) => Some(value.as_str()),
            Self::Many(values) => values.first().map(String::as_str),
        }
    }
}

/// A raw ballot, exactly as submitted: form field names mapped to values.
///
/// Single-choice positions are submitted under `<slug>`, multiple-choice
/// positions under `<slug>[]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BallotForm(BTreeMap<String, FieldValue>);

impl BallotForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single-valued field.
    pub fn one(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(field.into(), FieldValue::One(value.into()));
        self
    }

    /// Set a multi-valued field.
    pub fn many<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.0.insert(field.into(), FieldValue::Many(values));
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One accepted choice: a candidate for the position they stand for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub position: Position,
    pub candidate: Candidate,
}

/// More candidates were picked for a position than it allows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Max {max_vote} candidates allowed for {position}")]
pub struct TooManySelections {
    pub position_id: Id,
    pub position: String,
    pub max_vote: u32,
    pub submitted: usize,
}

/// Check a submitted ballot against the given positions, in order, and
/// resolve the candidate IDs it names.
///
/// Picking more candidates than a position allows rejects the whole ballot.
/// Anything else that is wrong with an individual pick (an ID that doesn't
/// parse, names nobody, names a candidate for another position, or is
/// repeated) drops just that pick, so a voter is never locked out of a ballot
/// by a stale or tampered field.
pub async fn validate(
    store: &dyn RecordStore,
    form: &BallotForm,
    positions: &[Position],
) -> Result<Vec<Selection>, TooManySelections> {
    let mut selections = Vec::new();
    for position in positions {
        let field = field_name(&slugify(&position.name), position.max_vote);
        let Some(value) = form.get(&field) else {
            continue;
        };

        let picked = if position.is_multi_select() {
            let values = value.values();
            if values.len() > position.max_vote as usize {
                return Err(TooManySelections {
                    position_id: position.id,
                    position: position.name.clone(),
                    max_vote: position.max_vote,
                    submitted: values.len(),
                });
            }
            values
        } else {
            value.first().into_iter().collect()
        };

        let mut chosen: Vec<Id> = Vec::with_capacity(picked.len());
        for raw_id in picked.into_iter().filter(|id| !id.is_empty()) {
            let Some(candidate) = resolve(store, position, raw_id).await else {
                continue;
            };
            if chosen.contains(&candidate.id) {
                warn!(
                    "Ignoring repeated pick of candidate {} for position '{}'",
                    candidate.id, position.name
                );
                continue;
            }
            chosen.push(candidate.id);
            selections.push(Selection {
                position: position.clone(),
                candidate,
            });
        }
    }
    Ok(selections)
}

/// Look up a candidate for the given position, logging why if that fails.
async fn resolve(store: &dyn RecordStore, position: &Position, raw_id: &str) -> Option<Candidate> {
    let id = match raw_id.parse::<Id>() {
        Ok(id) => id,
        Err(e) => {
            warn!("Ignoring malformed candidate ID '{raw_id}' for '{}': {e}", position.name);
            return None;
        }
    };
    match store.find_candidate_in_position(id, position.id).await {
        Ok(Some(candidate)) => Some(candidate),
        Ok(None) => {
            warn!("Ignoring unknown candidate {id} for position '{}'", position.name);
            None
        }
        Err(e) => {
            error!("Failed to look up candidate {id} for '{}': {e}", position.name);
            None
        }
    }
}

/// The picks for one position, as shown back to the voter before they submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub position: String,
    pub candidates: Vec<String>,
}

/// Group accepted selections by position, preserving order.
pub fn preview(selections: &[Selection]) -> Vec<PreviewEntry> {
    let mut entries: Vec<(Id, PreviewEntry)> = Vec::new();
    for selection in selections {
        let name = selection.candidate.fullname.clone();
        let current = entries
            .last_mut()
            .filter(|(id, _)| *id == selection.position.id);
        if let Some((_, entry)) = current {
            entry.candidates.push(name);
        } else {
            entries.push((
                selection.position.id,
                PreviewEntry {
                    position: selection.position.name.clone(),
                    candidates: vec![name],
                },
            ));
        }
    }
    entries.into_iter().map(|(_, entry)| entry).collect()
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use crate::{model::store::MemoryStore, voting::fixtures::election};

    use super::*;

    fn names(selections: &[Selection]) -> Vec<(&str, &str)> {
        selections
            .iter()
            .map(|s| (s.position.name.as_str(), s.candidate.fullname.as_str()))
            .collect()
    }

    #[rocket::async_test]
    async fn accepts_picks_within_limits() {
        let store = MemoryStore::new();
        let (positions, c) = election(&store).await;
        let form = BallotForm::new()
            .one("president", c[0].id.to_string())
            .many("senator[]", [c[2].id.to_string(), c[3].id.to_string()]);

        let selections = validate(&store, &form, &positions).await.unwrap();

        assert_eq!(
            names(&selections),
            [
                ("President", "Alice"),
                ("Senator", "Carol"),
                ("Senator", "Dave")
            ]
        );
    }

    #[rocket::async_test]
    async fn rejects_too_many_picks() {
        let store = MemoryStore::new();
        let (positions, c) = election(&store).await;
        let form = BallotForm::new().many(
            "senator[]",
            [c[2].id.to_string(), c[3].id.to_string(), c[4].id.to_string()],
        );

        let err = validate(&store, &form, &positions).await.unwrap_err();

        assert_eq!(err.position, "Senator");
        assert_eq!(err.position_id, positions[1].id);
        assert_eq!(err.submitted, 3);
        assert_eq!(err.to_string(), "Max 2 candidates allowed for Senator");
    }

    #[rocket::async_test]
    async fn drops_unresolvable_picks() {
        let store = MemoryStore::new();
        let (positions, c) = election(&store).await;
        let form = BallotForm::new()
            // Bob stands for President, not Senator.
            .many("senator[]", [c[1].id.to_string(), "garbage".to_string()])
            .one("president", Id::new().to_string());

        let selections = validate(&store, &form, &positions).await.unwrap();

        assert!(selections.is_empty());
    }

    #[rocket::async_test]
    async fn abstaining_is_allowed() {
        let store = MemoryStore::new();
        let (positions, c) = election(&store).await;
        let form = BallotForm::new()
            .one("president", "")
            .many("senator[]", [c[4].id.to_string()]);

        let selections = validate(&store, &form, &positions).await.unwrap();

        assert_eq!(names(&selections), [("Senator", "Erin")]);
    }

    #[rocket::async_test]
    async fn single_choice_takes_first_of_many() {
        let store = MemoryStore::new();
        let (positions, c) = election(&store).await;
        let form =
            BallotForm::new().many("president", [c[1].id.to_string(), c[0].id.to_string()]);

        let selections = validate(&store, &form, &positions).await.unwrap();

        assert_eq!(names(&selections), [("President", "Bob")]);
    }

    #[rocket::async_test]
    async fn repeated_picks_count_once() {
        let store = MemoryStore::new();
        let (positions, c) = election(&store).await;
        let form =
            BallotForm::new().many("senator[]", [c[2].id.to_string(), c[2].id.to_string()]);

        let selections = validate(&store, &form, &positions).await.unwrap();

        assert_eq!(names(&selections), [("Senator", "Carol")]);
    }

    #[rocket::async_test]
    async fn unknown_fields_are_ignored() {
        let store = MemoryStore::new();
        let (positions, c) = election(&store).await;
        // A multi-select position submitted without the `[]` suffix is not read.
        let form = BallotForm::new()
            .one("senator", c[2].id.to_string())
            .one("submit_vote", "1");

        let selections = validate(&store, &form, &positions).await.unwrap();

        assert!(selections.is_empty());
    }

    #[rocket::async_test]
    async fn preview_groups_by_position() {
        let store = MemoryStore::new();
        let (positions, c) = election(&store).await;
        let form = BallotForm::new()
            .one("president", c[1].id.to_string())
            .many("senator[]", [c[3].id.to_string(), c[4].id.to_string()]);
        let selections = validate(&store, &form, &positions).await.unwrap();

        let entries = preview(&selections);

        assert_eq!(
            entries,
            [
                PreviewEntry {
                    position: "President".to_string(),
                    candidates: vec!["Bob".to_string()],
                },
                PreviewEntry {
                    position: "Senator".to_string(),
                    candidates: vec!["Dave".to_string(), "Erin".to_string()],
                },
            ]
        );
        assert!(preview(&[]).is_empty());
    }

    #[test]
    fn form_deserializes_scalars_and_lists() {
        let form: BallotForm =
            serde_json::from_str(r#"{"president": "a", "senator[]": ["b", "c"]}"#).unwrap();
        assert_eq!(form.get("president").unwrap().values(), ["a"]);
        assert_eq!(form.get("senator[]").unwrap().values(), ["b", "c"]);
        assert_eq!(form.get("senator[]").unwrap().first(), Some("b"));
    }
}
