//! The Flashcard object, one-to-one with a Note of kind `Flashcard`.
//!
//! Carries the front/back Markdown plus the spaced-repetition state. Edits
//! to the card text mark the record modified but never touch the study
//! state; only the scheduler mutates that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    clock,
    internal::object::{NtObject, ObjectKind, State},
    oid::Oid,
    parser::ParsedFlashcard,
    srs::SrsSettings,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub oid: Oid,
    pub file_oid: Oid,
    pub note_oid: Oid,
    pub slug: String,
    pub short_title: String,
    pub tags: Vec<String>,
    pub front: String,
    pub back: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_studied_at: Option<DateTime<Utc>>,
    pub settings: SrsSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub state: State,
}

impl Flashcard {
    pub fn new_or_existing(
        parsed: &ParsedFlashcard,
        slug: &str,
        file_oid: Oid,
        note_oid: Oid,
        previous: Option<&Flashcard>,
    ) -> Flashcard {
        let now = clock::now();
        match previous {
            Some(prev) => {
                let changed = prev.front != parsed.front
                    || prev.back != parsed.back
                    || prev.short_title != parsed.short_title
                    || prev.tags != parsed.tags
                    || prev.slug != slug;
                Flashcard {
                    oid: prev.oid,
                    file_oid,
                    note_oid,
                    slug: slug.to_string(),
                    short_title: parsed.short_title.clone(),
                    tags: parsed.tags.clone(),
                    front: parsed.front.clone(),
                    back: parsed.back.clone(),
                    // Study state survives edits.
                    due_at: prev.due_at,
                    last_studied_at: prev.last_studied_at,
                    settings: prev.settings,
                    created_at: prev.created_at,
                    updated_at: if changed { now } else { prev.updated_at },
                    state: if changed { State::Modified } else { State::None },
                }
            }
            None => Flashcard {
                oid: Oid::random(),
                file_oid,
                note_oid,
                slug: slug.to_string(),
                short_title: parsed.short_title.clone(),
                tags: parsed.tags.clone(),
                front: parsed.front.clone(),
                back: parsed.back.clone(),
                due_at: None,
                last_studied_at: None,
                settings: SrsSettings::default(),
                created_at: now,
                updated_at: now,
                state: State::Added,
            },
        }
    }

    /// Record a review outcome produced by the scheduler.
    pub fn apply_review(&mut self, settings: SrsSettings, due_at: DateTime<Utc>) {
        self.settings = settings;
        self.due_at = Some(due_at);
        self.last_studied_at = Some(clock::now());
        self.updated_at = clock::now();
        if self.state == State::None {
            self.state = State::Modified;
        }
    }

    /// True when the card should be shown at time `t`.
    pub fn is_due(&self, t: DateTime<Utc>) -> bool {
        match self.due_at {
            Some(due) => due <= t,
            None => true,
        }
    }
}

impl NtObject for Flashcard {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Flashcard
    }

    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }

    fn mtime(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn desc(&self) -> String {
        format!("flashcard \"{}\"", self.short_title)
    }
}
