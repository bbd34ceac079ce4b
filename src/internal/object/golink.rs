//! The GoLink object: a Markdown link whose title carries `#go/<name>`,
//! giving a short mnemonic URL. Go-names are globally unique within the
//! repository; lint reports duplicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    clock,
    internal::object::{NtObject, ObjectKind, State},
    oid::Oid,
    parser::ParsedGoLink,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoLink {
    pub oid: Oid,
    pub note_oid: Oid,
    pub text: String,
    pub url: String,
    pub title: String,
    pub go_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub state: State,
}

impl GoLink {
    pub fn new_or_existing(
        parsed: &ParsedGoLink,
        note_oid: Oid,
        previous: Option<&GoLink>,
    ) -> GoLink {
        let now = clock::now();
        match previous {
            Some(prev) => {
                let changed = prev.text != parsed.text
                    || prev.url != parsed.url
                    || prev.title != parsed.title;
                GoLink {
                    oid: prev.oid,
                    note_oid,
                    text: parsed.text.clone(),
                    url: parsed.url.clone(),
                    title: parsed.title.clone(),
                    go_name: parsed.go_name.clone(),
                    created_at: prev.created_at,
                    updated_at: if changed { now } else { prev.updated_at },
                    state: if changed { State::Modified } else { State::None },
                }
            }
            None => GoLink {
                oid: Oid::random(),
                note_oid,
                text: parsed.text.clone(),
                url: parsed.url.clone(),
                title: parsed.title.clone(),
                go_name: parsed.go_name.clone(),
                created_at: now,
                updated_at: now,
                state: State::Added,
            },
        }
    }
}

impl NtObject for GoLink {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::GoLink
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
        format!("go/{} -> {}", self.go_name, self.url)
    }
}
