//! The Reminder object: a recurrence-tagged item inside a note.
//!
//! Each `` `#reminder-<expr>` `` occurrence becomes one record. The
//! expression is evaluated against the clock to fill `next_performed_at`;
//! marking a recurring reminder done moves `last_performed_at` forward and
//! re-evaluates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    clock,
    errors::NtError,
    internal::object::{NtObject, ObjectKind, State},
    oid::Oid,
    parser::ParsedReminder,
    recurrence::Recurrence,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub oid: Oid,
    pub file_oid: Oid,
    pub note_oid: Oid,
    /// The enclosing list-item text, or the note's short title.
    pub description: String,
    /// The raw tag, `#reminder-` prefix included.
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_performed_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_performed_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub state: State,
}

impl Reminder {
    pub fn new_or_existing(
        parsed: &ParsedReminder,
        file_oid: Oid,
        note_oid: Oid,
        previous: Option<&Reminder>,
    ) -> Result<Reminder, NtError> {
        let now = clock::now();
        let recurrence = Recurrence::parse(&parsed.expression)?;
        match previous {
            Some(prev) => {
                let changed =
                    prev.description != parsed.description || prev.tag != parsed.tag;
                let next_performed_at = if prev.tag == parsed.tag {
                    prev.next_performed_at
                } else {
                    Some(recurrence.next_after(clock::today())?)
                };
                Ok(Reminder {
                    oid: prev.oid,
                    file_oid,
                    note_oid,
                    description: parsed.description.clone(),
                    tag: parsed.tag.clone(),
                    last_performed_at: prev.last_performed_at,
                    next_performed_at,
                    created_at: prev.created_at,
                    updated_at: if changed { now } else { prev.updated_at },
                    state: if changed { State::Modified } else { State::None },
                })
            }
            None => Ok(Reminder {
                oid: Oid::random(),
                file_oid,
                note_oid,
                description: parsed.description.clone(),
                tag: parsed.tag.clone(),
                last_performed_at: None,
                next_performed_at: Some(recurrence.next_after(clock::today())?),
                created_at: now,
                updated_at: now,
                state: State::Added,
            }),
        }
    }

    /// The recurrence expression behind the tag.
    pub fn expression(&self) -> &str {
        self.tag.strip_prefix("#reminder-").unwrap_or(&self.tag)
    }

    /// Mark the reminder performed today. Recurring reminders re-evaluate;
    /// one-shot reminders clear their next date.
    pub fn mark_performed(&mut self) -> Result<(), NtError> {
        let today = clock::today();
        self.last_performed_at = Some(today);
        let recurrence = Recurrence::parse(self.expression())?;
        self.next_performed_at = if recurrence.recurring {
            Some(recurrence.next_after(today)?)
        } else {
            None
        };
        self.updated_at = clock::now();
        if self.state == State::None {
            self.state = State::Modified;
        }
        Ok(())
    }
}

impl NtObject for Reminder {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Reminder
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
        format!("reminder \"{}\" ({})", self.description, self.expression())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::clock::freeze_at;

    use super::*;

    fn parsed(expr: &str) -> ParsedReminder {
        ParsedReminder {
            note: 0,
            description: "Water the plants".to_string(),
            tag: format!("#reminder-{expr}"),
            expression: expr.to_string(),
        }
    }

    #[test]
    fn test_new_reminder_schedules() {
        let _guard = freeze_at(Utc.with_ymd_and_hms(2023, 7, 1, 9, 0, 0).unwrap());
        let reminder =
            Reminder::new_or_existing(&parsed("every-${tuesday}"), Oid::random(), Oid::random(), None)
                .unwrap();
        assert_eq!(reminder.state, State::Added);
        assert_eq!(
            reminder.next_performed_at,
            Some(NaiveDate::from_ymd_opt(2023, 7, 4).unwrap())
        );
    }

    #[test]
    fn test_unchanged_reminder_keeps_schedule() {
        let _guard = freeze_at(Utc.with_ymd_and_hms(2023, 7, 1, 9, 0, 0).unwrap());
        let first =
            Reminder::new_or_existing(&parsed("every-${tuesday}"), Oid::random(), Oid::random(), None)
                .unwrap();
        let second = Reminder::new_or_existing(
            &parsed("every-${tuesday}"),
            first.file_oid,
            first.note_oid,
            Some(&first),
        )
        .unwrap();
        assert_eq!(second.state, State::None);
        assert_eq!(second.next_performed_at, first.next_performed_at);
    }

    #[test]
    fn test_mark_performed_recurring() {
        let _guard = freeze_at(Utc.with_ymd_and_hms(2023, 7, 1, 9, 0, 0).unwrap());
        let mut reminder =
            Reminder::new_or_existing(&parsed("every-${tuesday}"), Oid::random(), Oid::random(), None)
                .unwrap();
        reminder.mark_performed().unwrap();
        assert_eq!(
            reminder.last_performed_at,
            Some(NaiveDate::from_ymd_opt(2023, 7, 1).unwrap())
        );
        assert_eq!(
            reminder.next_performed_at,
            Some(NaiveDate::from_ymd_opt(2023, 7, 4).unwrap())
        );
    }

    #[test]
    fn test_mark_performed_one_shot_clears() {
        let _guard = freeze_at(Utc.with_ymd_and_hms(2023, 7, 1, 9, 0, 0).unwrap());
        let mut reminder =
            Reminder::new_or_existing(&parsed("2023-12-25"), Oid::random(), Oid::random(), None)
                .unwrap();
        reminder.mark_performed().unwrap();
        assert_eq!(reminder.next_performed_at, None);
    }

    #[test]
    fn test_bad_expression_fails() {
        let err =
            Reminder::new_or_existing(&parsed("every-${fortnight}"), Oid::random(), Oid::random(), None)
                .unwrap_err();
        assert!(matches!(err, NtError::UnsupportedExpression(_)));
    }

    #[test]
    fn test_yaml_round_trip() {
        let _guard = freeze_at(Utc.with_ymd_and_hms(2023, 7, 1, 9, 0, 0).unwrap());
        let reminder =
            Reminder::new_or_existing(&parsed("every-${tuesday}"), Oid::random(), Oid::random(), None)
                .unwrap();
        let yaml = reminder.to_yaml().unwrap();
        let mut back = Reminder::from_yaml(&yaml).unwrap();
        back.state = reminder.state;
        assert_eq!(back, reminder);
    }
}
