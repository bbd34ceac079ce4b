//! Spaced-repetition scheduling (SM-2 style).
//!
//! Transitions are pure: [`review`] maps a settings snapshot and a feedback
//! to the next snapshot plus the new due date. The flashcard object persists
//! the result and a [`Review`] row records what happened. Late reviews extend
//! the interval by the overdue amount before the multiplier applies.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::oid::Oid;

/// Minimum ease factor; SM-2's floor.
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// User feedback for one review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Again,
    Hard,
    Good,
    Easy,
    #[serde(rename = "too-easy")]
    TooEasy,
    #[serde(rename = "too-hard")]
    TooHard,
}

/// Which scheduling queue a card sits in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardQueue {
    Suspend,
    #[default]
    New,
    Learn,
    Review,
    #[serde(rename = "day-learn")]
    DayLearn,
}

/// Maturity of a card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
}

/// Algorithm state carried by every flashcard.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SrsSettings {
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub lapses: u32,
    pub queue: CardQueue,
    pub card_type: CardType,
}

impl Default for SrsSettings {
    fn default() -> Self {
        Self {
            ease_factor: 2.5,
            interval_days: 0,
            repetitions: 0,
            lapses: 0,
            queue: CardQueue::New,
            card_type: CardType::New,
        }
    }
}

/// One persisted review event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub flashcard_oid: Oid,
    pub feedback: Feedback,
    /// How long the user looked at the card.
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    /// Snapshot of the settings after the transition.
    pub settings: SrsSettings,
}

/// Outcome of one transition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scheduled {
    pub settings: SrsSettings,
    pub due_at: DateTime<Utc>,
}

/// Apply one feedback at time `t`.
///
/// `previous_due` feeds the late-review adjustment: when `t` is past the
/// previous due date, the elapsed overdue days stretch the interval before
/// the multiplier applies.
pub fn review(
    settings: &SrsSettings,
    feedback: Feedback,
    t: DateTime<Utc>,
    previous_due: Option<DateTime<Utc>>,
) -> Scheduled {
    let mut next = *settings;

    // Late bonus: days overdue are added to the effective interval.
    let overdue_days = previous_due
        .filter(|due| t > *due)
        .map(|due| (t - due).num_days().max(0) as u32)
        .unwrap_or(0);
    let effective_interval = settings.interval_days.saturating_add(overdue_days);

    match feedback {
        Feedback::Again => {
            next.lapses += 1;
            next.ease_factor = (settings.ease_factor - 0.2).max(MIN_EASE_FACTOR);
            next.interval_days = 1;
            next.card_type = CardType::Relearning;
            next.queue = CardQueue::Learn;
        }
        Feedback::Hard => {
            next.ease_factor = (settings.ease_factor - 0.15).max(MIN_EASE_FACTOR);
            next.interval_days = ((effective_interval as f64 * 1.2).round() as u32).max(1);
            next.repetitions += 1;
            next.card_type = graduate(settings.card_type);
            next.queue = queue_for(next.card_type);
        }
        Feedback::Good => {
            // A new card takes its first 1-day step; a learning or
            // relearning card graduates at 6 days; a mature card scales by
            // its ease factor.
            next.interval_days = match settings.card_type {
                CardType::New => 1,
                CardType::Learning | CardType::Relearning => 6,
                CardType::Review => {
                    ((effective_interval as f64 * settings.ease_factor).round() as u32).max(1)
                }
            };
            next.repetitions += 1;
            next.card_type = graduate(settings.card_type);
            next.queue = queue_for(next.card_type);
        }
        Feedback::Easy => {
            next.ease_factor = settings.ease_factor + 0.15;
            next.interval_days = ((effective_interval.max(1) as f64) * next.ease_factor * 1.3)
                .round()
                .max(1.0) as u32;
            next.repetitions += 1;
            next.card_type = CardType::Review;
            next.queue = CardQueue::Review;
        }
        Feedback::TooEasy => {
            next.queue = CardQueue::Suspend;
            next.interval_days = 365;
        }
        Feedback::TooHard => {
            next = SrsSettings::default();
        }
    }

    Scheduled {
        settings: next,
        due_at: t + Duration::days(next.interval_days.max(1) as i64),
    }
}

/// One step up the maturity ladder.
fn graduate(card_type: CardType) -> CardType {
    match card_type {
        CardType::New => CardType::Learning,
        CardType::Learning | CardType::Relearning | CardType::Review => CardType::Review,
    }
}

fn queue_for(card_type: CardType) -> CardQueue {
    match card_type {
        CardType::New => CardQueue::New,
        CardType::Learning | CardType::Relearning => CardQueue::Learn,
        CardType::Review => CardQueue::Review,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 7, day, 9, 0, 0).unwrap()
    }

    /// Feedback sequence (Good, Good, Again, Good) produces intervals
    /// (1, 6, 1, 6) and ease (2.5, 2.5, 2.3, 2.3).
    #[test]
    fn test_good_good_again_good() {
        let mut settings = SrsSettings::default();
        let mut intervals = Vec::new();
        let mut eases = Vec::new();
        for (i, feedback) in [Feedback::Good, Feedback::Good, Feedback::Again, Feedback::Good]
            .iter()
            .enumerate()
        {
            let out = review(&settings, *feedback, at(1 + i as u32), None);
            settings = out.settings;
            intervals.push(out.settings.interval_days);
            eases.push(out.settings.ease_factor);
        }
        assert_eq!(intervals, vec![1, 6, 1, 6]);
        assert_eq!(eases, vec![2.5, 2.5, 2.3, 2.3]);
    }

    #[test]
    fn test_ease_floor() {
        let mut settings = SrsSettings {
            ease_factor: 1.35,
            ..Default::default()
        };
        let out = review(&settings, Feedback::Again, at(1), None);
        assert_eq!(out.settings.ease_factor, MIN_EASE_FACTOR);
        settings = out.settings;
        let out = review(&settings, Feedback::Hard, at(2), None);
        assert_eq!(out.settings.ease_factor, MIN_EASE_FACTOR);
    }

    #[test]
    fn test_again_does_not_increase_repetitions() {
        let settings = SrsSettings {
            repetitions: 3,
            interval_days: 12,
            ..Default::default()
        };
        let out = review(&settings, Feedback::Again, at(1), None);
        assert_eq!(out.settings.repetitions, 3);
        assert_eq!(out.settings.lapses, 1);
        assert_eq!(out.settings.interval_days, 1);
        assert_eq!(out.settings.card_type, CardType::Relearning);
        assert_eq!(out.settings.queue, CardQueue::Learn);
    }

    #[test]
    fn test_due_always_in_future() {
        for feedback in [
            Feedback::Again,
            Feedback::Hard,
            Feedback::Good,
            Feedback::Easy,
            Feedback::TooEasy,
            Feedback::TooHard,
        ] {
            let out = review(&SrsSettings::default(), feedback, at(1), None);
            assert!(out.due_at > at(1), "{feedback:?} must schedule ahead");
        }
    }

    #[test]
    fn test_hard_multiplier() {
        let settings = SrsSettings {
            interval_days: 10,
            repetitions: 2,
            ..Default::default()
        };
        let out = review(&settings, Feedback::Hard, at(1), None);
        assert_eq!(out.settings.interval_days, 12);
    }

    #[test]
    fn test_late_review_extends_interval() {
        let settings = SrsSettings {
            interval_days: 10,
            repetitions: 2,
            card_type: CardType::Review,
            queue: CardQueue::Review,
            ..Default::default()
        };
        // Reviewed 4 days late: effective interval 14, ×2.5 = 35.
        let out = review(&settings, Feedback::Good, at(15), Some(at(11)));
        assert_eq!(out.settings.interval_days, 35);
    }

    #[test]
    fn test_too_easy_suspends() {
        let out = review(&SrsSettings::default(), Feedback::TooEasy, at(1), None);
        assert_eq!(out.settings.queue, CardQueue::Suspend);
        assert_eq!(out.settings.interval_days, 365);
    }

    #[test]
    fn test_too_hard_resets() {
        let settings = SrsSettings {
            ease_factor: 2.8,
            interval_days: 120,
            repetitions: 9,
            lapses: 2,
            queue: CardQueue::Review,
            card_type: CardType::Review,
        };
        let out = review(&settings, Feedback::TooHard, at(1), None);
        assert_eq!(out.settings, SrsSettings::default());
    }
}
