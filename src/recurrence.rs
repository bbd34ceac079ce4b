//! Reminder recurrence expressions.
//!
//! Grammar:
//!
//! ```text
//! expr    := ["every-"] [year ["-" month ["-" day]]]
//! year    := 4digit | "${year}" | "${odd-year}" | "${even-year}"
//! month   := 2digit | "${month}" | "${odd-month}" | "${even-month}"
//! day     := 2digit | "${day}" | "${" weekday "}"
//! weekday := "monday" | ... | "sunday"
//! ```
//!
//! [`evaluate`] returns the earliest date strictly after the clock's today
//! satisfying the expression. Components may be omitted from the left — a
//! bare `${tuesday}` constrains only the weekday — so each token is assigned
//! to the narrowest field it can denote. Evaluation materialises candidate
//! dates from a small set of plausible years and months, filters out the
//! past and takes the minimum.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::{clock, errors::NtError};

/// Constraint on the year component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum YearSpec {
    Any,
    Literal(i32),
    Odd,
    Even,
}

/// Constraint on the month component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MonthSpec {
    Any,
    Literal(u32),
    Odd,
    Even,
}

/// Constraint on the day component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DaySpec {
    Any,
    Literal(u32),
    Weekday(Weekday),
}

/// A parsed recurrence expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recurrence {
    /// `every-` prefix: the reminder reschedules after each completion.
    pub recurring: bool,
    year: YearSpec,
    month: MonthSpec,
    day: DaySpec,
}

impl Recurrence {
    /// Parse an expression such as `2025-12-25`, `every-${year}-08-01` or
    /// `every-${tuesday}`.
    pub fn parse(expr: &str) -> Result<Recurrence, NtError> {
        let unsupported = || NtError::UnsupportedExpression(expr.to_string());
        let mut rest = expr.trim();
        let recurring = match rest.strip_prefix("every-") {
            Some(tail) => {
                rest = tail;
                true
            }
            None => false,
        };
        if rest.is_empty() {
            return Err(unsupported());
        }

        let mut year = YearSpec::Any;
        let mut month = MonthSpec::Any;
        let mut day = DaySpec::Any;
        // Fields filled left to right; a token is assigned to the narrowest
        // component it can denote after the ones already seen.
        let mut next_field = 0;
        for token in split_tokens(rest) {
            let token = token?;
            let assigned = loop {
                match next_field {
                    0 => {
                        if let Some(spec) = parse_year(&token) {
                            year = spec;
                            break true;
                        }
                        next_field = 1;
                    }
                    1 => {
                        if let Some(spec) = parse_month(&token) {
                            month = spec;
                            break true;
                        }
                        next_field = 2;
                    }
                    2 => {
                        if let Some(spec) = parse_day(&token) {
                            day = spec;
                            break true;
                        }
                        break false;
                    }
                    _ => break false,
                }
            };
            if !assigned {
                return Err(unsupported());
            }
            next_field += 1;
        }

        Ok(Recurrence {
            recurring,
            year,
            month,
            day,
        })
    }

    /// The earliest date strictly after `today` satisfying the expression.
    pub fn next_after(&self, today: NaiveDate) -> Result<NaiveDate, NtError> {
        let years: Vec<i32> = match self.year {
            YearSpec::Literal(y) => vec![y],
            YearSpec::Any => vec![today.year(), today.year() + 1],
            YearSpec::Odd | YearSpec::Even => (0..=2)
                .map(|off| today.year() + off)
                .filter(|y| match self.year {
                    YearSpec::Odd => y % 2 != 0,
                    YearSpec::Even => y % 2 == 0,
                    _ => true,
                })
                .collect(),
        };
        let months: Vec<u32> = match self.month {
            MonthSpec::Literal(m) => vec![m],
            MonthSpec::Any => (1..=12).collect(),
            MonthSpec::Odd => (1..=12).filter(|m| m % 2 != 0).collect(),
            MonthSpec::Even => (1..=12).filter(|m| m % 2 == 0).collect(),
        };

        let mut best: Option<NaiveDate> = None;
        for year in &years {
            for month in &months {
                for date in self.days_in(*year, *month) {
                    if date > today && best.is_none_or(|b| date < b) {
                        best = Some(date);
                    }
                }
            }
        }
        best.ok_or_else(|| NtError::NoFutureDate(self.to_expression()))
    }

    fn days_in(&self, year: i32, month: u32) -> Vec<NaiveDate> {
        match self.day {
            DaySpec::Literal(d) => NaiveDate::from_ymd_opt(year, month, d).into_iter().collect(),
            DaySpec::Any => (1..=31)
                .filter_map(|d| NaiveDate::from_ymd_opt(year, month, d))
                .collect(),
            DaySpec::Weekday(weekday) => (1..=31)
                .filter_map(|d| NaiveDate::from_ymd_opt(year, month, d))
                .filter(|date| date.weekday() == weekday)
                .collect(),
        }
    }

    /// Rebuild the textual form (used in error messages).
    pub fn to_expression(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        match self.year {
            YearSpec::Literal(y) => parts.push(format!("{y:04}")),
            YearSpec::Odd => parts.push("${odd-year}".to_string()),
            YearSpec::Even => parts.push("${even-year}".to_string()),
            YearSpec::Any => {}
        }
        match self.month {
            MonthSpec::Literal(m) => parts.push(format!("{m:02}")),
            MonthSpec::Odd => parts.push("${odd-month}".to_string()),
            MonthSpec::Even => parts.push("${even-month}".to_string()),
            MonthSpec::Any => {}
        }
        match self.day {
            DaySpec::Literal(d) => parts.push(format!("{d:02}")),
            DaySpec::Weekday(w) => parts.push(format!("${{{}}}", weekday_name(w))),
            DaySpec::Any => {}
        }
        let joined = parts.join("-");
        if self.recurring {
            format!("every-{joined}")
        } else {
            joined
        }
    }
}

/// Evaluate an expression to the next date strictly after the clock's today.
pub fn evaluate(expr: &str) -> Result<NaiveDate, NtError> {
    Recurrence::parse(expr)?.next_after(clock::today())
}

/// Split on `-` while keeping `${...}` groups intact.
fn split_tokens(raw: &str) -> impl Iterator<Item = Result<String, NtError>> + '_ {
    let mut tokens: Vec<Result<String, NtError>> = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '-' if depth == 0 => {
                tokens.push(Ok(std::mem::take(&mut current)));
            }
            _ => current.push(c),
        }
    }
    if depth > 0 {
        tokens.push(Err(NtError::UnsupportedExpression(raw.to_string())));
    } else {
        tokens.push(Ok(current));
    }
    tokens.into_iter()
}

fn parse_year(token: &str) -> Option<YearSpec> {
    match token {
        "${year}" => Some(YearSpec::Any),
        "${odd-year}" => Some(YearSpec::Odd),
        "${even-year}" => Some(YearSpec::Even),
        _ if token.len() == 4 => token.parse().ok().map(YearSpec::Literal),
        _ => None,
    }
}

fn parse_month(token: &str) -> Option<MonthSpec> {
    match token {
        "${month}" => Some(MonthSpec::Any),
        "${odd-month}" => Some(MonthSpec::Odd),
        "${even-month}" => Some(MonthSpec::Even),
        _ if token.len() == 2 => token
            .parse()
            .ok()
            .filter(|m| (1..=12).contains(m))
            .map(MonthSpec::Literal),
        _ => None,
    }
}

fn parse_day(token: &str) -> Option<DaySpec> {
    if token == "${day}" {
        return Some(DaySpec::Any);
    }
    if let Some(name) = token.strip_prefix("${").and_then(|t| t.strip_suffix('}')) {
        return weekday_from_name(name).map(DaySpec::Weekday);
    }
    if token.len() == 2 {
        return token
            .parse()
            .ok()
            .filter(|d| (1..=31).contains(d))
            .map(DaySpec::Literal);
    }
    None
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::clock::freeze_at;

    use super::*;

    fn frozen(y: i32, m: u32, d: u32) -> crate::clock::ClockGuard {
        freeze_at(Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_literal_date_in_future() {
        let _guard = frozen(2023, 7, 1);
        assert_eq!(evaluate("2023-12-25").unwrap(), date(2023, 12, 25));
    }

    #[test]
    fn test_literal_date_in_past_has_no_future() {
        let _guard = frozen(2023, 7, 1);
        assert!(matches!(
            evaluate("2020-01-01"),
            Err(NtError::NoFutureDate(_))
        ));
    }

    #[test]
    fn test_weekday_expression() {
        // 2023-07-01 is a Saturday; the next Tuesday is 2023-07-04.
        let _guard = frozen(2023, 7, 1);
        assert_eq!(evaluate("every-${tuesday}").unwrap(), date(2023, 7, 4));
    }

    #[test]
    fn test_weekday_advances_with_clock() {
        {
            let _guard = frozen(2023, 7, 5);
            assert_eq!(evaluate("every-${tuesday}").unwrap(), date(2023, 7, 11));
        }
    }

    #[test]
    fn test_yearly_recurrence() {
        let _guard = frozen(2023, 7, 1);
        assert_eq!(evaluate("every-${year}-06-01").unwrap(), date(2024, 6, 1));
        assert_eq!(evaluate("every-${year}-08-01").unwrap(), date(2023, 8, 1));
    }

    #[test]
    fn test_monthly_recurrence_wraps() {
        let _guard = frozen(2023, 12, 20);
        assert_eq!(
            evaluate("every-${year}-${month}-01").unwrap(),
            date(2024, 1, 1)
        );
    }

    #[test]
    fn test_odd_even_year() {
        let _guard = frozen(2023, 7, 1);
        assert_eq!(
            evaluate("every-${odd-year}-06-01").unwrap(),
            date(2025, 6, 1)
        );
        assert_eq!(
            evaluate("every-${even-year}-06-01").unwrap(),
            date(2024, 6, 1)
        );
    }

    #[test]
    fn test_odd_month() {
        let _guard = frozen(2023, 7, 1);
        // Next odd month with day 15 after July 1 is July 15.
        assert_eq!(
            evaluate("${year}-${odd-month}-15").unwrap(),
            date(2023, 7, 15)
        );
    }

    #[test]
    fn test_day_wildcard_is_tomorrow() {
        let _guard = frozen(2023, 7, 1);
        assert_eq!(evaluate("every-${day}").unwrap(), date(2023, 7, 2));
    }

    #[test]
    fn test_unknown_token() {
        assert!(matches!(
            evaluate("every-${fortnight}"),
            Err(NtError::UnsupportedExpression(_))
        ));
        assert!(matches!(
            evaluate("every-"),
            Err(NtError::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn test_monotonicity() {
        let first = {
            let _guard = frozen(2023, 7, 1);
            evaluate("every-${tuesday}").unwrap()
        };
        let same = {
            let _guard = frozen(2023, 7, 1);
            evaluate("every-${tuesday}").unwrap()
        };
        assert_eq!(first, same);
        let later = {
            let _guard = frozen(2023, 7, 4);
            evaluate("every-${tuesday}").unwrap()
        };
        assert!(later > first);
    }

    #[test]
    fn test_recurring_flag() {
        assert!(Recurrence::parse("every-${tuesday}").unwrap().recurring);
        assert!(!Recurrence::parse("2025-01-01").unwrap().recurring);
    }

    #[test]
    fn test_invalid_day_for_month_skipped() {
        let _guard = frozen(2023, 1, 31);
        // February 30 never exists; candidates fall through to a valid month.
        assert_eq!(evaluate("${year}-${month}-30").unwrap(), date(2023, 3, 30));
    }
}
