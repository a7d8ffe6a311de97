//! Date and calendar computation skill
//!
//! Answers questions the language model gets wrong because they need real
//! calendar arithmetic: the next Friday the 13th, days until a holiday,
//! the weekday of a date, the current date and time. Unmatched queries
//! fall back to the model's own response text.

use std::sync::{Arc, LazyLock};

use chrono::{Datelike, Local, NaiveDate, Timelike};
use regex::Regex;

use crate::Result;
use crate::skills::{Skill, SkillContext, SkillHandler};

/// Well-known holidays as (month, day)
const HOLIDAYS: &[(&str, u32, u32)] = &[
    ("christmas", 12, 25),
    ("christmas day", 12, 25),
    ("new year", 1, 1),
    ("new years", 1, 1),
    ("new year's", 1, 1),
    ("new year's day", 1, 1),
    ("valentine", 2, 14),
    ("valentines", 2, 14),
    ("valentine's", 2, 14),
    ("valentine's day", 2, 14),
    ("halloween", 10, 31),
    ("independence day", 7, 4),
    ("april fools", 4, 1),
    ("st patrick", 3, 17),
    ("st. patrick", 3, 17),
];

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

/// Build the date query skill
#[must_use]
pub fn skill() -> Skill {
    Skill::new("date_query", "date query", Arc::new(DateQuery))
}

struct DateQuery;

impl SkillHandler for DateQuery {
    fn handle(&self, ctx: SkillContext) -> Result<bool> {
        let query = ctx.param("query").unwrap_or_default().to_string();
        let now = Local::now();

        let answer = answer_query(&query, now.date_naive(), current_time_phrase(&now))
            .or_else(|| {
                if ctx.response.is_empty() {
                    None
                } else {
                    Some(ctx.response.clone())
                }
            })
            .unwrap_or_else(|| {
                format!(
                    "I couldn't compute that, but today is {}.",
                    format_long(now.date_naive())
                )
            });

        tracing::info!(query = %query, answer = %answer, "date query answered");
        ctx.speaker.say(answer);
        Ok(true)
    }
}

fn current_time_phrase(now: &chrono::DateTime<Local>) -> String {
    let (is_pm, hour12) = now.hour12();
    let meridiem = if is_pm { "PM" } else { "AM" };
    format!(
        "It's currently {:02}:{:02} {} on {}.",
        hour12,
        now.minute(),
        meridiem,
        format_long(now.date_naive())
    )
}

/// Answer a calendar query against `today`; `time_phrase` is the canned
/// current-time answer (injected so tests can pin the clock)
fn answer_query(query: &str, today: NaiveDate, time_phrase: String) -> Option<String> {
    let q = query.to_lowercase();

    if q.contains("friday the 13") || q.contains("friday 13") {
        return next_friday_13(today).map(|d| {
            format!(
                "The next Friday the 13th is {}, {}.",
                d.format("%A"),
                format_long(d)
            )
        });
    }

    if ["days until", "how many days", "how long until", "how long till"]
        .iter()
        .any(|kw| q.contains(kw))
    {
        return days_until_holiday(&q, today);
    }

    if q.contains("what day") && ["is", "was", "will"].iter().any(|w| q.contains(w)) {
        return day_of_week(&q, today);
    }

    if ["what time", "current time", "time now", "time is it"]
        .iter()
        .any(|kw| q.contains(kw))
    {
        return Some(time_phrase);
    }

    if ["what date", "today's date", "current date", "what year"]
        .iter()
        .any(|kw| q.contains(kw))
    {
        return Some(format!("Today is {}.", format_long(today)));
    }

    None
}

/// The next Friday the 13th on or after `from`
fn next_friday_13(from: NaiveDate) -> Option<NaiveDate> {
    if from.day() == 13 && from.weekday() == chrono::Weekday::Fri {
        return Some(from);
    }

    let (mut year, mut month) = (from.year(), from.month());
    if from.day() > 13 {
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }

    // Bounded search, roughly sixteen years
    for _ in 0..200 {
        if let Some(candidate) = NaiveDate::from_ymd_opt(year, month, 13) {
            if candidate >= from && candidate.weekday() == chrono::Weekday::Fri {
                return Some(candidate);
            }
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    None
}

/// Days from `today` until the next occurrence of `month`/`day`
fn days_until(month: u32, day: u32, today: NaiveDate) -> Option<i64> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    let target = if this_year <= today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)?
    } else {
        this_year
    };
    Some((target - today).num_days())
}

fn days_until_holiday(q: &str, today: NaiveDate) -> Option<String> {
    for &(name, month, day) in HOLIDAYS {
        if q.contains(name) {
            let days = days_until(month, day, today)?;
            let year = if NaiveDate::from_ymd_opt(today.year(), month, day)? > today {
                today.year()
            } else {
                today.year() + 1
            };
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            return Some(format!(
                "There are {} days until {} ({}).",
                days,
                title_case(name),
                format_long(date)
            ));
        }
    }
    None
}

static DATE_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2})\s*,?\s*(\d{4})?").unwrap()
});

fn day_of_week(q: &str, today: NaiveDate) -> Option<String> {
    let caps = DATE_MENTION.captures(q)?;
    let month_name = caps.get(1)?.as_str();
    let month = MONTHS
        .iter()
        .find(|(name, _)| *name == month_name)
        .map(|&(_, num)| num)?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = caps
        .get(3)
        .map_or(today.year(), |m| m.as_str().parse().unwrap_or(today.year()));

    let target = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(format!(
        "{} {}, {} is a {}.",
        title_case(month_name),
        day,
        year,
        target.format("%A")
    ))
}

fn format_long(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
