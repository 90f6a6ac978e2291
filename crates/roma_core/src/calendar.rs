//! crates/roma_core/src/calendar.rs
//!
//! Projects program days onto calendar dates.

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::ProgramDay;
use crate::history::dates_between;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub day_id: Uuid,
    pub day_index: i32,
    pub notes: Option<String>,
}

/// Cycles `days` (already ordered by `day_index`) across `[from, to]`, clipped to the assignment
/// window `[start_date, end_date]`. The cycle is anchored on `start_date`, so the first emitted
/// entry is the day reached after `from - start_date` elapsed days. A reversed range is swapped.
pub fn project_calendar(
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    days: &[ProgramDay],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<CalendarDay> {
    if days.is_empty() {
        return Vec::new();
    }
    let (from, to) = if from > to { (to, from) } else { (from, to) };
    let from = from.max(start_date);
    let to = end_date.map_or(to, |end| to.min(end));
    if from > to {
        return Vec::new();
    }

    let cycle = days.len();
    let mut idx = (from - start_date).num_days().rem_euclid(cycle as i64) as usize;
    dates_between(from, to)
        .into_iter()
        .map(|date| {
            let day = &days[idx];
            idx = (idx + 1) % cycle;
            CalendarDay {
                date,
                day_id: day.id,
                day_index: day.day_index,
                notes: day.notes.clone(),
            }
        })
        .collect()
}

/// Week/day slot of `date` assuming seven-day weeks counted from `start_date`.
/// Dates before the start map to the first slot.
pub fn program_slot_for_date(start_date: NaiveDate, date: NaiveDate) -> (i32, i32) {
    let elapsed = (date - start_date).num_days().max(0);
    ((elapsed / 7 + 1) as i32, (elapsed % 7 + 1) as i32)
}
