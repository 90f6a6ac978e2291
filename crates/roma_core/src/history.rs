//! crates/roma_core/src/history.rs
//!
//! Pure date-bucketing helpers behind the history and overview endpoints: window clamping,
//! gap filling of daily aggregates, pivoting into chart rows and personal-record estimation.
//! Storage adapters only produce raw rows; everything dense or derived is computed here.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::SessionStatus;

pub const DEFAULT_WINDOW_DAYS: i64 = 14;
pub const MAX_WINDOW_DAYS: i64 = 180;

/// Out-of-range windows (non-positive or above the maximum) fall back to the default.
pub fn clamp_days(days: i64) -> i64 {
    if days <= 0 || days > MAX_WINDOW_DAYS {
        DEFAULT_WINDOW_DAYS
    } else {
        days
    }
}

/// First date of a window of `days` days that ends on `today` (inclusive).
pub fn window_start(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(clamp_days(days) - 1)
}

/// Every calendar date in `[start, end]`. Empty when `start > end`.
pub fn dates_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// The calendar date of an instant as seen in `tz`.
pub fn local_date(at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Parses an IANA zone name, falling back when absent or unknown.
pub fn resolve_timezone(name: Option<&str>, fallback: Tz) -> Tz {
    name.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<Tz>().ok())
        .unwrap_or(fallback)
}

//=========================================================================================
// Query Vocabulary
//=========================================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Volume,
    Sets,
    Reps,
}

impl Metric {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("sets") => Metric::Sets,
            Some("reps") => Metric::Reps,
            _ => Metric::Volume,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotMode {
    #[default]
    ByExercise,
    ByMuscle,
}

impl PivotMode {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("by_muscle") | Some("muscle") => PivotMode::ByMuscle,
            _ => PivotMode::ByExercise,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryGroup {
    #[default]
    Session,
    Day,
}

impl HistoryGroup {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("day") => HistoryGroup::Day,
            _ => HistoryGroup::Session,
        }
    }
}

/// Filter for the paged history listings. Dates are local to `tz`.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub disciple_id: Uuid,
    pub tz: Tz,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: i64,
    pub offset: i64,
}

impl HistoryQuery {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }
}

//=========================================================================================
// Row Types
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyExerciseVolume {
    pub date: NaiveDate,
    pub exercise_id: Uuid,
    pub exercise_name: String,
    pub volume: f64,
    pub sets: i64,
    pub reps: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMuscleVolume {
    pub date: NaiveDate,
    pub primary_muscle: String,
    pub volume: f64,
    pub sets: i64,
    pub reps: i64,
}

/// An exercise relevant to a disciple, used to keep idle exercises visible as zero columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExerciseRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionHistoryRow {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub day_id: Uuid,
    pub performed_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub sets_count: i64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayHistoryRow {
    pub date: NaiveDate,
    pub sessions: i64,
    pub sets: i64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanVsDoneRow {
    pub date: NaiveDate,
    pub day_id: Uuid,
    pub planned_sets: i64,
    pub done_sets: i64,
}

/// One value per (date, series) pair, the shape the pivot consumes.
pub trait DailySeries {
    fn date(&self) -> NaiveDate;
    fn series(&self) -> &str;
    fn value(&self, metric: Metric) -> f64;
}

impl DailySeries for DailyExerciseVolume {
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn series(&self) -> &str {
        &self.exercise_name
    }
    fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Volume => self.volume,
            Metric::Sets => self.sets as f64,
            Metric::Reps => self.reps as f64,
        }
    }
}

impl DailySeries for DailyMuscleVolume {
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn series(&self) -> &str {
        &self.primary_muscle
    }
    fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Volume => self.volume,
            Metric::Sets => self.sets as f64,
            Metric::Reps => self.reps as f64,
        }
    }
}

//=========================================================================================
// Gap Filling
//=========================================================================================

/// Densifies per-exercise rows over `[start, end]`: one row per date and exercise, zeros where
/// nothing was logged. Series keys come from the raw rows in first-seen order, then from the
/// catalog. Rows outside the window are dropped.
pub fn fill_exercise_gaps(
    rows: Vec<DailyExerciseVolume>,
    catalog: &[ExerciseRef],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DailyExerciseVolume> {
    let mut seen = HashSet::new();
    let mut keys: Vec<ExerciseRef> = Vec::new();
    for row in &rows {
        if seen.insert(row.exercise_id) {
            keys.push(ExerciseRef {
                id: row.exercise_id,
                name: row.exercise_name.clone(),
            });
        }
    }
    for item in catalog {
        if seen.insert(item.id) {
            keys.push(item.clone());
        }
    }

    let mut raw: HashMap<(NaiveDate, Uuid), DailyExerciseVolume> = rows
        .into_iter()
        .map(|r| ((r.date, r.exercise_id), r))
        .collect();

    let dates = dates_between(start, end);
    let mut out = Vec::with_capacity(dates.len() * keys.len());
    for date in dates {
        for key in &keys {
            let row = raw
                .remove(&(date, key.id))
                .unwrap_or_else(|| DailyExerciseVolume {
                    date,
                    exercise_id: key.id,
                    exercise_name: key.name.clone(),
                    volume: 0.0,
                    sets: 0,
                    reps: 0,
                });
            out.push(row);
        }
    }
    out.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.exercise_name.cmp(&b.exercise_name))
            .then_with(|| a.exercise_id.cmp(&b.exercise_id))
    });
    out
}

/// Same as [`fill_exercise_gaps`] for per-muscle rows, without a catalog.
pub fn fill_muscle_gaps(
    rows: Vec<DailyMuscleVolume>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DailyMuscleVolume> {
    let mut seen = HashSet::new();
    let mut keys: Vec<String> = Vec::new();
    for row in &rows {
        if seen.insert(row.primary_muscle.clone()) {
            keys.push(row.primary_muscle.clone());
        }
    }

    let mut raw: HashMap<(NaiveDate, String), DailyMuscleVolume> = rows
        .into_iter()
        .map(|r| ((r.date, r.primary_muscle.clone()), r))
        .collect();

    let dates = dates_between(start, end);
    let mut out = Vec::with_capacity(dates.len() * keys.len());
    for date in dates {
        for key in &keys {
            let row = raw
                .remove(&(date, key.clone()))
                .unwrap_or_else(|| DailyMuscleVolume {
                    date,
                    primary_muscle: key.clone(),
                    volume: 0.0,
                    sets: 0,
                    reps: 0,
                });
            out.push(row);
        }
    }
    out.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.primary_muscle.cmp(&b.primary_muscle))
    });
    out
}

//=========================================================================================
// Pivot
//=========================================================================================

/// Column-oriented chart data: `columns[0]` is always `"date"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PivotResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Vec<ExerciseRef>>,
    pub mode: PivotMode,
    pub days: i64,
}

/// Reshapes a dense, date-sorted series into `{date, series1: v, series2: v, ...}` rows.
pub fn pivot<R: DailySeries>(
    dense: &[R],
    metric: Metric,
    start: NaiveDate,
    end: NaiveDate,
) -> PivotTable {
    let mut columns = vec!["date".to_string()];
    let mut seen = HashSet::new();
    for row in dense {
        if seen.insert(row.series().to_string()) {
            columns.push(row.series().to_string());
        }
    }

    // Every day of the window gets a row, even with no series at all.
    let dates = dates_between(start, end);
    let row_of_date: HashMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
    let mut sums: Vec<HashMap<String, f64>> = vec![HashMap::new(); dates.len()];
    for row in dense {
        if let Some(&idx) = row_of_date.get(&row.date()) {
            *sums[idx].entry(row.series().to_string()).or_insert(0.0) += row.value(metric);
        }
    }

    let rows = dates
        .iter()
        .zip(sums)
        .map(|(date, values)| {
            let mut m = Map::new();
            m.insert(
                "date".to_string(),
                Value::String(date.format("%Y-%m-%d").to_string()),
            );
            for column in columns.iter().skip(1) {
                let v = values.get(column).copied().unwrap_or(0.0);
                m.insert(column.clone(), metric_value(metric, v));
            }
            m
        })
        .collect();

    PivotTable { columns, rows }
}

fn metric_value(metric: Metric, v: f64) -> Value {
    match metric {
        Metric::Volume => Value::from(v),
        Metric::Sets | Metric::Reps => Value::from(v as i64),
    }
}

//=========================================================================================
// Personal Records
//=========================================================================================

/// A raw logged set as fed to the PR computation.
#[derive(Debug, Clone, PartialEq)]
pub struct LiftSample {
    pub exercise_id: Uuid,
    pub exercise_name: String,
    pub weight: Option<f64>,
    pub reps: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalRecord {
    pub exercise_id: Uuid,
    pub exercise_name: String,
    pub max_weight: Option<f64>,
    pub max_reps: i32,
    pub estimated_1rm: Option<f64>,
}

/// Brzycki one-rep-max estimate. Only defined for 1..=36 reps and a positive weight.
pub fn brzycki_1rm(weight: f64, reps: i32) -> Option<f64> {
    if (1..=36).contains(&reps) && weight > 0.0 {
        Some(weight * 36.0 / (37.0 - reps as f64))
    } else {
        None
    }
}

/// Best weight, best reps and best estimated 1RM per exercise, strongest first.
pub fn personal_records(samples: &[LiftSample]) -> Vec<PersonalRecord> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut by_exercise: HashMap<Uuid, PersonalRecord> = HashMap::new();

    for s in samples {
        let Some(weight) = s.weight else { continue };
        let Some(estimate) = brzycki_1rm(weight, s.reps) else {
            continue;
        };
        let rec = by_exercise.entry(s.exercise_id).or_insert_with(|| {
            order.push(s.exercise_id);
            PersonalRecord {
                exercise_id: s.exercise_id,
                exercise_name: s.exercise_name.clone(),
                max_weight: None,
                max_reps: 0,
                estimated_1rm: None,
            }
        });
        rec.max_weight = Some(rec.max_weight.map_or(weight, |w| w.max(weight)));
        rec.max_reps = rec.max_reps.max(s.reps);
        rec.estimated_1rm = Some(rec.estimated_1rm.map_or(estimate, |e| e.max(estimate)));
    }

    let mut out: Vec<PersonalRecord> = order
        .into_iter()
        .filter_map(|id| by_exercise.remove(&id))
        .collect();
    out.sort_by(|a, b| {
        desc_nulls_last(a.estimated_1rm, b.estimated_1rm)
            .then_with(|| desc_nulls_last(a.max_weight, b.max_weight))
            .then_with(|| b.max_reps.cmp(&a.max_reps))
            .then_with(|| a.exercise_name.cmp(&b.exercise_name))
    });
    out
}

fn desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

//=========================================================================================
// Adherence
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Adherence {
    pub days: i64,
    pub days_with_sets: i64,
    pub rate: f64,
}

impl Adherence {
    pub fn new(days: i64, days_with_sets: i64) -> Self {
        Self {
            days,
            days_with_sets,
            rate: days_with_sets as f64 / days.max(1) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ex_row(date: NaiveDate, id: Uuid, name: &str, volume: f64) -> DailyExerciseVolume {
        DailyExerciseVolume {
            date,
            exercise_id: id,
            exercise_name: name.to_string(),
            volume,
            sets: 1,
            reps: 5,
        }
    }

    #[test]
    fn clamp_days_falls_back_to_default() {
        assert_eq!(clamp_days(0), 14);
        assert_eq!(clamp_days(-3), 14);
        assert_eq!(clamp_days(181), 14);
        assert_eq!(clamp_days(180), 180);
        assert_eq!(clamp_days(7), 7);
    }

    #[test]
    fn window_includes_today() {
        assert_eq!(window_start(d(2024, 5, 14), 14), d(2024, 5, 1));
        assert_eq!(window_start(d(2024, 5, 14), 1), d(2024, 5, 14));
        assert_eq!(dates_between(d(2024, 5, 1), d(2024, 5, 14)).len(), 14);
        assert!(dates_between(d(2024, 5, 2), d(2024, 5, 1)).is_empty());
    }

    #[test]
    fn unknown_timezone_uses_fallback() {
        let fallback = chrono_tz::America::Santiago;
        assert_eq!(resolve_timezone(None, fallback), fallback);
        assert_eq!(resolve_timezone(Some("  "), fallback), fallback);
        assert_eq!(resolve_timezone(Some("Mars/Olympus"), fallback), fallback);
        assert_eq!(
            resolve_timezone(Some("Europe/Madrid"), fallback),
            chrono_tz::Europe::Madrid
        );
    }

    #[test]
    fn local_date_crosses_midnight_by_zone() {
        let at = DateTime::parse_from_rfc3339("2024-05-02T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(local_date(at, chrono_tz::UTC), d(2024, 5, 2));
        assert_eq!(local_date(at, chrono_tz::America::Santiago), d(2024, 5, 1));
    }

    #[test]
    fn exercise_gap_fill_is_dense_and_sorted() {
        let squat = Uuid::new_v4();
        let bench = Uuid::new_v4();
        let row = Uuid::new_v4();
        let rows = vec![
            ex_row(d(2024, 1, 2), squat, "Squat", 500.0),
            ex_row(d(2024, 1, 1), bench, "Bench", 300.0),
        ];
        let catalog = vec![
            ExerciseRef { id: squat, name: "Squat".into() },
            ExerciseRef { id: row, name: "Row".into() },
        ];

        let out = fill_exercise_gaps(rows, &catalog, d(2024, 1, 1), d(2024, 1, 3));

        assert_eq!(out.len(), 3 * 3);
        let names: Vec<_> = out.iter().take(3).map(|r| r.exercise_name.as_str()).collect();
        assert_eq!(names, vec!["Bench", "Row", "Squat"]);
        assert!(out.windows(2).all(|w| w[0].date <= w[1].date));

        let squat_day2 = out
            .iter()
            .find(|r| r.date == d(2024, 1, 2) && r.exercise_id == squat)
            .unwrap();
        assert_eq!(squat_day2.volume, 500.0);
        let row_day3 = out
            .iter()
            .find(|r| r.date == d(2024, 1, 3) && r.exercise_id == row)
            .unwrap();
        assert_eq!((row_day3.volume, row_day3.sets, row_day3.reps), (0.0, 0, 0));
    }

    #[test]
    fn exercise_gap_fill_drops_rows_outside_window() {
        let id = Uuid::new_v4();
        let rows = vec![ex_row(d(2023, 12, 31), id, "Squat", 100.0)];
        let out = fill_exercise_gaps(rows, &[], d(2024, 1, 1), d(2024, 1, 2));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.volume == 0.0));
    }

    #[test]
    fn muscle_gap_fill_has_one_row_per_pair() {
        let rows = vec![
            DailyMuscleVolume {
                date: d(2024, 1, 1),
                primary_muscle: "legs".into(),
                volume: 10.0,
                sets: 1,
                reps: 1,
            },
            DailyMuscleVolume {
                date: d(2024, 1, 4),
                primary_muscle: "chest".into(),
                volume: 20.0,
                sets: 2,
                reps: 2,
            },
        ];
        let out = fill_muscle_gaps(rows, d(2024, 1, 1), d(2024, 1, 4));
        assert_eq!(out.len(), 4 * 2);
        assert_eq!(out[0].primary_muscle, "chest");
        assert_eq!(out[1].primary_muscle, "legs");
        assert_eq!(out[1].volume, 10.0);
        assert_eq!(out.last().unwrap().primary_muscle, "legs");
        assert_eq!(out.last().unwrap().volume, 0.0);
    }

    #[test]
    fn pivot_builds_one_row_per_date() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let dense = fill_exercise_gaps(
            vec![
                ex_row(d(2024, 1, 1), a, "Bench", 300.0),
                ex_row(d(2024, 1, 2), b, "Squat", 500.0),
            ],
            &[],
            d(2024, 1, 1),
            d(2024, 1, 2),
        );

        let table = pivot(&dense, Metric::Volume, d(2024, 1, 1), d(2024, 1, 2));
        assert_eq!(table.columns, vec!["date", "Bench", "Squat"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["date"], Value::from("2024-01-01"));
        assert_eq!(table.rows[0]["Bench"], Value::from(300.0));
        assert_eq!(table.rows[0]["Squat"], Value::from(0.0));
        assert_eq!(table.rows[1]["Squat"], Value::from(500.0));

        let sets = pivot(&dense, Metric::Sets, d(2024, 1, 1), d(2024, 1, 2));
        assert_eq!(sets.rows[0]["Bench"], Value::from(1));
    }

    #[test]
    fn pivot_emits_date_rows_for_an_empty_window() {
        let dense = fill_exercise_gaps(vec![], &[], d(2024, 1, 1), d(2024, 1, 7));
        let table = pivot(&dense, Metric::Volume, d(2024, 1, 1), d(2024, 1, 7));
        assert_eq!(table.columns, vec!["date"]);
        assert_eq!(table.rows.len(), 7);
        assert_eq!(table.rows[0]["date"], Value::from("2024-01-01"));
        assert_eq!(table.rows[6]["date"], Value::from("2024-01-07"));
        assert_eq!(table.rows[3].len(), 1);

        let muscles = fill_muscle_gaps(vec![], d(2024, 1, 1), d(2024, 1, 3));
        assert_eq!(pivot(&muscles, Metric::Reps, d(2024, 1, 1), d(2024, 1, 3)).rows.len(), 3);
    }

    #[test]
    fn brzycki_matches_reference_value() {
        assert_eq!(brzycki_1rm(100.0, 5), Some(112.5));
        assert_eq!(brzycki_1rm(100.0, 1), Some(100.0));
        assert_eq!(brzycki_1rm(100.0, 0), None);
        assert_eq!(brzycki_1rm(100.0, 37), None);
        assert_eq!(brzycki_1rm(0.0, 5), None);
    }

    #[test]
    fn personal_records_exclude_unqualified_sets_and_sort_by_estimate() {
        let squat = Uuid::new_v4();
        let curl = Uuid::new_v4();
        let plank = Uuid::new_v4();
        let samples = vec![
            LiftSample { exercise_id: curl, exercise_name: "Curl".into(), weight: Some(20.0), reps: 10 },
            LiftSample { exercise_id: squat, exercise_name: "Squat".into(), weight: Some(100.0), reps: 5 },
            LiftSample { exercise_id: squat, exercise_name: "Squat".into(), weight: Some(120.0), reps: 1 },
            LiftSample { exercise_id: squat, exercise_name: "Squat".into(), weight: Some(200.0), reps: 40 },
            LiftSample { exercise_id: plank, exercise_name: "Plank".into(), weight: None, reps: 1 },
        ];

        let prs = personal_records(&samples);
        assert_eq!(prs.len(), 2);
        assert_eq!(prs[0].exercise_id, squat);
        assert_eq!(prs[0].max_weight, Some(120.0));
        assert_eq!(prs[0].max_reps, 5);
        assert_eq!(prs[0].estimated_1rm, Some(120.0));
        assert_eq!(prs[1].exercise_id, curl);
    }

    #[test]
    fn adherence_never_divides_by_zero() {
        assert_eq!(Adherence::new(0, 0).rate, 0.0);
        assert_eq!(Adherence::new(14, 7).rate, 0.5);
    }

    #[test]
    fn vocabulary_parsing_defaults() {
        assert_eq!(Metric::parse(Some("SETS")), Metric::Sets);
        assert_eq!(Metric::parse(Some("weird")), Metric::Volume);
        assert_eq!(PivotMode::parse(Some("by_muscle")), PivotMode::ByMuscle);
        assert_eq!(PivotMode::parse(None), PivotMode::ByExercise);
        assert_eq!(HistoryGroup::parse(Some("day")), HistoryGroup::Day);
        assert_eq!(HistoryGroup::parse(Some("x")), HistoryGroup::Session);
    }
}
