use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Daily meal minimum for the `minimum_meals` policy.
pub const MIN_MEALS_PER_DAY: u32 = 3;

/// Monthly gym quota for the `minimum_meals` policy: the raw goal of 12
/// sessions minus a 4-session allowance.
pub const MONTHLY_GYM_TARGET: u32 = 8;

/// Penalty rule-set applied to a member. Assigned per member in the config
/// table; members without an explicit entry get `standard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyClass {
    NoFoodTolerance,
    FoodAndGym,
    MinimumMeals,
    #[default]
    Standard,
}

/// Submission category, fixed at creation time.
///
/// `VideoNote` is a legacy category from before video notes required a tag;
/// rows carrying it still count toward gym totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Meal,
    Workout,
    Cheat,
    VideoNote,
}

/// What the engine needs to know about one verified submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionRow {
    pub kind: SubmissionKind,
    pub at: DateTime<Utc>,
}

/// Read-only view over verified submissions for a query window.
pub trait VerifiedSubmissions {
    /// Only `verified` rows, timestamp-filtered inclusive on both ends.
    fn verified_between(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<SubmissionRow>;
}

/// A member that survived the membership refresh, with its current display
/// name and assigned policy.
#[derive(Debug, Clone)]
pub struct ActiveMember {
    pub user_id: i64,
    pub name: String,
    pub policy: PolicyClass,
}

/// Classified submissions for one member on one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayBucket {
    pub meals: u32,
    pub cheats: u32,
    pub workouts: u32,
}

impl DayBucket {
    /// Cheats count as meals; workout and legacy video-note categories both
    /// count toward gym.
    pub fn tally<'a>(rows: impl IntoIterator<Item = &'a SubmissionRow>) -> Self {
        let mut bucket = DayBucket::default();
        for row in rows {
            match row.kind {
                SubmissionKind::Meal => bucket.meals += 1,
                SubmissionKind::Cheat => {
                    bucket.meals += 1;
                    bucket.cheats += 1;
                }
                SubmissionKind::Workout | SubmissionKind::VideoNote => bucket.workouts += 1,
            }
        }
        bucket
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DayVerdict {
    pub penalty: u32,
    pub reasons: Vec<String>,
}

impl DayVerdict {
    fn charge(&mut self, amount: u32, reason: String) {
        self.penalty += amount;
        self.reasons.push(reason);
    }
}

/// Score one member-day. Total over its domain: an empty bucket is valid
/// input (and scores as a missed day under most policies).
pub fn evaluate_day(policy: PolicyClass, day: &DayBucket) -> DayVerdict {
    let mut verdict = DayVerdict::default();
    match policy {
        PolicyClass::NoFoodTolerance => {
            if day.meals == 0 {
                verdict.charge(1, "no food".to_string());
            }
            if day.cheats > 0 {
                verdict.charge(day.cheats, format!("cheats ({})", day.cheats));
            }
        }
        PolicyClass::FoodAndGym => {
            if day.meals == 0 {
                verdict.charge(1, "no food".to_string());
            }
            if day.workouts == 0 {
                verdict.charge(1, "skipped gym".to_string());
            }
            if day.cheats > 0 {
                verdict.charge(day.cheats, format!("cheats ({})", day.cheats));
            }
        }
        PolicyClass::MinimumMeals => {
            // Gym is not judged daily here; see evaluate_period_adjustment.
            if day.meals < MIN_MEALS_PER_DAY {
                verdict.charge(
                    1,
                    format!("too few meals ({}/{})", day.meals, MIN_MEALS_PER_DAY),
                );
            }
        }
        PolicyClass::Standard => {
            if day.meals == 0 {
                verdict.charge(1, "no food".to_string());
            }
            if day.workouts == 0 {
                verdict.charge(1, "no gym".to_string());
            }
            if day.cheats > 0 {
                verdict.charge(day.cheats, format!("cheats ({})", day.cheats));
            }
        }
    }
    verdict
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PeriodAdjustment {
    pub extra_penalty: u32,
    pub reason: Option<String>,
    pub note: Option<String>,
}

/// Period-level rollup, applied once after the daily loop. Only
/// `minimum_meals` carries a quota: the shortfall against
/// [`MONTHLY_GYM_TARGET`] is added to the penalty, and the note reports
/// plan vs. done regardless of shortfall.
pub fn evaluate_period_adjustment(policy: PolicyClass, total_workouts: u32) -> PeriodAdjustment {
    match policy {
        PolicyClass::MinimumMeals => {
            let shortfall = MONTHLY_GYM_TARGET.saturating_sub(total_workouts);
            PeriodAdjustment {
                extra_penalty: shortfall,
                reason: (shortfall > 0).then(|| format!("gym (month): {shortfall} more to go")),
                note: Some(format!(
                    " (plan: {MONTHLY_GYM_TARGET}/month, done: {total_workouts})"
                )),
            }
        }
        _ => PeriodAdjustment::default(),
    }
}

/// Aggregated per-member output of one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReport {
    pub total_penalty: u32,
    pub total_meals: u32,
    pub total_workouts: u32,
    pub reasons: String,
    pub note: String,
}

fn day_start(day: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(day.and_hms_opt(0, 0, 0).unwrap(), Utc)
}

fn day_end(day: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(day.and_hms_micro_opt(23, 59, 59, 999_999).unwrap(), Utc)
}

/// Widen caller-supplied instants to full calendar days: 00:00:00.000000 of
/// start's day through 23:59:59.999999 of end's day.
pub fn full_day_window(start: DateTime<Utc>, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (day_start(start.date_naive()), day_end(end.date_naive()))
}

/// Calendar days from `start` through `end`, ascending, inclusive both ends.
/// `start == end` yields exactly one day; `start > end` yields none.
pub fn day_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(start), |d| d.succ_opt()).take_while(move |d| *d <= end)
}

/// Walk the window one member at a time: bucket each day, score it, then
/// apply the period rollup. Pure given its inputs — membership refresh and
/// name writes happen before this runs.
///
/// The output is keyed by display name; two members sharing a name silently
/// overwrite one another (known limitation).
pub fn build_report<S: VerifiedSubmissions>(
    subs: &S,
    members: &[ActiveMember],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> BTreeMap<String, UserReport> {
    let (start, end) = full_day_window(start, end);
    let mut out = BTreeMap::new();

    for member in members {
        let rows = subs.verified_between(member.user_id, start, end);

        let mut penalty = 0u32;
        let mut meals = 0u32;
        let mut workouts = 0u32;
        let mut trail: Vec<String> = Vec::new();

        for day in day_range(start.date_naive(), end.date_naive()) {
            let (from, to) = (day_start(day), day_end(day));
            let bucket = DayBucket::tally(rows.iter().filter(|r| r.at >= from && r.at <= to));

            meals += bucket.meals;
            workouts += bucket.workouts;

            let verdict = evaluate_day(member.policy, &bucket);
            penalty += verdict.penalty;
            if !verdict.reasons.is_empty() {
                trail.push(format!("{}: {}", day.format("%d.%m"), verdict.reasons.join(", ")));
            }
        }

        let adjustment = evaluate_period_adjustment(member.policy, workouts);
        penalty += adjustment.extra_penalty;
        if let Some(reason) = adjustment.reason {
            trail.push(reason);
        }

        let reasons = if trail.is_empty() {
            "none".to_string()
        } else {
            format!("\n      └ {}", trail.join("\n      └ "))
        };

        out.insert(
            member.name.clone(),
            UserReport {
                total_penalty: penalty,
                total_meals: meals,
                total_workouts: workouts,
                reasons,
                note: adjustment.note.unwrap_or_default(),
            },
        );
    }

    out
}

/// The {name -> penalty} view handed to the chart renderer.
pub fn penalty_series(report: &BTreeMap<String, UserReport>) -> Vec<(String, u32)> {
    report
        .iter()
        .map(|(name, r)| (name.clone(), r.total_penalty))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bucket(meals: u32, cheats: u32, workouts: u32) -> DayBucket {
        DayBucket {
            meals,
            cheats,
            workouts,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    struct FakeSubs(Vec<(i64, SubmissionRow)>);

    impl VerifiedSubmissions for FakeSubs {
        fn verified_between(
            &self,
            user_id: i64,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Vec<SubmissionRow> {
            self.0
                .iter()
                .filter(|(uid, r)| *uid == user_id && r.at >= start && r.at <= end)
                .map(|(_, r)| *r)
                .collect()
        }
    }

    fn member(user_id: i64, name: &str, policy: PolicyClass) -> ActiveMember {
        ActiveMember {
            user_id,
            name: name.to_string(),
            policy,
        }
    }

    #[test]
    fn empty_day_charges_per_policy() {
        let empty = bucket(0, 0, 0);

        let v = evaluate_day(PolicyClass::NoFoodTolerance, &empty);
        assert_eq!(v.penalty, 1);
        assert_eq!(v.reasons, vec!["no food".to_string()]);

        let v = evaluate_day(PolicyClass::FoodAndGym, &empty);
        assert_eq!(v.penalty, 2);
        assert_eq!(
            v.reasons,
            vec!["no food".to_string(), "skipped gym".to_string()]
        );

        let v = evaluate_day(PolicyClass::Standard, &empty);
        assert_eq!(v.penalty, 2);
        assert_eq!(v.reasons, vec!["no food".to_string(), "no gym".to_string()]);

        let v = evaluate_day(PolicyClass::MinimumMeals, &empty);
        assert_eq!(v.penalty, 1);
        assert_eq!(v.reasons, vec!["too few meals (0/3)".to_string()]);
    }

    #[test]
    fn no_food_tolerance_stacks_cheats_on_top() {
        let v = evaluate_day(PolicyClass::NoFoodTolerance, &bucket(0, 2, 0));
        assert_eq!(v.penalty, 3);
        assert_eq!(v.reasons, vec!["no food".to_string(), "cheats (2)".to_string()]);
    }

    #[test]
    fn no_food_tolerance_ignores_gym() {
        let v = evaluate_day(PolicyClass::NoFoodTolerance, &bucket(1, 0, 0));
        assert_eq!(v, DayVerdict::default());
    }

    #[test]
    fn food_and_gym_charges_skipped_gym_only() {
        let v = evaluate_day(PolicyClass::FoodAndGym, &bucket(1, 0, 0));
        assert_eq!(v.penalty, 1);
        assert_eq!(v.reasons, vec!["skipped gym".to_string()]);
    }

    #[test]
    fn minimum_meals_reports_the_count() {
        let v = evaluate_day(PolicyClass::MinimumMeals, &bucket(2, 0, 0));
        assert_eq!(v.penalty, 1);
        assert_eq!(v.reasons, vec!["too few meals (2/3)".to_string()]);
        assert_eq!(
            evaluate_day(PolicyClass::MinimumMeals, &bucket(3, 0, 0)),
            DayVerdict::default()
        );
    }

    #[test]
    fn minimum_meals_has_no_daily_gym_or_cheat_rule() {
        let v = evaluate_day(PolicyClass::MinimumMeals, &bucket(3, 2, 0));
        assert_eq!(v, DayVerdict::default());
    }

    #[test]
    fn standard_charges_all_three() {
        let v = evaluate_day(PolicyClass::Standard, &bucket(0, 1, 0));
        // One cheat counts as a meal at intake, but the bucket is taken as
        // given here.
        assert_eq!(v.penalty, 3);
        assert_eq!(
            v.reasons,
            vec![
                "no food".to_string(),
                "no gym".to_string(),
                "cheats (1)".to_string()
            ]
        );
    }

    #[test]
    fn tally_unions_categories() {
        let rows = [
            SubmissionRow {
                kind: SubmissionKind::Meal,
                at: at(2024, 3, 1, 9, 0, 0),
            },
            SubmissionRow {
                kind: SubmissionKind::Cheat,
                at: at(2024, 3, 1, 13, 0, 0),
            },
            SubmissionRow {
                kind: SubmissionKind::Workout,
                at: at(2024, 3, 1, 18, 0, 0),
            },
            SubmissionRow {
                kind: SubmissionKind::VideoNote,
                at: at(2024, 3, 1, 19, 0, 0),
            },
        ];
        let b = DayBucket::tally(rows.iter());
        assert_eq!(b, bucket(2, 1, 2));
    }

    #[test]
    fn period_adjustment_charges_the_shortfall() {
        let adj = evaluate_period_adjustment(PolicyClass::MinimumMeals, 5);
        assert_eq!(adj.extra_penalty, 3);
        assert!(adj.reason.as_deref().unwrap().contains('3'));
        assert!(adj.note.is_some());
    }

    #[test]
    fn period_adjustment_met_quota_keeps_the_note() {
        let adj = evaluate_period_adjustment(PolicyClass::MinimumMeals, 10);
        assert_eq!(adj.extra_penalty, 0);
        assert!(adj.reason.is_none());
        assert!(adj.note.as_deref().unwrap().contains("done: 10"));
    }

    #[test]
    fn period_adjustment_is_a_no_op_for_other_policies() {
        for policy in [
            PolicyClass::NoFoodTolerance,
            PolicyClass::FoodAndGym,
            PolicyClass::Standard,
        ] {
            assert_eq!(evaluate_period_adjustment(policy, 0), PeriodAdjustment::default());
        }
    }

    #[test]
    fn day_range_is_inclusive_and_ordered() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let days: Vec<NaiveDate> = day_range(start, end).collect();
        assert_eq!(days.len(), 5);
        assert_eq!(days.first(), Some(&start));
        assert_eq!(days.last(), Some(&end));
        assert!(days.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn day_range_single_day() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(day_range(day, day).count(), 1);
        assert_eq!(day_range(day, day.pred_opt().unwrap()).count(), 0);
    }

    #[test]
    fn full_day_window_widens_both_ends() {
        let (start, end) = full_day_window(at(2024, 5, 10, 14, 30, 0), at(2024, 5, 10, 14, 30, 0));
        assert_eq!(start, at(2024, 5, 10, 0, 0, 0));
        assert_eq!(
            end,
            day_end(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
        );
        assert!(end > at(2024, 5, 10, 23, 59, 58));
    }

    #[test]
    fn report_includes_midnight_and_last_microsecond() {
        let first = DateTime::from_naive_utc_and_offset(
            NaiveDate::from_ymd_opt(2024, 5, 10)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            Utc,
        );
        let last = DateTime::from_naive_utc_and_offset(
            NaiveDate::from_ymd_opt(2024, 5, 10)
                .unwrap()
                .and_hms_micro_opt(23, 59, 59, 999_999)
                .unwrap(),
            Utc,
        );
        let subs = FakeSubs(vec![
            (
                1,
                SubmissionRow {
                    kind: SubmissionKind::Meal,
                    at: first,
                },
            ),
            (
                1,
                SubmissionRow {
                    kind: SubmissionKind::Workout,
                    at: last,
                },
            ),
        ]);
        let members = [member(1, "ann", PolicyClass::Standard)];
        let noon = at(2024, 5, 10, 12, 0, 0);
        let report = build_report(&subs, &members, noon, noon);
        let r = &report["ann"];
        assert_eq!(r.total_meals, 1);
        assert_eq!(r.total_workouts, 1);
        assert_eq!(r.total_penalty, 0);
        assert_eq!(r.reasons, "none");
    }

    #[test]
    fn single_day_standard_member_misses_gym() {
        let subs = FakeSubs(vec![(
            7,
            SubmissionRow {
                kind: SubmissionKind::Meal,
                at: at(2024, 5, 10, 9, 0, 0),
            },
        )]);
        let members = [member(7, "bob", PolicyClass::Standard)];
        let day = at(2024, 5, 10, 15, 0, 0);
        let report = build_report(&subs, &members, day, day);
        let r = &report["bob"];
        assert_eq!(r.total_penalty, 1);
        assert_eq!(r.total_meals, 1);
        assert_eq!(r.total_workouts, 0);
        assert_eq!(r.reasons, "\n      └ 10.05: no gym");
        assert_eq!(r.note, "");
    }

    #[test]
    fn minimum_meals_member_with_quota_met() {
        let mut rows = vec![
            (
                3,
                SubmissionRow {
                    kind: SubmissionKind::Meal,
                    at: at(2024, 5, 10, 9, 0, 0),
                },
            ),
            (
                3,
                SubmissionRow {
                    kind: SubmissionKind::Meal,
                    at: at(2024, 5, 10, 13, 0, 0),
                },
            ),
        ];
        for hour in 8..17 {
            rows.push((
                3,
                SubmissionRow {
                    kind: SubmissionKind::Workout,
                    at: at(2024, 5, 10, hour, 30, 0),
                },
            ));
        }
        let subs = FakeSubs(rows);
        let members = [member(3, "cleo", PolicyClass::MinimumMeals)];
        let day = at(2024, 5, 10, 12, 0, 0);
        let report = build_report(&subs, &members, day, day);
        let r = &report["cleo"];
        // 2/3 meals charges one; nine workouts clear the monthly target.
        assert_eq!(r.total_penalty, 1);
        assert_eq!(r.total_workouts, 9);
        assert!(r.note.contains("done: 9"));
        assert!(!r.reasons.contains("gym (month)"));
    }

    #[test]
    fn minimum_meals_shortfall_lands_in_trail_and_total() {
        let subs = FakeSubs(vec![(
            3,
            SubmissionRow {
                kind: SubmissionKind::Workout,
                at: at(2024, 5, 10, 18, 0, 0),
            },
        )]);
        let members = [member(3, "cleo", PolicyClass::MinimumMeals)];
        let day = at(2024, 5, 10, 12, 0, 0);
        let report = build_report(&subs, &members, day, day);
        let r = &report["cleo"];
        // One day at 0/3 meals plus a 7-session shortfall.
        assert_eq!(r.total_penalty, 1 + 7);
        assert!(r.reasons.contains("gym (month): 7 more to go"));
        assert!(r.note.contains("done: 1"));
    }

    #[test]
    fn report_is_idempotent() {
        let subs = FakeSubs(vec![(
            7,
            SubmissionRow {
                kind: SubmissionKind::Cheat,
                at: at(2024, 5, 10, 9, 0, 0),
            },
        )]);
        let members = [member(7, "bob", PolicyClass::Standard)];
        let start = at(2024, 5, 9, 0, 0, 0);
        let end = at(2024, 5, 11, 0, 0, 0);
        let first = build_report(&subs, &members, start, end);
        let second = build_report(&subs, &members, start, end);
        assert_eq!(first, second);
    }

    #[test]
    fn member_with_no_submissions_still_gets_a_record() {
        let subs = FakeSubs(vec![]);
        let members = [member(9, "zoe", PolicyClass::NoFoodTolerance)];
        let day = at(2024, 5, 10, 12, 0, 0);
        let report = build_report(&subs, &members, day, day);
        let r = &report["zoe"];
        assert_eq!(r.total_meals, 0);
        assert_eq!(r.total_penalty, 1); // no food that day
    }

    #[test]
    fn penalty_series_matches_the_report() {
        let subs = FakeSubs(vec![]);
        let members = [
            member(1, "ann", PolicyClass::NoFoodTolerance),
            member(2, "bob", PolicyClass::Standard),
        ];
        let day = at(2024, 5, 10, 12, 0, 0);
        let report = build_report(&subs, &members, day, day);
        let series = penalty_series(&report);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0], ("ann".to_string(), 1));
        assert_eq!(series[1], ("bob".to_string(), 2));
    }
}
