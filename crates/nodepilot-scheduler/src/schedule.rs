use chrono::{NaiveDateTime, Timelike};
use nodepilot_core::types::{Direction, Machine, Schedule, ScheduleKind};

/// Decide whether `schedule` is due at wall-clock instant `now`.
///
/// Only the hour and minute of `now` are compared against `schedule.time`;
/// range schedules additionally require the calendar date of `now` to lie in
/// `[from_date, to_date]` inclusive. Disabled schedules, malformed times,
/// incomplete ranges and unknown schedule types never fire.
pub fn should_fire(schedule: &Schedule, now: NaiveDateTime) -> bool {
    if !schedule.enabled {
        return false;
    }
    let Some(at) = schedule.time_of_day() else {
        return false;
    };
    if (now.hour(), now.minute()) != (at.hour(), at.minute()) {
        return false;
    }

    match &schedule.kind {
        ScheduleKind::Daily => true,
        ScheduleKind::Range => match (schedule.from_date, schedule.to_date) {
            (Some(from), Some(to)) => (from..=to).contains(&now.date()),
            _ => false,
        },
        ScheduleKind::Unknown(_) => false,
    }
}

/// Actions due for `machine` at `now`, start before stop.
pub fn due_actions(machine: &Machine, now: NaiveDateTime) -> Vec<Direction> {
    Direction::ALL
        .into_iter()
        .filter(|d| should_fire(machine.schedule(*d), now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use nodepilot_core::types::MachineId;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn january() -> Schedule {
        Schedule::range("08:00", date(2024, 1, 1), date(2024, 1, 31))
    }

    #[test]
    fn daily_fires_on_matching_minute_any_date() {
        let s = Schedule::daily("09:00");
        for (y, m, d) in [(2024, 1, 1), (2024, 2, 29), (2025, 12, 31)] {
            assert!(should_fire(&s, at(y, m, d, 9, 0, 0)));
            assert!(should_fire(&s, at(y, m, d, 9, 0, 59)), "seconds are truncated");
        }
    }

    #[test]
    fn daily_does_not_fire_on_other_minutes() {
        let s = Schedule::daily("09:00");
        assert!(!should_fire(&s, at(2024, 1, 1, 8, 59, 59)));
        assert!(!should_fire(&s, at(2024, 1, 1, 9, 1, 0)));
        assert!(!should_fire(&s, at(2024, 1, 1, 21, 0, 0)));
    }

    #[test]
    fn disabled_schedule_never_fires() {
        let mut s = Schedule::daily("09:00");
        s.enabled = false;
        assert!(!should_fire(&s, at(2024, 1, 1, 9, 0, 0)));
    }

    #[test]
    fn range_fires_inside_interval_inclusive() {
        let s = january();
        assert!(should_fire(&s, at(2024, 1, 1, 8, 0, 0)));
        assert!(should_fire(&s, at(2024, 1, 15, 8, 0, 30)));
        assert!(should_fire(&s, at(2024, 1, 31, 8, 0, 59)));
    }

    #[test]
    fn range_does_not_fire_outside_interval() {
        let s = january();
        assert!(!should_fire(&s, at(2023, 12, 31, 8, 0, 0)));
        assert!(!should_fire(&s, at(2024, 2, 1, 8, 0, 0)));
    }

    #[test]
    fn range_requires_matching_minute() {
        assert!(!should_fire(&january(), at(2024, 1, 15, 9, 0, 0)));
    }

    #[test]
    fn single_day_range() {
        let s = Schedule::range("23:59", date(2024, 6, 1), date(2024, 6, 1));
        assert!(should_fire(&s, at(2024, 6, 1, 23, 59, 0)));
        assert!(!should_fire(&s, at(2024, 6, 2, 23, 59, 0)));
    }

    #[test]
    fn incomplete_range_fails_closed() {
        let mut s = january();
        s.to_date = None;
        assert!(!should_fire(&s, at(2024, 1, 15, 8, 0, 0)));
    }

    #[test]
    fn unknown_kind_fails_closed() {
        let mut s = Schedule::daily("08:00");
        s.kind = ScheduleKind::Unknown("weekly".into());
        assert!(!should_fire(&s, at(2024, 1, 15, 8, 0, 0)));
    }

    #[test]
    fn malformed_time_never_fires() {
        for bad in ["", "8", "noon", "24:00"] {
            let s = Schedule::daily(bad);
            assert!(!should_fire(&s, at(2024, 1, 15, 8, 0, 0)), "time {bad:?}");
        }
    }

    #[test]
    fn unpadded_time_never_fires() {
        let s = Schedule::daily("9:00");
        assert!(!should_fire(&s, at(2024, 1, 15, 9, 0, 0)));
    }

    #[test]
    fn due_actions_evaluates_both_schedules_independently() {
        let machine = Machine {
            id: MachineId::from("m-1"),
            name: "render-01".into(),
            node_id: "node-1".into(),
            start_url: "http://ctl/start".into(),
            stop_url: "http://ctl/stop".into(),
            start_schedule: Schedule::daily("09:00"),
            stop_schedule: Schedule::daily("09:00"),
            status: "unknown".into(),
            last_updated: Utc::now(),
        };
        assert_eq!(
            due_actions(&machine, at(2024, 1, 1, 9, 0, 0)),
            [Direction::Start, Direction::Stop]
        );
        assert!(due_actions(&machine, at(2024, 1, 1, 10, 0, 0)).is_empty());
    }
}
