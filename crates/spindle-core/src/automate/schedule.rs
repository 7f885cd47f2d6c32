//! Schedule - 4 つのフィールド式とタイムゾーン
//!
//! 時間ベースの trigger と `schedule` condition の両方がこれを使う。
//! 判定は与えられた時刻だけで決まる（状態を持たない）。

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::predicate::Predicate;
use crate::domain::{TriggerKind, ValidationError};
use crate::typed::Params;

fn any() -> String {
    "*".to_string()
}

/// テキストのままの schedule。保存・API 用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTemplate {
    #[serde(default = "any")]
    pub hour: String,
    #[serde(default = "any")]
    pub day: String,
    #[serde(default = "any")]
    pub month: String,
    /// 0 = Sunday.
    #[serde(default = "any")]
    pub week_day: String,
    /// IANA name; UTC when absent.
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Default for ScheduleTemplate {
    fn default() -> Self {
        Self {
            hour: any(),
            day: any(),
            month: any(),
            week_day: any(),
            timezone: None,
        }
    }
}

impl ScheduleTemplate {
    /// Template for a time-based trigger kind; `None` for event triggers.
    pub fn for_trigger(kind: &TriggerKind) -> Option<Self> {
        let template = match kind {
            TriggerKind::EveryHour => Self::default(),
            TriggerKind::EveryDay { hour, timezone } => Self {
                hour: hour.to_string(),
                timezone: timezone.clone(),
                ..Self::default()
            },
            TriggerKind::EveryWeek {
                week_day,
                hour,
                timezone,
            } => Self {
                hour: hour.to_string(),
                week_day: week_day.to_string(),
                timezone: timezone.clone(),
                ..Self::default()
            },
            TriggerKind::EveryMonth {
                month_day,
                hour,
                timezone,
            } => Self {
                hour: hour.to_string(),
                day: month_day.to_string(),
                timezone: timezone.clone(),
                ..Self::default()
            },
            TriggerKind::ContractEvent { .. } => return None,
        };
        Some(template)
    }

    pub fn compile(&self) -> Result<Schedule, ValidationError> {
        let field = |name: &str, raw: &str, min: u32, max: u32| {
            let predicate = Predicate::parse(raw)
                .map_err(|e| ValidationError::with_detail(name, e.to_string()))?;
            if !predicate.within(min, max) {
                return Err(ValidationError::with_detail(
                    name,
                    format!("'{raw}' is outside {min}-{max}"),
                ));
            }
            Ok(predicate)
        };
        let timezone = match &self.timezone {
            None => Tz::UTC,
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ValidationError::with_detail("timezone", name.clone()))?,
        };
        Ok(Schedule {
            hour: field("hour", &self.hour, 0, 23)?,
            day: field("day", &self.day, 1, 31)?,
            month: field("month", &self.month, 1, 12)?,
            week_day: field("weekDay", &self.week_day, 0, 6)?,
            timezone,
        })
    }
}

impl Params for ScheduleTemplate {
    fn verify(&self) -> Result<(), ValidationError> {
        self.compile().map(|_| ())
    }
}

/// 変換済みの schedule
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    hour: Predicate,
    day: Predicate,
    month: Predicate,
    week_day: Predicate,
    timezone: Tz,
}

impl Schedule {
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.timezone);
        self.hour.test(local.hour())
            && self.day.test(local.day())
            && self.month.test(local.month())
            && self.week_day.test(local.weekday().num_days_from_sunday())
    }

    /// 2 つの時刻がこの schedule の timezone で同じ時間枠（日付 + 時）に入るか
    pub fn same_hour(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        let (a, b) = (a.with_timezone(&self.timezone), b.with_timezone(&self.timezone));
        a.date_naive() == b.date_naive() && a.hour() == b.hour()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn every_hour_always_matches() {
        let schedule = ScheduleTemplate::for_trigger(&TriggerKind::EveryHour)
            .unwrap()
            .compile()
            .unwrap();
        assert!(schedule.matches(at(2024, 2, 29, 0)));
        assert!(schedule.matches(at(2024, 7, 4, 23)));
    }

    #[test]
    fn every_week_uses_sunday_as_zero() {
        // 2024-03-03 is a Sunday
        let kind = TriggerKind::EveryWeek {
            week_day: 0,
            hour: 9,
            timezone: None,
        };
        let schedule = ScheduleTemplate::for_trigger(&kind).unwrap().compile().unwrap();
        assert!(schedule.matches(at(2024, 3, 3, 9)));
        assert!(!schedule.matches(at(2024, 3, 4, 9)));
        assert!(!schedule.matches(at(2024, 3, 3, 10)));
    }

    #[test]
    fn every_month_matches_day_of_month() {
        let kind = TriggerKind::EveryMonth {
            month_day: 15,
            hour: 0,
            timezone: None,
        };
        let schedule = ScheduleTemplate::for_trigger(&kind).unwrap().compile().unwrap();
        assert!(schedule.matches(at(2024, 1, 15, 0)));
        assert!(schedule.matches(at(2024, 12, 15, 0)));
        assert!(!schedule.matches(at(2024, 1, 16, 0)));
    }

    #[test]
    fn timezone_shifts_the_local_hour() {
        let kind = TriggerKind::EveryDay {
            hour: 9,
            timezone: Some("Asia/Tokyo".into()),
        };
        let schedule = ScheduleTemplate::for_trigger(&kind).unwrap().compile().unwrap();
        // 09:00 JST == 00:00 UTC
        assert!(schedule.matches(at(2024, 5, 1, 0)));
        assert!(!schedule.matches(at(2024, 5, 1, 9)));
    }

    #[test]
    fn same_hour_follows_the_local_clock() {
        let utc = ScheduleTemplate::default().compile().unwrap();
        assert!(utc.same_hour(at(2024, 5, 1, 10), at(2024, 5, 1, 10) + chrono::Duration::minutes(59)));
        assert!(!utc.same_hour(at(2024, 5, 1, 10), at(2024, 5, 1, 11)));
        assert!(!utc.same_hour(at(2024, 5, 1, 10), at(2024, 5, 2, 10)));

        // +05:30: the local hour starts at xx:30 UTC
        let kolkata = ScheduleTemplate {
            timezone: Some("Asia/Kolkata".into()),
            ..ScheduleTemplate::default()
        }
        .compile()
        .unwrap();
        let half_past = at(2024, 5, 1, 10) + chrono::Duration::minutes(30);
        assert!(kolkata.same_hour(half_past, half_past + chrono::Duration::minutes(45)));
        assert!(!kolkata.same_hour(at(2024, 5, 1, 10), half_past));
    }

    #[test]
    fn event_triggers_have_no_schedule() {
        let kind = TriggerKind::ContractEvent {
            network: "1".into(),
            address: "0x0".into(),
            event: "Transfer".into(),
            subscription: None,
        };
        assert!(ScheduleTemplate::for_trigger(&kind).is_none());
    }

    #[test]
    fn bad_fields_name_the_field() {
        let template = ScheduleTemplate {
            week_day: "mon".into(),
            ..ScheduleTemplate::default()
        };
        let err = template.compile().unwrap_err();
        assert_eq!(err.field(), "weekDay");

        let template = ScheduleTemplate {
            timezone: Some("Mars/Olympus".into()),
            ..ScheduleTemplate::default()
        };
        assert_eq!(template.compile().unwrap_err().field(), "timezone");
    }

    #[rstest]
    #[case::hour(TriggerKind::EveryDay { hour: 24, timezone: None }, "hour")]
    #[case::week_day(TriggerKind::EveryWeek { week_day: 7, hour: 9, timezone: None }, "weekDay")]
    #[case::month_day(TriggerKind::EveryMonth { month_day: 32, hour: 0, timezone: None }, "day")]
    #[case::month_day_zero(TriggerKind::EveryMonth { month_day: 0, hour: 0, timezone: None }, "day")]
    fn out_of_range_trigger_fields_are_rejected(#[case] kind: TriggerKind, #[case] field: &str) {
        let err = ScheduleTemplate::for_trigger(&kind).unwrap().compile().unwrap_err();
        assert_eq!(err.field(), field);
        assert!(err.to_string().starts_with(&format!("Invalid {field}")));
    }

    #[rstest]
    #[case::month_list("month", "1,13")]
    #[case::day_range("day", "0-10")]
    #[case::hour_mod("hour", "12-30/2")]
    fn out_of_range_templates_are_rejected(#[case] field: &str, #[case] raw: &str) {
        let mut template = ScheduleTemplate::default();
        match field {
            "month" => template.month = raw.into(),
            "day" => template.day = raw.into(),
            _ => template.hour = raw.into(),
        }
        assert_eq!(template.compile().unwrap_err().field(), field);
    }

    #[test]
    fn params_parse_fills_missing_fields_with_star() {
        let template = ScheduleTemplate::parse(&serde_json::json!({"hour": "*/6"})).unwrap();
        assert_eq!(template.day, "*");
        let schedule = template.compile().unwrap();
        assert!(schedule.matches(at(2024, 1, 1, 12)));
        assert!(!schedule.matches(at(2024, 1, 1, 13)));
    }
}
