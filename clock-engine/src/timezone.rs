//! UTC to local wall-clock conversion with explicit rules. Pure, so any task
//! may call it without coordination.

use time::{Date, Month, OffsetDateTime, Time};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LocalTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub is_dst: bool,
}

impl LocalTime {
    /// Minutes after 12 o'clock on a 12 hour face.
    pub fn face_minutes(&self) -> u16 {
        (self.hour as u16 % 12) * 60 + self.minute as u16
    }
}

/// Daylight saving period starting and ending on the last Sunday of a month
/// at a fixed UTC hour (the European convention).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DstRule {
    pub offset_minutes: i16,
    pub start_month: u8,
    pub end_month: u8,
    pub utc_hour: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimezoneRules {
    pub std_offset_minutes: i16,
    pub dst: Option<DstRule>,
}

impl TimezoneRules {
    pub const UTC: Self = Self {
        std_offset_minutes: 0,
        dst: None,
    };

    /// CET/CEST
    pub const CENTRAL_EUROPE: Self = Self {
        std_offset_minutes: 60,
        dst: Some(DstRule {
            offset_minutes: 60,
            start_month: 3,
            end_month: 10,
            utc_hour: 1,
        }),
    };
}

fn last_sunday_utc(year: i32, month: u8, utc_hour: u8) -> Option<i64> {
    let month = Month::try_from(month).ok()?;
    let first_of_next = match month {
        Month::December => Date::from_calendar_date(year + 1, Month::January, 1),
        _ => Date::from_calendar_date(year, month.next(), 1),
    }
    .ok()?;
    let last_day = first_of_next.previous_day()?;
    let back = last_day.weekday().number_days_from_sunday();
    let sunday = Date::from_calendar_date(year, month, last_day.day() - back).ok()?;
    let at = Time::from_hms(utc_hour, 0, 0).ok()?;
    Some(sunday.with_time(at).assume_utc().unix_timestamp())
}

fn in_dst(utc: i64, year: i32, rule: &DstRule) -> bool {
    let (Some(start), Some(end)) = (
        last_sunday_utc(year, rule.start_month, rule.utc_hour),
        last_sunday_utc(year, rule.end_month, rule.utc_hour),
    ) else {
        return false;
    };
    if start <= end {
        start <= utc && utc < end
    } else {
        // southern hemisphere: the period spans new year
        utc >= start || utc < end
    }
}

/// Wall-clock time for `utc` under `rules`, or `None` if `utc` is outside the
/// representable calendar range.
pub fn utc_to_local(utc: i64, rules: &TimezoneRules) -> Option<LocalTime> {
    let year = OffsetDateTime::from_unix_timestamp(utc).ok()?.year();
    let is_dst = rules.dst.as_ref().is_some_and(|rule| in_dst(utc, year, rule));

    let mut offset_minutes = rules.std_offset_minutes as i64;
    if is_dst {
        if let Some(rule) = &rules.dst {
            offset_minutes += rule.offset_minutes as i64;
        }
    }

    let local = OffsetDateTime::from_unix_timestamp(utc + offset_minutes * 60).ok()?;
    Some(LocalTime {
        year: local.year(),
        month: local.month() as u8,
        day: local.day(),
        hour: local.hour(),
        minute: local.minute(),
        second: local.second(),
        is_dst,
    })
}
