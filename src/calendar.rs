use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub weekday: Weekday,
    pub days_in_month: u32,
}

pub trait SolarCalendar {
    fn kind(&self) -> CalendarKind;

    fn date_of(&self, at: DateTime<Utc>) -> SolarDate;

    /// Wall-clock time of `at` in the calendar's timezone.
    fn time_of(&self, at: DateTime<Utc>) -> NaiveTime;

    fn days_in_month(&self, year: i32, month: u32) -> u32;

    fn month_name(&self, month: u32) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarKind {
    #[default]
    Jalali,
    Gregorian,
}

impl CalendarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarKind::Jalali => "jalali",
            CalendarKind::Gregorian => "gregorian",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "jalali" => Some(CalendarKind::Jalali),
            "gregorian" => Some(CalendarKind::Gregorian),
            _ => None,
        }
    }
}

impl fmt::Display for CalendarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn build_calendar(kind: CalendarKind, tz: Tz) -> Box<dyn SolarCalendar> {
    match kind {
        CalendarKind::Jalali => Box::new(JalaliCalendar::new(tz)),
        CalendarKind::Gregorian => Box::new(GregorianCalendar::new(tz)),
    }
}

fn local_time(at: DateTime<Utc>, tz: &Tz) -> NaiveTime {
    let time = at.with_timezone(tz).time();
    time.with_nanosecond(0).unwrap_or(time)
}

const JALALI_MONTHS: [&str; 12] = [
    "Farvardin",
    "Ordibehesht",
    "Khordad",
    "Tir",
    "Mordad",
    "Shahrivar",
    "Mehr",
    "Aban",
    "Azar",
    "Dey",
    "Bahman",
    "Esfand",
];

const GREGORIAN_MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn month_name_from(table: &[&'static str; 12], month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|idx| table.get(idx as usize))
        .copied()
        .unwrap_or("unknown")
}

// Jalali years where the 33-year leap cycle shifts. Valid for -61..3178.
const JALALI_BREAKS: [i32; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

struct JalaliYear {
    /// Years since the last leap year; 0 means this year is leap.
    leap: i32,
    /// Day of March on which Farvardin 1 falls.
    march_day: i32,
}

fn jalali_year(jy: i32) -> JalaliYear {
    let gy = jy + 621;
    let mut leap_j = -14;
    let mut jp = JALALI_BREAKS[0];
    let mut jump = 0;

    for &jm in &JALALI_BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += jump / 33 * 8 + (jump % 33) / 4;
        jp = jm;
    }

    let mut n = jy - jp;
    leap_j += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - (gy / 100 + 1) * 3 / 4 - 150;
    let march_day = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let mut leap = ((n + 1) % 33 - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    JalaliYear { leap, march_day }
}

fn is_gregorian_leap(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn jalali_from_gregorian(date: NaiveDate) -> (i32, u32, u32) {
    let mut jy = date.year() - 621;
    let info = jalali_year(jy);
    let nowruz_ordinal0 = 59 + i32::from(is_gregorian_leap(date.year())) + info.march_day - 1;
    let mut k = date.ordinal0() as i32 - nowruz_ordinal0;

    if k >= 0 {
        if k <= 185 {
            return (jy, (1 + k / 31) as u32, (k % 31 + 1) as u32);
        }
        k -= 186;
    } else {
        jy -= 1;
        k += 179;
        if info.leap == 1 {
            k += 1;
        }
    }

    (jy, (7 + k / 30) as u32, (k % 30 + 1) as u32)
}

#[derive(Debug, Clone, Copy)]
pub struct JalaliCalendar {
    tz: Tz,
}

impl JalaliCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn is_leap_year(year: i32) -> bool {
        jalali_year(year).leap == 0
    }
}

impl SolarCalendar for JalaliCalendar {
    fn kind(&self) -> CalendarKind {
        CalendarKind::Jalali
    }

    fn date_of(&self, at: DateTime<Utc>) -> SolarDate {
        let local = at.with_timezone(&self.tz).date_naive();
        let (year, month, day) = jalali_from_gregorian(local);
        SolarDate {
            year,
            month,
            day,
            weekday: local.weekday(),
            days_in_month: self.days_in_month(year, month),
        }
    }

    fn time_of(&self, at: DateTime<Utc>) -> NaiveTime {
        local_time(at, &self.tz)
    }

    fn days_in_month(&self, year: i32, month: u32) -> u32 {
        match month {
            1..=6 => 31,
            7..=11 => 30,
            _ if Self::is_leap_year(year) => 30,
            _ => 29,
        }
    }

    fn month_name(&self, month: u32) -> &'static str {
        month_name_from(&JALALI_MONTHS, month)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GregorianCalendar {
    tz: Tz,
}

impl GregorianCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl SolarCalendar for GregorianCalendar {
    fn kind(&self) -> CalendarKind {
        CalendarKind::Gregorian
    }

    fn date_of(&self, at: DateTime<Utc>) -> SolarDate {
        let local = at.with_timezone(&self.tz).date_naive();
        SolarDate {
            year: local.year(),
            month: local.month(),
            day: local.day(),
            weekday: local.weekday(),
            days_in_month: self.days_in_month(local.year(), local.month()),
        }
    }

    fn time_of(&self, at: DateTime<Utc>) -> NaiveTime {
        local_time(at, &self.tz)
    }

    fn days_in_month(&self, year: i32, month: u32) -> u32 {
        match month {
            4 | 6 | 9 | 11 => 30,
            2 if is_gregorian_leap(year) => 29,
            2 => 28,
            _ => 31,
        }
    }

    fn month_name(&self, month: u32) -> &'static str {
        month_name_from(&GREGORIAN_MONTHS, month)
    }
}
