use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate};

/// Country-specific public-holiday lookup. Holidays force the weekday flag to
/// zero in the feature table regardless of the actual day of week.
pub trait HolidayCalendar {
    fn holidays_for_year(&self, year: i32) -> HashSet<NaiveDate>;

    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays_for_year(date.year()).contains(&date)
    }
}

/// Fallback for countries without a built-in calendar.
pub struct NoHolidays;

impl HolidayCalendar for NoHolidays {
    fn holidays_for_year(&self, _year: i32) -> HashSet<NaiveDate> {
        HashSet::new()
    }
}

/// Caller-supplied holiday set, mainly for tests and countries the built-ins
/// do not cover.
pub struct StaticHolidayCalendar {
    dates: HashSet<NaiveDate>,
}

impl StaticHolidayCalendar {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }
}

impl HolidayCalendar for StaticHolidayCalendar {
    fn holidays_for_year(&self, year: i32) -> HashSet<NaiveDate> {
        self.dates
            .iter()
            .copied()
            .filter(|date| date.year() == year)
            .collect()
    }
}

/// French public holidays: the fixed dates plus the Easter-derived movable
/// feasts (Easter Monday, Ascension, Whit Monday).
pub struct FranceHolidays;

const FRANCE_FIXED_DATES: [(u32, u32); 8] = [
    (1, 1),
    (5, 1),
    (5, 8),
    (7, 14),
    (8, 15),
    (11, 1),
    (11, 11),
    (12, 25),
];

impl HolidayCalendar for FranceHolidays {
    fn holidays_for_year(&self, year: i32) -> HashSet<NaiveDate> {
        let mut dates = HashSet::new();
        for (month, day) in FRANCE_FIXED_DATES {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                dates.insert(date);
            }
        }
        let easter = easter_sunday(year);
        dates.insert(easter + Duration::days(1));
        dates.insert(easter + Duration::days(39));
        dates.insert(easter + Duration::days(50));
        dates
    }
}

pub fn for_country(code: &str) -> Box<dyn HolidayCalendar> {
    match code.to_ascii_uppercase().as_str() {
        "FR" => Box::new(FranceHolidays),
        _ => Box::new(NoHolidays),
    }
}

/// Gregorian computus (Meeus/Jones/Butcher). Always lands between March 22
/// and April 25.
fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .expect("computus yields a valid date")
}
