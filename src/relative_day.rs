use crate::error::EngineError;

const FOLD_AFTER_DAY: u32 = 15;

/// Days after the 15th count back from month end, so day 30 of 30 becomes 0.
pub fn normalize(day: u32, days_in_month: u32) -> i32 {
    debug_assert!(
        (1..=days_in_month).contains(&day),
        "day {day} outside 1..={days_in_month}"
    );
    if day > FOLD_AFTER_DAY {
        day as i32 - days_in_month as i32
    } else {
        day as i32
    }
}

pub fn try_normalize(day: u32, days_in_month: u32) -> Result<i32, EngineError> {
    if day == 0 || day > days_in_month {
        return Err(EngineError::InvalidDay { day, days_in_month });
    }
    Ok(normalize(day, days_in_month))
}
