//! Calendar arithmetic for boundary and frequency rotation

use chrono::{DateTime, Local, NaiveTime, TimeDelta, TimeZone, Timelike};
use rotastream_core::{BoundaryUnit, Frequency};
use std::time::Duration;

/// Whether at least one `unit` has elapsed since `modified`, or the calendar day changed
pub fn boundary_crossed(
    unit: BoundaryUnit,
    modified: &DateTime<Local>,
    now: &DateTime<Local>,
) -> bool {
    if now.date_naive() != modified.date_naive() {
        return true;
    }
    let elapsed = now.signed_duration_since(*modified);
    elapsed.num_seconds() >= unit.duration().as_secs() as i64
}

/// Next calendar-aligned boundary of `frequency` strictly after `from`.
///
/// Boundaries are multiples of the period counted from the start of the
/// smallest enclosing unit that can hold one period: seconds within the
/// minute, minutes within the hour, hours within the day. "90 minutes" does
/// not fit in an hour, so it is counted from midnight; "120 seconds" is
/// counted from the top of the hour. When the period does not divide the
/// enclosing unit the last boundary is the end of that unit, so "7 minutes"
/// fires at :56 and then again at the top of the hour. Periods longer than a
/// day are counted from local midnight of `from`.
///
/// Returns `None` for an empty period or when the boundary falls outside the
/// calendar range.
pub fn next_boundary(frequency: &Frequency, from: &DateTime<Local>) -> Option<DateTime<Local>> {
    let naive = from.naive_local();
    let day_start = naive.date().and_time(NaiveTime::default());
    let secs_of_day = i64::from(naive.num_seconds_from_midnight());
    let step = i64::try_from(frequency.period().as_secs()).ok()?;
    if step == 0 {
        return None;
    }

    let natural = match frequency.unit {
        BoundaryUnit::Second => 60,
        BoundaryUnit::Minute => 3600,
        BoundaryUnit::Hour | BoundaryUnit::Day => 86_400,
    };
    let parent_len = [60i64, 3600, 86_400]
        .into_iter()
        .find(|len| *len >= natural && *len >= step);

    let parent_start = match parent_len {
        Some(len) => day_start.checked_add_signed(TimeDelta::try_seconds(secs_of_day / len * len)?)?,
        None => day_start,
    };

    let elapsed = (naive - parent_start).num_seconds();
    let offset = (elapsed / step).checked_add(1)?.checked_mul(step)?;
    let mut next = parent_start.checked_add_signed(TimeDelta::try_seconds(offset)?)?;

    if let Some(len) = parent_len {
        let parent_end = parent_start.checked_add_signed(TimeDelta::try_seconds(len)?)?;
        next = next.min(parent_end);
    }

    // A boundary inside a DST gap has no local representation
    match Local.from_local_datetime(&next).earliest() {
        Some(at) => Some(at),
        None => from.checked_add_signed(TimeDelta::try_seconds(step)?),
    }
}

/// Delay from `from` until the next boundary of `frequency`
pub fn delay_until_next(frequency: &Frequency, from: &DateTime<Local>) -> Option<Duration> {
    let next = next_boundary(frequency, from)?;
    Some(
        next.signed_duration_since(*from)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}
