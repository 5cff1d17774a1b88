use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

// HKT has no daylight saving; a fixed offset is exact.
const HKT_OFFSET_SECS: i32 = 8 * 3600;

/// Calendar date of the scan in Hong Kong time; the digest header uses it.
pub fn scan_date(now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    let hkt = FixedOffset::east_opt(HKT_OFFSET_SECS).context("invalid HKT offset")?;
    Ok(now_utc.with_timezone(&hkt).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rolls_to_next_day_after_utc_16h() {
        // 2026-01-05 16:30 UTC = 2026-01-06 00:30 HKT
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 16, 30, 0).unwrap();
        assert_eq!(scan_date(now).unwrap(), NaiveDate::from_ymd_opt(2026, 1, 6).unwrap());
    }

    #[test]
    fn same_day_before_utc_16h() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 15, 59, 0).unwrap();
        assert_eq!(scan_date(now).unwrap(), NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
    }
}
