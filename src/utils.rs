use chrono::{Days, NaiveDate};

/// Days covered by a climate sync when no range is given.
pub const DEFAULT_RANGE_DAYS: u64 = 30;

/// Fills in a missing start or end date.
///
/// The end defaults to the day before `today` (the API publishes daily values
/// with a delay), and the start to [`DEFAULT_RANGE_DAYS`] before the end.
pub fn resolve_date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let end = end.unwrap_or_else(|| today.pred_opt().unwrap_or(today));
    let start = start.unwrap_or_else(|| {
        end.checked_sub_days(Days::new(DEFAULT_RANGE_DAYS))
            .unwrap_or(end)
    });
    (start, end)
}
