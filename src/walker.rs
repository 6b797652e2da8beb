use crate::models::{Bar, BarsBySymbol, DaySlice};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Maps a bar timestamp onto the calendar day it is simulated on.
pub trait DayTruncation: Send + Sync {
    fn truncate(&self, timestamp: DateTime<Utc>) -> NaiveDate;
}

/// Calendar-day truncation in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcDay;

impl DayTruncation for UtcDay {
    fn truncate(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.date_naive()
    }
}

impl<F> DayTruncation for F
where
    F: Fn(DateTime<Utc>) -> NaiveDate + Send + Sync,
{
    fn truncate(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        self(timestamp)
    }
}

/// Derives the simulated calendar from multi-symbol bar data.
#[derive(Clone)]
pub struct TimeSeriesWalker {
    truncation: Arc<dyn DayTruncation>,
}

impl Default for TimeSeriesWalker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimeSeriesWalker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSeriesWalker").finish_non_exhaustive()
    }
}

impl TimeSeriesWalker {
    pub fn new() -> Self {
        Self::with_truncation(UtcDay)
    }

    pub fn with_truncation<T: DayTruncation + 'static>(truncation: T) -> Self {
        Self {
            truncation: Arc::new(truncation),
        }
    }

    pub fn day_of(&self, bar: &Bar) -> NaiveDate {
        self.truncation.truncate(bar.timestamp)
    }

    /// Every calendar day that has at least one bar, ascending and duplicate-free.
    pub fn extract_dates(&self, bars_by_symbol: &BarsBySymbol) -> Vec<NaiveDate> {
        bars_by_symbol
            .values()
            .flatten()
            .map(|bar| self.day_of(bar))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Bars falling on `date`, keyed by symbol. Symbols without data that day are absent.
    pub fn slice_for_date(&self, bars_by_symbol: &BarsBySymbol, date: NaiveDate) -> DaySlice {
        let mut slice = DaySlice::new();
        for (symbol, bars) in bars_by_symbol {
            let day_bars: Vec<Bar> = bars
                .iter()
                .filter(|bar| self.day_of(bar) == date)
                .cloned()
                .collect();
            if !day_bars.is_empty() {
                slice.insert(symbol.clone(), day_bars);
            }
        }
        slice
    }

    /// Single-pass equivalent of `extract_dates` followed by `slice_for_date` for every date.
    pub fn group_by_day(&self, bars_by_symbol: &BarsBySymbol) -> BTreeMap<NaiveDate, DaySlice> {
        let mut days: BTreeMap<NaiveDate, DaySlice> = BTreeMap::new();
        for (symbol, bars) in bars_by_symbol {
            for bar in bars {
                days.entry(self.day_of(bar))
                    .or_default()
                    .entry(symbol.clone())
                    .or_default()
                    .push(bar.clone());
            }
        }
        days
    }
}

/// Latest close per symbol within a day slice.
pub fn closing_prices(slice: &DaySlice) -> HashMap<String, f64> {
    slice
        .iter()
        .filter_map(|(symbol, bars)| {
            bars.iter()
                .max_by_key(|bar| bar.timestamp)
                .map(|bar| (symbol.clone(), bar.close))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone};

    fn bar(symbol: &str, timestamp: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        }
    }

    fn sample_bars() -> BarsBySymbol {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        HashMap::from([
            (
                "AAA".to_string(),
                vec![
                    bar("AAA", base, 10.0),
                    bar("AAA", base + Duration::hours(3), 10.5),
                    bar("AAA", base + Duration::days(2), 11.0),
                ],
            ),
            (
                "BBB".to_string(),
                vec![
                    bar("BBB", base + Duration::days(1), 20.0),
                    bar("BBB", base + Duration::days(2), 21.0),
                ],
            ),
        ])
    }

    #[test]
    fn extract_dates_is_sorted_union_of_days() {
        let walker = TimeSeriesWalker::new();
        let dates = walker.extract_dates(&sample_bars());
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
            ]
        );
    }

    #[test]
    fn slice_omits_symbols_without_data() {
        let walker = TimeSeriesWalker::new();
        let bars = sample_bars();

        let first = walker.slice_for_date(&bars, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(first.len(), 1);
        assert_eq!(first["AAA"].len(), 2);

        let missing = walker.slice_for_date(&bars, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert!(missing.is_empty());
    }

    #[test]
    fn group_by_day_matches_per_date_slices() {
        let walker = TimeSeriesWalker::new();
        let bars = sample_bars();
        let grouped = walker.group_by_day(&bars);

        let dates: Vec<NaiveDate> = grouped.keys().copied().collect();
        assert_eq!(dates, walker.extract_dates(&bars));
        for (date, slice) in &grouped {
            assert_eq!(slice, &walker.slice_for_date(&bars, *date));
        }
    }

    #[test]
    fn injected_truncation_shifts_days() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let walker = TimeSeriesWalker::with_truncation(move |ts: DateTime<Utc>| {
            ts.with_timezone(&offset).date_naive()
        });
        let late = Utc.with_ymd_and_hms(2024, 1, 3, 2, 0, 0).unwrap();
        let bars = HashMap::from([("AAA".to_string(), vec![bar("AAA", late, 1.0)])]);

        assert_eq!(
            walker.extract_dates(&bars),
            vec![NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()]
        );
    }

    #[test]
    fn closing_prices_use_latest_bar_of_the_day() {
        let walker = TimeSeriesWalker::new();
        let slice =
            walker.slice_for_date(&sample_bars(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        let prices = closing_prices(&slice);
        assert_eq!(prices.get("AAA"), Some(&10.5));
        assert!(prices.get("BBB").is_none());
    }
}
