use crate::error::{PipelineError, Result};
use crate::season::Season;
use crate::structs::{
    AnalysisConfig, AnomalyPoint, CityStatistics, ObservationRecord, SeasonStats, TrendLine,
    TrendPoint,
};
use chrono::{Datelike, NaiveDateTime};
use log::debug;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Per-city outcome of a parallel analysis run.
///
/// A failing city never discards the cities that succeeded.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub stats: BTreeMap<String, CityStatistics>,
    pub failures: BTreeMap<String, PipelineError>,
}

/// Lists the distinct cities of a dataset in order of first appearance.
pub fn distinct_cities(records: &[ObservationRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.city.as_str()))
        .map(|r| r.city.clone())
        .collect()
}

/// Computes [`CityStatistics`] for every requested city on the rayon pool.
///
/// Each worker receives its own copy of one city's observations, in dataset
/// order. Requested cities with no observations are reported in
/// `Aggregation::failures` as `PipelineError::EmptySeries`.
pub fn aggregate_cities(
    records: &[ObservationRecord],
    cities: &[String],
    config: &AnalysisConfig,
) -> Aggregation {
    let mut per_city: HashMap<&str, Vec<ObservationRecord>> = cities
        .iter()
        .map(|city| (city.as_str(), Vec::new()))
        .collect();
    for record in records {
        if let Some(slice) = per_city.get_mut(record.city.as_str()) {
            slice.push(record.clone());
        }
    }
    debug!(
        "Analyzing {} cities from {} observations",
        per_city.len(),
        records.len()
    );

    let entries: Vec<(String, Vec<ObservationRecord>)> = per_city
        .into_iter()
        .map(|(city, slice)| (city.to_string(), slice))
        .collect();
    let results: Vec<(String, Result<CityStatistics>)> = entries
        .into_par_iter()
        .map(|(city, slice)| {
            let stats = city_statistics(&city, &slice, config);
            (city, stats)
        })
        .collect();

    let mut aggregation = Aggregation::default();
    for (city, result) in results {
        match result {
            Ok(stats) => {
                aggregation.stats.insert(city, stats);
            }
            Err(err) => {
                debug!("Statistics failed for {}: {}", city, err);
                aggregation.failures.insert(city, err);
            }
        }
    }
    aggregation
}

/// Derives descriptive and predictive statistics for one city.
///
/// `observations` must all belong to `city` and be in time order; mixed
/// input is not detected.
///
/// # Errors
///
/// Returns `PipelineError::EmptySeries` when `observations` is empty.
pub fn city_statistics(
    city: &str,
    observations: &[ObservationRecord],
    config: &AnalysisConfig,
) -> Result<CityStatistics> {
    if observations.is_empty() {
        return Err(PipelineError::EmptySeries(city.to_string()));
    }

    let temps: Vec<f64> = observations.iter().map(|o| o.temperature).collect();
    let mean_temp = mean(&temps);
    let min_temp = temps.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max_temp = temps.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let anomalies = rolling_anomalies(observations, config.window, config.sigma);
    let season_profile = season_profile(observations);

    let ordinals: Vec<f64> = observations
        .iter()
        .map(|o| ordinal_day(&o.timestamp))
        .collect();
    let trend_line = fit_trend(&ordinals, &temps);
    let trend = observations
        .iter()
        .zip(&ordinals)
        .map(|(o, &x)| TrendPoint {
            timestamp: o.timestamp,
            trend: trend_line.predict(x),
        })
        .collect();

    Ok(CityStatistics {
        city: city.to_string(),
        count: observations.len() as u32,
        mean_temp,
        min_temp,
        max_temp,
        season_profile,
        trend_line,
        trend,
        anomalies,
    })
}

/// Flags each observation against a trailing window that includes itself.
///
/// The window holds at most `window` points (at least one). A point is
/// anomalous when it lies at or beyond `sigma` sample standard deviations from
/// the window mean. A one-point window has no sample std, so the first
/// observation is never flagged.
pub fn rolling_anomalies(
    observations: &[ObservationRecord],
    window: usize,
    sigma: f64,
) -> Vec<AnomalyPoint> {
    let window = window.max(1);
    let temps: Vec<f64> = observations.iter().map(|o| o.temperature).collect();

    observations
        .iter()
        .enumerate()
        .map(|(i, o)| {
            let start = (i + 1).saturating_sub(window);
            let slice = &temps[start..=i];
            let window_mean = mean(slice);
            let is_anomaly = sample_std(slice, window_mean).is_some_and(|std| {
                o.temperature >= window_mean + sigma * std
                    || o.temperature <= window_mean - sigma * std
            });
            AnomalyPoint {
                timestamp: o.timestamp,
                temperature: o.temperature,
                is_anomaly,
            }
        })
        .collect()
}

/// Mean and sample std per season present in the observations.
pub fn season_profile(observations: &[ObservationRecord]) -> BTreeMap<Season, SeasonStats> {
    let mut grouped: BTreeMap<Season, Vec<f64>> = BTreeMap::new();
    for o in observations {
        grouped.entry(o.season).or_default().push(o.temperature);
    }

    grouped
        .into_iter()
        .map(|(season, temps)| {
            let average = mean(&temps);
            let stats = SeasonStats {
                average,
                std: sample_std(&temps, average),
                count: temps.len() as u32,
            };
            (season, stats)
        })
        .collect()
}

/// Proleptic Gregorian day number, 0001-01-01 being day 1.
pub fn ordinal_day(timestamp: &NaiveDateTime) -> f64 {
    timestamp.date().num_days_from_ce() as f64
}

/// Ordinary least squares of `ys` on `xs`.
///
/// When every x is identical the slope is zero and the line passes through
/// the mean of `ys`.
pub fn fit_trend(xs: &[f64], ys: &[f64]) -> TrendLine {
    let x_mean = mean(xs);
    let y_mean = mean(ys);

    let (sxy, sxx) = xs
        .iter()
        .zip(ys)
        .fold((0.0, 0.0), |(sxy, sxx), (&x, &y)| {
            let dx = x - x_mean;
            (sxy + dx * (y - y_mean), sxx + dx * dx)
        });

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    TrendLine {
        slope,
        intercept: y_mean - slope * x_mean,
    }
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample standard deviation (N-1 denominator); undefined below two values.
fn sample_std(data: &[f64], mean_val: f64) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let variance =
        data.iter().map(|x| (x - mean_val).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(city: &str, day: u32, season: Season, temperature: f64) -> ObservationRecord {
        let timestamp = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::days(day as i64);
        ObservationRecord {
            city: city.to_string(),
            timestamp,
            season,
            temperature,
        }
    }

    fn series(city: &str, temps: &[f64]) -> Vec<ObservationRecord> {
        temps
            .iter()
            .enumerate()
            .map(|(i, &t)| obs(city, i as u32, Season::Winter, t))
            .collect()
    }

    #[test]
    fn empty_series_is_rejected() {
        let err = city_statistics("Nowhere", &[], &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySeries(city) if city == "Nowhere"));
    }

    #[test]
    fn mean_lies_between_min_and_max() {
        let temps = [3.0, -2.5, 7.25, 0.0, 11.0, 4.5];
        let stats = city_statistics("A", &series("A", &temps), &AnalysisConfig::default()).unwrap();
        assert_eq!(stats.min_temp, -2.5);
        assert_eq!(stats.max_temp, 11.0);
        assert!(stats.min_temp <= stats.mean_temp && stats.mean_temp <= stats.max_temp);
        assert!((stats.mean_temp - 23.25 / 6.0).abs() < 1e-12);
        for t in temps {
            assert!(stats.min_temp <= t && t <= stats.max_temp);
        }
        assert_eq!(stats.count, 6);
    }

    #[test]
    fn first_point_is_never_anomalous() {
        let points = rolling_anomalies(&series("A", &[100.0, 0.0, 0.0]), 30, 2.0);
        assert!(!points[0].is_anomaly);
    }

    #[test]
    fn constant_window_flags_its_own_point() {
        // zero spread: the band collapses onto the mean and the point sits on it
        let flags: Vec<bool> = rolling_anomalies(&series("A", &[5.0, 5.0, 5.0]), 30, 2.0)
            .iter()
            .map(|p| p.is_anomaly)
            .collect();
        assert_eq!(flags, vec![false, true, true]);
    }

    #[test]
    fn spike_after_stable_run_is_flagged() {
        let mut temps = vec![10.0, 10.5, 9.5, 10.0, 10.5, 9.5, 10.0, 10.5, 9.5, 10.0];
        temps.push(30.0);
        let points = rolling_anomalies(&series("A", &temps), 30, 2.0);
        assert!(points[..10].iter().all(|p| !p.is_anomaly));
        assert!(points[10].is_anomaly);
        assert_eq!(points[10].temperature, 30.0);
    }

    #[test]
    fn flags_only_points_outside_the_window_band() {
        let temps = [5.0, 7.0, 4.0, 12.0, 6.0, 5.5, -3.0, 6.5, 5.0, 6.0];
        let points = rolling_anomalies(&series("A", &temps), 4, 2.0);
        for (i, p) in points.iter().enumerate().skip(1) {
            let start = (i + 1).saturating_sub(4);
            let window = &temps[start..=i];
            let m = mean(window);
            let s = sample_std(window, m).unwrap();
            if (p.temperature - m).abs() < 2.0 * s {
                assert!(!p.is_anomaly, "point {} flagged inside band", i);
            }
        }
    }

    #[test]
    fn window_is_bounded() {
        // an early outlier stops influencing the band once it leaves the window
        let mut temps = vec![-50.0];
        temps.extend(std::iter::repeat_n(0.0, 5));
        temps.extend([0.1, -0.1, 0.1, -0.1]);
        temps.push(3.0);
        let short = rolling_anomalies(&series("A", &temps), 8, 2.0);
        let long = rolling_anomalies(&series("A", &temps), 30, 2.0);
        assert!(short.last().unwrap().is_anomaly);
        assert!(!long.last().unwrap().is_anomaly);
    }

    #[test]
    fn season_profile_only_has_present_seasons() {
        let records = vec![
            obs("A", 0, Season::Winter, -4.0),
            obs("A", 1, Season::Winter, -6.0),
            obs("A", 100, Season::Summer, 20.0),
        ];
        let profile = season_profile(&records);
        assert_eq!(profile.len(), 2);
        assert!(!profile.contains_key(&Season::Spring));

        let winter = profile[&Season::Winter];
        assert_eq!(winter.average, -5.0);
        assert!((winter.std.unwrap() - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(winter.count, 2);

        let summer = profile[&Season::Summer];
        assert_eq!(summer.average, 20.0);
        assert_eq!(summer.std, None);
    }

    #[test]
    fn ordinal_matches_proleptic_day_number() {
        let first = NaiveDate::from_ymd_opt(1, 1, 1)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        assert_eq!(ordinal_day(&first), 1.0);
        let later = NaiveDate::from_ymd_opt(2010, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(ordinal_day(&later), 733_773.0);
    }

    #[test]
    fn trend_recovers_exact_line() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [3.0, 5.0, 7.0, 9.0];
        let line = fit_trend(&xs, &ys);
        assert!((line.slope - 2.0).abs() < 1e-12);
        assert!((line.intercept - 1.0).abs() < 1e-12);
        assert_eq!(fit_trend(&xs, &ys), line);
    }

    #[test]
    fn degenerate_trend_is_flat_at_mean() {
        let line = fit_trend(&[5.0, 5.0], &[1.0, 3.0]);
        assert_eq!(line.slope, 0.0);
        assert_eq!(line.intercept, 2.0);

        let single = city_statistics("A", &series("A", &[4.0]), &AnalysisConfig::default()).unwrap();
        assert_eq!(single.trend[0].trend, 4.0);
    }

    #[test]
    fn trend_values_are_fitted_predictions() {
        let temps = [1.0, 4.0, 2.0, 8.0, 5.0];
        let records = series("A", &temps);
        let stats = city_statistics("A", &records, &AnalysisConfig::default()).unwrap();
        assert_eq!(stats.trend.len(), temps.len());
        for (point, record) in stats.trend.iter().zip(&records) {
            assert_eq!(point.timestamp, record.timestamp);
            assert!(point.trend.is_finite());
            let expected = stats.trend_line.predict(ordinal_day(&record.timestamp));
            assert_eq!(point.trend, expected);
        }
    }

    #[test]
    fn statistics_are_deterministic_for_the_same_order() {
        let records = series("A", &[2.0, 9.0, -1.0, 4.0, 15.0, 3.0, 3.5]);
        let config = AnalysisConfig::default();
        let original = city_statistics("A", &records, &config).unwrap();

        let mut shuffled = records.clone();
        shuffled.reverse();
        shuffled.sort_by_key(|r| r.timestamp);
        assert_eq!(city_statistics("A", &shuffled, &config).unwrap(), original);
    }

    #[test]
    fn aggregates_every_requested_city() {
        let records = vec![
            obs("A", 0, Season::Winter, -3.0),
            obs("B", 0, Season::Summer, 25.0),
            obs("A", 1, Season::Winter, -1.0),
            obs("B", 1, Season::Summer, 27.0),
            obs("A", 2, Season::Spring, 8.0),
        ];
        let cities = distinct_cities(&records);
        assert_eq!(cities, vec!["A".to_string(), "B".to_string()]);

        let result = aggregate_cities(&records, &cities, &AnalysisConfig::default());
        assert!(result.failures.is_empty());
        assert_eq!(
            result.stats.keys().cloned().collect::<Vec<_>>(),
            vec!["A".to_string(), "B".to_string()]
        );

        let a = &result.stats["A"];
        assert_eq!(
            a.season_profile.keys().copied().collect::<Vec<_>>(),
            vec![Season::Winter, Season::Spring]
        );
        let b = &result.stats["B"];
        assert_eq!(
            b.season_profile.keys().copied().collect::<Vec<_>>(),
            vec![Season::Summer]
        );
        assert_eq!(b.count, 2);
    }

    #[test]
    fn missing_city_fails_alone() {
        let records = vec![obs("A", 0, Season::Winter, 1.0)];
        let cities = vec!["A".to_string(), "Ghost".to_string()];
        let result = aggregate_cities(&records, &cities, &AnalysisConfig::default());
        assert!(result.stats.contains_key("A"));
        assert!(matches!(
            result.failures.get("Ghost"),
            Some(PipelineError::EmptySeries(_))
        ));
    }

    #[test]
    fn parallel_matches_sequential() {
        let records: Vec<ObservationRecord> = (0..200)
            .map(|i| {
                let city = ["A", "B", "C"][i % 3];
                obs(city, i as u32, Season::ALL[i % 4], (i as f64 * 0.7).sin() * 10.0)
            })
            .collect();
        let config = AnalysisConfig::default();
        let cities = distinct_cities(&records);
        let parallel = aggregate_cities(&records, &cities, &config);

        for city in &cities {
            let slice: Vec<ObservationRecord> =
                records.iter().filter(|r| &r.city == city).cloned().collect();
            let sequential = city_statistics(city, &slice, &config).unwrap();
            assert_eq!(parallel.stats[city], sequential);
        }
    }
}
