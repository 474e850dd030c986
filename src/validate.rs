use crate::season::Season;
use crate::structs::{CityStatistics, LiveTemperature, SeasonStats, Verdict};
use std::collections::BTreeMap;

/// Classifies one reading against a seasonal band.
///
/// Readings exactly on a bound are `Normal`. Without a reading, or without
/// any history for the season, the verdict is `NoData`. A season with a
/// single observation has no spread, so nothing can fall outside its band and
/// a reading is `Normal`.
pub fn classify(reading: Option<f64>, season_stats: Option<&SeasonStats>) -> Verdict {
    let (Some(reading), Some(season_stats)) = (reading, season_stats) else {
        return Verdict::NoData;
    };
    let Some((lower, upper)) = season_stats.band() else {
        return Verdict::Normal;
    };

    if reading > upper {
        Verdict::RecordHeat
    } else if reading < lower {
        Verdict::RecordCold
    } else {
        Verdict::Normal
    }
}

/// Verdict for each of `cities`, for the selected season.
///
/// Cities missing from `live` are treated as having no reading, and cities
/// without historical statistics get `NoData`.
pub fn validate_cities(
    stats: &BTreeMap<String, CityStatistics>,
    live: &BTreeMap<String, LiveTemperature>,
    cities: &[String],
    season: Season,
) -> BTreeMap<String, Verdict> {
    cities
        .iter()
        .map(|city| {
            let reading = live.get(city).and_then(LiveTemperature::celsius);
            let season_stats = stats
                .get(city)
                .and_then(|city_stats| city_stats.season_profile.get(&season));
            (city.clone(), classify(reading, season_stats))
        })
        .collect()
}
