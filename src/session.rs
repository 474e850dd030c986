use crate::error::FetchError;
use crate::fetch::WeatherClient;
use crate::season::Season;
use crate::structs::{AnalysisConfig, LiveTemperature, ObservationRecord, Verdict};
use crate::transform::{Aggregation, aggregate_cities, distinct_cities};
use crate::validate::validate_cities;
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// A dataset together with the statistics derived from it.
///
/// The statistics are computed once when the dataset is loaded and reused by
/// every later live check.
#[derive(Debug)]
pub struct LoadedData {
    pub records: Vec<ObservationRecord>,
    pub cities: Vec<String>,
    pub analysis: Aggregation,
}

impl LoadedData {
    pub fn new(records: Vec<ObservationRecord>, config: &AnalysisConfig) -> Self {
        let cities = distinct_cities(&records);
        let analysis = aggregate_cities(&records, &cities, config);
        Self {
            records,
            cities,
            analysis,
        }
    }
}

#[derive(Debug)]
pub struct LiveCheck {
    pub live: BTreeMap<String, LiveTemperature>,
    pub verdicts: BTreeMap<String, Verdict>,
}

/// Where the user is in the analysis flow.
///
/// `probe` holds the reading taken while verifying the credential so the
/// next live check does not request that city twice.
#[derive(Debug, Default)]
pub enum Session {
    #[default]
    NoData,
    DataLoaded(LoadedData),
    CredentialVerified {
        data: LoadedData,
        api_key: String,
        probe: Option<(String, LiveTemperature)>,
    },
}

impl Session {
    pub fn data(&self) -> Option<&LoadedData> {
        match self {
            Session::NoData => None,
            Session::DataLoaded(data) | Session::CredentialVerified { data, .. } => Some(data),
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Session::CredentialVerified { .. })
    }

    /// Replaces the dataset. Statistics from a previous dataset are dropped; a
    /// verified credential is kept.
    pub fn load(self, records: Vec<ObservationRecord>, config: &AnalysisConfig) -> Session {
        let data = LoadedData::new(records, config);
        info!(
            "Loaded {} observations for {} cities",
            data.records.len(),
            data.cities.len()
        );
        match self {
            Session::CredentialVerified { api_key, .. } => Session::CredentialVerified {
                data,
                api_key,
                probe: None,
            },
            _ => Session::DataLoaded(data),
        }
    }

    /// Probes the service with `probe_city`, or the first city of the dataset.
    ///
    /// Only a rejected credential keeps the session in `DataLoaded`. Any other
    /// failure is specific to the probed city: the session still becomes
    /// `CredentialVerified`, the city is recorded as no-data, and the reason is
    /// returned alongside. Without data there is nothing to probe with and the
    /// session is returned unchanged.
    pub async fn verify_credential(
        self,
        client: &WeatherClient,
        api_key: String,
        probe_city: Option<&str>,
    ) -> (Session, Option<FetchError>) {
        let data = match self {
            Session::NoData => {
                warn!("Cannot verify a credential before a dataset is loaded");
                return (Session::NoData, None);
            }
            Session::DataLoaded(data) | Session::CredentialVerified { data, .. } => data,
        };
        let Some(probe_city) = probe_city
            .map(str::to_string)
            .or_else(|| data.cities.first().cloned())
        else {
            return (Session::DataLoaded(data), None);
        };

        match client.current_temperature(&probe_city, &api_key).await {
            Ok(celsius) => {
                debug!("Credential accepted (probe {} = {:.2}°C)", probe_city, celsius);
                let reading = LiveTemperature::Reading {
                    celsius,
                    retrieved_at: Utc::now(),
                };
                let session = Session::CredentialVerified {
                    data,
                    api_key,
                    probe: Some((probe_city, reading)),
                };
                (session, None)
            }
            Err(err) if err.is_credential_rejected() => {
                warn!("Credential rejected: {}", err);
                (Session::DataLoaded(data), Some(err))
            }
            Err(err) => {
                warn!("Probe of {} failed, credential not rejected: {}", probe_city, err);
                let reading = LiveTemperature::NoData {
                    reason: err.clone(),
                };
                let session = Session::CredentialVerified {
                    data,
                    api_key,
                    probe: Some((probe_city, reading)),
                };
                (session, Some(err))
            }
        }
    }

    /// Fetches live temperatures for `cities` and validates them against the
    /// selected season. Only available once the credential is verified.
    ///
    /// A pending probe reading is consumed here in place of a second request
    /// for that city.
    pub async fn live_check(
        &mut self,
        client: &WeatherClient,
        season: Season,
        cities: &[String],
    ) -> Option<LiveCheck> {
        let Session::CredentialVerified {
            data,
            api_key,
            probe,
        } = self
        else {
            return None;
        };

        let probe = probe.take().filter(|(city, _)| cities.contains(city));
        let pending: Vec<String> = cities
            .iter()
            .filter(|city| probe.as_ref().is_none_or(|(probed, _)| probed != *city))
            .cloned()
            .collect();

        let mut live = client.current_temperatures(&pending, api_key).await;
        live.extend(probe);
        let verdicts = validate_cities(&data.analysis.stats, &live, cities, season);
        Some(LiveCheck { live, verdicts })
    }
}
