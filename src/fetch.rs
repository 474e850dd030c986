use crate::error::{FetchError, Result};
use crate::structs::{FetchConfig, LiveTemperature};
use chrono::Utc;
use futures::future::join_all;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: MainBlock,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
}

/// Error body the service sends with non-success statuses, e.g.
/// `{"cod": 401, "message": "Invalid API key. ..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for the current-weather endpoint.
///
/// The per-request timeout from [`FetchConfig`] is baked into the underlying
/// HTTP client, so a slow city expires on its own without stalling a batch.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: Client,
    endpoint: String,
}

impl WeatherClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Fetches the current temperature in Celsius for one city.
    pub async fn current_temperature(
        &self,
        city: &str,
        api_key: &str,
    ) -> std::result::Result<f64, FetchError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", city), ("appid", api_key), ("units", "metric")])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(FetchError::CredentialRejected {
                message: error_message(&text),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let body: CurrentWeather = serde_json::from_str(&text)
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;
        debug!("Current temperature for {}: {:.2}°C", city, body.main.temp);
        Ok(body.main.temp)
    }

    /// Fetches every city concurrently and waits for all requests to settle.
    ///
    /// Failures become `LiveTemperature::NoData` entries; this never fails as
    /// a whole.
    pub async fn current_temperatures(
        &self,
        cities: &[String],
        api_key: &str,
    ) -> BTreeMap<String, LiveTemperature> {
        let requests = cities.iter().map(|city| async move {
            let outcome = self.current_temperature(city, api_key).await;
            (city.clone(), outcome)
        });

        join_all(requests)
            .await
            .into_iter()
            .map(|(city, outcome)| {
                let live = match outcome {
                    Ok(celsius) => LiveTemperature::Reading {
                        celsius,
                        retrieved_at: Utc::now(),
                    },
                    Err(reason) => {
                        warn!("No current temperature for {}: {}", city, reason);
                        LiveTemperature::NoData { reason }
                    }
                };
                (city, live)
            })
            .collect()
    }
}

fn error_message(text: &str) -> String {
    serde_json::from_str::<ErrorBody>(text)
        .map(|body| body.message)
        .unwrap_or_else(|_| text.trim().to_string())
}
