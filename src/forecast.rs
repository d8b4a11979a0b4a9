//! Prévision de demande : oracle externe, seulement l'interface et un bouchon statique.

use crate::clock;
use crate::error::SchedError;
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Demande horaire (heure 0–23 → livreurs requis) et multiplicateur par jour (0 = dimanche).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    #[serde(default)]
    pub hourly: BTreeMap<u8, u32>,
    #[serde(default)]
    pub weekday_multiplier: BTreeMap<u8, f64>,
}

impl Forecast {
    /// Multiplicateur du jour, 1.0 si absent, jamais négatif.
    pub fn multiplier(&self, date: NaiveDate) -> f64 {
        self.weekday_multiplier
            .get(&clock::day_of_week(date))
            .copied()
            .unwrap_or(1.0)
            .max(0.0)
    }

    /// Livreurs requis à `hour` le jour `date`.
    pub fn required(&self, date: NaiveDate, hour: u8) -> u32 {
        let base = self.hourly.get(&hour).copied().unwrap_or(0);
        scaled_headcount(base, self.multiplier(date))
    }
}

/// `ceil(base × multiplier)`, tolérant aux erreurs d'arrondi flottant.
pub fn scaled_headcount(base: u32, multiplier: f64) -> u32 {
    if base == 0 || multiplier <= 0.0 {
        return 0;
    }
    let raw = f64::from(base) * multiplier;
    (raw - 1e-9).ceil().max(0.0) as u32
}

pub trait DemandForecaster: Send + Sync {
    fn forecast(&self, start: NaiveDate, end: NaiveDate) -> anyhow::Result<Forecast>;
}

/// Interroge le prévisionniste ; une panne devient `SchedError::Upstream`.
pub fn fetch(
    forecaster: &dyn DemandForecaster,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Forecast, SchedError> {
    forecaster
        .forecast(start, end)
        .map_err(|err| SchedError::Upstream {
            service: "forecaster",
            message: format!("{err:#}"),
        })
}

/// Renvoie toujours la même prévision.
#[derive(Debug, Clone, Default)]
pub struct StaticForecaster {
    forecast: Forecast,
}

impl StaticForecaster {
    pub fn new(forecast: Forecast) -> Self {
        Self { forecast }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .with_context(|| format!("reading forecast {}", path.display()))?;
        let forecast: Forecast = serde_json::from_slice(&data)
            .with_context(|| format!("parsing forecast {}", path.display()))?;
        Ok(Self::new(forecast))
    }
}

impl DemandForecaster for StaticForecaster {
    fn forecast(&self, start: NaiveDate, end: NaiveDate) -> anyhow::Result<Forecast> {
        anyhow::ensure!(end >= start, "forecast range is empty");
        Ok(self.forecast.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_headcount_rounds_up() {
        assert_eq!(scaled_headcount(4, 1.5), 6);
        assert_eq!(scaled_headcount(3, 1.1), 4);
        assert_eq!(scaled_headcount(10, 1.1), 11);
        assert_eq!(scaled_headcount(0, 2.0), 0);
        assert_eq!(scaled_headcount(5, -1.0), 0);
    }

    #[test]
    fn empty_range_is_an_upstream_failure() {
        let monday = NaiveDate::from_ymd_opt(2025, 10, 27).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2025, 10, 26).unwrap();
        match fetch(&StaticForecaster::default(), monday, sunday) {
            Err(SchedError::Upstream { service, message }) => {
                assert_eq!(service, "forecaster");
                assert!(message.contains("range is empty"), "{message}");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn missing_multiplier_defaults_to_one() {
        let forecast = Forecast::default();
        let monday = NaiveDate::from_ymd_opt(2025, 10, 27).unwrap();
        assert_eq!(forecast.multiplier(monday), 1.0);
    }
}
