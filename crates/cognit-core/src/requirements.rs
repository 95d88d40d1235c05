//! The placement policy ("Scheduling") the device asks the fabric to honor.

use serde::Deserialize;
use serde::Serialize;

use crate::error::ValidationError;

/// A geolocation hint, either a free-form label or a coordinate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Geolocation {
    /// A free-form location label (e.g. a region or datacenter tag).
    Label(String),
    /// A latitude/longitude pair.
    Coordinates {
        /// Latitude, in decimal degrees.
        lat: f64,
        /// Longitude, in decimal degrees.
        lon: f64,
    },
}

impl Geolocation {
    /// Whether the value counts as "non-empty" for the purposes of the
    /// `MAX_LATENCY` validity rule.
    fn is_present(&self) -> bool {
        match self {
            Self::Label(s) => !s.is_empty(),
            Self::Coordinates { .. } => true,
        }
    }
}

/// The placement policy sent to the Cognit Frontend.
///
/// Two `Requirements` values are equal iff every field that is `Some` in
/// either is equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Requirements {
    /// String tag identifying the target runtime image.
    pub flavour: Option<String>,
    /// Mandatory whenever `max_latency` is set.
    pub geolocation: Option<Geolocation>,
    /// Non-negative integer, milliseconds. `None`/`0` disables
    /// latency-aware cluster selection.
    pub max_latency: Option<u64>,
    /// Maximum permitted function execution time, in seconds.
    pub max_function_execution_time: Option<u64>,
    /// Minimum acceptable renewable-energy usage, percent (0-100).
    pub min_energy_renewable_usage: Option<u8>,
}

impl Requirements {
    /// Validates the `MAX_LATENCY` / `GEOLOCATION` rule: if `max_latency`
    /// is set (and non-zero), `geolocation` must be a non-empty string or
    /// struct.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let latency_aware = matches!(self.max_latency, Some(ms) if ms > 0);
        if latency_aware {
            match &self.geolocation {
                Some(g) if g.is_present() => Ok(()),
                _ => Err(ValidationError::MissingGeolocation),
            }
        } else {
            Ok(())
        }
    }

    /// Whether latency-aware cluster selection is requested.
    pub fn latency_budget(&self) -> Option<u64> {
        self.max_latency.filter(|&ms| ms > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_geolocation_is_rejected_when_latency_set() {
        let r = Requirements {
            max_latency: Some(25),
            ..Default::default()
        };
        assert_eq!(r.validate(), Err(ValidationError::MissingGeolocation));
    }

    #[test]
    fn empty_label_counts_as_missing() {
        let r = Requirements {
            max_latency: Some(25),
            geolocation: Some(Geolocation::Label(String::new())),
            ..Default::default()
        };
        assert_eq!(r.validate(), Err(ValidationError::MissingGeolocation));
    }

    #[test]
    fn zero_latency_disables_the_rule() {
        let r = Requirements {
            max_latency: Some(0),
            ..Default::default()
        };
        assert!(r.validate().is_ok());
        assert_eq!(r.latency_budget(), None);
    }

    #[test]
    fn equality_is_field_by_field() {
        let a = Requirements {
            flavour: Some("EnergyV2".into()),
            geolocation: Some(Geolocation::Label("LOC-1".into())),
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}
