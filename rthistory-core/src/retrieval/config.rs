use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Knobs for a retrieval run. Every field has a default so callers can
/// supply only what they want to change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Attempt ceiling applied to every task.
    pub retry: RetryConfig,
    /// How received records fan out into follow-up tasks.
    pub expansion: ExpansionConfig,
    /// Wall-clock budget for one run, checked between tasks.
    #[serde(
        with = "humantime_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub run_timeout: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// A task whose attempt number reaches this value is abandoned.
    pub max_attempts: u16,
}

impl RetryConfig {
    pub fn is_exhausted(&self, attempt: u16) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 10 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub contour_selection: ContourSelection,
}

/// Which regions of a structure set produce image tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourSelection {
    /// Only the first region that carries contour geometry.
    #[default]
    FirstWithGeometry,
    /// The first contour of every region that carries geometry.
    EveryRegion,
}

mod humantime_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_str(
                &humantime::format_duration(*duration).to_string(),
            ),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|value| {
            humantime::parse_duration(value.trim())
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
