//! Generative API provider identities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::UnknownProvider;

/// A generative API provider.
///
/// Serialised as its short wire code (`OPAI`, `STBAI`, ...), which is also
/// the key used by the configuration index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Provider {
    #[default]
    OpenAi,
    StabilityAi,
    Gcp,
    Azure,
    Aws,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::OpenAi,
        Provider::StabilityAi,
        Provider::Gcp,
        Provider::Azure,
        Provider::Aws,
    ];

    /// Short wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPAI",
            Self::StabilityAi => "STBAI",
            Self::Gcp => "GCP",
            Self::Azure => "AZC",
            Self::Aws => "AWS",
        }
    }

    /// Human-readable name, used when naming provider configurations.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::StabilityAi => "Stability AI",
            Self::Gcp => "Google Cloud",
            Self::Azure => "Azure Cloud",
            Self::Aws => "Amazon Web Services",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Provider::ALL
            .into_iter()
            .find(|p| p.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| UnknownProvider(code.to_string()))
    }
}

impl Serialize for Provider {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}
