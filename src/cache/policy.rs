//! Resource Policy Module
//!
//! Base keys for the resource classes PastPeek caches, and the TTL presets
//! they are stored under.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// == Base Keys ==
pub const WIKIPEDIA_SUMMARY: &str = "wikipedia_summary";
pub const WIKIPEDIA_FULL: &str = "wikipedia_full";
pub const GEONAMES: &str = "geonames";
pub const WIKIDATA_EVENTS: &str = "wikidata_events";
pub const OPENVERSE_IMAGES: &str = "openverse_images";
pub const MET_ARTIFACTS: &str = "met_artifacts";
pub const WEATHER: &str = "weather";
pub const CITY_DATA: &str = "city_data";

// == TTL Tier ==
/// How long a class of data stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlTier {
    /// 5 minutes: volatile data such as current weather
    Short,
    /// 30 minutes: city aggregate bundles
    Medium,
    /// 6 hours: encyclopedia content
    Long,
    /// 24 hours: geocoding, historical weather, museum records
    VeryLong,
}

impl TtlTier {
    pub fn duration(self) -> Duration {
        match self {
            TtlTier::Short => Duration::from_secs(5 * 60),
            TtlTier::Medium => Duration::from_secs(30 * 60),
            TtlTier::Long => Duration::from_secs(6 * 60 * 60),
            TtlTier::VeryLong => Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Default tier for a known base key, `None` for unknown keys.
    pub fn for_base_key(base_key: &str) -> Option<Self> {
        match base_key {
            WIKIPEDIA_SUMMARY | WIKIPEDIA_FULL | WIKIDATA_EVENTS | OPENVERSE_IMAGES => {
                Some(TtlTier::Long)
            }
            GEONAMES | MET_ARTIFACTS => Some(TtlTier::VeryLong),
            CITY_DATA => Some(TtlTier::Medium),
            WEATHER => Some(TtlTier::Short),
            _ => None,
        }
    }
}
