pub mod oauth;
pub mod uploads;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::Display;
use std::str::FromStr;

/// Body of an API request, already encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Json(Vec<u8>),
    Multipart { boundary: String, bytes: Vec<u8> },
}

/// One call against a fixed endpoint under the API base.
pub trait Request {
    fn method(&self) -> Method;

    fn endpoint(&self) -> Cow<'_, str>;

    fn body(&self) -> RequestBody {
        RequestBody::Empty
    }

    /// Bearer token for the `Authorization` header
    fn access_token(&self) -> Option<&str> {
        None
    }
}

/// Activity classification accepted by the upload endpoint
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityType {
    AlpineSki,
    BackcountrySki,
    Canoeing,
    Crossfit,
    EBikeRide,
    Elliptical,
    Golf,
    Handcycle,
    Hike,
    IceSkate,
    InlineSkate,
    Kayaking,
    Kitesurf,
    NordicSki,
    Ride,
    RockClimbing,
    RollerSki,
    Rowing,
    #[default]
    Run,
    Sail,
    Skateboard,
    Snowboard,
    Snowshoe,
    Soccer,
    StairStepper,
    StandUpPaddling,
    Surfing,
    Swim,
    Velomobile,
    VirtualRide,
    VirtualRun,
    Walk,
    WeightTraining,
    Wheelchair,
    Windsurf,
    Workout,
    Yoga,
}

impl ActivityType {
    pub const ALL: [ActivityType; 37] = [
        ActivityType::AlpineSki,
        ActivityType::BackcountrySki,
        ActivityType::Canoeing,
        ActivityType::Crossfit,
        ActivityType::EBikeRide,
        ActivityType::Elliptical,
        ActivityType::Golf,
        ActivityType::Handcycle,
        ActivityType::Hike,
        ActivityType::IceSkate,
        ActivityType::InlineSkate,
        ActivityType::Kayaking,
        ActivityType::Kitesurf,
        ActivityType::NordicSki,
        ActivityType::Ride,
        ActivityType::RockClimbing,
        ActivityType::RollerSki,
        ActivityType::Rowing,
        ActivityType::Run,
        ActivityType::Sail,
        ActivityType::Skateboard,
        ActivityType::Snowboard,
        ActivityType::Snowshoe,
        ActivityType::Soccer,
        ActivityType::StairStepper,
        ActivityType::StandUpPaddling,
        ActivityType::Surfing,
        ActivityType::Swim,
        ActivityType::Velomobile,
        ActivityType::VirtualRide,
        ActivityType::VirtualRun,
        ActivityType::Walk,
        ActivityType::WeightTraining,
        ActivityType::Wheelchair,
        ActivityType::Windsurf,
        ActivityType::Workout,
        ActivityType::Yoga,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlpineSki => "AlpineSki",
            Self::BackcountrySki => "BackcountrySki",
            Self::Canoeing => "Canoeing",
            Self::Crossfit => "Crossfit",
            Self::EBikeRide => "EBikeRide",
            Self::Elliptical => "Elliptical",
            Self::Golf => "Golf",
            Self::Handcycle => "Handcycle",
            Self::Hike => "Hike",
            Self::IceSkate => "IceSkate",
            Self::InlineSkate => "InlineSkate",
            Self::Kayaking => "Kayaking",
            Self::Kitesurf => "Kitesurf",
            Self::NordicSki => "NordicSki",
            Self::Ride => "Ride",
            Self::RockClimbing => "RockClimbing",
            Self::RollerSki => "RollerSki",
            Self::Rowing => "Rowing",
            Self::Run => "Run",
            Self::Sail => "Sail",
            Self::Skateboard => "Skateboard",
            Self::Snowboard => "Snowboard",
            Self::Snowshoe => "Snowshoe",
            Self::Soccer => "Soccer",
            Self::StairStepper => "StairStepper",
            Self::StandUpPaddling => "StandUpPaddling",
            Self::Surfing => "Surfing",
            Self::Swim => "Swim",
            Self::Velomobile => "Velomobile",
            Self::VirtualRide => "VirtualRide",
            Self::VirtualRun => "VirtualRun",
            Self::Walk => "Walk",
            Self::WeightTraining => "WeightTraining",
            Self::Wheelchair => "Wheelchair",
            Self::Windsurf => "Windsurf",
            Self::Workout => "Workout",
            Self::Yoga => "Yoga",
        }
    }
}

impl Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityTypeParseError(String);

impl Display for ActivityTypeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown activity type: {}", self.0)
    }
}

impl std::error::Error for ActivityTypeParseError {}

impl FromStr for ActivityType {
    type Err = ActivityTypeParseError;

    /// Matches the wire name case-insensitively, so `run` and `Run` both work
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ActivityTypeParseError(s.to_string()))
    }
}

/// File format of the uploaded payload
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Fit,
    Tcx,
    #[default]
    Gpx,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Tcx => "tcx",
            Self::Gpx => "gpx",
        }
    }

    /// Whether the file name ends in `.gz`
    pub fn is_gzipped_path(path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
    }

    /// Pick the kind from a file extension, ignoring a trailing `.gz`
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        let ext = name.rsplit_once('.')?.1;
        ext.parse().ok()
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fit" => Ok(Self::Fit),
            "tcx" => Ok(Self::Tcx),
            "gpx" => Ok(Self::Gpx),
            other => Err(format!("unsupported file format: {}", other)),
        }
    }
}
