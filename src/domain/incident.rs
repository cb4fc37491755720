//! Incident records and the closed vocabularies they are built from.
//!
//! Upstream extraction produces free-form strings; everything here is
//! lenient on input (coerce, normalize, pass through) and strict on what
//! it stores. The `message` transcript text and the generated
//! `description` are immutable once set.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ulid::Ulid;

use super::status::IncidentStatus;

/// Unique incident identifier: 26-char lexicographically sortable ULID,
/// assigned once at ingestion and never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub Ulid);

impl IncidentId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IncidentId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_str(s)?))
    }
}

/// Incident type classification (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentType {
    #[serde(rename = "Public Nuisance")]
    PublicNuisance,
    #[serde(rename = "Break In")]
    BreakIn,
    #[serde(rename = "Armed Robbery")]
    ArmedRobbery,
    #[serde(rename = "Car Theft")]
    CarTheft,
    #[serde(rename = "Theft")]
    Theft,
    #[serde(rename = "PickPocket")]
    PickPocket,
    #[serde(rename = "Fire")]
    Fire,
    #[serde(rename = "Mass Fire")]
    MassFire,
    #[serde(rename = "Crowd Stampede")]
    CrowdStampede,
    #[serde(rename = "Terrorist Attack")]
    TerroristAttack,
    #[serde(rename = "Other")]
    Other,
}

impl IncidentType {
    const ALL: &'static [IncidentType] = &[
        IncidentType::PublicNuisance,
        IncidentType::BreakIn,
        IncidentType::ArmedRobbery,
        IncidentType::CarTheft,
        IncidentType::Theft,
        IncidentType::PickPocket,
        IncidentType::Fire,
        IncidentType::MassFire,
        IncidentType::CrowdStampede,
        IncidentType::TerroristAttack,
        IncidentType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IncidentType::PublicNuisance => "Public Nuisance",
            IncidentType::BreakIn => "Break In",
            IncidentType::ArmedRobbery => "Armed Robbery",
            IncidentType::CarTheft => "Car Theft",
            IncidentType::Theft => "Theft",
            IncidentType::PickPocket => "PickPocket",
            IncidentType::Fire => "Fire",
            IncidentType::MassFire => "Mass Fire",
            IncidentType::CrowdStampede => "Crowd Stampede",
            IncidentType::TerroristAttack => "Terrorist Attack",
            IncidentType::Other => "Other",
        }
    }

    /// Coerce free-form model output into the closed set.
    ///
    /// Whitespace is collapsed and matching is case-insensitive; anything
    /// unrecognized lands in the `Other` bucket.
    pub fn coerce(raw: &str) -> Self {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let lower = collapsed.to_lowercase();

        for ty in Self::ALL {
            if ty.as_str().to_lowercase() == lower {
                return *ty;
            }
        }

        // Models spell this one every possible way
        if lower.contains("pick") && lower.contains("pocket") {
            return IncidentType::PickPocket;
        }

        IncidentType::Other
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggested action for the dispatcher (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestedAction {
    #[serde(rename = "console")]
    Console,
    #[serde(rename = "ask for more details")]
    AskForMoreDetails,
    #[serde(rename = "dispatch officer")]
    DispatchOfficer,
    #[serde(rename = "dispatch first-aiders")]
    DispatchFirstAiders,
    #[serde(rename = "dispatch firefighters")]
    DispatchFirefighters,
}

impl SuggestedAction {
    const ALL: &'static [SuggestedAction] = &[
        SuggestedAction::Console,
        SuggestedAction::AskForMoreDetails,
        SuggestedAction::DispatchOfficer,
        SuggestedAction::DispatchFirstAiders,
        SuggestedAction::DispatchFirefighters,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SuggestedAction::Console => "console",
            SuggestedAction::AskForMoreDetails => "ask for more details",
            SuggestedAction::DispatchOfficer => "dispatch officer",
            SuggestedAction::DispatchFirstAiders => "dispatch first-aiders",
            SuggestedAction::DispatchFirefighters => "dispatch firefighters",
        }
    }

    /// Coerce free-form model output; unrecognized input falls back to
    /// asking the caller for more details.
    pub fn coerce(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        for action in Self::ALL {
            if action.as_str() == lower {
                return *action;
            }
        }
        SuggestedAction::AskForMoreDetails
    }
}

impl fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency classification, 1 (least) to 3 (most). Assigned once by the
/// final triage stage and fixed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    Low = 1,
    Moderate = 2,
    Critical = 3,
}

impl Severity {
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Coerce a model-produced severity. Invalid values default to 2,
    /// matching the upstream triage contract.
    pub fn coerce(raw: i64) -> Self {
        match raw {
            1 => Severity::Low,
            3 => Severity::Critical,
            _ => Severity::Moderate,
        }
    }
}

impl From<Severity> for u8 {
    fn from(s: Severity) -> u8 {
        s.level()
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Severity::Low),
            2 => Ok(Severity::Moderate),
            3 => Ok(Severity::Critical),
            other => Err(format!("severity must be 1..=3, got {}", other)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// One timestamped segment of the call transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// HH:MM offset or wall time as produced by the transcriber
    pub time: String,

    /// Verbatim segment text
    pub text: String,
}

/// Normalize a postal-code-shaped location: strip spaces, uppercase.
///
/// Validation is deliberately lenient — malformed input is passed through
/// rather than rejected, because the category of truth is what the caller
/// said, not a valid postal code.
pub fn normalize_location(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// A candidate incident as delivered by the upstream extraction stage.
///
/// Enums are coerced from free-form strings on deserialization; the id is
/// assigned here if the extractor did not carry one through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateIncident {
    #[serde(default)]
    pub id: Option<IncidentId>,

    #[serde(deserialize_with = "coerce_incident_type")]
    pub incident_type: IncidentType,

    pub location: String,

    /// month/day/year
    pub date: String,

    /// HH:MM, 24-hour
    pub time: String,

    /// minutes and seconds, free text
    pub duration: String,

    /// Verbatim transcript text the record was derived from
    pub message: String,

    /// One-line generated summary
    pub description: String,

    #[serde(deserialize_with = "coerce_suggested_action")]
    pub suggested_action: SuggestedAction,

    #[serde(deserialize_with = "coerce_severity")]
    pub severity: Severity,

    #[serde(default)]
    pub transcript: Vec<TranscriptSegment>,
}

/// The canonical full incident record, as archived and queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub incident_type: IncidentType,
    pub location: String,
    pub date: String,
    pub time: String,
    pub duration: String,
    pub message: String,
    pub description: String,
    pub suggested_action: SuggestedAction,
    pub severity: Severity,
    pub status: IncidentStatus,

    /// Optional audit transcript; never consulted for dedup decisions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<TranscriptSegment>,

    /// When the record entered the core (bookkeeping, set on ingestion)
    pub ingested_at: DateTime<Utc>,
}

impl Incident {
    /// Build a full record from a candidate: assign the id if absent,
    /// normalize the location, start the lifecycle at `called`.
    pub fn from_candidate(candidate: CandidateIncident) -> Self {
        Self {
            id: candidate.id.unwrap_or_default(),
            incident_type: candidate.incident_type,
            location: normalize_location(&candidate.location),
            date: candidate.date,
            time: candidate.time,
            duration: candidate.duration,
            message: candidate.message,
            description: candidate.description,
            suggested_action: candidate.suggested_action,
            severity: candidate.severity,
            status: IncidentStatus::Called,
            transcript: candidate.transcript,
            ingested_at: Utc::now(),
        }
    }
}

fn coerce_incident_type<'de, D>(deserializer: D) -> Result<IncidentType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(IncidentType::coerce(&raw))
}

fn coerce_suggested_action<'de, D>(deserializer: D) -> Result<SuggestedAction, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(SuggestedAction::coerce(&raw))
}

/// Severity arrives as an integer or a numeric string depending on the
/// extraction backend; accept both.
fn coerce_severity<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    let raw = Raw::deserialize(deserializer)?;
    let value = match raw {
        Raw::Int(n) => n,
        Raw::Str(s) => s.trim().parse::<i64>().unwrap_or(0),
    };
    Ok(Severity::coerce(value))
}
