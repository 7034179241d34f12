//! 📦 Common data structures: the nouns of rpx.
//!
//! 🎬 COLD OPEN: INT. SURVEY PLATFORM, 11:58 PM
//!
//! Somebody just finished forty questions about their mental game. They hit
//! submit. A webhook leaves the building carrying three strings and a dream.
//! The structs in this module are what that dream turns into on our side of
//! the wire: a [`SurveyEvent`] on arrival, a [`SurveyResponseRecord`] once the
//! mapper has had its way with the raw payload.
//!
//! 🧠 Knowledge graph:
//! - [`ReportVariant`]: the six report kinds. Picks schema, bucket, template, route.
//! - [`Locale`]: English or Spanish. Only the Adult report cares.
//! - [`SurveyEvent`]: inbound webhook fields, read loosely.
//! - [`SurveyResponseRecord`]: mapper output, consumed by render + notify.
//!
//! 🦆 The duck filled out the survey too. It scored in the 99th percentile for
//! "staring into the middle distance". No comparison data available.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// 🎭 The six report kinds. Validated at deserialization time, just like the
/// config enums upstream: no freestyle variant names survive the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ReportVariant {
    Adult,
    Youth,
    YouthGolf,
    Staff,
    MindsetAthlete,
    MindsetAthleteAdult,
}

impl ReportVariant {
    /// Every variant, in route-registration order.
    pub const ALL: [ReportVariant; 6] = [
        Self::Adult,
        Self::Youth,
        Self::YouthGolf,
        Self::Staff,
        Self::MindsetAthlete,
        Self::MindsetAthleteAdult,
    ];

    /// 🏷️ snake_case name, matching the serde spelling exactly.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adult => "adult",
            Self::Youth => "youth",
            Self::YouthGolf => "youth_golf",
            Self::Staff => "staff",
            Self::MindsetAthlete => "mindset_athlete",
            Self::MindsetAthleteAdult => "mindset_athlete_adult",
        }
    }

    /// 🚪 The webhook path this variant listens on.
    pub fn route(&self) -> &'static str {
        match self {
            Self::Adult => "/generate_report",
            Self::Youth => "/generate_report_youth_mindset",
            Self::YouthGolf => "/generate_report_youth_golf_mindset",
            Self::Staff => "/generate_report_staff_mindset",
            Self::MindsetAthlete => "/generate_report_mindset_athlete",
            Self::MindsetAthleteAdult => "/generate_report_mindset_athlete_adult",
        }
    }

    /// ⏱️ The two Mindset Athlete endpoints answer after the whole pipeline
    /// finishes. Everyone else gets a 200 and a promise.
    pub fn is_synchronous(&self) -> bool {
        matches!(self, Self::MindsetAthlete | Self::MindsetAthleteAdult)
    }

    /// 🗝️ Default object-key prefix. Overridable per bucket in config.
    pub fn default_key_prefix(&self) -> &'static str {
        match self {
            Self::Adult => "psp-mindset-assessment-report",
            Self::Youth => "psp-youth-mindset-report",
            Self::YouthGolf => "psp-youth-golf-mindset-report",
            Self::Staff => "psp-staff-mindset-report",
            Self::MindsetAthlete => "psp-mindset-athlete-report",
            Self::MindsetAthleteAdult => "psp-mindset-athlete-adult-report",
        }
    }

    /// 📛 Human-facing assessment name, used in email subjects and chat posts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Adult => "Mindset Assessment",
            Self::Youth => "Youth Mindset Assessment",
            Self::YouthGolf => "Youth Golf Mindset Assessment",
            Self::Staff => "Staff Mindset Assessment",
            Self::MindsetAthlete => "Mindset Athlete Assessment",
            Self::MindsetAthleteAdult => "Mindset Athlete Adult Assessment",
        }
    }
}

impl fmt::Display for ReportVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 🌎 Report language. Two of them. The Adult survey is bilingual, everyone
/// else speaks English and is perfectly happy about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl Locale {
    /// 🔧 Survey-platform language codes look like `EN`, `ES`, `ES-ES`.
    /// Anything Spanish-flavored is Spanish. Anything else, English.
    pub fn from_language_code(code: &str) -> Self {
        if code.trim().to_ascii_uppercase().starts_with("ES") {
            Self::Es
        } else {
            Self::En
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }
}

/// 📨 What the webhook told us. Three strings. No guarantees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyEvent {
    pub survey_id: Option<String>,
    pub response_id: String,
    pub completed_date: Option<String>,
}

const SURVEY_ID_KEYS: [&str; 4] = ["SurveyID", "surveyId", "survey_id", "SurveyId"];
const RESPONSE_ID_KEYS: [&str; 4] = ["ResponseID", "responseId", "response_id", "ResponseId"];
const COMPLETED_DATE_KEYS: [&str; 4] = [
    "CompletedDate",
    "completedDate",
    "completed_date",
    "RecordedDate",
];

impl SurveyEvent {
    /// 🔍 Builds an event from a loosely-spelled field bag.
    ///
    /// The survey platform says `ResponseID`. The newer integrations say
    /// `responseId`. Someone, somewhere, says `response_id`. We accept all of
    /// them. Returns `None` only when there is no response id at all, because
    /// without one there is nothing to fetch.
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let response_id = first_present(fields, &RESPONSE_ID_KEYS)?;
        Some(Self {
            survey_id: first_present(fields, &SURVEY_ID_KEYS),
            response_id,
            completed_date: first_present(fields, &COMPLETED_DATE_KEYS),
        })
    }
}

fn first_present(fields: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// 🎯 One normalized survey response, ready to become a report.
///
/// The variant tag is the whole identity of the record: it decides which
/// params exist, which bucket the PDF lands in, and who gets an email.
/// `params` is ordered exactly as the schema declares it, so the render URL is
/// byte-for-byte reproducible. Replay a URL from the logs, get the same report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyResponseRecord {
    pub variant: ReportVariant,
    pub response_id: String,
    pub subject_name: String,
    /// `None` when the survey did not capture one. The respondent email is skipped.
    pub email: Option<String>,
    pub recorded_date: String,
    pub providers: Vec<String>,
    pub locale: Option<Locale>,
    /// 📊 Ordered `(query param, value)` pairs: scores, percentiles, flags, extras.
    pub params: Vec<(&'static str, String)>,
}

impl SurveyResponseRecord {
    /// 🔍 Look up one param by name. Linear scan; there are never more than ~30.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn effective_locale(&self) -> Locale {
        self.locale.unwrap_or_default()
    }
}
