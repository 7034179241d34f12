//! 📜 The six mapping schemas, as static tables.
//!
//! Each schema is a list of `(query param, where to find it, what kind of value)`.
//! Adding a field is adding a line. Removing one is deleting a line. No
//! per-variant boilerplate functions, no copy-pasted destructuring blocks.
//!
//! 🧠 Knowledge graph:
//! - `Source::Value(key)` reads `result.values[key]` (raw answers, embedded data)
//! - `Source::Label(key)` reads `result.labels[key]` (human text for dropdowns, multi-selects)
//! - Adult keys follow the Mindset Assessment survey export.
//!   The rest follow the same conventions: `QID*_TEXT` for free text,
//!   `{code}P` for percentiles, `{code}Score` for raw cluster scores.

use crate::common::ReportVariant;

/// 📍 Where a field lives inside the fetched survey response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Value(&'static str),
    Label(&'static str),
}

/// 🏷️ How a field's value gets normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Text,
    /// Trailing `%` stripped before it goes anywhere near a URL.
    Percentile,
    Score,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldSpec {
    pub param: &'static str,
    pub source: Source,
    pub kind: FieldKind,
}

/// 🚩 A boolean derived from a list-valued field: "does the list contain `needle`?"
#[derive(Debug, Clone, Copy)]
pub(crate) struct FlagSpec {
    pub param: &'static str,
    pub source: Source,
    pub needle: &'static str,
}

/// 👥 How many providers a schema can name.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ProviderSpec {
    None,
    /// One provider name, taken verbatim.
    Single(Source),
    /// A comma-separated (or multi-select) list of provider names.
    Multi(Source),
}

#[derive(Debug)]
pub(crate) struct Schema {
    pub variant: ReportVariant,
    pub subject_name: Source,
    pub email: Source,
    pub recorded_date: Source,
    pub providers: ProviderSpec,
    /// Only the bilingual Adult survey sets this.
    pub language: Option<Source>,
    pub fields: &'static [FieldSpec],
    pub flags: &'static [FlagSpec],
}

const fn text(param: &'static str, key: &'static str) -> FieldSpec {
    FieldSpec {
        param,
        source: Source::Value(key),
        kind: FieldKind::Text,
    }
}

const fn pct(param: &'static str, key: &'static str) -> FieldSpec {
    FieldSpec {
        param,
        source: Source::Value(key),
        kind: FieldKind::Percentile,
    }
}

const fn score(param: &'static str, key: &'static str) -> FieldSpec {
    FieldSpec {
        param,
        source: Source::Value(key),
        kind: FieldKind::Score,
    }
}

const RECORDED_DATE: Source = Source::Value("recordedDate");

// ============================================================
//  🧑 Adult: five clusters, three comparison cohorts, raw scores
// ============================================================

const ADULT_FIELDS: &[FieldSpec] = &[
    text("level", "Level"),
    pct("growthMindsetPercentile", "GP"),
    pct("growthMindsetPercentileHighSchool", "GMHSComparison"),
    pct("growthMindsetPercentileCollege", "GMColComparison"),
    pct("growthMindsetPercentilePro", "GMProComparison"),
    score("growthMindsetScore", "GMScore"),
    pct("mentalSkillsPercentile", "PP"),
    pct("mentalSkillsPercentileHighSchool", "MSHSComparison"),
    pct("mentalSkillsPercentileCollege", "MSColComparison"),
    pct("mentalSkillsPercentilePro", "MSProComparison"),
    score("mentalSkillsScore", "MSScore"),
    pct("teamSupportPercentile", "TP"),
    pct("teamSupportPercentileHighSchool", "TSHSComparison"),
    pct("teamSupportPercentileCollege", "TSColComparison"),
    pct("teamSupportPercentilePro", "TSProComparison"),
    score("teamSupportScore", "TSScore"),
    pct("healthHabitsPercentile", "PhP"),
    pct("healthHabitsPercentileHighSchool", "HHHSComparison"),
    pct("healthHabitsPercentileCollege", "HHColComparison"),
    pct("healthHabitsPercentilePro", "HHProComparison"),
    score("healthHabitsScore", "HHScore"),
    pct("selfReflectionPercentile", "MP"),
    pct("selfReflectionPercentileHighSchool", "SRHSComparison"),
    pct("selfReflectionPercentileCollege", "SRColComparison"),
    pct("selfReflectionPercentilePro", "SRProComparison"),
    score("selfReflectionScore", "SRScore"),
];

pub(crate) const ADULT: Schema = Schema {
    variant: ReportVariant::Adult,
    subject_name: Source::Value("QID9_TEXT"),
    email: Source::Value("QID12_TEXT"),
    recorded_date: RECORDED_DATE,
    providers: ProviderSpec::Single(Source::Label("QID14")),
    language: Some(Source::Value("userLanguage")),
    fields: ADULT_FIELDS,
    flags: &[],
};

// ============================================================
//  🧒 Youth + Youth Golf: four clusters, no comparison cohorts
// ============================================================

const YOUTH_FIELDS: &[FieldSpec] = &[
    pct("growthMindsetPercentile", "GP"),
    score("growthMindsetScore", "GMScore"),
    pct("mentalSkillsPercentile", "PP"),
    score("mentalSkillsScore", "MSScore"),
    pct("teamSupportPercentile", "TP"),
    score("teamSupportScore", "TSScore"),
    pct("healthHabitsPercentile", "PhP"),
    score("healthHabitsScore", "HHScore"),
];

pub(crate) const YOUTH: Schema = Schema {
    variant: ReportVariant::Youth,
    subject_name: Source::Value("QID1_TEXT"),
    email: Source::Value("QID2_TEXT"),
    recorded_date: RECORDED_DATE,
    providers: ProviderSpec::Single(Source::Label("QID5")),
    language: None,
    fields: YOUTH_FIELDS,
    flags: &[FlagSpec {
        param: "isGolfer",
        source: Source::Label("QID4"),
        needle: "Golf",
    }],
};

pub(crate) const YOUTH_GOLF: Schema = Schema {
    variant: ReportVariant::YouthGolf,
    subject_name: Source::Value("QID1_TEXT"),
    email: Source::Value("QID2_TEXT"),
    recorded_date: RECORDED_DATE,
    providers: ProviderSpec::Single(Source::Label("QID5")),
    language: None,
    fields: YOUTH_FIELDS,
    flags: &[],
};

// ============================================================
//  🧑‍💼 Staff: five clusters, percentiles only
// ============================================================

pub(crate) const STAFF: Schema = Schema {
    variant: ReportVariant::Staff,
    subject_name: Source::Value("QID1_TEXT"),
    email: Source::Value("QID2_TEXT"),
    recorded_date: RECORDED_DATE,
    providers: ProviderSpec::None,
    language: None,
    fields: &[
        text("organization", "QID3_TEXT"),
        pct("leadershipPercentile", "LP"),
        pct("communicationPercentile", "CP"),
        pct("wellbeingPercentile", "WP"),
        pct("teamCulturePercentile", "TCP"),
        pct("growthMindsetPercentile", "GP"),
    ],
    flags: &[],
};

// ============================================================
//  🏅 Mindset Athlete (+ Adult): the newer, multi-provider surveys
// ============================================================

pub(crate) const MINDSET_ATHLETE: Schema = Schema {
    variant: ReportVariant::MindsetAthlete,
    subject_name: Source::Value("QID9_TEXT"),
    email: Source::Value("QID12_TEXT"),
    recorded_date: RECORDED_DATE,
    providers: ProviderSpec::Multi(Source::Label("QID14")),
    language: None,
    fields: &[
        text("level", "Level"),
        pct("growthMindsetPercentile", "GP"),
        score("growthMindsetScore", "GMScore"),
        pct("mentalSkillsPercentile", "PP"),
        score("mentalSkillsScore", "MSScore"),
        pct("teamSupportPercentile", "TP"),
        score("teamSupportScore", "TSScore"),
        pct("healthHabitsPercentile", "PhP"),
        score("healthHabitsScore", "HHScore"),
        pct("selfReflectionPercentile", "MP"),
        score("selfReflectionScore", "SRScore"),
    ],
    flags: &[FlagSpec {
        param: "isGolfer",
        source: Source::Label("QID15"),
        needle: "Golf",
    }],
};

pub(crate) const MINDSET_ATHLETE_ADULT: Schema = Schema {
    variant: ReportVariant::MindsetAthleteAdult,
    subject_name: Source::Value("QID9_TEXT"),
    email: Source::Value("QID12_TEXT"),
    recorded_date: RECORDED_DATE,
    providers: ProviderSpec::Multi(Source::Label("QID14")),
    language: None,
    fields: ADULT_FIELDS,
    flags: &[],
};

/// 🎯 Variant → schema. Exhaustive, so a seventh variant will not compile
/// until someone writes its table.
pub(crate) fn schema_for(variant: ReportVariant) -> &'static Schema {
    match variant {
        ReportVariant::Adult => &ADULT,
        ReportVariant::Youth => &YOUTH,
        ReportVariant::YouthGolf => &YOUTH_GOLF,
        ReportVariant::Staff => &STAFF,
        ReportVariant::MindsetAthlete => &MINDSET_ATHLETE,
        ReportVariant::MindsetAthleteAdult => &MINDSET_ATHLETE_ADULT,
    }
}
