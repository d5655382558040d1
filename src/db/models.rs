use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i32,
    pub slug: String,
    pub name: String,
    pub locale: String,
    /// Comma separated locale codes, e.g. `en,de`.
    pub locale_array: String,
}

impl Event {
    pub fn locales(&self) -> Vec<String> {
        self.locale_array
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Cfp {
    pub id: i32,
    pub event_id: i32,
    pub default_type_id: Option<i32>,
    pub deadline: Option<DateTime<Utc>>,
}

impl Cfp {
    /// The global CFP is open when there is no deadline or it has not passed yet.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.deadline.map_or(true, |deadline| deadline >= now)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SubmissionType {
    pub id: i32,
    pub event_id: i32,
    pub name: String,
    pub default_duration: i32,
    pub deadline: Option<DateTime<Utc>>,
}

impl fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} minutes)", self.name, self.default_duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionState {
    Submitted,
    Accepted,
    Rejected,
    Confirmed,
    Canceled,
    Withdrawn,
}

impl SubmissionState {
    pub const ALL: [SubmissionState; 6] = [
        SubmissionState::Submitted,
        SubmissionState::Accepted,
        SubmissionState::Rejected,
        SubmissionState::Confirmed,
        SubmissionState::Canceled,
        SubmissionState::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Submitted => "submitted",
            SubmissionState::Accepted => "accepted",
            SubmissionState::Rejected => "rejected",
            SubmissionState::Confirmed => "confirmed",
            SubmissionState::Canceled => "canceled",
            SubmissionState::Withdrawn => "withdrawn",
        }
    }

    /// Speakers may only change their submission while it is still undecided.
    pub fn is_editable(&self) -> bool {
        matches!(self, SubmissionState::Submitted)
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown submission state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for SubmissionState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubmissionState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

impl TryFrom<String> for SubmissionState {
    type Error = UnknownState;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: i32,
    pub code: String,
    pub event_id: i32,
    pub title: String,
    pub submission_type_id: i32,
    pub content_locale: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub do_not_record: bool,
    pub image: Option<String>,
    #[sqlx(try_from = "String")]
    pub state: SubmissionState,
    pub created_at: DateTime<Utc>,
}

/// The user-editable part of a submission, as written to the database.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionFields {
    pub title: String,
    pub submission_type_id: i32,
    pub content_locale: String,
    pub abstract_text: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub do_not_record: bool,
    pub image: Option<String>,
}

impl From<&Submission> for SubmissionFields {
    fn from(submission: &Submission) -> Self {
        Self {
            title: submission.title.clone(),
            submission_type_id: submission.submission_type_id,
            content_locale: submission.content_locale.clone(),
            abstract_text: submission.abstract_text.clone(),
            description: submission.description.clone(),
            notes: submission.notes.clone(),
            do_not_record: submission.do_not_record,
            image: submission.image.clone(),
        }
    }
}

/// Per-event key/value settings with the service-wide defaults behind them.
#[derive(Debug, Clone, Default)]
pub struct EventSettings {
    values: HashMap<String, String>,
}

impl EventSettings {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .or_else(|| default_setting(key))
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).map_or(false, parse_bool)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

fn default_setting(key: &str) -> Option<&'static str> {
    match key {
        "cfp_request_abstract" | "cfp_request_description" | "cfp_request_notes"
        | "cfp_request_image" | "cfp_request_do_not_record" => Some("True"),
        "cfp_require_abstract" => Some("True"),
        "cfp_require_description" | "cfp_require_notes" | "cfp_require_image"
        | "cfp_require_do_not_record" => Some("False"),
        _ => None,
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Everything the forms read about one event.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub event: Event,
    pub settings: EventSettings,
    pub cfp: Cfp,
    /// Ordered by id.
    pub submission_types: Vec<SubmissionType>,
}

impl EventContext {
    pub fn submission_type(&self, id: i32) -> Option<&SubmissionType> {
        self.submission_types.iter().find(|t| t.id == id)
    }
}
