use serde::Serialize;

use super::{Choice, Field, Form, FormData, FormErrors};
use crate::db::{EventContext, SubmissionState};

/// Organizer-side filter over an event's submissions.
#[derive(Debug, Clone)]
pub struct SubmissionFilterForm {
    form: Form,
}

impl SubmissionFilterForm {
    /// `counts` holds the number of the event's submissions per state; states
    /// missing from it are shown as zero.
    pub fn new(ctx: &EventContext, counts: &[(SubmissionState, i64)]) -> Self {
        let type_choices = ctx
            .submission_types
            .iter()
            .filter(|t| t.event_id == ctx.event.id)
            .map(|t| Choice::new(t.id.to_string(), t.to_string()))
            .collect();

        let state_choices = SubmissionState::ALL
            .iter()
            .map(|state| {
                let count = counts
                    .iter()
                    .find(|(counted, _)| counted == state)
                    .map_or(0, |(_, count)| *count);
                Choice::new(state.as_str(), format!("{} ({})", capitalize(state.as_str()), count))
            })
            .collect();

        let form = Form::new(vec![
            Field::choice("submission_type", "Submission type", type_choices),
            Field::multiple_choice("state", "State", state_choices),
        ]);

        Self { form }
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn clean(&mut self, data: &FormData) -> Result<SubmissionFilter, FormErrors> {
        let cleaned = self.form.full_clean(data)?;

        let submission_type_id = cleaned
            .text("submission_type")
            .and_then(|id| id.parse::<i32>().ok());
        let states = cleaned
            .list("state")
            .iter()
            .filter_map(|state| state.parse().ok())
            .collect();

        Ok(SubmissionFilter {
            submission_type_id,
            states,
        })
    }
}

/// An empty filter matches every submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubmissionFilter {
    pub submission_type_id: Option<i32>,
    pub states: Vec<SubmissionState>,
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
