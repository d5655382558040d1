use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::{
    language_name, Choice, Field, FieldValue, Form, FormData, FormErrors, UploadedFile, Widget,
    REQUIRED,
};
use crate::db::{EventContext, Submission, SubmissionFields, SubmissionType};

/// Fields an event can hide or make mandatory through its
/// `cfp_request_*` / `cfp_require_*` settings.
const CONFIGURABLE_FIELDS: [&str; 5] = ["abstract", "description", "notes", "image", "do_not_record"];

#[derive(Debug, Clone)]
pub struct InfoFormOptions {
    pub readonly: bool,
    pub initial: HashMap<String, FieldValue>,
    pub now: DateTime<Utc>,
}

impl Default for InfoFormOptions {
    fn default() -> Self {
        Self {
            readonly: false,
            initial: HashMap::new(),
            now: Utc::now(),
        }
    }
}

/// The speaker-facing form describing a talk proposal.
#[derive(Debug, Clone)]
pub struct InfoForm {
    form: Form,
    readonly: bool,
}

impl InfoForm {
    pub fn new(ctx: &EventContext, instance: Option<&Submission>, options: InfoFormOptions) -> Self {
        let mut form = Form::new(vec![
            Field::char("title", "Title").required(true).with_max_length(200),
            Field::choice("submission_type", "Submission type", Vec::new()).required(true),
            Field::choice("content_locale", "Language", Vec::new()).required(true),
            Field::textarea("abstract", "Abstract")
                .with_widget(Widget::Textarea { rows: 2 }),
            Field::textarea("description", "Description"),
            Field::textarea("notes", "Notes")
                .with_help_text("These notes are meant for the organisers and won't be made public."),
            Field::boolean("do_not_record", "Don't record this talk."),
            Field::image("image", "Talk image")
                .with_help_text("Use this if you want an illustration to go with your submission."),
        ]);

        if let Some(submission) = instance {
            form.set_initial("title", submission.title.clone().into());
            form.set_initial("abstract", submission.abstract_text.clone().into());
            form.set_initial("description", submission.description.clone().into());
            form.set_initial("notes", submission.notes.clone().into());
            form.set_initial("do_not_record", submission.do_not_record.into());
            form.set_initial("image", submission.image.clone().into());
        }
        for (name, value) in options.initial {
            form.set_initial(&name, value);
        }
        let initial_type = instance
            .map(|s| s.submission_type_id)
            .or(ctx.cfp.default_type_id)
            .map(|id| id.to_string());
        form.set_initial("submission_type", initial_type.into());
        let initial_locale = instance.map_or_else(
            || ctx.event.locale.clone(),
            |s| s.content_locale.clone(),
        );
        form.set_initial("content_locale", initial_locale.into());

        for key in CONFIGURABLE_FIELDS {
            let request = ctx.settings.get_bool(&format!("cfp_request_{}", key));
            let require = ctx.settings.get_bool(&format!("cfp_require_{}", key));
            if !request {
                form.remove_field(key);
            } else if let Some(field) = form.field_mut(key) {
                field.required = require;
            }
        }

        let types = available_types(ctx, instance, options.now);
        if let Some(field) = form.field_mut("submission_type") {
            field.set_choices(
                types
                    .iter()
                    .map(|t| Choice::new(t.id.to_string(), t.to_string()))
                    .collect(),
            );
        }
        if let Some(field) = form.field_mut("content_locale") {
            field.set_choices(locale_choices(ctx));
        }

        if options.readonly {
            form.disable_all();
        }

        tracing::debug!(
            event = %ctx.event.slug,
            types = types.len(),
            fields = form.fields().len(),
            readonly = options.readonly,
            "built info form"
        );

        Self {
            form,
            readonly: options.readonly,
        }
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Validates `data`. Fields the event does not request come back as `None`.
    pub fn clean(&mut self, data: &FormData) -> Result<SubmissionInfo, FormErrors> {
        let mut cleaned = self.form.full_clean(data)?;

        let submission_type_id = cleaned
            .text("submission_type")
            .and_then(|id| id.parse::<i32>().ok())
            .ok_or_else(|| {
                let mut errors = FormErrors::default();
                errors.add("submission_type", REQUIRED);
                errors
            })?;

        let optional_text = |name: &str| {
            cleaned
                .contains(name)
                .then(|| cleaned.text(name).map(str::to_string))
        };
        let abstract_text = optional_text("abstract");
        let description = optional_text("description");
        let notes = optional_text("notes");

        Ok(SubmissionInfo {
            title: cleaned.text("title").unwrap_or_default().to_string(),
            submission_type_id,
            content_locale: cleaned.text("content_locale").unwrap_or_default().to_string(),
            abstract_text,
            description,
            notes,
            do_not_record: cleaned.bool("do_not_record"),
            image: cleaned.take_file("image"),
        })
    }
}

/// Types a speaker may pick right now. The global CFP deadline decides
/// whether types without their own deadline are still open.
pub fn available_types<'a>(
    ctx: &'a EventContext,
    instance: Option<&Submission>,
    now: DateTime<Utc>,
) -> Vec<&'a SubmissionType> {
    let cfp_open = ctx.cfp.is_open(now);
    ctx.submission_types
        .iter()
        .filter(|t| t.event_id == ctx.event.id)
        .filter(|t| {
            let open = match t.deadline {
                Some(deadline) => deadline >= now,
                None => cfp_open,
            };
            open || instance.map_or(false, |s| s.submission_type_id == t.id)
        })
        .collect()
}

fn locale_choices(ctx: &EventContext) -> Vec<Choice> {
    ctx.event
        .locales()
        .into_iter()
        .filter_map(|code| language_name(&code).map(|name| Choice::new(code, name)))
        .collect()
}

/// Cleaned info form data. An outer `None` means the event does not ask
/// for that field, so the stored value must be left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionInfo {
    pub title: String,
    pub submission_type_id: i32,
    pub content_locale: String,
    pub abstract_text: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub do_not_record: Option<bool>,
    /// A newly uploaded image, still to be stored.
    pub image: Option<UploadedFile>,
}

impl SubmissionInfo {
    /// Writes the present fields into `fields` and hands back the upload, if any.
    pub fn apply(self, fields: &mut SubmissionFields) -> Option<UploadedFile> {
        fields.title = self.title;
        fields.submission_type_id = self.submission_type_id;
        fields.content_locale = self.content_locale;
        if let Some(value) = self.abstract_text {
            fields.abstract_text = value;
        }
        if let Some(value) = self.description {
            fields.description = value;
        }
        if let Some(value) = self.notes {
            fields.notes = value;
        }
        if let Some(value) = self.do_not_record {
            fields.do_not_record = value;
        }
        self.image
    }

    pub fn into_fields(self) -> (SubmissionFields, Option<UploadedFile>) {
        let mut fields = SubmissionFields {
            title: String::new(),
            submission_type_id: self.submission_type_id,
            content_locale: String::new(),
            abstract_text: None,
            description: None,
            notes: None,
            do_not_record: false,
            image: None,
        };
        let image = self.apply(&mut fields);
        (fields, image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Cfp, Event, EventSettings, SubmissionState};
    use crate::forms::FieldKind;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn submission_type(
        id: i32,
        event_id: i32,
        name: &str,
        deadline: Option<DateTime<Utc>>,
    ) -> SubmissionType {
        SubmissionType {
            id,
            event_id,
            name: name.to_string(),
            default_duration: 30,
            deadline,
        }
    }

    fn context() -> EventContext {
        EventContext {
            event: Event {
                id: 1,
                slug: "democon".to_string(),
                name: "DemoCon".to_string(),
                locale: "en".to_string(),
                locale_array: "en,de".to_string(),
            },
            settings: EventSettings::default(),
            cfp: Cfp {
                id: 1,
                event_id: 1,
                default_type_id: Some(1),
                deadline: None,
            },
            submission_types: vec![
                submission_type(1, 1, "Talk", None),
                submission_type(2, 1, "Workshop", Some(now() - Duration::days(1))),
                submission_type(3, 1, "Lightning talk", Some(now() + Duration::days(1))),
                submission_type(4, 2, "Foreign talk", None),
            ],
        }
    }

    fn submission(type_id: i32) -> Submission {
        Submission {
            id: 7,
            code: "ABCDEF".to_string(),
            event_id: 1,
            title: "Existing talk".to_string(),
            submission_type_id: type_id,
            content_locale: "de".to_string(),
            abstract_text: Some("Short".to_string()),
            description: Some("Long".to_string()),
            notes: Some("Private".to_string()),
            do_not_record: true,
            image: None,
            state: SubmissionState::Submitted,
            created_at: now(),
        }
    }

    fn options() -> InfoFormOptions {
        InfoFormOptions {
            now: now(),
            ..InfoFormOptions::default()
        }
    }

    fn type_choices(form: &InfoForm) -> Vec<String> {
        form.form()
            .field("submission_type")
            .unwrap()
            .choices()
            .iter()
            .map(|c| c.value.clone())
            .collect()
    }

    fn valid_data() -> FormData {
        FormData::from_pairs([
            ("title", "A talk"),
            ("submission_type", "1"),
            ("content_locale", "en"),
            ("abstract", "Short"),
        ])
    }

    #[rstest]
    #[case("abstract")]
    #[case("description")]
    #[case("notes")]
    #[case("image")]
    #[case("do_not_record")]
    fn unrequested_field_is_removed(#[case] key: &str) {
        let mut ctx = context();
        ctx.settings.set(format!("cfp_request_{}", key), "False");
        let form = InfoForm::new(&ctx, None, options());
        assert!(form.form().field(key).is_none());
        assert_eq!(form.form().fields().len(), 7);
    }

    #[rstest]
    #[case("description")]
    #[case("notes")]
    #[case("image")]
    #[case("do_not_record")]
    fn required_field_rejects_empty_input(#[case] key: &str) {
        let mut ctx = context();
        let mut form = InfoForm::new(&ctx, None, options());
        assert!(form.clean(&valid_data()).is_ok());

        ctx.settings.set(format!("cfp_require_{}", key), "True");
        let mut form = InfoForm::new(&ctx, None, options());
        assert!(form.form().field(key).unwrap().required);
        let errors = form.clean(&valid_data()).unwrap_err();
        assert_eq!(errors.get(key), [REQUIRED]);
    }

    #[test]
    fn abstract_is_required_by_default() {
        let mut form = InfoForm::new(&context(), None, options());
        let data = FormData::from_pairs([
            ("title", "A talk"),
            ("submission_type", "1"),
            ("content_locale", "en"),
        ]);
        let errors = form.clean(&data).unwrap_err();
        assert_eq!(errors.get("abstract"), [REQUIRED]);
    }

    #[test]
    fn abstract_textarea_is_two_rows() {
        let form = InfoForm::new(&context(), None, options());
        assert_eq!(
            form.form().field("abstract").unwrap().widget,
            Widget::Textarea { rows: 2 }
        );
    }

    #[test]
    fn open_cfp_offers_types_without_passed_deadline() {
        let form = InfoForm::new(&context(), None, options());
        assert_eq!(type_choices(&form), vec!["1", "3"]);
    }

    #[test]
    fn closed_cfp_offers_only_types_with_future_deadline() {
        let mut ctx = context();
        ctx.cfp.deadline = Some(now() - Duration::hours(1));
        let form = InfoForm::new(&ctx, None, options());
        assert_eq!(type_choices(&form), vec!["3"]);
    }

    #[rstest]
    #[case::cfp_open(None)]
    #[case::cfp_closed(Some(now() - Duration::hours(1)))]
    fn type_deadline_is_inclusive(#[case] cfp_deadline: Option<DateTime<Utc>>) {
        let mut ctx = context();
        ctx.cfp.deadline = cfp_deadline;
        ctx.submission_types[2].deadline = Some(now());

        let offered: Vec<i32> = available_types(&ctx, None, now())
            .iter()
            .map(|t| t.id)
            .collect();
        assert!(offered.contains(&3));
        assert!(!offered.contains(&2));
    }

    #[test]
    fn type_choices_never_leave_the_event() {
        let mut ctx = context();
        ctx.cfp.deadline = Some(now() + Duration::days(10));
        let form = InfoForm::new(&ctx, None, options());
        assert!(!type_choices(&form).contains(&"4".to_string()));
    }

    #[test]
    fn editing_keeps_a_closed_type_available() {
        let ctx = context();
        let instance = submission(2);
        let form = InfoForm::new(&ctx, Some(&instance), options());
        assert_eq!(type_choices(&form), vec!["1", "2", "3"]);
    }

    #[test]
    fn type_choice_labels_show_duration() {
        let form = InfoForm::new(&context(), None, options());
        let field = form.form().field("submission_type").unwrap();
        assert_eq!(field.choices()[0].label, "Talk (30 minutes)");
    }

    #[test]
    fn initial_values_come_from_the_event() {
        let form = InfoForm::new(&context(), None, options());
        let form = form.form();
        assert_eq!(form.field("submission_type").unwrap().initial, FieldValue::from("1"));
        assert_eq!(form.field("content_locale").unwrap().initial, FieldValue::from("en"));
    }

    #[test]
    fn initial_values_come_from_the_instance() {
        let instance = submission(3);
        let form = InfoForm::new(&context(), Some(&instance), options());
        let form = form.form();
        assert_eq!(form.field("submission_type").unwrap().initial, FieldValue::from("3"));
        assert_eq!(form.field("content_locale").unwrap().initial, FieldValue::from("de"));
        assert_eq!(form.field("title").unwrap().initial, FieldValue::from("Existing talk"));
        assert_eq!(form.field("do_not_record").unwrap().initial, FieldValue::from(true));
    }

    #[test]
    fn initial_overrides_do_not_replace_type_or_locale() {
        let mut opts = options();
        opts.initial.insert("title".to_string(), "Suggested".into());
        opts.initial.insert("submission_type".to_string(), "3".into());
        let form = InfoForm::new(&context(), None, opts);
        let form = form.form();
        assert_eq!(form.field("title").unwrap().initial, FieldValue::from("Suggested"));
        assert_eq!(form.field("submission_type").unwrap().initial, FieldValue::from("1"));
    }

    #[test]
    fn locale_choices_are_limited_to_known_event_locales() {
        let mut ctx = context();
        ctx.event.locale_array = "de,tlh,en".to_string();
        let form = InfoForm::new(&ctx, None, options());
        let choices = form.form().field("content_locale").unwrap().choices().to_vec();
        assert_eq!(
            choices,
            vec![Choice::new("de", "German"), Choice::new("en", "English")]
        );
    }

    #[test]
    fn readonly_disables_every_field_and_keeps_instance_values() {
        let instance = submission(1);
        let opts = InfoFormOptions {
            readonly: true,
            ..options()
        };
        let mut form = InfoForm::new(&context(), Some(&instance), opts);
        assert!(form.is_readonly());
        assert!(form.form().fields().iter().all(|f| f.disabled));

        let data = FormData::from_pairs([("title", "Hijacked"), ("content_locale", "en")]);
        let info = form.clean(&data).unwrap();
        let mut fields = SubmissionFields::from(&instance);
        info.apply(&mut fields);
        assert_eq!(fields, SubmissionFields::from(&instance));
    }

    #[test]
    fn removed_fields_keep_their_stored_value() {
        let mut ctx = context();
        ctx.settings.set("cfp_request_notes", "False");
        let instance = submission(1);
        let mut form = InfoForm::new(&ctx, Some(&instance), options());

        let info = form.clean(&valid_data()).unwrap();
        assert_eq!(info.notes, None);
        let mut fields = SubmissionFields::from(&instance);
        info.apply(&mut fields);
        assert_eq!(fields.title, "A talk");
        assert_eq!(fields.notes.as_deref(), Some("Private"));
        assert!(!fields.do_not_record);
    }

    #[test]
    fn new_submission_fields_from_clean_data() {
        let mut form = InfoForm::new(&context(), None, options());
        let (fields, image) = form.clean(&valid_data()).unwrap().into_fields();
        assert_eq!(fields.title, "A talk");
        assert_eq!(fields.submission_type_id, 1);
        assert_eq!(fields.content_locale, "en");
        assert_eq!(fields.abstract_text.as_deref(), Some("Short"));
        assert_eq!(fields.description, None);
        assert!(image.is_none());
    }

    #[test]
    fn closed_type_cannot_be_picked_for_new_submission() {
        let mut form = InfoForm::new(&context(), None, options());
        let data = FormData::from_pairs([
            ("title", "A talk"),
            ("submission_type", "2"),
            ("content_locale", "en"),
            ("abstract", "Short"),
        ]);
        let errors = form.clean(&data).unwrap_err();
        assert!(matches!(
            form.form().field("submission_type").unwrap().kind,
            FieldKind::Choice { .. }
        ));
        assert_eq!(
            errors.get("submission_type"),
            ["Select a valid choice. 2 is not one of the available choices."]
        );
    }
}
