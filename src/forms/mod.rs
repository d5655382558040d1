//! A small declarative form layer: fields with choices, initial values,
//! required/disabled flags and field-level validation, serializable for
//! the templates.

mod filter;
mod info;
mod languages;

pub use filter::{SubmissionFilter, SubmissionFilterForm};
pub use info::{InfoForm, InfoFormOptions};
pub use languages::language_name;

use image::ImageFormat;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

fn invalid_choice(value: &str) -> String {
    format!("Select a valid choice. {} is not one of the available choices.", value)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Widget {
    TextInput,
    Textarea { rows: u32 },
    Select,
    CheckboxInput,
    CheckboxSelectMultiple,
    ClearableFileInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Char { max_length: Option<usize> },
    Boolean,
    Choice { choices: Vec<Choice> },
    MultipleChoice { choices: Vec<Choice> },
    Image,
}

/// A value as shown in the rendered form: initial data or what the client sent.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Empty,
    Text(String),
    Bool(bool),
    List(Vec<String>),
}

impl FieldValue {
    /// The raw strings a browser would have sent for this value.
    fn as_raw(&self) -> Vec<String> {
        match self {
            FieldValue::Empty => Vec::new(),
            FieldValue::Text(text) => vec![text.clone()],
            FieldValue::Bool(true) => vec!["on".to_string()],
            FieldValue::Bool(false) => Vec::new(),
            FieldValue::List(values) => values.clone(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(FieldValue::Empty, FieldValue::Text)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Raster formats accepted for uploads. Vector formats can carry script.
const IMAGE_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

impl UploadedFile {
    /// Sniffs the content and fully decodes it. The file name plays no part.
    pub fn image_format(&self) -> Option<ImageFormat> {
        let format = image::guess_format(&self.content).ok()?;
        if !IMAGE_FORMATS.contains(&format) {
            return None;
        }
        image::load_from_memory_with_format(&self.content, format).ok()?;
        Some(format)
    }

    /// Renames the file so its extension matches `format`.
    fn with_extension(&self, format: ImageFormat) -> UploadedFile {
        let stem = Path::new(&self.filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .unwrap_or("image");
        let extension = format.extensions_str().first().copied().unwrap_or("img");
        UploadedFile {
            filename: format!("{}.{}", stem, extension),
            content: self.content.clone(),
        }
    }
}

/// Submitted form data: possibly repeated text values plus uploaded files.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    values: HashMap<String, Vec<String>>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut data = FormData::default();
        for (key, value) in pairs {
            data.insert(key, value);
        }
        data
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    pub fn add_file(&mut self, key: impl Into<String>, file: UploadedFile) {
        self.files.insert(key.into(), file);
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn file(&self, key: &str) -> Option<&UploadedFile> {
        self.files.get(key).filter(|file| !file.filename.is_empty())
    }
}

/// Validation errors keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FormErrors {}

#[derive(Debug, Clone, PartialEq)]
pub enum CleanedValue {
    Empty,
    Text(String),
    Bool(bool),
    List(Vec<String>),
    File(UploadedFile),
}

#[derive(Debug, Clone, Default)]
pub struct CleanedData(HashMap<String, CleanedValue>);

impl CleanedData {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name)? {
            CleanedValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name)? {
            CleanedValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> &[String] {
        match self.0.get(name) {
            Some(CleanedValue::List(values)) => values,
            _ => &[],
        }
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        match self.0.remove(name)? {
            CleanedValue::File(file) => Some(file),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub name: String,
    pub label: String,
    pub help_text: Option<String>,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub widget: Widget,
    pub required: bool,
    pub disabled: bool,
    pub initial: FieldValue,
    /// What the template shows: the initial value, or the bound data after validation.
    pub value: FieldValue,
    pub errors: Vec<String>,
}

impl Field {
    fn new(name: &str, label: &str, kind: FieldKind, widget: Widget) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            help_text: None,
            kind,
            widget,
            required: false,
            disabled: false,
            initial: FieldValue::Empty,
            value: FieldValue::Empty,
            errors: Vec::new(),
        }
    }

    pub fn char(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Char { max_length: None }, Widget::TextInput)
    }

    pub fn textarea(name: &str, label: &str) -> Self {
        Self::new(
            name,
            label,
            FieldKind::Char { max_length: None },
            Widget::Textarea { rows: 10 },
        )
    }

    pub fn boolean(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Boolean, Widget::CheckboxInput)
    }

    pub fn choice(name: &str, label: &str, choices: Vec<Choice>) -> Self {
        Self::new(name, label, FieldKind::Choice { choices }, Widget::Select)
    }

    pub fn multiple_choice(name: &str, label: &str, choices: Vec<Choice>) -> Self {
        Self::new(
            name,
            label,
            FieldKind::MultipleChoice { choices },
            Widget::CheckboxSelectMultiple,
        )
    }

    pub fn image(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Image, Widget::ClearableFileInput)
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        if let FieldKind::Char { max_length } = &mut self.kind {
            *max_length = Some(max);
        }
        self
    }

    pub fn with_help_text(mut self, help_text: &str) -> Self {
        self.help_text = Some(help_text.to_string());
        self
    }

    pub fn with_widget(mut self, widget: Widget) -> Self {
        self.widget = widget;
        self
    }

    pub fn set_initial(&mut self, initial: FieldValue) {
        self.value = initial.clone();
        self.initial = initial;
    }

    pub fn choices(&self) -> &[Choice] {
        match &self.kind {
            FieldKind::Choice { choices } | FieldKind::MultipleChoice { choices } => choices,
            _ => &[],
        }
    }

    pub fn set_choices(&mut self, new_choices: Vec<Choice>) {
        if let FieldKind::Choice { choices } | FieldKind::MultipleChoice { choices } =
            &mut self.kind
        {
            *choices = new_choices;
        }
    }

    fn has_choice(&self, value: &str) -> bool {
        self.choices().iter().any(|choice| choice.value == value)
    }

    /// Validates this field against `data`. Disabled fields ignore `data`
    /// and validate their initial value instead.
    fn clean(&mut self, data: &FormData) -> Result<CleanedValue, String> {
        let raw = if self.disabled {
            self.initial.as_raw()
        } else {
            data.get_all(&self.name).to_vec()
        };

        match &self.kind {
            FieldKind::Char { max_length } => {
                let text = raw.first().map(|s| s.trim().to_string()).unwrap_or_default();
                self.value = FieldValue::Text(text.clone());
                if text.is_empty() {
                    return if self.required {
                        Err(REQUIRED.to_string())
                    } else {
                        Ok(CleanedValue::Empty)
                    };
                }
                let length = text.chars().count();
                match max_length {
                    Some(max) if length > *max => Err(format!(
                        "Ensure this value has at most {} characters (it has {}).",
                        max, length
                    )),
                    _ => Ok(CleanedValue::Text(text)),
                }
            }
            FieldKind::Boolean => {
                let checked = raw.first().map_or(false, |v| {
                    !matches!(v.to_ascii_lowercase().as_str(), "" | "false" | "0" | "off")
                });
                self.value = FieldValue::Bool(checked);
                if self.required && !checked {
                    Err(REQUIRED.to_string())
                } else {
                    Ok(CleanedValue::Bool(checked))
                }
            }
            FieldKind::Choice { .. } => {
                let value = raw.into_iter().next().unwrap_or_default();
                self.value = FieldValue::Text(value.clone());
                if value.is_empty() {
                    if self.required {
                        Err(REQUIRED.to_string())
                    } else {
                        Ok(CleanedValue::Empty)
                    }
                } else if self.has_choice(&value) {
                    Ok(CleanedValue::Text(value))
                } else {
                    Err(invalid_choice(&value))
                }
            }
            FieldKind::MultipleChoice { .. } => {
                let values: Vec<String> = raw.into_iter().filter(|v| !v.is_empty()).collect();
                self.value = FieldValue::List(values.clone());
                if values.is_empty() && self.required {
                    return Err(REQUIRED.to_string());
                }
                match values.iter().find(|v| !self.has_choice(v)) {
                    Some(invalid) => Err(invalid_choice(invalid)),
                    None => Ok(CleanedValue::List(values)),
                }
            }
            FieldKind::Image => {
                let upload = if self.disabled { None } else { data.file(&self.name) };
                match upload {
                    Some(file) => match file.image_format() {
                        Some(format) => Ok(CleanedValue::File(file.with_extension(format))),
                        None => Err(INVALID_IMAGE.to_string()),
                    },
                    None if self.required && self.initial == FieldValue::Empty => {
                        Err(REQUIRED.to_string())
                    }
                    None => Ok(CleanedValue::Empty),
                }
            }
        }
    }
}

/// An ordered set of fields.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Form {
    fields: Vec<Field>,
}

impl Form {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|field| field.name == name)
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Field> {
        let index = self.fields.iter().position(|field| field.name == name)?;
        Some(self.fields.remove(index))
    }

    pub fn set_initial(&mut self, name: &str, value: FieldValue) {
        if let Some(field) = self.field_mut(name) {
            field.set_initial(value);
        }
    }

    pub fn disable_all(&mut self) {
        for field in &mut self.fields {
            field.disabled = true;
        }
    }

    /// Binds `data` and validates every field. Errors are kept on the
    /// fields for rendering and returned together.
    pub fn full_clean(&mut self, data: &FormData) -> Result<CleanedData, FormErrors> {
        let mut cleaned = HashMap::new();
        let mut errors = FormErrors::default();

        for field in &mut self.fields {
            field.errors.clear();
            match field.clean(data) {
                Ok(value) => {
                    cleaned.insert(field.name.clone(), value);
                }
                Err(message) => {
                    errors.add(&field.name, message.clone());
                    field.errors.push(message);
                }
            }
        }

        if errors.is_empty() {
            Ok(CleanedData(cleaned))
        } else {
            Err(errors)
        }
    }
}
