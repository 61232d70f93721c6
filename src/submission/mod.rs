pub mod character;
pub mod commands;
pub mod modal;
pub mod queries;

use crate::sheets::{Catalog, Constraint, SheetTemplate, TemplateNotFound, NAME_FIELD};
use crate::stats::Registry;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Opened,
    Filled,
    Confirmed,
    Cancelled,
    TimedOut,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Confirmed | State::Cancelled | State::TimedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldErrorReason {
    #[error("is required")]
    Missing,
    #[error("must be at most {max} characters")]
    TooLong { max: usize },
    #[error("must be one of the stat presets: {allowed}")]
    NotAStat { allowed: String },
    #[error("must be one of the kinds: {allowed}")]
    NotAKind { allowed: String },
    #[error("is already used by another of your characters")]
    Taken,
    #[error("is not part of this sheet")]
    Unknown,
    #[error("appears more than once")]
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} {reason}")]
pub struct FieldError {
    pub field: String,
    pub reason: FieldErrorReason,
}

impl FieldError {
    fn new(field: &str, reason: FieldErrorReason) -> Self {
        FieldError {
            field: field.to_string(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    TemplateNotFound(#[from] TemplateNotFound),
    #[error("sheet has {} invalid field(s)", .0.len())]
    Invalid(Vec<FieldError>),
    #[error("submission is already {0:?}")]
    Closed(State),
}

/// A confirmed sheet, handed over for storage and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    pub template: String,
    pub author_id: u64,
    /// One entry per template field, in template order.
    pub fields: Vec<(String, String)>,
}

impl SubmissionResult {
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn name(&self) -> &str {
        self.field(NAME_FIELD).unwrap_or(&self.template)
    }
}

/// What the hosting runtime reports about an open interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Submitted(String),
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Confirmed(SubmissionResult),
    /// The sheet was rejected and can be edited again.
    Retry(Vec<FieldError>),
    Closed(State),
}

/// One user's sheet submission, from opening the form to its resolution.
#[derive(Debug, Clone)]
pub struct Submission {
    template: Arc<SheetTemplate>,
    author_id: u64,
    state: State,
    values: Vec<(String, String)>,
    extraneous: Vec<String>,
    duplicates: Vec<String>,
    taken_names: Vec<String>,
}

impl Submission {
    /// Opens a submission for `template_name`. The template is snapshotted so
    /// catalog changes do not reach a submission in flight.
    pub fn open(
        catalog: &Catalog,
        template_name: &str,
        author_id: u64,
    ) -> Result<Self, SubmissionError> {
        let template = catalog.get_template(template_name)?;
        Ok(Submission {
            template,
            author_id,
            state: State::Opened,
            values: Vec::new(),
            extraneous: Vec::new(),
            duplicates: Vec::new(),
            taken_names: Vec::new(),
        })
    }

    /// Reopens a sheet that was confirmed but could not be stored, so it can
    /// be checked against fresher data and presented again.
    pub fn reopen(catalog: &Catalog, result: &SubmissionResult) -> Result<Self, SubmissionError> {
        let mut submission = Submission::open(catalog, &result.template, result.author_id)?;
        for (label, value) in &result.fields {
            submission.fill(label, value)?;
        }
        Ok(submission)
    }

    /// Names the author already uses; unique fields must avoid them.
    pub fn with_taken_names(mut self, names: Vec<String>) -> Self {
        self.taken_names = names.iter().map(|name| name.to_lowercase()).collect();
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn template(&self) -> &SheetTemplate {
        &self.template
    }

    pub fn author_id(&self) -> u64 {
        self.author_id
    }

    pub fn value(&self, label: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    fn ensure_open(&self) -> Result<(), SubmissionError> {
        if self.state.is_terminal() {
            return Err(SubmissionError::Closed(self.state));
        }
        Ok(())
    }

    /// Sets a single field. Labels the template does not declare are kept
    /// aside and rejected on confirm.
    pub fn fill(&mut self, label: &str, value: &str) -> Result<(), SubmissionError> {
        self.ensure_open()?;

        match self.template.field(label) {
            Some(field) => {
                let label = field.label.clone();
                match self.values.iter_mut().find(|(l, _)| *l == label) {
                    Some((_, existing)) => *existing = value.trim().to_string(),
                    None => self.values.push((label, value.trim().to_string())),
                }
            }
            None => {
                let label = label.trim();
                if !self.extraneous.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                    self.extraneous.push(label.to_string());
                }
            }
        }

        self.state = State::Filled;
        Ok(())
    }

    /// Clears a field, or forgets a label the template does not declare.
    pub fn unfill(&mut self, label: &str) -> Result<(), SubmissionError> {
        self.ensure_open()?;

        let label = label.trim();
        match self.template.field(label) {
            Some(field) => self.values.retain(|(l, _)| *l != field.label),
            None => self.extraneous.retain(|l| !l.eq_ignore_ascii_case(label)),
        }

        self.state = State::Filled;
        Ok(())
    }

    /// Replaces every value with the contents of a submitted sheet.
    pub fn fill_sheet(&mut self, text: &str) -> Result<(), SubmissionError> {
        self.ensure_open()?;

        let sheet = self.template.parse(text);
        self.values = sheet.values;
        self.extraneous = sheet.extraneous;
        self.duplicates = sheet.duplicates;

        self.state = State::Filled;
        Ok(())
    }

    /// The sheet text for the current values, used to present the form.
    pub fn draft(&self) -> String {
        self.template.render(|label| self.value(label))
    }

    /// The draft if it fits in `max_chars`, dropping hints from empty fields
    /// when that is what it takes. `None` when even that is too long.
    pub fn draft_within(&self, max_chars: usize) -> Option<String> {
        let draft = self.draft();
        if draft.chars().count() <= max_chars {
            return Some(draft);
        }

        let compact = self.template.render_compact(|label| self.value(label));
        (compact.chars().count() <= max_chars).then_some(compact)
    }

    fn validate(&self, registry: &Registry) -> Result<Vec<(String, String)>, Vec<FieldError>> {
        let mut errors: Vec<FieldError> = self
            .extraneous
            .iter()
            .map(|label| FieldError::new(label, FieldErrorReason::Unknown))
            .chain(
                self.duplicates
                    .iter()
                    .map(|label| FieldError::new(label, FieldErrorReason::Duplicate)),
            )
            .collect();
        let mut fields = Vec::with_capacity(self.template.fields().len());

        for field in self.template.fields() {
            let mut value = self.value(&field.label).unwrap_or_default().to_string();

            if value.is_empty() {
                if field.required {
                    errors.push(FieldError::new(&field.label, FieldErrorReason::Missing));
                }
                fields.push((field.label.clone(), value));
                continue;
            }

            if let Some(max) = field.max_len {
                if value.chars().count() > max {
                    errors.push(FieldError::new(
                        &field.label,
                        FieldErrorReason::TooLong { max },
                    ));
                }
            }

            match field.constraint {
                Constraint::Free => {}
                Constraint::Stat => match registry.stat(&value) {
                    Some(stat) => value = stat.name().to_string(),
                    None => errors.push(FieldError::new(
                        &field.label,
                        FieldErrorReason::NotAStat {
                            allowed: join_names(registry.stats().iter().map(|s| s.name())),
                        },
                    )),
                },
                Constraint::Kind => match registry.kind(&value) {
                    Some(kind) => value = kind.name().to_string(),
                    None => errors.push(FieldError::new(
                        &field.label,
                        FieldErrorReason::NotAKind {
                            allowed: join_names(registry.kinds().iter().map(|k| k.name())),
                        },
                    )),
                },
            }

            if field.unique && self.taken_names.contains(&value.to_lowercase()) {
                errors.push(FieldError::new(&field.label, FieldErrorReason::Taken));
            }

            fields.push((field.label.clone(), value));
        }

        if errors.is_empty() {
            Ok(fields)
        } else {
            Err(errors)
        }
    }

    /// Validates the sheet. On success the submission is confirmed and the
    /// result returned; on failure it stays `Filled` so the user can retry.
    pub fn confirm(&mut self, registry: &Registry) -> Result<SubmissionResult, SubmissionError> {
        self.ensure_open()?;

        match self.validate(registry) {
            Ok(fields) => {
                self.state = State::Confirmed;
                Ok(SubmissionResult {
                    template: self.template.name().to_string(),
                    author_id: self.author_id,
                    fields,
                })
            }
            Err(errors) => {
                self.state = State::Filled;
                Err(SubmissionError::Invalid(errors))
            }
        }
    }

    pub fn cancel(&mut self) -> Result<(), SubmissionError> {
        self.ensure_open()?;
        self.state = State::Cancelled;
        Ok(())
    }

    pub fn time_out(&mut self) -> Result<(), SubmissionError> {
        self.ensure_open()?;
        self.state = State::TimedOut;
        Ok(())
    }

    /// Drives the submission from a runtime event.
    pub fn handle(&mut self, event: Event, registry: &Registry) -> Result<Step, SubmissionError> {
        match event {
            Event::Submitted(text) => {
                self.fill_sheet(&text)?;
                match self.confirm(registry) {
                    Ok(result) => Ok(Step::Confirmed(result)),
                    Err(SubmissionError::Invalid(errors)) => Ok(Step::Retry(errors)),
                    Err(e) => Err(e),
                }
            }
            Event::Cancelled => {
                self.cancel()?;
                Ok(Step::Closed(self.state))
            }
            Event::TimedOut => {
                self.time_out()?;
                Ok(Step::Closed(self.state))
            }
        }
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}
