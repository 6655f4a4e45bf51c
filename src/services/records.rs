//! Typed records, parsed and validated at the document store boundary.
//!
//! DESIGN
//! ======
//! Views never see raw documents. Every snapshot passes through a parser
//! here that produces one typed shape per collection; documents that fail to
//! parse are skipped with a warning. Writes go through drafts, which validate
//! form input and produce the exact field map to store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::frame::ErrorCode;
use crate::services::auth::normalize_email;
use crate::services::store::{Document, Fields};

pub const NOTIFICATIONS: &str = "notifications";
pub const COURSES: &str = "courses";
pub const ADMISSIONS: &str = "Admissions";
pub const STUDENTS: &str = "students";

pub const MAX_RATING: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{0} has the wrong type")]
    WrongType(&'static str),
    #[error("{0} must be an image data URL")]
    NotImageDataUrl(&'static str),
    #[error("{0} is out of range")]
    OutOfRange(&'static str),
    #[error("email is malformed")]
    InvalidEmail,
}

impl ErrorCode for RecordError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing(_) => "E_FIELD_MISSING",
            Self::WrongType(_) => "E_FIELD_TYPE",
            Self::NotImageDataUrl(_) => "E_FIELD_IMAGE",
            Self::OutOfRange(_) => "E_FIELD_RANGE",
            Self::InvalidEmail => "E_FIELD_EMAIL",
        }
    }
}

// =============================================================================
// FIELD HELPERS
// =============================================================================

/// Text field. Numbers are accepted and rendered; absent and null read as
/// `None`.
fn text(fields: &Fields, key: &'static str) -> Result<Option<String>, RecordError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(RecordError::WrongType(key)),
    }
}

fn required_text(fields: &Fields, key: &'static str) -> Result<String, RecordError> {
    text(fields, key)?
        .filter(|s| !s.trim().is_empty())
        .ok_or(RecordError::Missing(key))
}

/// Numeric value from a JSON number or a numeric string. Blank strings read
/// as absent.
fn lenient_number(value: &Value, key: &'static str) -> Result<Option<f64>, RecordError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| RecordError::WrongType(key)),
        _ => Err(RecordError::WrongType(key)),
    }
}

fn number(fields: &Fields, key: &'static str) -> Result<Option<f64>, RecordError> {
    fields.get(key).map_or(Ok(None), |v| lenient_number(v, key))
}

/// `true` for `data:image/<subtype>;base64,<payload>` with a non-empty
/// base64 payload.
#[must_use]
pub fn is_image_data_url(raw: &str) -> bool {
    let Some(rest) = raw.strip_prefix("data:image/") else {
        return false;
    };
    let Some((subtype, payload)) = rest.split_once(";base64,") else {
        return false;
    };
    !subtype.is_empty()
        && subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !payload.is_empty()
        && payload
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
}

fn image_field(raw: Option<String>, key: &'static str) -> Result<String, RecordError> {
    let raw = raw.unwrap_or_default();
    if raw.is_empty() || is_image_data_url(&raw) {
        Ok(raw)
    } else {
        Err(RecordError::NotImageDataUrl(key))
    }
}

fn non_blank(raw: &str, key: &'static str) -> Result<String, RecordError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RecordError::Missing(key));
    }
    Ok(trimmed.to_owned())
}

fn optional(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

/// Parse every document, skipping and logging the ones that do not fit.
pub fn parse_all<T>(collection: &str, docs: &[Document], parse: fn(&Document) -> Result<T, RecordError>) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match parse(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%collection, id = %doc.id, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

// =============================================================================
// NOTIFICATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub heading: String,
    pub description: String,
    pub link: String,
    pub image: String,
    pub created_at: Option<i64>,
}

impl Notification {
    /// # Errors
    ///
    /// Returns [`RecordError`] when a required field is missing or mistyped.
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        Ok(Self {
            id: doc.id,
            heading: required_text(&doc.fields, "heading")?,
            description: required_text(&doc.fields, "description")?,
            link: text(&doc.fields, "link")?.unwrap_or_default(),
            image: text(&doc.fields, "image")?.unwrap_or_default(),
            created_at: doc.created_at(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationDraft {
    pub heading: String,
    pub description: String,
    pub link: Option<String>,
    pub image: Option<String>,
}

impl NotificationDraft {
    /// Validate and produce the fields to store.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] for blank heading/description or a
    /// non-image `image`.
    pub fn into_fields(self) -> Result<Fields, RecordError> {
        let mut fields = Fields::new();
        fields.insert("heading".into(), non_blank(&self.heading, "heading")?.into());
        fields.insert("description".into(), non_blank(&self.description, "description")?.into());
        fields.insert("link".into(), optional(self.link).unwrap_or_default().into());
        fields.insert("image".into(), image_field(self.image, "image")?.into());
        Ok(fields)
    }
}

// =============================================================================
// COURSE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub heading: String,
    pub description: String,
    pub photo: String,
    pub price: f64,
    pub rating: f64,
    pub created_at: Option<i64>,
}

impl Course {
    /// # Errors
    ///
    /// Returns [`RecordError`] when a required field is missing or mistyped.
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        Ok(Self {
            id: doc.id,
            heading: required_text(&doc.fields, "heading")?,
            description: required_text(&doc.fields, "description")?,
            photo: text(&doc.fields, "photo")?.unwrap_or_default(),
            price: number(&doc.fields, "price")?.unwrap_or(0.0),
            rating: number(&doc.fields, "rating")?.unwrap_or(0.0),
            created_at: doc.created_at(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourseDraft {
    pub heading: String,
    pub description: String,
    pub photo: Option<String>,
    pub price: Option<Value>,
    pub rating: Option<Value>,
}

fn draft_number(raw: Option<&Value>, key: &'static str) -> Result<f64, RecordError> {
    let Some(raw) = raw else {
        return Ok(0.0);
    };
    let value = lenient_number(raw, key)?.unwrap_or(0.0);
    if value.is_finite() { Ok(value) } else { Err(RecordError::OutOfRange(key)) }
}

impl CourseDraft {
    /// Validate and produce the fields to store. Missing price and rating
    /// default to zero.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] for blank text, a non-image `photo`, a negative
    /// price, or a rating outside `0..=5`.
    pub fn into_fields(self) -> Result<Fields, RecordError> {
        let price = draft_number(self.price.as_ref(), "price")?;
        if price < 0.0 {
            return Err(RecordError::OutOfRange("price"));
        }
        let rating = draft_number(self.rating.as_ref(), "rating")?;
        if !(0.0..=MAX_RATING).contains(&rating) {
            return Err(RecordError::OutOfRange("rating"));
        }

        let mut fields = Fields::new();
        fields.insert("heading".into(), non_blank(&self.heading, "heading")?.into());
        fields.insert("description".into(), non_blank(&self.description, "description")?.into());
        fields.insert("photo".into(), image_field(self.photo, "photo")?.into());
        fields.insert("price".into(), price.into());
        fields.insert("rating".into(), rating.into());
        Ok(fields)
    }
}

// =============================================================================
// ADMISSION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub course: String,
    pub message: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub qualification: Option<String>,
    pub created_at: Option<i64>,
}

impl Admission {
    /// # Errors
    ///
    /// Returns [`RecordError`] when a required field is missing or mistyped.
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        let f = &doc.fields;
        Ok(Self {
            id: doc.id,
            name: required_text(f, "name")?,
            email: required_text(f, "email")?,
            course: required_text(f, "course")?,
            message: text(f, "message")?,
            dob: text(f, "dob")?,
            gender: text(f, "gender")?,
            address: text(f, "address")?,
            phone: text(f, "phone")?,
            qualification: text(f, "qualification")?,
            created_at: doc.created_at(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdmissionDraft {
    pub name: String,
    pub email: String,
    pub course: String,
    pub message: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub qualification: Option<String>,
}

impl AdmissionDraft {
    /// Validate and produce the fields to store. Blank optional fields are
    /// omitted.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] for a blank name or course, or a malformed
    /// email.
    pub fn into_fields(self) -> Result<Fields, RecordError> {
        if self.email.trim().is_empty() {
            return Err(RecordError::Missing("email"));
        }
        let email = normalize_email(&self.email).ok_or(RecordError::InvalidEmail)?;

        let mut fields = Fields::new();
        fields.insert("name".into(), non_blank(&self.name, "name")?.into());
        fields.insert("email".into(), email.into());
        fields.insert("course".into(), non_blank(&self.course, "course")?.into());
        for (key, value) in [
            ("message", self.message),
            ("dob", self.dob),
            ("gender", self.gender),
            ("address", self.address),
            ("phone", self.phone),
            ("qualification", self.qualification),
        ] {
            if let Some(value) = optional(value) {
                fields.insert(key.into(), value.into());
            }
        }
        Ok(fields)
    }
}

// =============================================================================
// STUDENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub grade: String,
    pub roll_no: String,
    pub email: String,
    pub enrollment_date: String,
}

impl Student {
    /// Older documents carry the student's programme under `course` instead
    /// of `grade`; both read into `grade`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] when `name` is missing or a field is mistyped.
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        let f = &doc.fields;
        let grade = match text(f, "grade")?.filter(|g| !g.trim().is_empty()) {
            Some(grade) => grade,
            None => text(f, "course")?.unwrap_or_default(),
        };
        Ok(Self {
            id: doc.id,
            name: required_text(f, "name")?,
            grade,
            roll_no: text(f, "rollNo")?.unwrap_or_default(),
            email: text(f, "email")?.unwrap_or_default(),
            enrollment_date: text(f, "enrollmentDate")?.unwrap_or_default(),
        })
    }

    /// Case-insensitive email match.
    #[must_use]
    pub fn has_email(&self, email: &str) -> bool {
        match (normalize_email(&self.email), normalize_email(email)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Name and grade only, for the admin overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub name: String,
    pub grade: String,
}

impl From<Student> for StudentSummary {
    fn from(student: Student) -> Self {
        Self { name: student.name, grade: student.grade }
    }
}

#[cfg(test)]
#[path = "records_test.rs"]
mod tests;
