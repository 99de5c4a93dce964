//! Field and uniqueness validation for signup, login and update payloads.
//!
//! Each operation hands in its own typed payload, the set of fields it
//! requires, and how uniqueness should be checked against the store. The
//! result is either the sanitized fields or every error found, grouped per
//! field in the order the checks ran.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{ser::SerializeMap, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};

pub const USERNAME_MAX_CHARS: usize = 15;
pub const EMAIL_MAX_CHARS: usize = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldName {
    Username,
    Email,
    Password,
    Refresh,
    Token,
}

impl FieldName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Username => "username",
            FieldName::Email => "email",
            FieldName::Password => "password",
            FieldName::Refresh => "refresh",
            FieldName::Token => "token",
        }
    }

    pub fn max_chars(&self) -> Option<usize> {
        match self {
            FieldName::Username => Some(USERNAME_MAX_CHARS),
            FieldName::Email => Some(EMAIL_MAX_CHARS),
            _ => None,
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields an operation insists on. Fields outside the set are validated only
/// when the client sends them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFields(BTreeSet<FieldName>);

impl RequiredFields {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(fields: &[FieldName]) -> Self {
        Self(fields.iter().copied().collect())
    }

    pub fn signup() -> Self {
        Self::of(&[FieldName::Username, FieldName::Email, FieldName::Password])
    }

    pub fn login() -> Self {
        Self::of(&[FieldName::Email, FieldName::Password])
    }

    pub fn update() -> Self {
        Self::none()
    }

    pub fn contains(&self, field: FieldName) -> bool {
        self.0.contains(&field)
    }
}

/// How submitted username/email values are checked against existing users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uniqueness {
    /// Any existing holder is a conflict.
    Create,
    /// The record being updated may keep its own values.
    Update { exclude: Uuid },
    /// Lookup only, as in login.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Blank,
    Require,
    MaxLength,
    Invalid,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub code: ErrorCode,
    pub message: String,
}

impl FieldError {
    fn new(field: FieldName, code: ErrorCode) -> Self {
        let message = match code {
            ErrorCode::Blank => "This field may not be blank.".to_string(),
            ErrorCode::Require => "This field is required.".to_string(),
            ErrorCode::MaxLength => match field.max_chars() {
                Some(max) => format!("Ensure this field has no more than {max} characters."),
                None => "Ensure this field is not too long.".to_string(),
            },
            ErrorCode::Invalid => "Enter a valid email address.".to_string(),
            ErrorCode::Unique => format!("user with this {field} already exists."),
        };
        Self { code, message }
    }
}

/// Errors per field. Serializes as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<FieldName, Vec<FieldError>>);

impl FieldErrors {
    pub fn single(field: FieldName, code: ErrorCode) -> Self {
        let mut errors = Self::default();
        errors.push(field, code);
        errors
    }

    pub fn push(&mut self, field: FieldName, code: ErrorCode) {
        self.0
            .entry(field)
            .or_default()
            .push(FieldError::new(field, code));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: FieldName) -> bool {
        self.0.contains_key(&field)
    }

    pub fn codes(&self, field: FieldName) -> Vec<ErrorCode> {
        self.0
            .get(&field)
            .map(|errors| errors.iter().map(|e| e.code).collect())
            .unwrap_or_default()
    }

    /// A `unique` failure anywhere turns the whole response into a conflict.
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.0.values().flatten().any(|e| e.code == code)
    }
}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, errors) in &self.0 {
            let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
            map.serialize_entry(field.as_str(), &messages)?;
        }
        map.end()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, errors) in &self.0 {
            for error in errors {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                write!(f, "{field}: {}", error.message)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid fields: {0}")]
    Fields(FieldErrors),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Raw values as submitted; `None` means the key was absent or null.
#[derive(Debug, Clone, Default)]
pub struct UserFields {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Values that passed validation. Username is trimmed, email normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedFields {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Dot-atom local part; domain checked label by label with no empty labels
/// and no label starting or ending in `-`. `localhost` is accepted as is.
pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref LOCAL_RE: Regex =
            Regex::new(r"(?i)^[-!#$%&'*+/=?^_`{}|~0-9a-z]+(?:\.[-!#$%&'*+/=?^_`{}|~0-9a-z]+)*$")
                .unwrap();
        static ref DOMAIN_RE: Regex = Regex::new(
            r"(?i)^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])$"
        )
        .unwrap();
    }
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    LOCAL_RE.is_match(local) && (domain == "localhost" || DOMAIN_RE.is_match(domain))
}

/// Trims the address and lower-cases its domain part. The local part keeps
/// its case.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Returns the trimmed value, or records `require`/`blank` and returns `None`.
fn present(
    field: FieldName,
    value: Option<&str>,
    required: &RequiredFields,
    errors: &mut FieldErrors,
) -> Option<String> {
    match value {
        None if required.contains(field) => {
            errors.push(field, ErrorCode::Require);
            None
        }
        None => None,
        Some(v) if v.trim().is_empty() => {
            errors.push(field, ErrorCode::Blank);
            None
        }
        Some(v) => Some(v.trim().to_string()),
    }
}

/// Shape checks that need no store access.
pub fn check_fields(input: &UserFields, required: &RequiredFields) -> (ValidatedFields, FieldErrors) {
    let mut errors = FieldErrors::default();
    let mut out = ValidatedFields::default();

    if let Some(username) = present(
        FieldName::Username,
        input.username.as_deref(),
        required,
        &mut errors,
    ) {
        if username.chars().count() > USERNAME_MAX_CHARS {
            errors.push(FieldName::Username, ErrorCode::MaxLength);
        } else {
            out.username = Some(username);
        }
    }

    if let Some(email) = present(FieldName::Email, input.email.as_deref(), required, &mut errors) {
        let email = normalize_email(&email);
        if email.chars().count() > EMAIL_MAX_CHARS {
            errors.push(FieldName::Email, ErrorCode::MaxLength);
        } else if is_valid_email(&email) {
            out.email = Some(email);
        } else {
            errors.push(FieldName::Email, ErrorCode::Invalid);
        }
    }

    if present(
        FieldName::Password,
        input.password.as_deref(),
        required,
        &mut errors,
    )
    .is_some()
    {
        // Passwords are kept as typed, surrounding whitespace included.
        out.password = input.password.clone();
    }

    (out, errors)
}

/// Adds `unique` errors for values already held by another user.
pub async fn check_unique(
    store: &dyn UserStore,
    fields: &ValidatedFields,
    uniqueness: Uniqueness,
    errors: &mut FieldErrors,
) -> Result<(), StoreError> {
    let excluding = match uniqueness {
        Uniqueness::Skip => return Ok(()),
        Uniqueness::Create => None,
        Uniqueness::Update { exclude } => Some(exclude),
    };
    if fields.username.is_none() && fields.email.is_none() {
        return Ok(());
    }
    let holders = store
        .find_by_username_or_email(fields.username.as_deref(), fields.email.as_deref(), excluding)
        .await?;
    if holders
        .iter()
        .any(|u| fields.username.as_deref() == Some(u.username.as_str()))
    {
        errors.push(FieldName::Username, ErrorCode::Unique);
    }
    if holders
        .iter()
        .any(|u| fields.email.as_deref() == Some(u.email.as_str()))
    {
        errors.push(FieldName::Email, ErrorCode::Unique);
    }
    Ok(())
}

/// Full validation: shape first, then uniqueness for the values that passed.
pub async fn validate(
    store: &dyn UserStore,
    input: &UserFields,
    required: &RequiredFields,
    uniqueness: Uniqueness,
) -> Result<ValidatedFields, ValidationError> {
    let (fields, mut errors) = check_fields(input, required);
    check_unique(store, &fields, uniqueness, &mut errors).await?;
    if errors.is_empty() {
        Ok(fields)
    } else {
        Err(ValidationError::Fields(errors))
    }
}
