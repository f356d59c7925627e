use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use sqlx::FromRow;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub const MAX_NAME_LENGTH: usize = 100;
pub const MIN_NAME_LENGTH: usize = 2;
pub const MAX_EMAIL_LENGTH: usize = 120;
pub const MAX_PHONE_LENGTH: usize = 20;
pub const MIN_PHONE_DIGITS: usize = 10;

/// Field-level contract violation raised when a value is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Email is required")]
    EmailRequired,
    #[error("Email must be at most 120 characters")]
    EmailTooLong,
    #[error("Invalid email format")]
    EmailFormat,
    #[error("Name must be at least 2 characters")]
    NameTooShort,
    #[error("Name must be at most 100 characters")]
    NameTooLong,
    #[error("Name must contain only letters")]
    NameCharacters,
    #[error("Phone must contain only digits")]
    PhoneDigits,
    #[error("Phone must have at least 10 digits")]
    PhoneTooShort,
    #[error("Phone must be at most 20 characters")]
    PhoneTooLong,
}

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap();
    static ref NAME_RE: Regex = Regex::new(r"^[\p{L}\s'-]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^[0-9]+$").unwrap();
}

/// Checks an email and returns it lowercased.
pub fn validate_email(value: &str) -> Result<String, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmailRequired);
    }
    if value.chars().count() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::EmailTooLong);
    }
    if !EMAIL_RE.is_match(value) {
        return Err(ValidationError::EmailFormat);
    }
    Ok(value.to_lowercase())
}

/// Checks a display name and returns it trimmed.
pub fn validate_name(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.chars().count() < MIN_NAME_LENGTH {
        return Err(ValidationError::NameTooShort);
    }
    // the upper bound applies to the raw value
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong);
    }
    if !NAME_RE.is_match(value) {
        return Err(ValidationError::NameCharacters);
    }
    Ok(trimmed.to_string())
}

/// Checks a phone number. An empty value means "no phone".
pub fn validate_phone(value: &str) -> Result<Option<String>, ValidationError> {
    if value.is_empty() {
        return Ok(None);
    }
    if !PHONE_RE.is_match(value) {
        return Err(ValidationError::PhoneDigits);
    }
    if value.len() < MIN_PHONE_DIGITS {
        return Err(ValidationError::PhoneTooShort);
    }
    if value.len() > MAX_PHONE_LENGTH {
        return Err(ValidationError::PhoneTooLong);
    }
    Ok(Some(value.to_string()))
}

/// A persisted user row.
///
/// Fields are private: every change goes through [`User::apply_partial_update`],
/// [`User::disable`] or [`User::enable`], which keep the validators and the
/// `updated_at` stamp in the loop.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    id: i64,
    name: String,
    email: String,
    phone: Option<String>,
    enabled: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

/// JSON shape of a user as returned by the API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub enabled: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl User {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    pub fn to_representation(&self) -> UserResponse {
        UserResponse {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            enabled: self.enabled,
            created_at: self.created_at.format(&Rfc3339).ok(),
            updated_at: self.updated_at.format(&Rfc3339).ok(),
        }
    }

    /// Assigns every field present in `changes` and stamps `updated_at`,
    /// even when nothing changed.
    pub fn apply_partial_update(&mut self, changes: UserChanges) {
        let UserChanges { name, email, phone } = changes;
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(email) = email {
            self.email = email;
        }
        if let Some(phone) = phone {
            self.phone = phone;
        }
        self.touch();
    }

    /// Soft-delete.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.touch();
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc().max(self.created_at);
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User {} ({})", self.name, self.email)
    }
}

/// A validated user that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    name: String,
    email: String,
    phone: Option<String>,
    enabled: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl NewUser {
    pub fn builder() -> NewUserBuilder {
        NewUserBuilder::default()
    }

    pub fn new(name: &str, email: &str, phone: Option<&str>) -> Result<Self, ValidationError> {
        let mut builder = Self::builder().name(name)?.email(email)?;
        if let Some(phone) = phone {
            builder = builder.phone(phone)?;
        }
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    /// Turns the record into a stored row once the backend has assigned an id.
    pub fn into_user(self, id: i64) -> User {
        User {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            enabled: self.enabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Builds a [`NewUser`], validating each field as it is set.
#[derive(Debug, Clone)]
pub struct NewUserBuilder {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    enabled: bool,
}

impl Default for NewUserBuilder {
    fn default() -> Self {
        Self {
            name: None,
            email: None,
            phone: None,
            enabled: true,
        }
    }
}

impl NewUserBuilder {
    pub fn name(mut self, value: &str) -> Result<Self, ValidationError> {
        self.name = Some(validate_name(value)?);
        Ok(self)
    }

    pub fn email(mut self, value: &str) -> Result<Self, ValidationError> {
        self.email = Some(validate_email(value)?);
        Ok(self)
    }

    pub fn phone(mut self, value: &str) -> Result<Self, ValidationError> {
        self.phone = validate_phone(value)?;
        Ok(self)
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn build(self) -> Result<NewUser, ValidationError> {
        let name = self.name.ok_or(ValidationError::NameTooShort)?;
        let email = self.email.ok_or(ValidationError::EmailRequired)?;
        let now = OffsetDateTime::now_utc();
        Ok(NewUser {
            name,
            email,
            phone: self.phone,
            enabled: self.enabled,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Allow-list of fields a partial update may touch. Values are validated
/// when set, so an instance only ever carries clean data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    name: Option<String>,
    email: Option<String>,
    phone: Option<Option<String>>,
}

impl UserChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, value: &str) -> Result<Self, ValidationError> {
        self.name = Some(validate_name(value)?);
        Ok(self)
    }

    pub fn with_email(mut self, value: &str) -> Result<Self, ValidationError> {
        self.email = Some(validate_email(value)?);
        Ok(self)
    }

    pub fn with_phone(mut self, value: &str) -> Result<Self, ValidationError> {
        self.phone = Some(validate_phone(value)?);
        Ok(self)
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }
}
