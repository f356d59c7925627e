use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::users::model::{NewUser, UserChanges};

pub const JSON_REQUIRED: &str = "JSON data is required";

type JsonObject = Map<String, Value>;

/// Parses a request body that must be a non-empty JSON object.
pub fn parse_object(body: &[u8]) -> Result<JsonObject, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        _ => Err(ApiError::validation(JSON_REQUIRED)),
    }
}

/// A string field; `null` reads as empty so the validators report it.
fn text<'a>(map: &'a JsonObject, field: &str) -> Result<Option<&'a str>, ApiError> {
    match map.get(field) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some("")),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ApiError::validation(format!(
            "Field {} must be a string",
            field
        ))),
    }
}

fn required_text<'a>(map: &'a JsonObject, field: &str) -> Result<&'a str, ApiError> {
    match text(map, field)? {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ApiError::validation(format!("Field {} is required", field))),
    }
}

fn optional_bool(map: &JsonObject, field: &str) -> Result<Option<bool>, ApiError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ApiError::validation(format!(
            "Field {} must be a boolean",
            field
        ))),
    }
}

/// `POST /users` body: `{name, email, phone, enabled?}`.
///
/// All three fields must be present before any of them is validated; a
/// missing field wins over a malformed one.
pub fn create_request(map: &JsonObject) -> Result<NewUser, ApiError> {
    let name = required_text(map, "name")?;
    let email = required_text(map, "email")?;
    let phone = required_text(map, "phone")?;

    let builder = NewUser::builder()
        .name(name)?
        .email(email)?
        .phone(phone)?
        .enabled(optional_bool(map, "enabled")?.unwrap_or(true));
    Ok(builder.build()?)
}

/// `PUT /users/{phone}` body. Only `name` and `email` are honoured; other
/// keys are ignored.
pub fn update_request(map: &JsonObject) -> Result<UserChanges, ApiError> {
    let mut changes = UserChanges::new();
    if let Some(name) = text(map, "name")? {
        changes = changes.with_name(name)?;
    }
    if let Some(email) = text(map, "email")? {
        changes = changes.with_email(email)?;
    }
    Ok(changes)
}
