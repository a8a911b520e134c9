//! Helm-flavoured template filters
//!
//! The names follow the Sprig functions chart authors already know, in
//! lower case.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};
use semver::{Version, VersionReq};
use sha2::{Digest, Sha256};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

fn as_text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None if value.is_undefined() || value.is_none() => String::new(),
        None => value.to_string(),
    }
}

/// `{{ values.resources | toyaml }}`
pub fn toyaml(value: Value) -> Result<String, Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(String::new());
    }
    let yaml = serde_yaml::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))?;
    Ok(yaml.trim_end().to_string())
}

/// `{{ values.env | tojson }}`
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))
}

pub fn b64enc(value: Value) -> String {
    base64::engine::general_purpose::STANDARD.encode(as_text(&value))
}

pub fn b64dec(value: String) -> Result<String, Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| invalid(format!("decoded value is not UTF-8: {}", e)))
}

pub fn quote(value: Value) -> String {
    format!("{:?}", as_text(&value))
}

pub fn squote(value: Value) -> String {
    format!("'{}'", as_text(&value))
}

/// Indent every non-empty line by `width` spaces
pub fn indent(value: Value, width: usize) -> String {
    let pad = " ".repeat(width);
    as_text(&value)
        .split('\n')
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Like [`indent`] with a leading newline
pub fn nindent(value: Value, width: usize) -> String {
    format!("\n{}", indent(value, width))
}

/// `{{ values.global.hosts.domain | required("a domain is required") }}`
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);
    if missing {
        return Err(invalid(
            message.unwrap_or_else(|| "a required value is missing".to_string()),
        ));
    }
    Ok(value)
}

/// Keep the first `length` characters; a negative length keeps the tail
pub fn trunc(value: Value, length: i64) -> String {
    let text = as_text(&value);
    let count = text.chars().count();
    let keep = length.unsigned_abs() as usize;
    if keep >= count {
        return text;
    }
    if length >= 0 {
        text.chars().take(keep).collect()
    } else {
        text.chars().skip(count - keep).collect()
    }
}

pub fn trimprefix(value: Value, prefix: String) -> String {
    let text = as_text(&value);
    text.strip_prefix(prefix.as_str()).unwrap_or(&text).to_string()
}

pub fn trimsuffix(value: Value, suffix: String) -> String {
    let text = as_text(&value);
    text.strip_suffix(suffix.as_str()).unwrap_or(&text).to_string()
}

pub fn sha256sum(value: Value) -> String {
    let digest = Sha256::digest(as_text(&value).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// `{% if capabilities.kubeVersion.version | semvercompare(">=1.23.0-0") %}`
///
/// A leading `v` on the version is accepted.
pub fn semvercompare(version: Value, constraint: String) -> Result<bool, Error> {
    let raw = as_text(&version);
    let version = Version::parse(raw.trim_start_matches('v'))
        .map_err(|e| invalid(format!("invalid version '{}': {}", raw, e)))?;
    let requirement = VersionReq::parse(&constraint)
        .map_err(|e| invalid(format!("invalid constraint '{}': {}", constraint, e)))?;
    Ok(requirement.matches(&version))
}
