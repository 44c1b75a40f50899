//! Credential types shared by the configuration and the connection gate.

use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A secret value (the ClickHouse password) that never shows up in logs.
///
/// `Debug`/`Display` print `[REDACTED]` and serialization writes
/// `"***REDACTED***"`, so a config dump or a structured log line carrying the
/// connector config cannot leak the password. Deserialization reads the real
/// value.
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Access the real value. Only the transport should need this.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl JsonSchema for SensitiveString {
    fn schema_name() -> String {
        "SensitiveString".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        let mut schema = gen.subschema_for::<String>();
        if let schemars::schema::Schema::Object(obj) = &mut schema {
            obj.format = Some("password".to_string());
            obj.metadata().description =
                Some("ClickHouse password. Redacted in logs and config dumps.".to_string());
        }
        schema
    }
}

/// A username/password pair attached to an endpoint.
///
/// Only ever constructed when both halves are present; see
/// [`Credentials::from_parts`].
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SensitiveString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<SensitiveString>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Pair up optional username and password.
    ///
    /// Returns `None` unless both are present: a lone username or a lone
    /// password means anonymous access.
    pub fn from_parts(username: Option<&str>, password: Option<&SensitiveString>) -> Option<Self> {
        match (username, password) {
            (Some(user), Some(pass)) => Some(Self {
                username: user.to_string(),
                password: pass.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_string_is_redacted() {
        let secret = SensitiveString::new("hunter2");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(
            serde_json::to_string(&secret).unwrap(),
            "\"***REDACTED***\""
        );
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn test_sensitive_string_deserialize() {
        let secret: SensitiveString = serde_json::from_str("\"hunter2\"").unwrap();
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("ingest", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ingest"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_credentials_from_parts() {
        let pass = SensitiveString::new("pw");
        let both = Credentials::from_parts(Some("u"), Some(&pass)).unwrap();
        assert_eq!(both.username, "u");
        assert_eq!(both.password.expose_secret(), "pw");

        assert!(Credentials::from_parts(Some("u"), None).is_none());
        assert!(Credentials::from_parts(None, Some(&pass)).is_none());
        assert!(Credentials::from_parts(None, None).is_none());
    }
}
