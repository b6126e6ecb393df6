use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full URL of a secret, e.g. `https://my-vault.vault.azure.net/secrets/db-password`.
///
/// Ids returned by the vault may carry a trailing version segment; both forms
/// are accepted wherever a `SecretId` is expected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretId(String);

impl SecretId {
    pub fn new(id: impl Into<String>) -> Self {
        SecretId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The secret name, i.e. the path segment following `/secrets/`.
    pub fn name(&self) -> Option<&str> {
        let (_, rest) = self.0.split_once("/secrets/")?;
        rest.split(['/', '?']).next().filter(|name| !name.is_empty())
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SecretId {
    fn from(id: String) -> Self {
        SecretId(id)
    }
}

/// Metadata of a secret as listed by the vault. Listing never returns values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub id: SecretId,
    #[serde(default)]
    pub attributes: Option<SecretAttributes>,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub managed: bool,
}

/// Lifecycle attributes of a secret. Timestamps travel as UNIX seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created: Option<DateTime<Utc>>,

    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated: Option<DateTime<Utc>>,

    #[serde(
        rename = "nbf",
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub not_before: Option<DateTime<Utc>>,

    #[serde(
        rename = "exp",
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires: Option<DateTime<Utc>>,

    #[serde(
        rename = "recoverylevel",
        alias = "recoveryLevel",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recovery_level: Option<String>,
}

impl SecretAttributes {
    fn is_empty(&self) -> bool {
        *self == SecretAttributes::default()
    }

    /// The subset accepted when writing a new value.
    fn for_set(&self) -> SecretAttributes {
        SecretAttributes {
            not_before: self.not_before,
            expires: self.expires,
            recovery_level: self.recovery_level.clone(),
            ..Default::default()
        }
    }
}

/// A secret together with its value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SecretValue {
    #[serde(flatten)]
    pub secret: Secret,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub kid: Option<String>,
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("secret", &self.secret)
            .field("value", &"[REDACTED]")
            .field("kid", &self.kid)
            .finish()
    }
}

/// Body of a `PUT` creating a new version of a secret.
#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSecret {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "SecretAttributes::is_empty")]
    pub attributes: SecretAttributes,
}

impl SetSecret {
    pub fn new(value: impl Into<String>) -> Self {
        SetSecret {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Only `nbf`, `exp` and the recovery level are sent; other attributes
    /// are assigned by the vault.
    pub fn attributes(mut self, attributes: &SecretAttributes) -> Self {
        self.attributes = attributes.for_set();
        self
    }
}

impl fmt::Debug for SetSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetSecret")
            .field("value", &"[REDACTED]")
            .field("content_type", &self.content_type)
            .field("tags", &self.tags)
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// Body of a `PATCH` updating the current version's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSecret {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<SecretAttributes>,
}
