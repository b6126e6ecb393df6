//! Typed access to the secrets of one vault.
//!
//! [`KeyVault`] wraps a [`JsonClient`] and knows the vault's URL layout:
//!
//! | operation                     | request                                  |
//! |-------------------------------|------------------------------------------|
//! | [`KeyVault::secrets`]         | `GET {vault}/secrets` (paged)            |
//! | [`KeyVault::versions`]        | `GET {id}/versions` (paged)              |
//! | [`KeyVault::value`]           | `GET {id}`                               |
//! | [`KeyVault::set`]             | `PUT {id}`                               |
//! | [`KeyVault::update`]          | `PATCH {id}`                             |
//!
//! Every request carries `?api-version=<version>`.

use std::fmt;

use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use http_body_util::Full;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tower::Service;
use tracing::debug;

use crate::client::FromConfigError;
use crate::client::json::{ClientError, JsonClient};
use crate::config::KeyVaultConfig;

mod secret;

pub use secret::{Secret, SecretAttributes, SecretId, SecretValue, SetSecret, UpdateSecret};

/// API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "2016-10-01";

const API_VERSION_PARAM: &str = "api-version";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    /// Missing and `null` both mean an empty page.
    value: Option<Vec<T>>,
    #[serde(default)]
    next_link: Option<String>,
}

/// A vault reachable through the service `S`, normally an
/// [`Authentication`](crate::client::Authentication) stack.
#[derive(Clone)]
pub struct KeyVault<S> {
    client: JsonClient<S>,
    url: String,
    api_version: String,
}

impl<S> fmt::Debug for KeyVault<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVault")
            .field("url", &self.url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl<S> KeyVault<S> {
    pub fn new(service: S, url: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        KeyVault {
            client: JsonClient::new(service),
            url,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        let api_version = api_version.into();
        if !api_version.is_empty() {
            self.api_version = api_version;
        }
        self
    }

    /// Build a vault handle from the `vault_url` and `api_version` settings.
    pub fn from_config(service: S, config: &KeyVaultConfig) -> Result<Self, FromConfigError> {
        let url = config
            .vault_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(FromConfigError::MissingVaultUrl)?;

        let vault = KeyVault::new(service, url);
        Ok(match &config.api_version {
            Some(version) => vault.with_api_version(version.as_str()),
            None => vault,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn client(&self) -> &JsonClient<S> {
        &self.client
    }

    /// Handle for the secret called `name`. No request is made.
    pub fn secret(&self, name: &str) -> SecretId {
        SecretId::new(format!("{}/secrets/{}", self.url, name))
    }

    fn versioned(&self, url: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}{API_VERSION_PARAM}={}", self.api_version)
    }

    /// Collect every item of a paged listing, following `nextLink` until the
    /// vault stops returning one. Links are used exactly as returned.
    async fn list<T, ResBody>(&self, url: &str) -> Result<Vec<T>, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        T: DeserializeOwned,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        let mut items = Vec::new();
        let mut next = Some(self.versioned(url));

        while let Some(url) = next {
            let page: Page<T> = self.client.get_json(&url).await?;
            let value = page.value.unwrap_or_default();
            debug!(url = %url, count = value.len(), "fetched page");
            items.extend(value);
            next = page.next_link.filter(|link| !link.is_empty());
        }

        Ok(items)
    }

    /// All secrets in the vault, without values.
    pub async fn secrets<ResBody>(&self) -> Result<Vec<Secret>, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        self.list(&format!("{}/secrets", self.url)).await
    }

    /// All versions of a secret, without values.
    pub async fn versions<ResBody>(
        &self,
        id: &SecretId,
    ) -> Result<Vec<Secret>, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        self.list(&format!("{id}/versions")).await
    }

    /// The current value of a secret, or the pinned version if `id` has one.
    pub async fn value<ResBody>(&self, id: &SecretId) -> Result<SecretValue, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        self.client.get_json(&self.versioned(id.as_str())).await
    }

    /// Store a new version of a secret.
    pub async fn set<ResBody>(
        &self,
        id: &SecretId,
        secret: &SetSecret,
    ) -> Result<SecretValue, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        debug!(secret = %id, "setting secret");
        self.client
            .put_json(&self.versioned(id.as_str()), secret)
            .await
    }

    /// Update the metadata of a secret without changing its value.
    pub async fn update<ResBody>(
        &self,
        id: &SecretId,
        update: &UpdateSecret,
    ) -> Result<SecretValue, ClientError<S::Error>>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone,
        ResBody: Body,
        ResBody::Error: fmt::Debug,
    {
        debug!(secret = %id, "updating secret");
        self.client
            .patch_json(&self.versioned(id.as_str()), update)
            .await
    }
}
