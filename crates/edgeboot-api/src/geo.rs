// Best-effort geolocation used to label subscription links.
//
// Providers are tried in order; the first one that yields both a country
// code and an organisation wins. Every failure degrades to `Unknown`.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Label used when no provider answers.
pub const UNKNOWN: &str = "Unknown";

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(3);

/// A JSON geolocation endpoint and the field names it uses.
#[derive(Debug, Clone)]
pub struct GeoProvider {
    pub url: Url,
    pub country_field: &'static str,
    pub org_field: &'static str,
}

impl GeoProvider {
    pub fn new(url: Url, country_field: &'static str, org_field: &'static str) -> Self {
        Self {
            url,
            country_field,
            org_field,
        }
    }

    /// `ipapi.co` then `ip-api.com`.
    pub fn defaults() -> Result<Vec<Self>, Error> {
        Ok(vec![
            Self::new(Url::parse("https://ipapi.co/json/")?, "country_code", "org"),
            Self::new(Url::parse("http://ip-api.com/json/")?, "countryCode", "org"),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    pub country: String,
    pub org: String,
}

impl GeoInfo {
    /// `<country>_<org>`
    pub fn label(&self) -> String {
        format!("{}_{}", self.country, self.org)
    }
}

#[derive(Debug, Clone)]
pub struct GeoLocator {
    http: reqwest::Client,
    providers: Vec<GeoProvider>,
}

impl GeoLocator {
    pub fn new() -> Result<Self, Error> {
        let transport = TransportConfig {
            connect_timeout: PROVIDER_TIMEOUT,
            timeout: Some(PROVIDER_TIMEOUT),
            ..TransportConfig::for_lookups()
        };
        Ok(Self::with_providers(
            transport.build_client()?,
            GeoProvider::defaults()?,
        ))
    }

    pub fn with_providers(http: reqwest::Client, providers: Vec<GeoProvider>) -> Self {
        Self { http, providers }
    }

    /// First provider answer carrying both fields.
    pub async fn lookup(&self) -> Option<GeoInfo> {
        for provider in &self.providers {
            match self.query(provider).await {
                Ok(Some(info)) => return Some(info),
                Ok(None) => debug!(url = %provider.url, "geo provider returned incomplete data"),
                Err(e) => debug!(url = %provider.url, error = %e, "geo provider failed"),
            }
        }
        None
    }

    /// `<country>_<org>`, or [`UNKNOWN`].
    pub async fn label(&self) -> String {
        self.lookup()
            .await
            .map_or_else(|| UNKNOWN.to_owned(), |info| info.label())
    }

    async fn query(&self, provider: &GeoProvider) -> Result<Option<GeoInfo>, Error> {
        let resp = self.http.get(provider.url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: provider.url.to_string(),
            });
        }

        let body = resp.text().await?;
        let json: Value = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.clone(),
        })?;

        let field = |name: &str| {
            json.get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        Ok(field(provider.country_field)
            .zip(field(provider.org_field))
            .map(|(country, org)| GeoInfo { country, org }))
    }
}
