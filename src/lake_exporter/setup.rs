// lake_exporter - Prometheus metrics exporter for wassertemperatur.org
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::{ClientError, LakeClient};
use crate::record::LakeRecord;
use crate::store::StoreError;
use reqwest::Url;
use std::error;
use std::fmt;

/// Site that lake pages are expected to come from.
pub const DEFAULT_SOURCE_DOMAIN: &str = "wassertemperatur.org";

#[derive(Debug)]
pub enum SetupError {
    InvalidSource(String),
    CannotConnect(ClientError),
    Duplicate(String),
    UnknownLake(String),
    Store(StoreError),
}

impl SetupError {
    /// Short machine readable code for the error, suitable for showing next to the input
    /// that caused it.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidSource(_) => "invalid_url",
            Self::CannotConnect(_) => "cannot_connect",
            Self::Duplicate(_) => "already_configured",
            Self::UnknownLake(_) => "not_found",
            Self::Store(_) => "storage",
        }
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSource(url) => write!(f, "invalid lake URL {}", url),
            Self::CannotConnect(e) => write!(f, "cannot connect: {}", e),
            Self::Duplicate(id) => write!(f, "lake {} is already configured", id),
            Self::UnknownLake(id) => write!(f, "unknown lake {}", id),
            Self::Store(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for SetupError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::CannotConnect(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SetupError {
    fn from(e: StoreError) -> Self {
        SetupError::Store(e)
    }
}

/// Checks that a candidate lake URL points at the expected site and can be fetched and
/// parsed before it is accepted.
#[derive(Debug, Clone)]
pub struct SourceValidator {
    client: LakeClient,
    domain: String,
}

impl SourceValidator {
    pub fn new<S: Into<String>>(client: LakeClient, domain: S) -> Self {
        SourceValidator {
            client,
            domain: domain.into().to_ascii_lowercase(),
        }
    }

    /// Parse `url` and make sure it is an HTTP(S) URL on the expected domain or one of
    /// its subdomains. No requests are made.
    pub fn check_source(&self, url: &str) -> Result<Url, SetupError> {
        let trimmed = url.trim();
        let parsed = Url::parse(trimmed).map_err(|_| SetupError::InvalidSource(trimmed.to_owned()))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SetupError::InvalidSource(trimmed.to_owned()));
        }

        let host = parsed.host_str().map(|h| h.to_ascii_lowercase()).unwrap_or_default();
        if host == self.domain || host.ends_with(&format!(".{}", self.domain)) {
            Ok(parsed)
        } else {
            Err(SetupError::InvalidSource(trimmed.to_owned()))
        }
    }

    /// Check the URL, then fetch and parse it once.
    ///
    /// A page without a current temperature is accepted: lakes often don't have one
    /// outside of the swimming season.
    pub async fn probe(&self, url: &str) -> Result<LakeRecord, SetupError> {
        let parsed = self.check_source(url)?;
        let record = self.client.lake(&parsed).await.map_err(SetupError::CannotConnect)?;

        if record.temperature_c.is_none() {
            tracing::info!(message = "lake page has no current temperature", url = %parsed);
        }

        Ok(record)
    }
}
