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

use crate::parser::LakeParser;
use crate::record::LakeRecord;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode, Url};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Client for fetching and parsing lake pages.
///
/// Timeouts are the responsibility of the provided `Client` and should be set when it
/// is built. Requests are never retried.
#[derive(Debug, Clone)]
pub struct LakeClient {
    client: Client,
    parser: LakeParser,
}

impl LakeClient {
    /// Lake pages are served differently (or not at all) to clients that don't look like
    /// a browser.
    pub const USER_AGENT: &'static str =
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

    pub fn new(client: Client) -> Self {
        Self::with_parser(client, LakeParser::new())
    }

    pub fn with_parser(client: Client, parser: LakeParser) -> Self {
        LakeClient { client, parser }
    }

    pub fn parser(&self) -> &LakeParser {
        &self.parser
    }

    /// Fetch and parse the lake page at `url`.
    pub async fn lake(&self, url: &Url) -> Result<LakeRecord, ClientError> {
        let text = self.fetch(url).await?;
        let record = self.parser.parse(&text, url);
        tracing::debug!(
            message = "parsed lake page",
            url = %url,
            lake_id = %record.lake_id,
            temperature = ?record.temperature_c,
        );

        Ok(record)
    }

    /// Fetch the raw text of the page at `url`. Any non-2xx response is an error.
    pub async fn fetch(&self, url: &Url) -> Result<String, ClientError> {
        tracing::debug!(message = "making lake page request", url = %url);

        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .send()
            .await
            .map_err(ClientError::Internal)?;

        let status = res.status();
        if !status.is_success() {
            return Err(ClientError::Unexpected(status, url.clone()));
        }

        res.text().await.map_err(ClientError::Internal)
    }
}
