// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! TeamCity REST API Client Library
//!
//! This client covers the slice of the TeamCity REST API needed for cloud
//! agent administration: reading and updating Cloud Profile / Cloud Image
//! project features under the root project, and listing, disabling, and
//! removing build agents.
//!
//! ## Usage
//!
//! ```ignore
//! use teamcity_client::TeamCityClient;
//!
//! let client = TeamCityClient::new("https://teamcity.example.com", "token")?;
//!
//! // Point a Cloud Image at a new machine image and disable agents still
//! // running the old one.
//! client
//!     .update_cloud_image("AWS Agents", "build-agent", "ami-123", false)
//!     .await?;
//!
//! // Garbage-collect disabled agents superseded by a newer image.
//! client.remove_superseded_agents(false).await?;
//! ```
//!
//! All requests authenticate with a bearer token (TeamCity 2019.1+ access
//! tokens). Fatal failures carry a reserved process exit code; see
//! [`Error::exit_code`].

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, ORIGIN};

pub mod agents;
pub mod cloud_profiles;
mod error;
mod types;

pub use error::Error;
pub use types::{
    Agent, AgentList, Build, CloudInstance, Comment, EnabledInfo, ProjectFeature, ProjectFeatures,
    Properties, Property, shorten_image,
};

/// Whole-request timeout. TeamCity reserves a distinct exit code for an
/// image-update timeout, so the client must actually enforce one.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the TeamCity REST API.
///
/// Holds a configured [`reqwest::Client`] plus the server base URL and the
/// access token. Cheap to clone; all operations take `&self`.
#[derive(Debug, Clone)]
pub struct TeamCityClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TeamCityClient {
    /// Create a new client for `server` (e.g. `https://teamcity.example.com`)
    /// using a TeamCity user access token.
    pub fn new(server: &str, token: &str) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("tcagent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: server.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Server base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET request expecting a JSON response body.
    pub(crate) fn get_json(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
    }

    /// Mutating request (PUT/DELETE). TeamCity's CSRF protection wants an
    /// Origin header on these.
    pub(crate) fn mutate(
        &self,
        method: reqwest::Method,
        path: &str,
        content_type: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, content_type)
            .header(ORIGIN, &self.base_url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_stripped_from_server_url() {
        let client = TeamCityClient::new("https://tc.example.com/", "t").unwrap();
        assert_eq!(client.base_url(), "https://tc.example.com");
        assert_eq!(client.url("/app/rest/agents"), "https://tc.example.com/app/rest/agents");
    }
}
