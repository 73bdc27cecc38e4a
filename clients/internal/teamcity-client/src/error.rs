// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Error types for TeamCity REST operations.
//!
//! Every fatal failure class keeps a reserved process exit code so that
//! calling scripts can tell failure modes apart; see [`Error::exit_code`].

use reqwest::StatusCode;
use thiserror::Error;

/// Fatal failures from the TeamCity REST operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The server rejected an agent disable request.
    #[error("server returned non-2xx status code {0} when disabling agent")]
    DisableAgentStatus(StatusCode),

    /// Transport-level failure while disabling an agent.
    #[error("error when disabling agent: {0}")]
    DisableAgentTransport(#[source] reqwest::Error),

    /// The project-features fetch returned a non-2xx status.
    #[error("server returned non-2xx status code {0} when fetching project features")]
    ProjectFeaturesStatus(StatusCode),

    /// A project feature is missing a property the operation depends on.
    /// Missing properties on *agents* are never fatal; this only applies to
    /// Cloud Profile / Cloud Image features.
    #[error("unable to find property '{name}' on feature '{feature}'")]
    MissingFeatureProperty { name: String, feature: String },

    /// No Cloud Profile feature with the requested name.
    #[error("unable to find cloud profile '{0}'")]
    CloudProfileNotFound(String),

    /// No Cloud Image feature matching the profile and agent prefix.
    #[error(
        "unable to find cloud image with profileId '{profile_id}' and \
         {prefix_property} '{agent_prefix}'"
    )]
    CloudImageNotFound {
        profile_id: String,
        prefix_property: &'static str,
        agent_prefix: String,
    },

    /// The image property update returned a non-2xx status.
    #[error("server returned non-2xx status code {0} when updating cloud image")]
    ImageUpdateStatus(StatusCode),

    /// Transport-level failure while updating the cloud image.
    #[error("error when updating cloud image: {0}")]
    ImageUpdateTransport(#[source] reqwest::Error),

    /// The image property update timed out.
    #[error("timeout when updating cloud image")]
    ImageUpdateTimeout,

    /// The server rejected an agent removal request.
    #[error("server returned non-2xx status code {0} when removing agent")]
    RemoveAgentStatus(StatusCode),

    /// Transport-level failure while removing an agent.
    #[error("error when removing agent: {0}")]
    RemoveAgentTransport(#[source] reqwest::Error),

    /// Failures outside the reserved classes: listing agents, decoding a
    /// response body, or building the HTTP client.
    #[error("TeamCity request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Reserved process exit code for this failure class.
    ///
    /// Codes 2-12 are each pinned to one remote-call failure; anything else
    /// maps to the generic failure code 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::DisableAgentStatus(_) => 2,
            Error::DisableAgentTransport(_) => 3,
            Error::ProjectFeaturesStatus(_) => 4,
            Error::MissingFeatureProperty { .. } => 5,
            Error::CloudProfileNotFound(_) => 6,
            Error::CloudImageNotFound { .. } => 7,
            Error::ImageUpdateStatus(_) => 8,
            Error::ImageUpdateTransport(_) => 9,
            Error::ImageUpdateTimeout => 10,
            Error::RemoveAgentStatus(_) => 11,
            Error::RemoveAgentTransport(_) => 12,
            Error::Http(_) => 1,
        }
    }
}
