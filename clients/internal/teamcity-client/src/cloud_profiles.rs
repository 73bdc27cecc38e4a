// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Cloud profile operations: locating Cloud Profile / Cloud Image project
//! features under the root project and pushing image updates.

use reqwest::Method;
use tracing::{debug, info};

use crate::types::{ProjectFeature, ProjectFeatures};
use crate::{Error, TeamCityClient};

const CLOUD_PROFILE_TYPE: &str = "CloudProfile";
const CLOUD_IMAGE_TYPE: &str = "CloudImage";

/// Property a Cloud Image is keyed by, per cloud. The AWS plugin keys images
/// by `image-name-prefix`; the Azure plugins use `source-id`.
fn agent_prefix_property(cloud_code: &str) -> &'static str {
    if cloud_code == "amazon" { "image-name-prefix" } else { "source-id" }
}

/// Property holding the machine image reference, per cloud.
fn image_property(cloud_code: &str) -> &'static str {
    if cloud_code == "amazon" { "amazon-id" } else { "imageId" }
}

/// Find the Cloud Profile feature with the given name (exact match).
pub fn find_cloud_profile<'a>(
    features: &'a ProjectFeatures,
    name: &str,
) -> Result<&'a ProjectFeature, Error> {
    let mut found = None;
    for feature in features
        .project_feature
        .iter()
        .filter(|f| f.feature_type == CLOUD_PROFILE_TYPE)
    {
        if feature.required_property("name")? == name {
            found = Some(feature);
        }
    }
    found.ok_or_else(|| Error::CloudProfileNotFound(name.to_string()))
}

/// Find the Cloud Image feature belonging to `profile` whose cloud-specific
/// prefix property equals `agent_prefix`.
pub fn find_cloud_image<'a>(
    profile: &ProjectFeature,
    agent_prefix: &str,
    features: &'a ProjectFeatures,
) -> Result<&'a ProjectFeature, Error> {
    let prefix_property = agent_prefix_property(profile.required_property("cloud-code")?);
    let mut found = None;
    for feature in features
        .project_feature
        .iter()
        .filter(|f| f.feature_type == CLOUD_IMAGE_TYPE)
    {
        if feature.required_property("profileId")? != profile.id {
            continue;
        }
        if feature.required_property(prefix_property)? == agent_prefix {
            found = Some(feature);
        }
    }
    found.ok_or_else(|| Error::CloudImageNotFound {
        profile_id: profile.id.clone(),
        prefix_property,
        agent_prefix: agent_prefix.to_string(),
    })
}

/// Adjust the new image identifier for quirks of the target cloud.
///
/// Identity for everything except `cloud-code == "arm"`. The Azure plugin
/// capitalises the resource group segment when it writes image ids back, so
/// the identifier is pre-uppercased to match what the server will hold.
/// See https://github.com/JetBrains/teamcity-azure-agent/issues/129.
pub fn tweak_image_name(
    profile: &ProjectFeature,
    image_feature: &ProjectFeature,
    new_image: &str,
) -> Result<String, Error> {
    if profile.required_property("cloud-code")? != "arm" {
        return Ok(new_image.to_string());
    }
    let group_id = image_feature.required_property("groupId")?;
    Ok(replace_ignore_ascii_case(new_image, group_id, &group_id.to_uppercase()))
}

/// Replace every occurrence of `needle` in `haystack`, ignoring ASCII case.
fn replace_ignore_ascii_case(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let lower_haystack = haystack.to_ascii_lowercase();
    let lower_needle = needle.to_ascii_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;
    while let Some(pos) = lower_haystack[last..].find(&lower_needle) {
        let start = last + pos;
        out.push_str(&haystack[last..start]);
        out.push_str(replacement);
        last = start + needle.len();
    }
    out.push_str(&haystack[last..]);
    out
}

impl TeamCityClient {
    /// Fetch all project features of the root project.
    pub async fn project_features(&self) -> Result<ProjectFeatures, Error> {
        let response = self
            .get_json("/app/rest/projects/id:_Root/projectFeatures")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ProjectFeaturesStatus(status));
        }
        debug!(%status, "fetched project features");
        Ok(response.json().await?)
    }

    /// PUT the new image reference to the Cloud Image's property.
    async fn push_image_update(
        &self,
        profile: &ProjectFeature,
        image_feature: &ProjectFeature,
        current_image: &str,
        new_image: &str,
        profile_name: &str,
        agent_prefix: &str,
        dry_run: bool,
    ) -> Result<(), Error> {
        if dry_run {
            info!(
                profile = profile_name,
                image = agent_prefix,
                current_image,
                new_image,
                "would update cloud image"
            );
            return Ok(());
        }
        info!(
            profile = profile_name,
            image = agent_prefix,
            current_image,
            new_image,
            "updating cloud image"
        );

        let cloud_code = profile.required_property("cloud-code")?;
        let path = format!(
            "/app/rest/projects/id:_Root/projectFeatures/type:CloudImage,\
             property(name:{},value:{})/properties/{}",
            agent_prefix_property(cloud_code),
            agent_prefix,
            image_property(cloud_code),
        );
        let response = self
            .mutate(Method::PUT, &path, "text/plain")
            .body(new_image.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::ImageUpdateTimeout
                } else {
                    Error::ImageUpdateTransport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ImageUpdateStatus(status));
        }
        debug!(%status, "server accepted image update");
        info!(cloud_image = %image_feature.id, "successfully updated cloud image");
        Ok(())
    }

    /// Update a Cloud Profile's image reference, then disable every agent
    /// still running the replaced image.
    ///
    /// When the (adjusted) new image equals the current one, nothing changed:
    /// neither the update nor the agent-disable pass runs.
    pub async fn update_cloud_image(
        &self,
        profile_name: &str,
        agent_prefix: &str,
        image: &str,
        dry_run: bool,
    ) -> Result<(), Error> {
        let features = self.project_features().await?;
        let profile = find_cloud_profile(&features, profile_name)?;
        let image_feature = find_cloud_image(profile, agent_prefix, &features)?;

        let image_prop = image_property(profile.required_property("cloud-code")?);
        let current_image = image_feature.required_property(image_prop)?.to_string();
        let new_image = tweak_image_name(profile, image_feature, image)?;

        if current_image == new_image {
            info!(
                profile = profile_name,
                image = agent_prefix,
                current = %new_image,
                "cloud image is already up to date"
            );
            return Ok(());
        }

        let mut updated_feature = image_feature.clone();
        updated_feature.properties.set(image_prop, &new_image);

        let cloud_profile_id = profile.id.clone();
        self.push_image_update(
            profile,
            &updated_feature,
            &current_image,
            &new_image,
            profile_name,
            agent_prefix,
            dry_run,
        )
        .await?;

        self.disable_old_agents(&current_image, &new_image, dry_run, &cloud_profile_id)
            .await
    }
}
