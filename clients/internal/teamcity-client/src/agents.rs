// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Build agent operations: listing authorized agents, disabling agents that
//! run a superseded image, and removing disabled agents once no build is
//! active on them.

use std::sync::LazyLock;

use futures_util::future::join_all;
use regex::Regex;
use reqwest::{Method, StatusCode};
use tracing::{debug, info, warn};

use crate::types::{Agent, AgentList, shorten_image};
use crate::{Error, TeamCityClient};

/// Agent property carrying the AWS machine image the agent booted from.
const AMI_PROPERTY: &str = "system.ec2.ami-id";
/// Agent property carrying the id of the Cloud Profile that launched it.
const PROFILE_ID_PROPERTY: &str = "system.cloud.profile_id";
/// Agent property carrying the name of the source image the agent was built
/// from (set by the image bake pipeline; image ids end with this name).
const PROVENANCE_PROPERTY: &str = "system.Octopus.Provenance.Name";

/// Detail view requested when deciding whether an agent can be removed.
const REMOVAL_FIELDS: &str = "id,name,href,build(id),enabled,enabledInfo(comment),cloudInstance";

/// Comment written by [`TeamCityClient::disable_agent`]. The removal pass
/// only touches agents whose disable comment matches this.
#[allow(clippy::expect_used)]
static SUPERSEDED_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Disabling agent as it uses base image .*, which has been superseded by base image .*\.",
    )
    .expect("superseded-comment pattern is valid")
});

/// True when the agent runs the image being replaced.
///
/// Two equivalent pathways, because the image identifier format differs by
/// cloud: either the agent's reported AMI equals `image` directly, or the
/// agent belongs to `cloud_profile_id` and `image` ends with the agent's
/// provenance name.
pub fn matches_old_image(agent: &Agent, image: &str, cloud_profile_id: &str) -> bool {
    if agent.property(AMI_PROPERTY) == Some(image) {
        return true;
    }
    match (agent.property(PROFILE_ID_PROPERTY), agent.property(PROVENANCE_PROPERTY)) {
        (Some(profile_id), Some(provenance)) => {
            profile_id == cloud_profile_id && image.ends_with(provenance)
        }
        _ => false,
    }
}

/// True when the agent is disabled and its disable comment marks it as
/// superseded by a newer image.
pub fn is_superseded(agent: &Agent) -> bool {
    if agent.enabled != Some(false) {
        return false;
    }
    agent
        .enabled_info
        .as_ref()
        .and_then(|info| info.comment.as_ref())
        .and_then(|comment| comment.text.as_deref())
        .is_some_and(|text| SUPERSEDED_COMMENT.is_match(text))
}

impl TeamCityClient {
    /// List all authorized agents.
    pub async fn list_authorized_agents(&self) -> Result<Vec<Agent>, Error> {
        let response = self
            .get_json("/app/rest/agents?locator=authorized:true")
            .send()
            .await?
            .error_for_status()?;
        let list: AgentList = response.json().await?;
        Ok(list.agent)
    }

    /// Fetch one agent's detail record from its `href`.
    ///
    /// A non-200 response is downgraded to an empty record so one broken
    /// agent does not abort a whole batch.
    pub async fn agent_details(&self, href: &str) -> Result<Agent, Error> {
        let response = self.get_json(href).send().await?;
        if response.status() != StatusCode::OK {
            warn!(
                status = %response.status(),
                href,
                "server returned non-200 for agent details; ignoring this agent and moving on"
            );
            return Ok(Agent::default());
        }
        Ok(response.json().await?)
    }

    /// Disable an agent, recording which image superseded the one it runs.
    pub async fn disable_agent(
        &self,
        agent: &Agent,
        old_image: &str,
        new_image: &str,
        dry_run: bool,
    ) -> Result<(), Error> {
        if dry_run {
            info!(agent = agent.id, "would have disabled agent");
            return Ok(());
        }
        let Some(href) = agent.href.as_deref() else {
            warn!(agent = agent.id, "agent record has no href; cannot disable");
            return Ok(());
        };

        let body = format!(
            "<enabledInfo status='false'><comment><text>Disabling agent as it uses base image \
             {}, which has been superseded by base image {}.</text></comment></enabledInfo>",
            shorten_image(old_image),
            shorten_image(new_image),
        );
        let response = self
            .mutate(Method::PUT, &format!("{href}/enabledInfo"), "application/xml")
            .body(body)
            .send()
            .await
            .map_err(Error::DisableAgentTransport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DisableAgentStatus(status));
        }
        debug!(%status, "server accepted disable request");
        info!(agent = agent.id, "successfully disabled agent");
        Ok(())
    }

    /// Disable every authorized agent still running `old_image` under the
    /// given cloud profile.
    pub async fn disable_old_agents(
        &self,
        old_image: &str,
        new_image: &str,
        dry_run: bool,
        cloud_profile_id: &str,
    ) -> Result<(), Error> {
        info!(
            image = old_image,
            cloud_profile_id, "attempting to disable agents that use the superseded image"
        );
        let agents = self.list_authorized_agents().await?;

        // Fan out all detail fetches at once; completion order is irrelevant.
        let details = join_all(
            agents
                .iter()
                .filter_map(|agent| agent.href.as_deref())
                .map(|href| self.agent_details(href)),
        )
        .await;

        let mut matched = 0usize;
        for detail in details {
            let detail = detail?;
            if !matches_old_image(&detail, old_image, cloud_profile_id) {
                continue;
            }
            if detail.property(AMI_PROPERTY) == Some(old_image) {
                info!(agent = detail.id, image = old_image, "disabling agent; it uses the old image");
            } else {
                info!(
                    agent = detail.id,
                    cloud_profile_id,
                    provenance = detail.property(PROVENANCE_PROPERTY),
                    "disabling agent; it belongs to the cloud profile and matches by provenance name"
                );
            }
            self.disable_agent(&detail, old_image, new_image, dry_run).await?;
            matched += 1;
        }

        if matched == 0 {
            info!(image = old_image, "no agents with that image found; nothing to disable");
        }
        Ok(())
    }

    /// Remove an agent by deleting its backing cloud instance.
    pub async fn remove_agent(&self, agent: &Agent, dry_run: bool) -> Result<(), Error> {
        if dry_run {
            info!(agent = agent.name.as_deref(), "would have removed agent");
            return Ok(());
        }
        let Some(instance_id) = agent.cloud_instance.as_ref().and_then(|i| i.id.as_deref()) else {
            warn!(agent = agent.name.as_deref(), "agent has no cloud instance id; cannot remove");
            return Ok(());
        };

        let path = format!("/app/rest/ui/cloud/instances/id:({instance_id})");
        let response = self
            .mutate(Method::DELETE, &path, "application/xml")
            .send()
            .await
            .map_err(Error::RemoveAgentTransport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoveAgentStatus(status));
        }
        debug!(%status, "server accepted removal request");
        info!(agent = agent.name.as_deref(), "successfully removed agent");
        Ok(())
    }

    /// Remove every disabled agent whose disable comment marks it as
    /// superseded, skipping agents that still have a build running.
    pub async fn remove_superseded_agents(&self, dry_run: bool) -> Result<(), Error> {
        info!("attempting to remove old disabled agents that have been replaced by newer images");
        let agents = self.list_authorized_agents().await?;

        let details = join_all(
            agents
                .iter()
                .filter_map(|agent| agent.href.as_deref())
                .map(|href| {
                    let href = format!("{href}?fields={REMOVAL_FIELDS}");
                    async move { self.agent_details(&href).await }
                }),
        )
        .await;

        let mut removed = 0usize;
        for detail in details {
            let detail = detail?;
            if !is_superseded(&detail) {
                continue;
            }
            info!(
                agent = detail.name.as_deref(),
                comment = detail
                    .enabled_info
                    .as_ref()
                    .and_then(|info| info.comment.as_ref())
                    .and_then(|comment| comment.text.as_deref()),
                "agent uses an old image and should be cleaned up"
            );
            if let Some(build) = &detail.build {
                info!(
                    agent = detail.name.as_deref(),
                    build = build.id,
                    "agent is still running a build; skipping cleanup this time round"
                );
                continue;
            }
            self.remove_agent(&detail, dry_run).await?;
            removed += 1;
        }

        if removed == 0 {
            info!("no disabled, superseded agents found; nothing to clean up");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    fn agent_with(pairs: &[(&str, &str)]) -> Agent {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "href": "/app/rest/agents/id:1",
            "properties": {
                "property": pairs
                    .iter()
                    .map(|(name, value)| serde_json::json!({ "name": name, "value": value }))
                    .collect::<Vec<_>>()
            }
        }))
        .unwrap()
    }

    #[test]
    fn ami_match_wins_regardless_of_profile() {
        let agent = agent_with(&[
            (AMI_PROPERTY, "ami-old"),
            (PROFILE_ID_PROPERTY, "some-other-profile"),
        ]);
        assert!(matches_old_image(&agent, "ami-old", "cloud-1"));
    }

    #[test]
    fn profile_and_provenance_suffix_match() {
        let agent = agent_with(&[
            (AMI_PROPERTY, "ami-different"),
            (PROFILE_ID_PROPERTY, "cloud-1"),
            (PROVENANCE_PROPERTY, "my-image"),
        ]);
        assert!(matches_old_image(
            &agent,
            "/subscriptions/abc/resourceGroups/rg/providers/Microsoft.Compute/images/my-image",
            "cloud-1"
        ));
    }

    #[test_case(&[(AMI_PROPERTY, "ami-different")]; "different ami, no profile")]
    #[test_case(&[(PROFILE_ID_PROPERTY, "cloud-2"), (PROVENANCE_PROPERTY, "my-image")]; "wrong profile")]
    #[test_case(&[(PROFILE_ID_PROPERTY, "cloud-1"), (PROVENANCE_PROPERTY, "other-image")]; "provenance not a suffix")]
    #[test_case(&[(PROFILE_ID_PROPERTY, "cloud-1")]; "no provenance property")]
    fn non_matching_combinations(pairs: &[(&str, &str)]) {
        let agent = agent_with(pairs);
        assert!(!matches_old_image(&agent, "images/my-image", "cloud-1"));
    }

    #[test]
    fn agent_without_properties_never_matches() {
        assert!(!matches_old_image(&Agent::default(), "ami-old", "cloud-1"));
    }

    fn agent_record(value: serde_json::Value) -> Agent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn superseded_requires_disabled_and_comment() {
        let agent = agent_record(serde_json::json!({
            "id": 2,
            "enabled": false,
            "enabledInfo": { "comment": { "text":
                "Disabling agent as it uses base image ami-1, which has been superseded by base image ami-2."
            } }
        }));
        assert!(is_superseded(&agent));
    }

    #[test]
    fn enabled_agent_is_not_superseded() {
        let agent = agent_record(serde_json::json!({
            "id": 2,
            "enabled": true,
            "enabledInfo": { "comment": { "text":
                "Disabling agent as it uses base image ami-1, which has been superseded by base image ami-2."
            } }
        }));
        assert!(!is_superseded(&agent));
    }

    #[test]
    fn manually_disabled_agent_is_not_superseded() {
        let agent = agent_record(serde_json::json!({
            "id": 2,
            "enabled": false,
            "enabledInfo": { "comment": { "text": "Disabled for maintenance" } }
        }));
        assert!(!is_superseded(&agent));
    }

    #[test]
    fn disabled_agent_without_comment_is_not_superseded() {
        let agent = agent_record(serde_json::json!({ "id": 2, "enabled": false }));
        assert!(!is_superseded(&agent));
    }

    #[test]
    fn disable_comment_matches_removal_pattern() {
        let comment = format!(
            "Disabling agent as it uses base image {}, which has been superseded by base image {}.",
            shorten_image("/a/b/old-image"),
            shorten_image("ami-new"),
        );
        assert!(SUPERSEDED_COMMENT.is_match(&comment));
        assert_eq!(
            comment,
            "Disabling agent as it uses base image old-image, \
             which has been superseded by base image ami-new."
        );
    }
}
