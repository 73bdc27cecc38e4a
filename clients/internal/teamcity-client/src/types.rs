// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Wire types for the TeamCity REST API.
//!
//! TeamCity models agent and project-feature properties as an ordered list of
//! name/value pairs, not a map, and duplicate names are technically allowed.
//! The list is kept as-is for wire fidelity; reads are last-match-wins and
//! writes mutate the first match, both deliberately.

use serde::Deserialize;

use crate::Error;

/// One name/value entry in a property list.
#[derive(Debug, Clone, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

/// A TeamCity property list (`{"property": [{"name": ..., "value": ...}]}`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Properties {
    #[serde(default)]
    pub property: Vec<Property>,
}

impl Properties {
    /// Value of the named property, or `None` if absent.
    ///
    /// When the list carries duplicate names the last one wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.property
            .iter()
            .filter(|p| p.name == name)
            .next_back()
            .map(|p| p.value.as_str())
    }

    /// Overwrite the first entry with the given name; no-op when absent.
    pub fn set(&mut self, name: &str, value: &str) {
        if let Some(p) = self.property.iter_mut().find(|p| p.name == name) {
            p.value = value.to_string();
        }
    }
}

/// A build agent record.
///
/// Every field is optional: list responses carry only a summary, detail
/// responses carry whatever the `fields` selector asked for, and a failed
/// detail fetch is substituted with an empty record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Agent {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub properties: Option<Properties>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default, rename = "enabledInfo")]
    pub enabled_info: Option<EnabledInfo>,
    #[serde(default)]
    pub build: Option<Build>,
    #[serde(default, rename = "cloudInstance")]
    pub cloud_instance: Option<CloudInstance>,
}

impl Agent {
    /// Value of a reported agent property. Missing properties on agents are
    /// never fatal; a record without a property list simply has no matches.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.as_ref()?.get(name)
    }
}

/// Response body of `GET /app/rest/agents`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentList {
    #[serde(default)]
    pub agent: Vec<Agent>,
}

/// The enablement status comment attached to an agent.
#[derive(Debug, Clone, Deserialize)]
pub struct EnabledInfo {
    #[serde(default)]
    pub comment: Option<Comment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub text: Option<String>,
}

/// The build currently running on an agent, if any.
#[derive(Debug, Clone, Deserialize)]
pub struct Build {
    pub id: i64,
}

/// The cloud instance backing an agent.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudInstance {
    #[serde(default)]
    pub id: Option<String>,
}

/// A project feature (Cloud Profile or Cloud Image) under the root project.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFeature {
    pub id: String,
    #[serde(rename = "type")]
    pub feature_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl ProjectFeature {
    /// Value of a feature property. Unlike agent properties, a missing
    /// feature property is fatal (exit code 5).
    pub fn required_property(&self, name: &str) -> Result<&str, Error> {
        self.properties.get(name).ok_or_else(|| Error::MissingFeatureProperty {
            name: name.to_string(),
            feature: self.id.clone(),
        })
    }
}

/// Response body of `GET /app/rest/projects/id:_Root/projectFeatures`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFeatures {
    #[serde(default, rename = "projectFeature")]
    pub project_feature: Vec<ProjectFeature>,
}

/// Last `/`-separated segment of an image identifier.
///
/// Azure image ids are long resource paths; humans only care about the final
/// segment. Identity for plain ids like `ami-1`.
pub fn shorten_image(image: &str) -> &str {
    image.rsplit('/').next().unwrap_or(image)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    fn properties(pairs: &[(&str, &str)]) -> Properties {
        Properties {
            property: pairs
                .iter()
                .map(|(name, value)| Property {
                    name: (*name).to_string(),
                    value: (*value).to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn get_returns_matching_value() {
        let props = properties(&[
            ("system.ec2.ami-id", "ami-123456"),
            ("system.cloud.profile_id", "cloud-1"),
        ]);
        assert_eq!(props.get("system.ec2.ami-id"), Some("ami-123456"));
        assert_eq!(props.get("system.cloud.profile_id"), Some("cloud-1"));
    }

    #[test]
    fn get_missing_property_is_none() {
        let props = properties(&[("system.ec2.ami-id", "ami-123456")]);
        assert_eq!(props.get("non-existent"), None);
    }

    #[test]
    fn get_duplicate_names_last_wins() {
        let props = properties(&[("imageId", "first"), ("imageId", "second")]);
        assert_eq!(props.get("imageId"), Some("second"));
    }

    #[test]
    fn set_overwrites_first_match_only() {
        let mut props = properties(&[("imageId", "old-image"), ("other", "value"), ("imageId", "dup")]);
        props.set("imageId", "new-image");
        assert_eq!(props.property[0].value, "new-image");
        assert_eq!(props.property[1].value, "value");
        assert_eq!(props.property[2].value, "dup");
    }

    #[test]
    fn set_is_noop_when_absent() {
        let mut props = properties(&[("other", "value")]);
        props.set("imageId", "new-image");
        assert_eq!(props.get("imageId"), None);
        assert_eq!(props.get("other"), Some("value"));
    }

    #[test]
    fn agent_without_properties_has_no_matches() {
        let agent = Agent::default();
        assert_eq!(agent.property("system.ec2.ami-id"), None);
    }

    #[test]
    fn required_property_missing_is_exit_code_5() {
        let feature: ProjectFeature = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "type": "CloudProfile",
            "properties": { "property": [] }
        }))
        .unwrap();
        let err = feature.required_property("non-existent").unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test_case("path/to/my/image", "image")]
    #[test_case("/a/b/c/image-x", "image-x")]
    #[test_case("ami-12345678", "ami-12345678")]
    #[test_case(
        "/subscriptions/abc/resourceGroups/rg/providers/Microsoft.Compute/images/my-image",
        "my-image"
    )]
    fn shorten_image_keeps_last_segment(input: &str, expected: &str) {
        assert_eq!(shorten_image(input), expected);
    }

    #[test]
    fn agent_list_deserializes_wire_shape() {
        let list: AgentList = serde_json::from_value(serde_json::json!({
            "count": 1,
            "agent": [
                { "id": 7, "href": "/app/rest/agents/id:7", "name": "agent-7" }
            ]
        }))
        .unwrap();
        assert_eq!(list.agent.len(), 1);
        assert_eq!(list.agent[0].id, Some(7));
        assert_eq!(list.agent[0].href.as_deref(), Some("/app/rest/agents/id:7"));
    }
}
