//! Payloads returned by the server's JSON API. Only the fields the tracker reads are modelled.

use serde::{Deserialize, Serialize};

/// `GET <definition>/api/json?tree=downstreamProjects[name,url,color],lastBuild[number]`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBody {
    #[serde(default)]
    pub downstream_projects: Vec<Project>,
    #[serde(default)]
    pub last_build: Option<BuildRef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Project {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl Project {
    pub fn is_disabled(&self) -> bool {
        self.color.as_deref() == Some("disabled")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildRef {
    pub number: u64,
}

/// `GET <definition>/<n>/api/json?tree=actions[causes[...]],timestamp`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BuildCauses {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub timestamp: i64,
}

impl BuildCauses {
    /// Causes from the first action that carries any
    pub fn causes(&self) -> Vec<Cause> {
        self.actions
            .iter()
            .find_map(|a| a.causes.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Action {
    #[serde(default)]
    pub causes: Option<Vec<Cause>>,
}

/// One upstream execution claiming to have triggered a build
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cause {
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub upstream_project: Option<String>,
    #[serde(default)]
    pub upstream_url: Option<String>,
    #[serde(default)]
    pub upstream_build: Option<u64>,
}

/// `GET <execution>/api/json?tree=result,timestamp`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultBody {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Queue item returned for a submission
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QueueItem {
    #[serde(default)]
    pub cancelled: Option<bool>,
    /// Alternate spelling some server versions use
    #[serde(default)]
    pub canceled: Option<bool>,
    #[serde(default)]
    pub task: Option<QueueTask>,
    #[serde(default)]
    pub executable: Option<Executable>,
}

impl QueueItem {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.unwrap_or(false) || self.canceled.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueTask {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Executable {
    pub number: u64,
    pub url: String,
}
