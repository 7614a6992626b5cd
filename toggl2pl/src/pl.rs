//! # Project Laboratory client
//!
//! Network implementation of [`WorklogSink`]. Every PL call is a `POST` to
//! `{base_url}/{endpoint}` with a JSON body that carries the `app-key` and
//! `user-key` next to the endpoint's own parameters. PL spells parameter
//! names with hyphens; [`normalize`] converts them.
//!
//! PL projects are the top level of the catalog and their tasks the second
//! level, so a post resolves to (project id, task id).

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use toggl2pl_core::contract::WorklogSink;
use toggl2pl_core::error::TransportError;
use toggl2pl_core::model::{Catalog, EntityId, PostConfirmation, PostRequest, TaxonomyEntity};
use tracing::{debug, error, info, warn};

use crate::load_config::PlSection;
use crate::toggl::wire_id;

#[derive(Debug, Clone, Deserialize)]
pub struct PlProject {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlTask {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub assigned: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ProjectList {
    #[serde(default)]
    projects: Vec<PlProject>,
}

#[derive(Debug, Deserialize)]
struct TaskPage {
    #[serde(default)]
    data: Vec<PlTask>,
}

#[derive(Debug, Deserialize)]
struct TaskList {
    tasks: TaskPage,
}

/// Rewrites parameter names from `snake_case` to PL's `hyphen-case`.
pub fn normalize(params: Map<String, Value>) -> Map<String, Value> {
    params
        .into_iter()
        .map(|(key, value)| (key.replace('_', "-"), value))
        .collect()
}

/// Builds the posting catalog, leaving out `excluded` projects.
pub fn catalog_from(
    projects: Vec<(PlProject, Vec<PlTask>)>,
    excluded: &BTreeSet<String>,
) -> Catalog {
    let mut catalog = Catalog::new();
    for (project, tasks) in projects {
        if excluded.contains(&project.name) {
            continue;
        }
        let project_id = EntityId::from(project.id);
        catalog.insert_client(TaxonomyEntity::new(project.id, &project.name, None));
        for task in tasks {
            catalog.insert_project(&project_id, TaxonomyEntity::new(task.id, &task.title, None));
        }
    }
    catalog
}

/// Request parameters of `posts/add`.
pub fn post_params(request: &PostRequest) -> Result<Map<String, Value>, TransportError> {
    let mut params = Map::new();
    params.insert("project_id".into(), json!(wire_id(&request.project_id)?));
    params.insert("task_id".into(), json!(wire_id(&request.task_id)?));
    params.insert("description".into(), json!(request.description));
    params.insert("date".into(), json!(request.date.format("%Y-%m-%d").to_string()));
    params.insert("minutes".into(), json!(request.minutes));
    Ok(params)
}

pub struct PlClient {
    http: Client,
    base_url: String,
    app_key: String,
    user_key: String,
    excluded_projects: BTreeSet<String>,
}

impl PlClient {
    pub fn new(config: &PlSection, timeout: Duration) -> Result<Self, TransportError> {
        if !config.verify {
            warn!(base_url = %config.base_url, "TLS verification disabled for PL");
        }
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!config.verify)
            .build()?;
        info!(base_url = %config.base_url, "Initialized PlClient");
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_key: config.app_key.clone(),
            user_key: config.user_key.clone(),
            excluded_projects: config.excluded_projects.iter().cloned().collect(),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Map<String, Value>,
    ) -> Result<T, TransportError> {
        let mut body = normalize(params);
        body.insert("app-key".into(), json!(self.app_key));
        body.insert("user-key".into(), json!(self.user_key));

        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, "PL request");
        let response = self.http.post(&url).json(&body).send().await.map_err(|e| {
            error!(error = ?e, %url, "PL request failed to send");
            e
        })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, %url, body = %text, "PL request failed");
            return Err(format!("PL returned {status} for {endpoint}: {text}").into());
        }
        response.json::<T>().await.map_err(|e| {
            error!(error = ?e, %url, "Malformed PL response");
            e.into()
        })
    }

    pub async fn list_projects(&self) -> Result<Vec<PlProject>, TransportError> {
        let mut params = Map::new();
        params.insert("include_inactive".into(), json!(false));
        let list: ProjectList = self.post("projects/list", params).await?;
        Ok(list.projects)
    }

    pub async fn list_tasks(&self, project_id: i64) -> Result<Vec<PlTask>, TransportError> {
        let mut params = Map::new();
        params.insert("project_id".into(), json!(project_id));
        params.insert("per_page".into(), json!(-1));
        let list: TaskList = self.post("tasks/list", params).await?;
        Ok(list.tasks.data)
    }

    /// Every visible, non-excluded project with its tasks.
    pub async fn projects_with_tasks(&self) -> Result<Vec<(PlProject, Vec<PlTask>)>, TransportError> {
        let projects: Vec<PlProject> = self
            .list_projects()
            .await?
            .into_iter()
            .filter(|project| !self.excluded_projects.contains(&project.name))
            .collect();
        let tasks = try_join_all(projects.iter().map(|project| self.list_tasks(project.id))).await?;
        Ok(projects.into_iter().zip(tasks).collect())
    }
}

#[async_trait]
impl WorklogSink for PlClient {
    async fn fetch_catalog(&self) -> Result<Catalog, TransportError> {
        let projects = self.projects_with_tasks().await?;
        let catalog = catalog_from(projects, &self.excluded_projects);
        info!(
            projects = catalog.client_count(),
            tasks = catalog.project_count(),
            "Fetched PL catalog"
        );
        Ok(catalog)
    }

    async fn add_post(&self, request: &PostRequest) -> Result<PostConfirmation, TransportError> {
        let params = post_params(request)?;
        let raw: Value = self.post("posts/add", params).await?;
        info!(
            project_id = %request.project_id,
            task_id = %request.task_id,
            minutes = request.minutes,
            "Added PL post"
        );
        Ok(PostConfirmation { raw })
    }
}
