//! # Toggl client
//!
//! Network implementation of [`EntrySource`] and [`TaxonomyStore`] against
//! the Toggl v8 API and the v2 detailed reports API.
//!
//! - Authentication is HTTP basic with the API token as user and the
//!   literal `api_token` as password.
//! - The workspace is resolved by name once, in [`TogglClient::connect`],
//!   and every later call is scoped to it.
//! - Toggl clients are the top level of the catalog, Toggl projects the
//!   second level.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use toggl2pl_core::contract::{EntrySource, TaxonomyStore};
use toggl2pl_core::error::{CreateError, TransportError};
use toggl2pl_core::model::{Catalog, EntityId, RawEntry, TaxonomyEntity};
use tracing::{debug, error, info, warn};

use crate::load_config::TogglSection;

const USER_AGENT: &str = "toggl2pl";

#[derive(Debug, Clone, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct DetailsPage {
    total_count: u64,
    per_page: u64,
    #[serde(default)]
    data: Vec<DetailEntry>,
}

/// One row of the detailed report. `dur` is in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailEntry {
    pub client: Option<String>,
    pub project: Option<String>,
    pub description: Option<String>,
    pub dur: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    /// Owning client; projects without one are not part of the catalog.
    pub cid: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct NewClient<'a> {
    name: &'a str,
    wid: i64,
}

#[derive(Debug, Serialize)]
struct NewProject<'a> {
    name: &'a str,
    wid: i64,
    cid: i64,
}

/// Parses an id handed out by one of the trackers back into its wire form.
pub(crate) fn wire_id(id: &EntityId) -> Result<i64, TransportError> {
    id.as_str()
        .parse::<i64>()
        .map_err(|e| format!("Invalid numeric id {id:?}: {e}").into())
}

/// Picks the workspace called `name`; exactly one must match.
pub fn select_workspace(workspaces: &[Workspace], name: &str) -> Result<Workspace, TransportError> {
    let matches: Vec<&Workspace> = workspaces.iter().filter(|w| w.name == name).collect();
    match matches.as_slice() {
        [workspace] => Ok((*workspace).clone()),
        [] => Err(format!("No Toggl workspace named {name:?}").into()),
        many => Err(format!("{} Toggl workspaces are named {name:?}", many.len()).into()),
    }
}

/// Keeps a field as sent unless it is blank.
fn present(field: &Option<String>) -> Option<String> {
    field
        .as_ref()
        .filter(|value| !value.trim().is_empty())
        .cloned()
}

/// Converts report rows into raw entries. Blank names count as missing.
pub fn entries_from_details(rows: &[DetailEntry]) -> Vec<RawEntry> {
    rows.iter()
        .map(|row| RawEntry {
            client: present(&row.client),
            project: present(&row.project),
            description: present(&row.description),
            duration_seconds: row.dur / 1000,
        })
        .collect()
}

/// Builds a catalog from the workspace's clients and projects.
pub fn catalog_from(clients: Vec<ClientRecord>, projects: Vec<ProjectRecord>) -> Catalog {
    let mut catalog = Catalog::new();
    for client in &clients {
        catalog.insert_client(TaxonomyEntity::new(client.id, &client.name, None));
    }
    for project in projects {
        match project.cid {
            Some(cid) if clients.iter().any(|c| c.id == cid) => {
                catalog.insert_project(
                    &EntityId::from(cid),
                    TaxonomyEntity::new(project.id, &project.name, None),
                );
            }
            _ => debug!(project = %project.name, "Skipping project without a known client"),
        }
    }
    catalog
}

fn is_duplicate(status: StatusCode, body: &str) -> bool {
    status == StatusCode::BAD_REQUEST && body.to_ascii_lowercase().contains("already")
}

pub struct TogglClient {
    http: Client,
    base_url: String,
    api_token: String,
    workspace: Workspace,
}

impl TogglClient {
    /// Builds the HTTP client and resolves the configured workspace.
    pub async fn connect(config: &TogglSection, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(timeout).build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let url = format!("{base_url}/api/v8/workspaces");
        let response = http
            .get(&url)
            .basic_auth(&config.api_token, Some("api_token"))
            .send()
            .await?;
        let workspaces: Vec<Workspace> = Self::json(response, &url).await?;
        let workspace = select_workspace(&workspaces, &config.workspace).map_err(|e| {
            error!(error = %e, workspace = %config.workspace, "Failed to resolve Toggl workspace");
            e
        })?;
        info!(workspace = %workspace.name, id = workspace.id, "Connected to Toggl");

        Ok(Self {
            http,
            base_url,
            api_token: config.api_token.clone(),
            workspace,
        })
    }

    pub fn workspace_id(&self) -> EntityId {
        EntityId::from(self.workspace.id)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.api_token, Some("api_token"))
    }

    async fn json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, url, body = %body, "Toggl request failed");
            return Err(format!("Toggl returned {status} for {url}: {body}").into());
        }
        response.json::<T>().await.map_err(|e| {
            error!(error = ?e, url, "Malformed Toggl response");
            e.into()
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, TransportError> {
        let response = self.authed(self.http.get(url)).send().await?;
        Self::json(response, url).await
    }

    /// `null` is what Toggl answers for a workspace without clients or projects.
    async fn get_list<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, TransportError> {
        let list: Option<Vec<T>> = self.get(url).await?;
        Ok(list.unwrap_or_default())
    }

    async fn create<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        name: &str,
    ) -> Result<TaxonomyEntity, CreateError> {
        let response = self
            .authed(self.http.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| CreateError::Other(e.into()))?;
        let status = response.status();
        if status.is_success() {
            let created: DataEnvelope<ProjectRecord> = response
                .json()
                .await
                .map_err(|e| CreateError::Other(e.into()))?;
            let parent = created.data.cid.map(EntityId::from);
            return Ok(TaxonomyEntity::new(created.data.id, &created.data.name, parent));
        }
        let body = response.text().await.unwrap_or_default();
        if is_duplicate(status, &body) {
            warn!(name, "Toggl reports entity already exists");
            return Err(CreateError::AlreadyExists {
                name: name.to_string(),
                existing: None,
            });
        }
        error!(%status, url, body = %body, "Toggl create failed");
        Err(CreateError::Other(
            format!("Toggl returned {status} for {url}: {body}").into(),
        ))
    }
}

#[async_trait]
impl EntrySource for TogglClient {
    async fn fetch_entries(
        &self,
        workspace_id: &EntityId,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<RawEntry>, TransportError> {
        info!(workspace = %workspace_id, %since, %until, "Fetching Toggl detailed report");
        let mut rows = Vec::new();
        let mut page: u64 = 1;
        loop {
            let url = format!(
                "{}/reports/api/v2/details?workspace_id={}&since={}&until={}&user_agent={}&page={}",
                self.base_url, workspace_id, since, until, USER_AGENT, page
            );
            let details: DetailsPage = self.get(&url).await?;
            debug!(page, total = details.total_count, rows = details.data.len(), "Fetched report page");
            let fetched = details.data.len();
            rows.extend(details.data);
            if fetched == 0 || details.per_page * page >= details.total_count {
                break;
            }
            page += 1;
        }
        info!(entries = rows.len(), "Fetched Toggl entries");
        Ok(entries_from_details(&rows))
    }
}

#[async_trait]
impl TaxonomyStore for TogglClient {
    async fn fetch_catalog(&self) -> Result<Catalog, TransportError> {
        let wid = self.workspace.id;
        let clients: Vec<ClientRecord> = self
            .get_list(&format!("{}/api/v8/workspaces/{wid}/clients", self.base_url))
            .await?;
        let projects: Vec<ProjectRecord> = self
            .get_list(&format!("{}/api/v8/workspaces/{wid}/projects", self.base_url))
            .await?;
        info!(clients = clients.len(), projects = projects.len(), "Fetched Toggl catalog");
        Ok(catalog_from(clients, projects))
    }

    async fn create_client(&self, name: &str) -> Result<TaxonomyEntity, CreateError> {
        let url = format!("{}/api/v8/clients", self.base_url);
        let body = serde_json::json!({
            "client": NewClient { name, wid: self.workspace.id }
        });
        let mut entity = self.create(&url, &body, name).await?;
        entity.parent_id = None;
        Ok(entity)
    }

    async fn create_project(
        &self,
        client_id: &EntityId,
        name: &str,
    ) -> Result<TaxonomyEntity, CreateError> {
        let cid = wire_id(client_id).map_err(CreateError::Other)?;
        let url = format!("{}/api/v8/projects", self.base_url);
        let body = serde_json::json!({
            "project": NewProject { name, wid: self.workspace.id, cid }
        });
        let mut entity = self.create(&url, &body, name).await?;
        entity.parent_id = Some(client_id.clone());
        Ok(entity)
    }
}
