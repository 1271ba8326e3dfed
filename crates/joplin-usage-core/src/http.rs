use crate::api::{DataApi, NewDocument, Page, DEFAULT_PAGE_SIZE};
use crate::collector::collect_pages;
use crate::error::{DataApiError, PreconditionError};
use crate::logging::redact_token;
use crate::model::{Note, Notebook, Resource};
use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const PING_RESPONSE: &str = "JoplinClipperServer";
const NOTEBOOK_FIELDS: &str = "id,title";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoplinHttpConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_ms: u64,
    /// Notebook id or exact title standing in for the host's selected notebook.
    pub target_notebook: Option<String>,
}

impl Default for JoplinHttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:41184".to_string(),
            token: None,
            timeout_ms: 30_000,
            target_notebook: None,
        }
    }
}

/// Blocking client for the Joplin Data API.
#[derive(Clone, Debug)]
pub struct JoplinHttpApi {
    config: JoplinHttpConfig,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct CreatedNote {
    id: String,
}

impl JoplinHttpApi {
    pub fn new(config: JoplinHttpConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms.max(1_000));
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { config, agent }
    }

    pub fn config(&self) -> &JoplinHttpConfig {
        &self.config
    }

    /// Checks that the base URL answers like a Joplin clipper server.
    pub fn ping(&self) -> Result<()> {
        let request = self.request("GET", "ping");
        let body = call(request)?
            .into_string()
            .map_err(|err| DataApiError::Decode(err.to_string()))?;
        if body.trim() != PING_RESPONSE {
            return Err(anyhow!(
                "{} does not look like a Joplin data api (ping answered {:?})",
                self.config.base_url,
                body.trim()
            ));
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = self.url(path);
        tracing::debug!(method, url = %url, "data api request");
        let mut request = self.agent.request(method, &url);
        if let Some(token) = &self.config.token {
            request = request.query("token", token);
        }
        request
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, DataApiError> {
        let mut request = self.request("GET", path);
        for (key, value) in query {
            request = request.query(key, value);
        }
        call(request)?
            .into_json::<T>()
            .map_err(|err| DataApiError::Decode(format!("{path}: {err}")))
    }

    fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        page: usize,
        page_size: usize,
        fields: &str,
    ) -> Result<Page<T>> {
        let query = [
            ("page", page.to_string()),
            ("limit", page_size.to_string()),
            ("fields", fields.to_string()),
        ];
        Ok(self.get_json(path, &query)?)
    }

    fn get_folder(&self, notebook_id: &str) -> Result<Notebook, DataApiError> {
        self.get_json(
            &format!("folders/{notebook_id}"),
            &[("fields", NOTEBOOK_FIELDS.to_string())],
        )
    }

    fn find_folder_by_title(&self, title: &str) -> Result<Option<Notebook>> {
        let folders: Vec<Notebook> = collect_pages(DEFAULT_PAGE_SIZE, |page, size| {
            self.get_page("folders", page, size, NOTEBOOK_FIELDS)
        })?;
        Ok(folders.into_iter().find(|folder| folder.title == title))
    }
}

impl DataApi for JoplinHttpApi {
    fn list_resources(
        &self,
        page: usize,
        page_size: usize,
        fields: &[&str],
    ) -> Result<Page<Resource>> {
        self.get_page("resources", page, page_size, &fields.join(","))
    }

    fn list_notes_referencing(&self, resource_id: &str, fields: &[&str]) -> Result<Vec<Note>> {
        let path = format!("resources/{resource_id}/notes");
        let fields = fields.join(",");
        collect_pages(DEFAULT_PAGE_SIZE, |page, size| {
            self.get_page(&path, page, size, &fields)
        })
    }

    fn get_notebook(&self, notebook_id: &str) -> Result<Notebook> {
        Ok(self.get_folder(notebook_id)?)
    }

    fn create_document(&self, document: &NewDocument) -> Result<String> {
        let payload = json!({
            "title": document.title,
            "parent_id": document.notebook_id,
            "body": document.body,
        });
        let request = self.request("POST", "notes");
        let response = request.send_json(payload).map_err(map_ureq_error)?;
        let created: CreatedNote = response
            .into_json()
            .map_err(|err| DataApiError::Decode(format!("notes: {err}")))?;
        Ok(created.id)
    }

    fn delete_document(&self, document_id: &str) -> Result<()> {
        let request = self
            .request("DELETE", &format!("notes/{document_id}"))
            .query("permanent", "1");
        call(request)?;
        Ok(())
    }

    fn current_notebook(&self) -> Result<Option<Notebook>> {
        let Some(target) = self.config.target_notebook.as_deref() else {
            return Ok(None);
        };

        match self.get_folder(target) {
            Ok(notebook) => return Ok(Some(notebook)),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        match self.find_folder_by_title(target)? {
            Some(notebook) => Ok(Some(notebook)),
            None => Err(PreconditionError::NotebookNotFound(target.to_string()).into()),
        }
    }
}

fn call(request: ureq::Request) -> Result<ureq::Response, DataApiError> {
    request.call().map_err(map_ureq_error)
}

fn map_ureq_error(err: ureq::Error) -> DataApiError {
    match err {
        ureq::Error::Status(status, response) => {
            let url = redact_token(response.get_url());
            let body = response.into_string().unwrap_or_default();
            DataApiError::Status { status, url, body }
        }
        ureq::Error::Transport(transport) => {
            DataApiError::Transport(describe_transport(&transport))
        }
    }
}

/// Display for a transport failure, with the request URL's token redacted.
fn describe_transport(transport: &ureq::Transport) -> String {
    let mut detail = transport.kind().to_string();
    if let Some(message) = transport.message() {
        detail.push_str(": ");
        detail.push_str(message);
    }
    if let Some(source) = std::error::Error::source(transport) {
        detail.push_str(": ");
        detail.push_str(&source.to_string());
    }
    match transport.url() {
        Some(url) => format!("{}: {detail}", redact_token(url.as_str())),
        None => detail,
    }
}
