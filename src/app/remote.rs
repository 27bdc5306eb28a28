use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use async_trait::async_trait;

use super::backend::{AppBackend, ReembedReport};
use super::errors::AppError;
use crate::{
    config::Config,
    eid::Eid,
    language::Language,
    notes::{ListQuery, Note, NoteDraft},
    recall::RecallResponse,
};

/// Backend that proxies every operation to a running daemon.
pub struct AppRemote {
    remote_addr: String,
    basic_auth: Option<(String, Option<String>)>,
    client: reqwest::Client,
}

impl AppRemote {
    pub fn new(addr: &str, basic_auth: Option<(String, Option<String>)>) -> AppRemote {
        let remote_addr = addr.strip_suffix('/').unwrap_or(addr).to_string();

        AppRemote {
            remote_addr,
            basic_auth,
            client: reqwest::Client::new(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        log::debug!("GET {}{}", self.remote_addr, path);
        let url = format!("{}{}", self.remote_addr, path);

        match self.basic_auth.clone() {
            Some((username, password)) => self.client.get(&url).basic_auth(username, password),
            None => self.client.get(&url),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        log::debug!("POST {}{}", self.remote_addr, path);
        let url = format!("{}{}", self.remote_addr, path);

        match self.basic_auth.clone() {
            Some((username, password)) => self.client.post(&url).basic_auth(username, password),
            None => self.client.post(&url),
        }
    }
}

/// Daemon responses are either the payload or an error envelope.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum WebResponse<T> {
    Error { error: String },
    Data(T),
}

async fn handle_response<T>(response: reqwest::Response) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let text = response.text().await?;

    let web_response = serde_json::from_str::<WebResponse<T>>(&text).map_err(|err| {
        log::error!("{err}. tried to parse: {text:?}");
        err
    })?;

    match web_response {
        WebResponse::Data(data) => Ok(data),
        WebResponse::Error { error } => anyhow::bail!(error),
    }
}

#[derive(Deserialize)]
struct DeletedResponse {
    deleted: bool,
}

#[derive(Deserialize)]
pub struct TotalResponse {
    pub total: usize,
}

#[async_trait]
impl AppBackend for AppRemote {
    async fn capture(&self, draft: NoteDraft) -> Result<Note, AppError> {
        let resp = self.post("/api/notes/capture").json(&draft).send().await?;
        Ok(handle_response(resp).await?)
    }

    async fn recall(
        &self,
        query: String,
        language: Option<Language>,
    ) -> Result<RecallResponse, AppError> {
        let resp = self
            .post("/api/recall/query")
            .json(&json!({
                "query": query,
                "language": language,
            }))
            .send()
            .await?;

        Ok(handle_response(resp).await?)
    }

    async fn search(&self, query: ListQuery) -> Result<Vec<Note>, AppError> {
        let resp = self.post("/api/notes/search").json(&query).send().await?;
        Ok(handle_response(resp).await?)
    }

    async fn delete(&self, id: Eid) -> Result<(), AppError> {
        let resp = self
            .post("/api/notes/delete")
            .json(&json!({ "id": id }))
            .send()
            .await?;

        let deleted: DeletedResponse = handle_response(resp).await?;
        if deleted.deleted {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }

    async fn categories(&self) -> Result<Vec<String>, AppError> {
        let resp = self.get("/api/categories").send().await?;
        Ok(handle_response(resp).await?)
    }

    async fn tags(&self) -> Result<Vec<String>, AppError> {
        let resp = self.post("/api/notes/tags").send().await?;
        Ok(handle_response(resp).await?)
    }

    async fn total(&self) -> Result<usize, AppError> {
        let resp = self.post("/api/notes/total").send().await?;
        let resp: TotalResponse = handle_response(resp).await?;
        Ok(resp.total)
    }

    async fn reembed(&self) -> Result<ReembedReport, AppError> {
        let resp = self.post("/api/notes/reembed").send().await?;
        Ok(handle_response(resp).await?)
    }

    async fn config(&self) -> Result<Config, AppError> {
        let resp = self.get("/api/config").send().await?;
        Ok(handle_response(resp).await?)
    }

    async fn update_config(&self, config: Config) -> Result<(), AppError> {
        let resp = self.post("/api/config").json(&config).send().await?;
        let _: serde_json::Value = handle_response(resp).await?;
        Ok(())
    }
}
