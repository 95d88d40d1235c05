//! Cognit Frontend Adapter: authentication, requirements, cluster listing,
//! and function upload.

use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;
use url::Url;

use crate::cache::RemoteFunctionId;
use crate::cache::UploadCache;
use crate::call::Function;
use crate::config::Config;
use crate::config::SecretString;
use crate::error::AdapterError;
use crate::error::TransportError;
use crate::requirements::Requirements;

/// A candidate Edge Cluster Frontend returned by `listClusters`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCandidate {
    /// The cluster's base URL.
    pub endpoint: Url,
    /// Display name, for logging/diagnostics.
    pub name: String,
}

/// Raw `POST /v1/daas/upload` request body.
#[derive(Serialize)]
struct UploadRequest<'a> {
    #[serde(rename = "LANG")]
    lang: &'a str,
    #[serde(rename = "FC")]
    fc: &'a str,
    #[serde(rename = "FC_HASH")]
    fc_hash: String,
}

/// Raw `GET /v1/app_requirements/{id}/ec_fe` entry.
#[derive(Deserialize)]
struct ClusterEntry {
    #[serde(rename = "NAME")]
    name: String,
    #[serde(rename = "TEMPLATE")]
    template: ClusterTemplate,
}

/// The nested `TEMPLATE` object of a cluster entry.
#[derive(Deserialize)]
struct ClusterTemplate {
    #[serde(rename = "EDGE_CLUSTER_FRONTEND")]
    edge_cluster_frontend: Option<String>,
}

/// Thin client over the Cognit Frontend's versioned HTTPS API.
///
/// Owned exclusively by the supervisor state machine; its token,
/// `application_id`, and connection flag are never shared with the facade.
pub struct CognitFrontendAdapter {
    client: reqwest::Client,
    base_url: Url,
    username: String,
    password: SecretString,
    token: Option<SecretString>,
    application_id: Option<u64>,
    connected: bool,
}

impl CognitFrontendAdapter {
    /// Builds a fresh adapter from configuration. The adapter starts
    /// unauthenticated and unconnected.
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.endpoint.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            token: None,
            application_id: None,
            connected: false,
        }
    }

    /// Whether the last HTTP response observed was a success (< 400).
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// The application-requirements record id, once registered.
    pub fn application_id(&self) -> Option<u64> {
        self.application_id
    }

    /// Joins `path` onto the adapter's base URL under the `/v1` prefix.
    fn url(&self, path: &str) -> Url {
        self.base_url
            .join(&format!("v1/{path}"))
            .expect("path segments are static and well-formed")
    }

    /// Records the outcome of a response: `true` on any status < 400,
    /// `false` on a transport error or >= 400.
    fn observe(&mut self, success: bool) {
        self.connected = success;
    }

    /// Exchanges `username`/`password` for a bearer token via HTTP Basic
    /// auth. Returns `Ok(true)` if a token was obtained, `Ok(false)` if the
    /// server rejected the credentials without a transport-level failure.
    pub async fn authenticate(&mut self) -> Result<bool, TransportError> {
        let endpoint = self.url("authenticate");
        let sent = self
            .client
            .post(endpoint.clone())
            .basic_auth(&self.username, Some(self.password.expose()))
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(source) => {
                self.observe(false);
                return Err(TransportError::Request {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        };

        let status = response.status();
        if status.as_u16() == 200 || status.as_u16() == 201 {
            let token: String = response.json().await.map_err(|source| TransportError::Decode {
                endpoint: endpoint.to_string(),
                source,
            })?;
            self.token = Some(token.into());
            self.observe(true);
            Ok(true)
        } else {
            self.observe(false);
            Ok(false)
        }
    }

    /// Attaches the `token` header, if one has been obtained.
    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header("token", token.expose()),
            None => builder,
        }
    }

    /// Creates or updates the application-requirements record. Validates
    /// the geolocation/latency rule before issuing the request.
    pub async fn register_or_update(
        &mut self,
        requirements: &Requirements,
    ) -> Result<bool, AdapterError> {
        requirements.validate()?;

        let (method, endpoint) = match self.application_id {
            None => (reqwest::Method::POST, self.url("app_requirements")),
            Some(id) => (
                reqwest::Method::PUT,
                self.url(&format!("app_requirements/{id}")),
            ),
        };

        let sent = self
            .authorize(self.client.request(method, endpoint.clone()))
            .json(requirements)
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(source) => {
                self.observe(false);
                return Err(AdapterError::Transport(TransportError::Request {
                    endpoint: endpoint.to_string(),
                    source,
                }));
            }
        };

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            self.observe(false);
            return Err(AdapterError::Transport(TransportError::Unauthorized {
                endpoint: endpoint.to_string(),
            }));
        }
        if status.as_u16() != 200 {
            self.observe(status.as_u16() < 400);
            return Ok(false);
        }

        if self.application_id.is_none() {
            let id: u64 = response.json().await.map_err(|source| TransportError::Decode {
                endpoint: endpoint.to_string(),
                source,
            })?;
            self.application_id = Some(id);
        }
        self.observe(true);
        Ok(true)
    }

    /// Reads back the currently registered requirements.
    pub async fn read_requirements(&mut self) -> Result<Option<Requirements>, TransportError> {
        let Some(id) = self.application_id else {
            return Ok(None);
        };
        let endpoint = self.url(&format!("app_requirements/{id}"));
        let sent = self.authorize(self.client.get(endpoint.clone())).send().await;
        let response = match sent {
            Ok(response) => response,
            Err(source) => {
                self.observe(false);
                return Err(TransportError::Request {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        };

        let status = response.status();
        self.observe(status.as_u16() < 400);
        if status.as_u16() != 200 {
            return Ok(None);
        }
        let requirements = response.json().await.map_err(|source| TransportError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })?;
        Ok(Some(requirements))
    }

    /// Deletes the currently registered requirements record.
    pub async fn delete_requirements(&mut self) -> Result<bool, TransportError> {
        let Some(id) = self.application_id else {
            return Ok(false);
        };
        let endpoint = self.url(&format!("app_requirements/{id}"));
        let sent = self.authorize(self.client.delete(endpoint.clone())).send().await;
        let response = match sent {
            Ok(response) => response,
            Err(source) => {
                self.observe(false);
                return Err(TransportError::Request {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        };

        let success = response.status().as_u16() == 204;
        self.observe(success || response.status().as_u16() < 400);
        if success {
            self.application_id = None;
        }
        Ok(success)
    }

    /// Lists candidate Edge Cluster Frontends for the registered
    /// application. Clusters missing `TEMPLATE.EDGE_CLUSTER_FRONTEND` are
    /// skipped with a warning. Order follows the remote's own ordering.
    pub async fn list_clusters(&mut self) -> Result<Vec<ClusterCandidate>, TransportError> {
        let Some(id) = self.application_id else {
            return Ok(Vec::new());
        };
        let endpoint = self.url(&format!("app_requirements/{id}/ec_fe"));
        let sent = self.authorize(self.client.get(endpoint.clone())).send().await;
        let response = match sent {
            Ok(response) => response,
            Err(source) => {
                self.observe(false);
                return Err(TransportError::Request {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        };

        let status = response.status();
        self.observe(status.as_u16() < 400);
        if !status.is_success() {
            return Ok(Vec::new());
        }

        let entries: Vec<ClusterEntry> =
            response.json().await.map_err(|source| TransportError::Decode {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let mut candidates = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.template.edge_cluster_frontend {
                Some(url) => match Url::parse(&url) {
                    Ok(endpoint) => candidates.push(ClusterCandidate {
                        endpoint,
                        name: entry.name,
                    }),
                    Err(e) => warn!(cluster = %entry.name, error = %e, "cluster has an unparseable EDGE_CLUSTER_FRONTEND URL; skipping"),
                },
                None => warn!(cluster = %entry.name, "cluster template missing EDGE_CLUSTER_FRONTEND; skipping"),
            }
        }
        Ok(candidates)
    }

    /// Uploads `function`'s compiled body, or returns its cached id if an
    /// identical body was already uploaded.
    pub async fn upload_function(
        &mut self,
        function: &Function,
        cache: &UploadCache,
    ) -> Result<RemoteFunctionId, TransportError> {
        let endpoint = self.url("daas/upload");
        let lang = match function.language {
            crate::call::Language::Py => "PY",
            crate::call::Language::C => "C",
        };

        let result = cache
            .lookup_or_upload(function, || async {
                let hash = crate::cache::fingerprint(function);
                let body = UploadRequest {
                    lang,
                    fc: &function.blob,
                    fc_hash: hex::encode(hash),
                };
                let response = self
                    .authorize(self.client.post(endpoint.clone()))
                    .json(&body)
                    .send()
                    .await
                    .map_err(|source| TransportError::Request {
                        endpoint: endpoint.to_string(),
                        source,
                    })?;

                let status = response.status();
                if status.as_u16() != 200 {
                    return Err(TransportError::Status {
                        endpoint: endpoint.to_string(),
                        status: status.as_u16(),
                        body: response.text().await.unwrap_or_default(),
                    });
                }

                let id: u64 = response.json().await.map_err(|source| TransportError::Decode {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
                info!(function = ?function.id, remote_id = id, "function uploaded");
                Ok(RemoteFunctionId(id))
            })
            .await;

        match &result {
            Ok(_) => self.observe(true),
            Err(TransportError::Request { .. }) => self.observe(false),
            Err(_) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::method;
    use wiremock::matchers::path;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;

    use super::*;
    use crate::cache::UploadCache;
    use crate::call::FunctionRegistry;
    use crate::call::Language;
    use crate::error::ValidationError;

    fn config(uri: &str) -> Config {
        Config {
            endpoint: Url::parse(&format!("{uri}/")).unwrap(),
            username: "device".into(),
            password: "hunter2".into(),
            queue_bound: 8,
            probe_period_ms: 2_000,
            tick_ms: 50,
        }
    }

    #[tokio::test]
    async fn authenticate_stores_the_token_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/authenticate"))
            .respond_with(ResponseTemplate::new(200).set_body_json("a-token"))
            .mount(&server)
            .await;

        let mut adapter = CognitFrontendAdapter::new(&config(&server.uri()));
        assert!(adapter.authenticate().await.unwrap());
        assert!(adapter.connected());
        assert!(adapter.token.is_some());
    }

    #[tokio::test]
    async fn authenticate_rejects_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/authenticate"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut adapter = CognitFrontendAdapter::new(&config(&server.uri()));
        assert!(!adapter.authenticate().await.unwrap());
        assert!(!adapter.connected());
    }

    #[tokio::test]
    async fn register_or_update_rejects_invalid_requirements_before_sending() {
        let server = MockServer::start().await;
        let mut adapter = CognitFrontendAdapter::new(&config(&server.uri()));
        let requirements = Requirements {
            max_latency: Some(10),
            ..Default::default()
        };
        let result = adapter.register_or_update(&requirements).await;
        assert!(matches!(
            result,
            Err(AdapterError::Validation(ValidationError::MissingGeolocation))
        ));
    }

    #[tokio::test]
    async fn register_or_update_reports_unauthorized_as_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/app_requirements"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut adapter = CognitFrontendAdapter::new(&config(&server.uri()));
        let result = adapter.register_or_update(&Requirements::default()).await;
        assert!(matches!(
            result,
            Err(AdapterError::Transport(TransportError::Unauthorized { .. }))
        ));
        assert!(!adapter.connected());
    }

    #[tokio::test]
    async fn register_or_update_assigns_the_application_id_on_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/app_requirements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(7))
            .mount(&server)
            .await;

        let mut adapter = CognitFrontendAdapter::new(&config(&server.uri()));
        assert!(adapter.register_or_update(&Requirements::default()).await.unwrap());
        assert_eq!(adapter.application_id(), Some(7));
    }

    #[tokio::test]
    async fn read_then_delete_requirements_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/app_requirements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(3))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/app_requirements/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "FLAVOUR": "EnergyV2",
                "GEOLOCATION": null,
                "MAX_LATENCY": null,
                "MAX_FUNCTION_EXECUTION_TIME": null,
                "MIN_ENERGY_RENEWABLE_USAGE": null,
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/app_requirements/3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let mut adapter = CognitFrontendAdapter::new(&config(&server.uri()));
        let requirements = Requirements {
            flavour: Some("EnergyV2".into()),
            ..Default::default()
        };
        adapter.register_or_update(&requirements).await.unwrap();

        let read_back = adapter.read_requirements().await.unwrap().unwrap();
        assert_eq!(read_back.flavour.as_deref(), Some("EnergyV2"));

        assert!(adapter.delete_requirements().await.unwrap());
        assert_eq!(adapter.application_id(), None);
    }

    #[tokio::test]
    async fn read_requirements_without_an_application_id_is_none() {
        let server = MockServer::start().await;
        let mut adapter = CognitFrontendAdapter::new(&config(&server.uri()));
        assert_eq!(adapter.read_requirements().await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_clusters_skips_entries_missing_the_frontend_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/app_requirements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(1))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/app_requirements/1/ec_fe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "NAME": "good", "TEMPLATE": { "EDGE_CLUSTER_FRONTEND": "https://cluster.example/" } },
                { "NAME": "incomplete", "TEMPLATE": {} },
            ])))
            .mount(&server)
            .await;

        let mut adapter = CognitFrontendAdapter::new(&config(&server.uri()));
        adapter.register_or_update(&Requirements::default()).await.unwrap();

        let candidates = adapter.list_clusters().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "good");
    }

    #[tokio::test]
    async fn upload_function_uses_the_cache_on_a_repeat_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/daas/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(99))
            .expect(1)
            .mount(&server)
            .await;

        let mut adapter = CognitFrontendAdapter::new(&config(&server.uri()));
        let cache = UploadCache::new();
        let registry = FunctionRegistry::new();
        let id = registry.register(Language::Py, "def f(): pass".into());
        let function = registry.get(id).unwrap();

        let first = adapter.upload_function(&function, &cache).await.unwrap();
        let second = adapter.upload_function(&function, &cache).await.unwrap();
        assert_eq!(first, second);
    }
}
