//! HTTP implementation of the provider API.

use std::time::Duration;

use async_trait::async_trait;
use dbfleet_api::deployment::{CustomZoneMapping, ManagedNamespace, ProcessArgs, SearchNodeSpec};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{ProviderError, Result};
use super::types::{
    BackupSchedule, Cluster, CustomZoneMappingRequest, FlexInstance, GeoSharding,
    SearchDeployment, SearchIndexDefinition, ServerlessEndpoint, ServerlessInstance,
};
use super::{BackupApi, ClusterApi, FlexApi, GlobalClusterApi, SearchApi, ServerlessApi};

const API_PREFIX: [&str; 3] = ["api", "atlas", "v2"];

/// API key pair sent with every request.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub public_key: String,
    pub private_key: String,
}

/// Provider client speaking JSON over HTTP.
///
/// The key pair is sent as HTTP Basic credentials. The hosted Atlas Admin API
/// only accepts programmatic keys over HTTP Digest, so reaching it directly
/// needs a gateway in front that terminates Digest. Endpoints that take Basic,
/// such as the local mock used in tests, work as is.
#[derive(Clone)]
pub struct HttpProvider {
    client: Client,
    base: Url,
    credentials: Option<Credentials>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct Paginated<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchDeploymentRequest<'a> {
    specs: &'a [SearchNodeSpec],
}

#[derive(Debug, Serialize)]
struct EndpointCommentRequest<'a> {
    comment: &'a str,
}

impl HttpProvider {
    pub fn new(endpoint: &str, credentials: Option<Credentials>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(endpoint)
            .map_err(|e| ProviderError::Transport(format!("invalid endpoint {}: {}", endpoint, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::from)?;
        Ok(Self {
            client,
            base,
            credentials,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Transport(format!("endpoint {} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(API_PREFIX.iter().copied().chain(segments.iter().copied()));
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(c) => request.basic_auth(&c.public_key, Some(&c.private_key)),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: ApiErrorBody = response.json().await.unwrap_or_default();
        Err(ProviderError::api(
            status.as_u16(),
            body.error_code,
            body.detail,
        ))
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.authorize(request).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn execute_empty(&self, request: RequestBuilder) -> Result<()> {
        let response = self.authorize(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        debug!("GET {}", url);
        self.execute(self.client.get(url)).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let url = self.url(segments)?;
        debug!("POST {}", url);
        self.execute(self.client.post(url).json(body)).await
    }

    async fn patch<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let url = self.url(segments)?;
        debug!("PATCH {}", url);
        self.execute(self.client.patch(url).json(body)).await
    }

    async fn delete(&self, segments: &[&str]) -> Result<()> {
        let url = self.url(segments)?;
        debug!("DELETE {}", url);
        self.execute_empty(self.client.delete(url)).await
    }
}

#[async_trait]
impl ClusterApi for HttpProvider {
    async fn get_cluster(&self, project_id: &str, name: &str) -> Result<Cluster> {
        self.get(&["groups", project_id, "clusters", name]).await
    }

    async fn create_cluster(&self, project_id: &str, cluster: &Cluster) -> Result<Cluster> {
        self.post(&["groups", project_id, "clusters"], cluster).await
    }

    async fn update_cluster(
        &self,
        project_id: &str,
        name: &str,
        cluster: &Cluster,
    ) -> Result<Cluster> {
        self.patch(&["groups", project_id, "clusters", name], cluster)
            .await
    }

    async fn delete_cluster(&self, project_id: &str, name: &str) -> Result<()> {
        self.delete(&["groups", project_id, "clusters", name]).await
    }

    async fn upgrade_tenant(&self, project_id: &str, cluster: &Cluster) -> Result<Cluster> {
        self.post(&["groups", project_id, "clusters", "tenantUpgrade"], cluster)
            .await
    }

    async fn get_process_args(&self, project_id: &str, name: &str) -> Result<ProcessArgs> {
        self.get(&["groups", project_id, "clusters", name, "processArgs"])
            .await
    }

    async fn update_process_args(
        &self,
        project_id: &str,
        name: &str,
        args: &ProcessArgs,
    ) -> Result<ProcessArgs> {
        self.patch(&["groups", project_id, "clusters", name, "processArgs"], args)
            .await
    }
}

#[async_trait]
impl ServerlessApi for HttpProvider {
    async fn get_serverless(&self, project_id: &str, name: &str) -> Result<ServerlessInstance> {
        self.get(&["groups", project_id, "serverless", name]).await
    }

    async fn create_serverless(
        &self,
        project_id: &str,
        instance: &ServerlessInstance,
    ) -> Result<ServerlessInstance> {
        self.post(&["groups", project_id, "serverless"], instance)
            .await
    }

    async fn update_serverless(
        &self,
        project_id: &str,
        name: &str,
        instance: &ServerlessInstance,
    ) -> Result<ServerlessInstance> {
        self.patch(&["groups", project_id, "serverless", name], instance)
            .await
    }

    async fn delete_serverless(&self, project_id: &str, name: &str) -> Result<()> {
        self.delete(&["groups", project_id, "serverless", name]).await
    }

    async fn list_serverless_endpoints(
        &self,
        project_id: &str,
        instance: &str,
    ) -> Result<Vec<ServerlessEndpoint>> {
        self.get(&[
            "groups",
            project_id,
            "privateEndpoint",
            "serverless",
            "instance",
            instance,
            "endpoint",
        ])
        .await
    }

    async fn create_serverless_endpoint(
        &self,
        project_id: &str,
        instance: &str,
        comment: &str,
    ) -> Result<ServerlessEndpoint> {
        self.post(
            &[
                "groups",
                project_id,
                "privateEndpoint",
                "serverless",
                "instance",
                instance,
                "endpoint",
            ],
            &EndpointCommentRequest { comment },
        )
        .await
    }

    async fn update_serverless_endpoint(
        &self,
        project_id: &str,
        instance: &str,
        endpoint: &ServerlessEndpoint,
    ) -> Result<ServerlessEndpoint> {
        self.patch(
            &[
                "groups",
                project_id,
                "privateEndpoint",
                "serverless",
                "instance",
                instance,
                "endpoint",
                &endpoint.id,
            ],
            endpoint,
        )
        .await
    }

    async fn delete_serverless_endpoint(
        &self,
        project_id: &str,
        instance: &str,
        endpoint_id: &str,
    ) -> Result<()> {
        self.delete(&[
            "groups",
            project_id,
            "privateEndpoint",
            "serverless",
            "instance",
            instance,
            "endpoint",
            endpoint_id,
        ])
        .await
    }
}

#[async_trait]
impl FlexApi for HttpProvider {
    async fn get_flex(&self, project_id: &str, name: &str) -> Result<FlexInstance> {
        self.get(&["groups", project_id, "flexClusters", name]).await
    }

    async fn create_flex(&self, project_id: &str, instance: &FlexInstance) -> Result<FlexInstance> {
        self.post(&["groups", project_id, "flexClusters"], instance)
            .await
    }

    async fn update_flex(
        &self,
        project_id: &str,
        name: &str,
        instance: &FlexInstance,
    ) -> Result<FlexInstance> {
        self.patch(&["groups", project_id, "flexClusters", name], instance)
            .await
    }

    async fn delete_flex(&self, project_id: &str, name: &str) -> Result<()> {
        self.delete(&["groups", project_id, "flexClusters", name])
            .await
    }
}

#[async_trait]
impl BackupApi for HttpProvider {
    async fn get_backup_schedule(
        &self,
        project_id: &str,
        cluster: &str,
    ) -> Result<BackupSchedule> {
        self.get(&["groups", project_id, "clusters", cluster, "backup", "schedule"])
            .await
    }

    async fn update_backup_schedule(
        &self,
        project_id: &str,
        cluster: &str,
        schedule: &BackupSchedule,
    ) -> Result<BackupSchedule> {
        self.patch(
            &["groups", project_id, "clusters", cluster, "backup", "schedule"],
            schedule,
        )
        .await
    }
}

#[async_trait]
impl SearchApi for HttpProvider {
    async fn get_search_deployment(
        &self,
        project_id: &str,
        cluster: &str,
    ) -> Result<SearchDeployment> {
        self.get(&["groups", project_id, "clusters", cluster, "search", "deployment"])
            .await
    }

    async fn create_search_deployment(
        &self,
        project_id: &str,
        cluster: &str,
        specs: &[SearchNodeSpec],
    ) -> Result<SearchDeployment> {
        self.post(
            &["groups", project_id, "clusters", cluster, "search", "deployment"],
            &SearchDeploymentRequest { specs },
        )
        .await
    }

    async fn update_search_deployment(
        &self,
        project_id: &str,
        cluster: &str,
        specs: &[SearchNodeSpec],
    ) -> Result<SearchDeployment> {
        self.patch(
            &["groups", project_id, "clusters", cluster, "search", "deployment"],
            &SearchDeploymentRequest { specs },
        )
        .await
    }

    async fn delete_search_deployment(&self, project_id: &str, cluster: &str) -> Result<()> {
        self.delete(&["groups", project_id, "clusters", cluster, "search", "deployment"])
            .await
    }

    async fn list_search_indexes(
        &self,
        project_id: &str,
        cluster: &str,
    ) -> Result<Vec<SearchIndexDefinition>> {
        let page: Paginated<SearchIndexDefinition> = self
            .get(&["groups", project_id, "clusters", cluster, "search", "indexes"])
            .await?;
        Ok(page.results)
    }

    async fn create_search_index(
        &self,
        project_id: &str,
        cluster: &str,
        index: &SearchIndexDefinition,
    ) -> Result<SearchIndexDefinition> {
        self.post(
            &["groups", project_id, "clusters", cluster, "search", "indexes"],
            index,
        )
        .await
    }

    async fn update_search_index(
        &self,
        project_id: &str,
        cluster: &str,
        index_id: &str,
        index: &SearchIndexDefinition,
    ) -> Result<SearchIndexDefinition> {
        self.patch(
            &[
                "groups", project_id, "clusters", cluster, "search", "indexes", index_id,
            ],
            index,
        )
        .await
    }

    async fn delete_search_index(
        &self,
        project_id: &str,
        cluster: &str,
        index_id: &str,
    ) -> Result<()> {
        self.delete(&[
            "groups", project_id, "clusters", cluster, "search", "indexes", index_id,
        ])
        .await
    }
}

#[async_trait]
impl GlobalClusterApi for HttpProvider {
    async fn get_geo_sharding(&self, project_id: &str, cluster: &str) -> Result<GeoSharding> {
        self.get(&["groups", project_id, "clusters", cluster, "globalWrites"])
            .await
    }

    async fn create_custom_zone_mappings(
        &self,
        project_id: &str,
        cluster: &str,
        mappings: &[CustomZoneMapping],
    ) -> Result<GeoSharding> {
        self.post(
            &[
                "groups",
                project_id,
                "clusters",
                cluster,
                "globalWrites",
                "customZoneMapping",
            ],
            &CustomZoneMappingRequest {
                custom_zone_mappings: mappings.to_vec(),
            },
        )
        .await
    }

    async fn delete_custom_zone_mappings(
        &self,
        project_id: &str,
        cluster: &str,
    ) -> Result<GeoSharding> {
        let url = self.url(&[
            "groups",
            project_id,
            "clusters",
            cluster,
            "globalWrites",
            "customZoneMapping",
        ])?;
        debug!("DELETE {}", url);
        self.execute(self.client.delete(url)).await
    }

    async fn create_managed_namespace(
        &self,
        project_id: &str,
        cluster: &str,
        namespace: &ManagedNamespace,
    ) -> Result<GeoSharding> {
        self.post(
            &[
                "groups",
                project_id,
                "clusters",
                cluster,
                "globalWrites",
                "managedNamespaces",
            ],
            namespace,
        )
        .await
    }

    async fn delete_managed_namespace(
        &self,
        project_id: &str,
        cluster: &str,
        db: &str,
        collection: &str,
    ) -> Result<GeoSharding> {
        let url = self.url(&[
            "groups",
            project_id,
            "clusters",
            cluster,
            "globalWrites",
            "managedNamespaces",
        ])?;
        debug!("DELETE {} ({}.{})", url, db, collection);
        self.execute(
            self.client
                .delete(url)
                .query(&[("db", db), ("collection", collection)]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building_escapes_segments() {
        let provider =
            HttpProvider::new("http://localhost:8080/", None, Duration::from_secs(5)).unwrap();
        let url = provider
            .url(&["groups", "p1", "clusters", "my cluster"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/atlas/v2/groups/p1/clusters/my%20cluster"
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(HttpProvider::new("not a url", None, Duration::from_secs(5)).is_err());
    }
}
