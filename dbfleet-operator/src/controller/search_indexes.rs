//! Atlas-style search indexes of a cluster.

use std::collections::HashSet;

use dbfleet_api::deployment::{AdvancedDeploymentSpec, SearchIndex, SearchIndexStatus};
use dbfleet_api::{ConditionType, Deployment, Reason, SearchIndexConfig, StoreExt};
use tracing::{debug, info};

use super::DeploymentReconciler;
use crate::diff::diff;
use crate::provider::types::{SearchIndexDefinition, INDEX_FAILED, INDEX_READY};
use crate::workflow::{aggregate, Context, Outcome};

const STATUS_READY: &str = "READY";
const STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
const STATUS_ERROR: &str = "ERROR";

impl DeploymentReconciler {
    pub(super) async fn ensure_search_indexes(
        &self,
        d: &Deployment,
        spec: &AdvancedDeploymentSpec,
        ctx: &mut Context,
    ) -> Outcome {
        let outcome = self.sync_search_indexes(d, spec, ctx).await;
        if outcome.is_unmanaged() {
            ctx.unset_condition(ConditionType::SearchIndexesReady);
        } else if outcome.is_ok() {
            ctx.set_condition_true(ConditionType::SearchIndexesReady);
        } else {
            ctx.set_condition_from(ConditionType::SearchIndexesReady, &outcome);
        }
        outcome
    }

    async fn sync_search_indexes(
        &self,
        d: &Deployment,
        spec: &AdvancedDeploymentSpec,
        ctx: &mut Context,
    ) -> Outcome {
        let mut names = HashSet::new();
        for index in &spec.search_indexes {
            if !names.insert(index.name.as_str()) {
                return Outcome::terminate(
                    Reason::SearchIndexesNamesNotUnique,
                    format!("every index 'name' must be unique: duplicated index name {}", index.name),
                );
            }
        }

        let mut desired = Vec::with_capacity(spec.search_indexes.len());
        for index in &spec.search_indexes {
            match self.index_definition(d, index).await {
                Ok(def) => desired.push(def),
                Err(outcome) => return outcome,
            }
        }

        let project_id = d.spec.project_id.as_str();
        let listed = match self.provider.list_search_indexes(project_id, &spec.name).await {
            Ok(indexes) => indexes,
            Err(e) => return Outcome::terminate(Reason::SearchIndexesNotReady, e),
        };
        let observed = owned_indexes(listed, &ctx.status().search_indexes, &names);

        if desired.is_empty() && observed.is_empty() {
            ctx.status_mut().search_indexes.clear();
            return Outcome::unmanaged();
        }

        let changes = diff(&desired, &observed, |i| i.name.clone(), same_definition);
        let mut statuses = Vec::new();
        let mut results = Vec::new();

        for index in changes.to_create {
            info!("Creating search index {}", index.name);
            match self
                .provider
                .create_search_index(project_id, &spec.name, index)
                .await
            {
                Ok(created) => {
                    let status = created.status.clone().unwrap_or_default();
                    statuses.push(index_status(&created, STATUS_IN_PROGRESS, ""));
                    results.push(Outcome::in_progress(
                        Reason::SearchIndexesNotReady,
                        format!("search index status: {}", status),
                    ));
                }
                Err(e) => {
                    statuses.push(index_status(index, STATUS_ERROR, &e.to_string()));
                    results.push(Outcome::provider_failure(Reason::SearchIndexesNotReady, &e));
                }
            }
        }

        for (index, current) in changes.to_update {
            if let Some(outcome) = still_building(current) {
                statuses.push(index_status(current, STATUS_IN_PROGRESS, ""));
                results.push(outcome);
                continue;
            }
            let Some(index_id) = current.index_id.as_deref() else {
                statuses.push(index_status(current, STATUS_ERROR, "index has no id"));
                results.push(Outcome::terminate(
                    Reason::SearchIndexesNotReady,
                    format!("search index {} has no id", current.name),
                ));
                continue;
            };
            info!("Updating search index {}", index.name);
            match self
                .provider
                .update_search_index(project_id, &spec.name, index_id, index)
                .await
            {
                Ok(updated) => {
                    statuses.push(index_status(&updated, STATUS_IN_PROGRESS, ""));
                    results.push(Outcome::in_progress(
                        Reason::SearchIndexesNotReady,
                        format!(
                            "search index status: {}",
                            updated.status.as_deref().unwrap_or_default()
                        ),
                    ));
                }
                Err(e) => {
                    statuses.push(index_status(current, STATUS_ERROR, &e.to_string()));
                    results.push(Outcome::provider_failure(Reason::SearchIndexesNotReady, &e));
                }
            }
        }

        for (_, current) in changes.to_keep {
            match current.status.as_deref() {
                Some(INDEX_FAILED) => {
                    let message = format!("search index {} failed to build", current.name);
                    statuses.push(index_status(current, STATUS_ERROR, &message));
                    results.push(Outcome::terminate(Reason::SearchIndexesNotReady, message));
                }
                _ => match still_building(current) {
                    Some(outcome) => {
                        statuses.push(index_status(current, STATUS_IN_PROGRESS, ""));
                        results.push(outcome);
                    }
                    None => {
                        debug!("search index {} is up to date", current.name);
                        statuses.push(index_status(current, STATUS_READY, ""));
                        results.push(Outcome::ok());
                    }
                },
            }
        }

        for current in changes.to_delete {
            if let Some(outcome) = still_building(current) {
                statuses.push(index_status(current, STATUS_IN_PROGRESS, ""));
                results.push(outcome);
                continue;
            }
            let Some(index_id) = current.index_id.as_deref() else {
                continue;
            };
            info!("Deleting search index {}", current.name);
            if let Err(e) = self
                .provider
                .delete_search_index(project_id, &spec.name, index_id)
                .await
            {
                statuses.push(index_status(current, STATUS_ERROR, &e.to_string()));
                results.push(Outcome::provider_failure(Reason::SearchIndexesNotReady, &e));
            }
        }

        ctx.status_mut().search_indexes = statuses;
        aggregate(results)
    }

    /// Provider definition of a declared index, with the referenced
    /// configuration inlined for search-type indexes.
    async fn index_definition(&self, d: &Deployment, index: &SearchIndex) -> Result<SearchIndexDefinition, Outcome> {
        let mut def = SearchIndexDefinition {
            name: index.name.clone(),
            database: index.database.clone(),
            collection_name: index.collection_name.clone(),
            type_: index.type_.clone(),
            ..Default::default()
        };

        match index.type_.as_str() {
            "search" => {
                let Some(search) = index.search.as_ref() else {
                    return Err(Outcome::terminate(
                        Reason::SearchIndexesNotReady,
                        format!("index '{}' has type 'search' but the spec is missing", index.name),
                    ));
                };
                let config_key = search.search_configuration_ref.key(&d.meta.namespace);
                let config = match self.store.get::<SearchIndexConfig>(&config_key).await {
                    Ok(Some(config)) => config,
                    Ok(None) => {
                        return Err(Outcome::terminate(
                            Reason::SearchIndexesNotReady,
                            format!(
                                "can not get search index configuration for index '{}': {} not found",
                                index.name, config_key
                            ),
                        ))
                    }
                    Err(e) => {
                        return Err(Outcome::terminate(
                            Reason::SearchIndexesNotReady,
                            format!(
                                "can not get search index configuration for index '{}': {}",
                                index.name, e
                            ),
                        ))
                    }
                };
                def.mappings = Some(search.mappings.clone());
                def.synonyms = search.synonyms.clone();
                def.analyzer = config.spec.analyzer;
                def.search_analyzer = config.spec.search_analyzer;
                def.analyzers = config.spec.analyzers;
                def.stored_source = config.spec.stored_source;
            }
            "vector" => {
                def.fields = index.vector_search.as_ref().map(|v| v.fields.clone());
            }
            other => {
                return Err(Outcome::terminate(
                    Reason::SearchIndexesNotReady,
                    format!(
                        "index {:?} has unknown type {:?}. Can be either search or vector",
                        index.name, other
                    ),
                ))
            }
        }
        Ok(def)
    }
}

/// Indexes this operator is responsible for: those recorded in the status by
/// an earlier pass and those with a declared name. Anything else on the
/// cluster was created elsewhere and is left alone.
fn owned_indexes(
    listed: Vec<SearchIndexDefinition>,
    recorded: &[SearchIndexStatus],
    declared: &HashSet<&str>,
) -> Vec<SearchIndexDefinition> {
    let recorded_ids: HashSet<&str> = recorded
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| !id.is_empty())
        .collect();
    listed
        .into_iter()
        .filter(|i| {
            declared.contains(i.name.as_str())
                || i.index_id
                    .as_deref()
                    .is_some_and(|id| recorded_ids.contains(id))
        })
        .collect()
}

/// Progress outcome for an index the provider is still building.
fn still_building(index: &SearchIndexDefinition) -> Option<Outcome> {
    match index.status.as_deref() {
        None | Some("") | Some(INDEX_READY) => None,
        Some(status) => Some(Outcome::in_progress(
            Reason::SearchIndexesNotReady,
            format!("search index status: {}", status),
        )),
    }
}

fn same_definition(desired: &SearchIndexDefinition, observed: &SearchIndexDefinition) -> bool {
    let strip = |d: &SearchIndexDefinition| SearchIndexDefinition {
        index_id: None,
        status: None,
        ..d.clone()
    };
    strip(desired) == strip(observed)
}

fn index_status(index: &SearchIndexDefinition, status: &str, message: &str) -> SearchIndexStatus {
    SearchIndexStatus {
        id: index.index_id.clone().unwrap_or_default(),
        name: index.name.clone(),
        status: status.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_definition(name: &str, status: Option<&str>) -> SearchIndexDefinition {
        SearchIndexDefinition {
            index_id: Some(format!("{}-id", name)),
            name: name.to_string(),
            database: "db".to_string(),
            collection_name: "items".to_string(),
            type_: "vector".to_string(),
            status: status.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_still_building() {
        assert!(still_building(&make_definition("a", None)).is_none());
        assert!(still_building(&make_definition("a", Some("READY"))).is_none());

        let outcome = still_building(&make_definition("a", Some("IN_PROGRESS"))).unwrap();
        assert!(outcome.is_in_progress());
        assert_eq!(outcome.message(), "search index status: IN_PROGRESS");
    }

    #[test]
    fn test_only_recorded_or_declared_indexes_are_owned() {
        let listed = vec![
            make_definition("declared", Some("READY")),
            make_definition("recorded", Some("READY")),
            make_definition("foreign", Some("READY")),
        ];
        let recorded = vec![SearchIndexStatus {
            id: "recorded-id".to_string(),
            name: "recorded".to_string(),
            status: STATUS_READY.to_string(),
            message: String::new(),
        }];
        let declared = HashSet::from(["declared"]);

        let owned: Vec<String> = owned_indexes(listed, &recorded, &declared)
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(owned, vec!["declared", "recorded"]);
    }

    #[test]
    fn test_same_definition_ignores_provider_fields() {
        let mut desired = make_definition("a", None);
        desired.index_id = None;
        assert!(same_definition(&desired, &make_definition("a", Some("READY"))));

        desired.fields = Some(serde_json::json!([{"type": "vector", "path": "v"}]));
        assert!(!same_definition(&desired, &make_definition("a", Some("READY"))));
    }
}
