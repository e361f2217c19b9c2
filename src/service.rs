//! The service facade: one `Catalogue` owns the settings, the HTTP fetcher
//! and cache, and the index engines, and exposes every public operation as
//! an async method.
//!
//! SQLite and embedding work is synchronous and runs through
//! `spawn_blocking`; network-bound operations await directly. A component
//! whose index or model failed to initialise degrades per call: operations
//! answer with an empty result and a diagnostic warning instead of failing
//! the whole process.

use crate::config::Settings;
use crate::error::{RetrievalError, RetrievalResult, Warnings};
use crate::iconclass::{BrowseOutcome, IconclassEngine, IconclassEntry};
use crate::linkedart::http::Fetcher;
use crate::linkedart::image::ImageInfo;
use crate::linkedart::{
    ApiSearchParams, ArtworkDetail, BibliographyOutcome, LinkedArtClient,
};
use crate::oai::{HarvestParams, HeaderPage, OaiClient, OaiSet, RecordPage};
use crate::semantic::SemanticEngine;
use crate::semantic::embedding::{EMBEDDING_DIM, QueryEmbedder};
use crate::vocab::filters::SearchFilters;
use crate::vocab::{ArtworkSummary, VocabularyEngine};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Options for the composite structured search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Local and upstream-capable filters.
    pub filters: SearchFilters,
    /// Free-text query, treated as a title filter unless `filters.title`
    /// is set explicitly.
    pub query: Option<String>,
    /// Exact object number (resolved upstream; zero hits is `NotFound`).
    pub object_number: Option<String>,
    /// Upstream-only description filter.
    pub description: Option<String>,
    /// Upstream-only image availability filter.
    pub image_available: Option<bool>,
    /// Upstream continuation token from a previous page.
    pub page_token: Option<String>,
    /// Return only the count and object numbers, skipping detail resolution.
    pub compact: bool,
}

/// One structured-search hit: the summary row, plus the enriched record
/// when detail resolution succeeded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(flatten)]
    pub summary: ArtworkSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ArtworkDetail>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_results: Option<u64>,
    pub results: Vec<SearchHit>,
    /// Populated in compact mode.
    pub object_numbers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub warnings: Vec<String>,
}

/// One semantic-search hit.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSearchHit {
    pub object_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSearchResponse {
    /// `semantic` (pure KNN) or `semantic+filtered`.
    pub mode: &'static str,
    pub results: Vec<SemanticSearchHit>,
    pub warnings: Vec<String>,
}

/// Change feed page: full records or headers only.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChangeFeedPage {
    Records(RecordPage),
    Identifiers(HeaderPage),
}

/// Options for the change feed operation.
#[derive(Debug, Clone, Default)]
pub struct ChangeFeedOptions {
    pub from: Option<String>,
    pub until: Option<String>,
    pub set: Option<String>,
    pub identifiers_only: bool,
    pub resumption_token: Option<String>,
}

enum Component<T> {
    Ready(Arc<T>),
    Unavailable(String),
}

impl<T> Component<T> {
    fn init(name: &str, result: RetrievalResult<T>) -> Self {
        match result {
            Ok(engine) => Self::Ready(Arc::new(engine)),
            Err(e) => {
                tracing::warn!(target: "service", "{name} disabled: {e}");
                Self::Unavailable(e.to_string())
            }
        }
    }

    fn get(&self) -> Result<Arc<T>, String> {
        match self {
            Self::Ready(engine) => Ok(Arc::clone(engine)),
            Self::Unavailable(reason) => Err(reason.clone()),
        }
    }
}

/// Shared services for the whole core. Pass this around; the embedding
/// model is the only process-wide singleton-like resource, and it lives
/// here too.
pub struct Catalogue {
    settings: Settings,
    vocab: Component<VocabularyEngine>,
    semantic: Component<SemanticEngine>,
    iconclass: Component<IconclassEngine>,
    embedder: Component<QueryEmbedder>,
    linkedart: Arc<LinkedArtClient>,
    oai: OaiClient,
}

impl Catalogue {
    /// Initialise every component. Index or model failures disable the
    /// affected component; only a broken HTTP client is fatal.
    pub fn new(settings: Settings) -> RetrievalResult<Self> {
        let fetcher = Arc::new(Fetcher::new(&settings)?);
        let linkedart = Arc::new(LinkedArtClient::new(
            Arc::clone(&fetcher),
            &settings.api,
            &settings.http,
        ));

        // The OAI endpoint speaks XML; it gets a plain client without the
        // ld+json accept header.
        let oai_http = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .pool_max_idle_per_host(settings.http.max_connections_per_host)
            .user_agent(settings.http.user_agent.clone())
            .build()
            .map_err(|e| RetrievalError::Config {
                reason: format!("HTTP client: {e}"),
            })?;
        let oai = OaiClient::new(oai_http, &settings.api);

        let embedder = Component::init(
            "embedding model",
            QueryEmbedder::new(&settings.semantic).map_err(|e| RetrievalError::Embedding {
                reason: e.to_string(),
            }),
        );
        let expected_dims = match &embedder {
            Component::Ready(e) => e.dimensions(),
            Component::Unavailable(_) => EMBEDDING_DIM,
        };

        let vocab = Component::init("vocabulary index", VocabularyEngine::open(&settings.indexes));
        let semantic = Component::init(
            "embeddings index",
            SemanticEngine::open(&settings.indexes, &settings.semantic, expected_dims),
        );
        let iconclass = Component::init("iconclass index", IconclassEngine::open(&settings.indexes));

        Ok(Self {
            settings,
            vocab,
            semantic,
            iconclass,
            embedder,
            linkedart,
            oai,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Hermetic constructor with every index and the model disabled, used
    /// to exercise degradation paths without touching disk or network.
    #[cfg(test)]
    fn new_degraded(settings: Settings) -> RetrievalResult<Self> {
        let fetcher = Arc::new(Fetcher::new(&settings)?);
        let linkedart = Arc::new(LinkedArtClient::new(
            Arc::clone(&fetcher),
            &settings.api,
            &settings.http,
        ));
        let oai_http = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .build()
            .map_err(|e| RetrievalError::Config {
                reason: format!("HTTP client: {e}"),
            })?;
        let oai = OaiClient::new(oai_http, &settings.api);
        Ok(Self {
            settings,
            vocab: Component::Unavailable("index not opened".to_string()),
            semantic: Component::Unavailable("index not opened".to_string()),
            iconclass: Component::Unavailable("index not opened".to_string()),
            embedder: Component::Unavailable("model not loaded".to_string()),
            linkedart,
            oai,
        })
    }

    // ---- structured search ----------------------------------------------

    /// Composite structured search: local vocabulary filters run on the
    /// vocabulary index, API-only requests go upstream. See the routing
    /// rules in DESIGN.md.
    pub async fn search(&self, options: SearchOptions) -> RetrievalResult<SearchResponse> {
        let has_api_fields = options.query.is_some()
            || options.object_number.is_some()
            || options.description.is_some()
            || options.image_available.is_some()
            || options.page_token.is_some();
        if options.filters.is_empty() && !has_api_fields {
            return Err(RetrievalError::validation(
                "structured search requires at least one filter: \
                 title|creator|type|material|technique|creationDate|description",
            ));
        }

        if uses_local_index(&options.filters) {
            self.search_local(options).await
        } else {
            self.search_upstream(options).await
        }
    }

    async fn search_local(&self, options: SearchOptions) -> RetrievalResult<SearchResponse> {
        let mut warnings = Warnings::new();
        let vocab = match self.vocab.get() {
            Ok(vocab) => vocab,
            Err(reason) => {
                warnings.push(format!("vocabulary index unavailable: {reason}"));
                return Ok(empty_search_response(warnings));
            }
        };

        let mut filters = options.filters.clone();
        if filters.title.is_none() {
            filters.title = options.query.clone();
        }
        for (name, present) in [
            ("objectNumber", options.object_number.is_some()),
            ("description", options.description.is_some()),
            ("imageAvailable", options.image_available.is_some()),
            ("pageToken", options.page_token.is_some()),
        ] {
            if present {
                warnings.push(format!(
                    "'{name}' only applies to upstream searches and was ignored \
                     because local-only filters are present"
                ));
            }
        }

        let outcome = {
            let vocab = Arc::clone(&vocab);
            let filters = filters.clone();
            run_blocking(move || vocab.search(&filters)).await??
        };
        warnings.extend(outcome.warnings);

        if options.compact {
            let object_numbers: Vec<String> = outcome
                .results
                .iter()
                .map(|r| r.object_number.clone())
                .collect();
            let total = match outcome.total_results {
                Some(total) => Some(total),
                None => {
                    warnings.push(
                        "count reflects the returned page only; multi-filter totals are \
                         not computed",
                    );
                    Some(object_numbers.len() as u64)
                }
            };
            return Ok(SearchResponse {
                total_results: total,
                results: Vec::new(),
                object_numbers,
                next_page_token: None,
                warnings: warnings.into_vec(),
            });
        }

        let results = self
            .enrich_summaries(outcome.results, &mut warnings)
            .await;
        Ok(SearchResponse {
            total_results: outcome.total_results,
            results,
            object_numbers: Vec::new(),
            next_page_token: None,
            warnings: warnings.into_vec(),
        })
    }

    async fn search_upstream(&self, options: SearchOptions) -> RetrievalResult<SearchResponse> {
        let mut warnings = Warnings::new();
        let filters = &options.filters;
        let params = ApiSearchParams {
            query: options.query.clone(),
            title: filters.title.clone(),
            creator: filters.creator.clone(),
            object_number: options.object_number.clone(),
            object_type: filters.object_type.clone(),
            material: filters.material.clone(),
            technique: filters.technique.clone(),
            creation_date: filters.creation_date.clone(),
            description: options.description.clone(),
            image_available: options.image_available,
            page_token: options.page_token.clone(),
        };
        let page = self.linkedart.search(&params).await?;

        if options.object_number.is_some() && page.uris.is_empty() {
            return Err(RetrievalError::not_found(
                "artwork",
                options.object_number.unwrap_or_default(),
            ));
        }

        let limit = filters.effective_limit();
        let uris: Vec<String> = page.uris.into_iter().take(limit).collect();
        let details = self.resolve_details(&uris, &mut warnings).await;

        if options.compact {
            let object_numbers = details
                .iter()
                .flatten()
                .map(|d| {
                    d.object_number
                        .clone()
                        .unwrap_or_else(|| crate::linkedart::json::uri_tail(&d.uri).to_string())
                })
                .collect();
            return Ok(SearchResponse {
                total_results: page.total,
                results: Vec::new(),
                object_numbers,
                next_page_token: page.next_page_token,
                warnings: warnings.into_vec(),
            });
        }

        let results = uris
            .iter()
            .zip(details)
            .map(|(uri, detail)| match detail {
                Some(detail) => SearchHit {
                    summary: ArtworkSummary {
                        object_number: detail
                            .object_number
                            .clone()
                            .unwrap_or_else(|| crate::linkedart::json::uri_tail(uri).to_string()),
                        title: Some(detail.title.clone()),
                        creator: Some(detail.creator.clone()),
                        date: Some(detail.date.clone()),
                        object_type: detail.object_types.first().cloned(),
                        url: detail.web_page.clone(),
                        nearest_place: None,
                        distance_km: None,
                    },
                    detail: Some(detail),
                },
                None => SearchHit {
                    summary: ArtworkSummary {
                        object_number: crate::linkedart::json::uri_tail(uri).to_string(),
                        title: None,
                        creator: None,
                        date: None,
                        object_type: None,
                        url: Some(uri.clone()),
                        nearest_place: None,
                        distance_km: None,
                    },
                    detail: None,
                },
            })
            .collect();

        Ok(SearchResponse {
            total_results: page.total,
            results,
            object_numbers: Vec::new(),
            next_page_token: page.next_page_token,
            warnings: warnings.into_vec(),
        })
    }

    /// Enrich local summaries with detail records, bounded-parallel.
    /// Failures degrade to the bare summary.
    async fn enrich_summaries(
        &self,
        summaries: Vec<ArtworkSummary>,
        warnings: &mut Warnings,
    ) -> Vec<SearchHit> {
        let mut set: JoinSet<(usize, Option<ArtworkDetail>)> = JoinSet::new();
        let concurrency = self.settings.http.resolve_concurrency.max(1);
        let mut queue: Vec<(usize, String)> = summaries
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.object_number.clone()))
            .collect();
        queue.reverse();
        let mut details: Vec<Option<ArtworkDetail>> = (0..summaries.len()).map(|_| None).collect();
        let mut failures = 0usize;

        loop {
            while set.len() < concurrency
                && let Some((index, object_number)) = queue.pop()
            {
                let linkedart = Arc::clone(&self.linkedart);
                set.spawn(async move {
                    let detail = match linkedart.resolve_object_uri(&object_number).await {
                        Ok(uri) => linkedart.detail(&uri).await.ok(),
                        Err(_) => None,
                    };
                    (index, detail)
                });
            }
            match set.join_next().await {
                Some(Ok((index, detail))) => {
                    if detail.is_none() {
                        failures += 1;
                    }
                    details[index] = detail;
                }
                Some(Err(e)) => {
                    tracing::warn!(target: "service", "enrichment task panicked: {e}");
                    failures += 1;
                }
                None => break,
            }
        }
        if failures > 0 {
            warnings.push(format!(
                "{failures} result(s) could not be enriched with Linked Art detail"
            ));
        }

        summaries
            .into_iter()
            .zip(details)
            .map(|(summary, detail)| SearchHit { summary, detail })
            .collect()
    }

    /// Resolve detail records for known URIs, bounded-parallel; failures
    /// yield `None` and one aggregate warning.
    async fn resolve_details(
        &self,
        uris: &[String],
        warnings: &mut Warnings,
    ) -> Vec<Option<ArtworkDetail>> {
        let mut set: JoinSet<(usize, Option<ArtworkDetail>)> = JoinSet::new();
        let concurrency = self.settings.http.resolve_concurrency.max(1);
        let mut queue: Vec<(usize, String)> = uris
            .iter()
            .enumerate()
            .map(|(i, u)| (i, u.clone()))
            .collect();
        queue.reverse();
        let mut details: Vec<Option<ArtworkDetail>> = (0..uris.len()).map(|_| None).collect();
        let mut failures = 0usize;

        loop {
            while set.len() < concurrency
                && let Some((index, uri)) = queue.pop()
            {
                let linkedart = Arc::clone(&self.linkedart);
                set.spawn(async move { (index, linkedart.detail(&uri).await.ok()) });
            }
            match set.join_next().await {
                Some(Ok((index, detail))) => {
                    if detail.is_none() {
                        failures += 1;
                    }
                    details[index] = detail;
                }
                Some(Err(e)) => {
                    tracing::warn!(target: "service", "detail task panicked: {e}");
                    failures += 1;
                }
                None => break,
            }
        }
        if failures > 0 {
            warnings.push(format!("{failures} detail record(s) failed to resolve"));
        }
        details
    }

    // ---- semantic search ------------------------------------------------

    /// Semantic search with optional structured narrowing. The supported
    /// filter subset is type, material, technique, creationDate, creator.
    pub async fn semantic_search(
        &self,
        query: &str,
        filters: Option<SearchFilters>,
        max_results: usize,
    ) -> RetrievalResult<SemanticSearchResponse> {
        let mut warnings = Warnings::new();
        let query = query.trim().to_string();
        if query.is_empty() {
            return Err(RetrievalError::validation("semantic search requires a query"));
        }
        let k = max_results.clamp(1, 100);

        let (embedder, engine) = match (self.embedder.get(), self.semantic.get()) {
            (Ok(embedder), Ok(engine)) => (embedder, engine),
            (Err(reason), _) | (_, Err(reason)) => {
                warnings.push(format!("semantic search unavailable: {reason}"));
                return Ok(SemanticSearchResponse {
                    mode: "semantic",
                    results: Vec::new(),
                    warnings: warnings.into_vec(),
                });
            }
        };

        let filters = filters.filter(|f| !f.is_empty());
        let candidates = match &filters {
            Some(filters) => match self.vocab.get() {
                Ok(vocab) => {
                    let filters = filters.clone();
                    let vocab = Arc::clone(&vocab);
                    let (candidates, filter_warnings) =
                        run_blocking(move || vocab.candidate_object_numbers(&filters)).await??;
                    warnings.extend(filter_warnings);
                    Some(candidates)
                }
                Err(reason) => {
                    warnings.push(format!(
                        "structured filters dropped: vocabulary index unavailable ({reason})"
                    ));
                    None
                }
            },
            None => None,
        };

        let mode = if candidates.is_some() {
            "semantic+filtered"
        } else {
            "semantic"
        };

        let (hits, approximate) = {
            let query = query.clone();
            run_blocking(move || -> RetrievalResult<_> {
                let embedded = embedder
                    .embed_query_int8(&query)
                    .map_err(|e| RetrievalError::Embedding {
                        reason: e.to_string(),
                    })?;
                match candidates {
                    Some(candidates) => {
                        let filtered = engine.filtered_knn(&embedded, &candidates, k)?;
                        Ok((filtered.hits, filtered.approximate))
                    }
                    None => Ok((engine.knn(&embedded, k)?, false)),
                }
            })
            .await??
        };
        if approximate {
            warnings.push(
                "candidate set exceeded the exact-ranking threshold; results were ranked \
                 approximately by post-filtering an unfiltered scan",
            );
        }
        if hits.is_empty() && warnings.is_empty() {
            warnings.push("no semantically similar artworks found");
        }

        // Decorate hits from the structured index: summary columns plus the
        // reconstructed source text.
        let decorated = match self.vocab.get() {
            Ok(vocab) => {
                let object_numbers: Vec<String> =
                    hits.iter().map(|h| h.object_number.clone()).collect();
                let vocab_for_summaries = Arc::clone(&vocab);
                let numbers = object_numbers.clone();
                let mut summaries =
                    run_blocking(move || vocab_for_summaries.summaries_for(&numbers)).await??;
                let mut results = Vec::with_capacity(hits.len());
                for hit in &hits {
                    let summary = summaries.remove(&hit.object_number);
                    let source_text = {
                        let vocab = Arc::clone(&vocab);
                        let object_number = hit.object_number.clone();
                        run_blocking(move || vocab.source_text(&object_number)).await??
                    };
                    results.push(SemanticSearchHit {
                        object_number: hit.object_number.clone(),
                        title: summary.as_ref().and_then(|s| s.title.clone()),
                        creator: summary.as_ref().and_then(|s| s.creator.clone()),
                        date: summary.as_ref().and_then(|s| s.date.clone()),
                        object_type: summary.as_ref().and_then(|s| s.object_type.clone()),
                        similarity: hit.similarity,
                        source_text,
                        url: summary.as_ref().and_then(|s| s.url.clone()),
                    });
                }
                results
            }
            Err(_) => hits
                .iter()
                .map(|hit| SemanticSearchHit {
                    object_number: hit.object_number.clone(),
                    title: None,
                    creator: None,
                    date: None,
                    object_type: None,
                    similarity: hit.similarity,
                    source_text: None,
                    url: None,
                })
                .collect(),
        };

        Ok(SemanticSearchResponse {
            mode,
            results: decorated,
            warnings: warnings.into_vec(),
        })
    }

    // ---- detail, bibliography, image ------------------------------------

    /// Enriched detail record, by object number or LOD URI.
    pub async fn artwork_detail(&self, id: &str) -> RetrievalResult<ArtworkDetail> {
        let uri = self.resolve_id(id).await?;
        self.linkedart.detail(&uri).await
    }

    /// Normalised bibliography. `full = false` returns the count only;
    /// `limit = 0` means all entries.
    pub async fn bibliography(
        &self,
        object_number: &str,
        full: bool,
        limit: usize,
    ) -> RetrievalResult<BibliographyOutcome> {
        let uri = self.resolve_id(object_number).await?;
        let mut outcome = self.linkedart.bibliography(&uri, full, limit).await?;
        if outcome.object_number.is_none() {
            outcome.object_number = Some(object_number.to_string());
        }
        Ok(outcome)
    }

    /// IIIF image descriptor, `None` when the object has no image chain.
    pub async fn image_info(&self, object_number: &str) -> RetrievalResult<Option<ImageInfo>> {
        let uri = self.resolve_id(object_number).await?;
        self.linkedart.image_info(&uri).await
    }

    async fn resolve_id(&self, id: &str) -> RetrievalResult<String> {
        if id.starts_with("http://") || id.starts_with("https://") {
            Ok(id.to_string())
        } else {
            self.linkedart.resolve_object_uri(id).await
        }
    }

    // ---- iconclass ------------------------------------------------------

    pub async fn iconclass_search(
        &self,
        query: &str,
        lang: &str,
        max_results: usize,
        only_with_artworks: bool,
    ) -> RetrievalResult<(Vec<IconclassEntry>, Vec<String>)> {
        let mut warnings = Warnings::new();
        let engine = match self.iconclass.get() {
            Ok(engine) => engine,
            Err(reason) => {
                warnings.push(format!("iconclass index unavailable: {reason}"));
                return Ok((Vec::new(), warnings.into_vec()));
            }
        };
        let query = query.to_string();
        let lang = lang.to_string();
        let (entries, search_warnings) = run_blocking(move || {
            engine.search(&query, &lang, max_results.clamp(1, 100), only_with_artworks)
        })
        .await??;
        warnings.extend(search_warnings);
        Ok((entries, warnings.into_vec()))
    }

    pub async fn iconclass_browse(
        &self,
        notation: &str,
        lang: &str,
    ) -> RetrievalResult<BrowseOutcome> {
        let engine = self
            .iconclass
            .get()
            .map_err(|reason| RetrievalError::index_unavailable("iconclass", reason))?;
        let notation = notation.to_string();
        let lang = lang.to_string();
        run_blocking(move || engine.browse(&notation, &lang)).await?
    }

    pub async fn iconclass_semantic(
        &self,
        query: &str,
        lang: &str,
        max_results: usize,
        only_with_artworks: bool,
    ) -> RetrievalResult<(Vec<IconclassEntry>, Vec<String>)> {
        let mut warnings = Warnings::new();
        let (engine, embedder) = match (self.iconclass.get(), self.embedder.get()) {
            (Ok(engine), Ok(embedder)) => (engine, embedder),
            (Err(reason), _) | (_, Err(reason)) => {
                warnings.push(format!("iconclass semantic search unavailable: {reason}"));
                return Ok((Vec::new(), warnings.into_vec()));
            }
        };
        let query = query.to_string();
        let lang = lang.to_string();
        let (entries, search_warnings) = run_blocking(move || -> RetrievalResult<_> {
            let embedded = embedder
                .embed_query_int8(&query)
                .map_err(|e| RetrievalError::Embedding {
                    reason: e.to_string(),
                })?;
            engine.search_semantic(&embedded, &lang, max_results.clamp(1, 100), only_with_artworks)
        })
        .await??;
        warnings.extend(search_warnings);
        Ok((entries, warnings.into_vec()))
    }

    // ---- change feed ----------------------------------------------------

    pub async fn change_feed(&self, options: ChangeFeedOptions) -> RetrievalResult<ChangeFeedPage> {
        let params = HarvestParams {
            from: options.from,
            until: options.until,
            set: options.set,
            resumption_token: options.resumption_token,
        };
        if options.identifiers_only {
            Ok(ChangeFeedPage::Identifiers(
                self.oai.list_identifiers(&params).await?,
            ))
        } else {
            Ok(ChangeFeedPage::Records(self.oai.list_records(&params).await?))
        }
    }

    pub async fn list_sets(&self) -> RetrievalResult<Vec<OaiSet>> {
        self.oai.list_sets().await
    }
}

/// Filters that only the local vocabulary index can answer.
fn uses_local_index(filters: &SearchFilters) -> bool {
    filters.subject.is_some()
        || filters.depicted_person.is_some()
        || filters.depicted_place.is_some()
        || filters.production_place.is_some()
        || filters.birth_place.is_some()
        || filters.death_place.is_some()
        || filters.profession.is_some()
        || filters.collection_set.is_some()
        || filters.production_role.is_some()
        || filters.iconclass.is_some()
        || filters.license.is_some()
        || filters.inscription.is_some()
        || filters.provenance.is_some()
        || filters.credit_line.is_some()
        || filters.narrative.is_some()
        || filters.min_height.is_some()
        || filters.max_height.is_some()
        || filters.min_width.is_some()
        || filters.max_width.is_some()
        || filters.has_geo()
}

fn empty_search_response(warnings: Warnings) -> SearchResponse {
    SearchResponse {
        total_results: Some(0),
        results: Vec::new(),
        object_numbers: Vec::new(),
        next_page_token: None,
        warnings: warnings.into_vec(),
    }
}

async fn run_blocking<T, F>(f: F) -> RetrievalResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RetrievalError::Integrity {
            reason: format!("worker task failed: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_routing_detection() {
        let api_only = SearchFilters {
            creator: Some("Rembrandt".to_string()),
            object_type: Some("painting".to_string()),
            creation_date: Some("164*".to_string()),
            ..Default::default()
        };
        assert!(!uses_local_index(&api_only));

        let local = SearchFilters {
            creator: Some("Rembrandt".to_string()),
            depicted_place: Some("Amsterdam".to_string()),
            ..Default::default()
        };
        assert!(uses_local_index(&local));

        let geo = SearchFilters {
            near_lat: Some(52.0),
            near_lon: Some(4.8),
            ..Default::default()
        };
        assert!(uses_local_index(&geo));
    }

    #[tokio::test]
    async fn search_without_filters_is_validation_error() {
        let catalogue = Catalogue::new_degraded(Settings::default()).unwrap();
        let err = catalogue.search(SearchOptions::default()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Validation { .. }));
    }

    #[tokio::test]
    async fn degraded_vocab_returns_empty_with_diagnostic() {
        let catalogue = Catalogue::new_degraded(Settings::default()).unwrap();

        let response = catalogue
            .search(SearchOptions {
                filters: SearchFilters {
                    depicted_place: Some("Amsterdam".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(response.results.is_empty());
        assert!(
            response
                .warnings
                .iter()
                .any(|w| w.contains("vocabulary index unavailable"))
        );

        let semantic = catalogue
            .semantic_search("solitude", None, 10)
            .await
            .unwrap();
        assert!(semantic.results.is_empty());
        assert!(
            semantic
                .warnings
                .iter()
                .any(|w| w.contains("semantic search unavailable"))
        );

        let (iconclass, warnings) = catalogue
            .iconclass_search("crucifixion", "en", 10, false)
            .await
            .unwrap();
        assert!(iconclass.is_empty());
        assert!(warnings.iter().any(|w| w.contains("unavailable")));
    }
}
