//! OAI-PMH change feed client and EDM parser (C5).
//!
//! Streams incremental-harvest pages from the museum's OAI-PMH endpoint and
//! flattens the EDM/RDF record graph into domain records for downstream
//! change detection. The feed emits additions and metadata updates under
//! the same datestamp; a recent datestamp does not mean "new acquisition".

pub mod xml;

use crate::config::ApiConfig;
use crate::error::{RetrievalError, RetrievalResult};
use serde::Serialize;
use std::collections::HashMap;
use xml::Element;

const METADATA_PREFIX: &str = "edm";

/// A harvest set offered by the endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OaiSet {
    pub spec: String,
    pub name: String,
}

/// OAI record header, also used for `list_identifiers`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordHeader {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datestamp: Option<String>,
    pub sets: Vec<String>,
    pub deleted: bool,
}

/// Creator entity resolved from the record's `edm:Agent`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCreator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_date: Option<String>,
    /// Authority links keyed by source: viaf, ulan, wikidata, rkd.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub authorities: HashMap<&'static str, String>,
}

/// A typed subject tag on a record.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChangeSubject {
    Iconclass {
        notation: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Person {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    Place {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
}

/// A flattened EDM record. Missing sub-graphs produce `None` attributes,
/// never errors.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub header: RecordHeader,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lod_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    pub materials: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<ChangeCreator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iiif_service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rights_uri: Option<String>,
    pub subjects: Vec<ChangeSubject>,
}

/// One page of `list_records`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub records: Vec<ChangeRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumption_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_list_size: Option<u64>,
}

/// One page of `list_identifiers`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderPage {
    pub headers: Vec<RecordHeader>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumption_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_list_size: Option<u64>,
}

/// Selective-harvest parameters. A resumption token overrides every other
/// parameter per OAI-PMH semantics.
#[derive(Debug, Clone, Default)]
pub struct HarvestParams {
    pub from: Option<String>,
    pub until: Option<String>,
    pub set: Option<String>,
    pub resumption_token: Option<String>,
}

/// OAI-PMH client. Parsing is separated into pure functions so page
/// handling is testable without a network.
pub struct OaiClient {
    http: reqwest::Client,
    endpoint: String,
}

impl OaiClient {
    pub fn new(http: reqwest::Client, api: &ApiConfig) -> Self {
        Self {
            http,
            endpoint: api.oai_url.clone(),
        }
    }

    pub async fn list_sets(&self) -> RetrievalResult<Vec<OaiSet>> {
        let xml = self.request(&[("verb", "ListSets")]).await?;
        parse_sets_response(&xml, &self.endpoint)
    }

    pub async fn list_records(&self, params: &HarvestParams) -> RetrievalResult<RecordPage> {
        let query = build_query("ListRecords", params);
        let xml = self.request(&query).await?;
        parse_records_response(&xml, &self.endpoint)
    }

    pub async fn list_identifiers(&self, params: &HarvestParams) -> RetrievalResult<HeaderPage> {
        let query = build_query("ListIdentifiers", params);
        let xml = self.request(&query).await?;
        parse_identifiers_response(&xml, &self.endpoint)
    }

    async fn request(&self, query: &[(&str, &str)]) -> RetrievalResult<String> {
        tracing::debug!(target: "oai", "GET {} {query:?}", self.endpoint);
        let response = self
            .http
            .get(&self.endpoint)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

fn build_query<'a>(verb: &'a str, params: &'a HarvestParams) -> Vec<(&'a str, &'a str)> {
    let mut query = vec![("verb", verb)];
    if let Some(token) = params.resumption_token.as_deref() {
        query.push(("resumptionToken", token));
        return query;
    }
    query.push(("metadataPrefix", METADATA_PREFIX));
    if let Some(from) = params.from.as_deref() {
        query.push(("from", from));
    }
    if let Some(until) = params.until.as_deref() {
        query.push(("until", until));
    }
    if let Some(set) = params.set.as_deref() {
        query.push(("set", set));
    }
    query
}

// ---- parsing ------------------------------------------------------------

/// Check the OAI error element. `noRecordsMatch` is empty-but-successful;
/// everything else surfaces code and message.
fn check_error(root: &Element, endpoint: &str) -> RetrievalResult<bool> {
    let Some(error) = root.child("error") else {
        return Ok(false);
    };
    let code = error.attr("code").unwrap_or("unknown");
    if code == "noRecordsMatch" {
        return Ok(true);
    }
    Err(RetrievalError::external(
        endpoint,
        None,
        format!("OAI-PMH {code}: {}", error.text_content().unwrap_or_default()),
    ))
}

fn parse_root(xml: &str, endpoint: &str) -> RetrievalResult<Element> {
    Element::parse(xml).map_err(|e| RetrievalError::external(endpoint, None, e.to_string()))
}

fn resumption(list: &Element) -> (Option<String>, Option<u64>) {
    let Some(token) = list.child("resumptionToken") else {
        return (None, None);
    };
    let size = token.attr("completeListSize").and_then(|s| s.parse().ok());
    (token.text_content().map(str::to_string), size)
}

pub fn parse_sets_response(xml: &str, endpoint: &str) -> RetrievalResult<Vec<OaiSet>> {
    let root = parse_root(xml, endpoint)?;
    if check_error(&root, endpoint)? {
        return Ok(Vec::new());
    }
    let Some(list) = root.child("ListSets") else {
        return Ok(Vec::new());
    };
    Ok(list
        .children_named("set")
        .filter_map(|set| {
            Some(OaiSet {
                spec: set.child("setSpec")?.text_content()?.to_string(),
                name: set
                    .child("setName")
                    .and_then(Element::text_content)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect())
}

pub fn parse_records_response(xml: &str, endpoint: &str) -> RetrievalResult<RecordPage> {
    let root = parse_root(xml, endpoint)?;
    if check_error(&root, endpoint)? {
        return Ok(RecordPage {
            records: Vec::new(),
            resumption_token: None,
            complete_list_size: None,
        });
    }
    let Some(list) = root.child("ListRecords") else {
        return Err(RetrievalError::external(
            endpoint,
            None,
            "response carries neither ListRecords nor an error element",
        ));
    };
    let (resumption_token, complete_list_size) = resumption(list);
    let records = list.children_named("record").map(parse_record).collect();
    Ok(RecordPage {
        records,
        resumption_token,
        complete_list_size,
    })
}

pub fn parse_identifiers_response(xml: &str, endpoint: &str) -> RetrievalResult<HeaderPage> {
    let root = parse_root(xml, endpoint)?;
    if check_error(&root, endpoint)? {
        return Ok(HeaderPage {
            headers: Vec::new(),
            resumption_token: None,
            complete_list_size: None,
        });
    }
    let Some(list) = root.child("ListIdentifiers") else {
        return Err(RetrievalError::external(
            endpoint,
            None,
            "response carries neither ListIdentifiers nor an error element",
        ));
    };
    let (resumption_token, complete_list_size) = resumption(list);
    let headers = list.children_named("header").map(parse_header).collect();
    Ok(HeaderPage {
        headers,
        resumption_token,
        complete_list_size,
    })
}

fn parse_header(header: &Element) -> RecordHeader {
    RecordHeader {
        identifier: header
            .child("identifier")
            .and_then(Element::text_content)
            .unwrap_or_default()
            .to_string(),
        datestamp: header
            .child("datestamp")
            .and_then(Element::text_content)
            .map(str::to_string),
        sets: header
            .children_named("setSpec")
            .filter_map(Element::text_content)
            .map(str::to_string)
            .collect(),
        deleted: header.attr("status") == Some("deleted"),
    }
}

/// Entity lookup over the record's RDF graph: `rdf:about` URI → element,
/// for every description-like child. `dc:`/`dcterms:` resource references
/// resolve through this map.
fn entity_map(rdf: &Element) -> HashMap<&str, &Element> {
    const ENTITY_NAMES: [&str; 6] = [
        "rdf:Description",
        "skos:Concept",
        "edm:Place",
        "edm:Agent",
        "edm:WebResource",
        "ore:Aggregation",
    ];
    rdf.children
        .iter()
        .filter(|c| ENTITY_NAMES.contains(&c.name.as_str()))
        .filter_map(|c| c.attr("rdf:about").map(|about| (about, c)))
        .collect()
}

fn parse_record(record: &Element) -> ChangeRecord {
    let header = record
        .child("header")
        .map(parse_header)
        .unwrap_or_else(|| RecordHeader {
            identifier: String::new(),
            datestamp: None,
            sets: Vec::new(),
            deleted: false,
        });
    let sets = header.sets.clone();

    let rdf = record
        .child("metadata")
        .and_then(|m| m.child("rdf:RDF"));
    let Some(rdf) = rdf else {
        return ChangeRecord {
            header,
            object_number: None,
            lod_uri: None,
            title: None,
            description: None,
            date: None,
            dimensions: None,
            object_type: None,
            materials: Vec::new(),
            creator: None,
            image_url: None,
            iiif_service_url: None,
            rights_uri: None,
            subjects: Vec::new(),
        };
    };

    let entities = entity_map(rdf);
    let cho = rdf.child("edm:ProvidedCHO");
    let aggregation = rdf.child("ore:Aggregation");

    let object_number = cho
        .and_then(|c| c.child("dc:identifier"))
        .and_then(Element::text_content)
        .map(str::to_string);
    let lod_uri = cho.and_then(|c| c.attr("rdf:about")).map(str::to_string);

    let title = cho.and_then(|c| language_preferred(c, "dc:title"));
    let description = cho.and_then(|c| language_preferred(c, "dc:description"));
    let date = cho
        .and_then(|c| c.child("dcterms:created").or_else(|| c.child("dc:date")))
        .and_then(Element::text_content)
        .map(str::to_string);
    let dimensions = cho.and_then(|c| language_preferred(c, "dcterms:extent"));

    let object_type = cho
        .and_then(|c| c.child("dc:type"))
        .and_then(|t| resolved_label(t, &entities));
    let materials = cho
        .map(|c| {
            c.children_named("dcterms:medium")
                .filter_map(|m| resolved_label(m, &entities))
                .collect()
        })
        .unwrap_or_default();

    let creator = cho
        .and_then(|c| c.child("dc:creator"))
        .and_then(|c| parse_creator(c, &entities));

    let image_url = aggregation
        .and_then(|a| a.child("edm:isShownBy"))
        .and_then(|e| e.attr("rdf:resource"))
        .map(str::to_string);
    // isShownBy → WebResource → has_service
    let iiif_service_url = image_url
        .as_deref()
        .and_then(|url| entities.get(url))
        .and_then(|resource| resource.child("svcs:has_service"))
        .and_then(|s| s.attr("rdf:resource"))
        .map(str::to_string);
    let rights_uri = aggregation
        .and_then(|a| a.child("edm:rights"))
        .and_then(|e| e.attr("rdf:resource"))
        .map(str::to_string);

    let subjects = cho
        .map(|c| {
            c.children_named("dc:subject")
                .filter_map(|s| parse_subject(s, &entities))
                .collect()
        })
        .unwrap_or_default();

    ChangeRecord {
        header,
        object_number,
        lod_uri,
        title,
        description,
        date,
        dimensions,
        object_type,
        materials,
        creator,
        image_url,
        iiif_service_url,
        rights_uri,
        subjects,
    }
}

/// English-preferred language fallback over repeated literal elements.
fn language_preferred(parent: &Element, name: &str) -> Option<String> {
    let candidates: Vec<&Element> = parent.children_named(name).collect();
    candidates
        .iter()
        .find(|e| e.attr("xml:lang") == Some("en"))
        .or_else(|| candidates.first())
        .and_then(|e| e.text_content())
        .map(str::to_string)
}

/// Resolve an element that is either an inline literal or an
/// `rdf:resource` reference into a human label.
fn resolved_label(element: &Element, entities: &HashMap<&str, &Element>) -> Option<String> {
    if let Some(text) = element.text_content() {
        return Some(text.to_string());
    }
    let uri = element.attr("rdf:resource")?;
    let entity = entities.get(uri)?;
    pref_label(entity)
}

/// English-preferred `skos:prefLabel` of an entity.
fn pref_label(entity: &Element) -> Option<String> {
    language_preferred(entity, "skos:prefLabel")
}

fn parse_creator(
    creator: &Element,
    entities: &HashMap<&str, &Element>,
) -> Option<ChangeCreator> {
    let Some(uri) = creator.attr("rdf:resource") else {
        // Inline creator statement without an agent entity
        return creator.text_content().map(|name| ChangeCreator {
            name: Some(name.to_string()),
            ..Default::default()
        });
    };
    let Some(agent) = entities.get(uri) else {
        return Some(ChangeCreator {
            name: None,
            ..Default::default()
        });
    };

    let mut authorities = HashMap::new();
    for same_as in agent.children_named("owl:sameAs") {
        let Some(target) = same_as.attr("rdf:resource") else {
            continue;
        };
        let source = if target.contains("viaf.org") {
            Some("viaf")
        } else if target.contains("vocab.getty.edu/ulan") {
            Some("ulan")
        } else if target.contains("wikidata.org") {
            Some("wikidata")
        } else if target.contains("rkd.nl") {
            Some("rkd")
        } else {
            None
        };
        if let Some(source) = source {
            authorities.entry(source).or_insert_with(|| target.to_string());
        }
    }

    Some(ChangeCreator {
        name: pref_label(agent),
        birth_date: agent
            .child("rdaGr2:dateOfBirth")
            .and_then(Element::text_content)
            .map(str::to_string),
        death_date: agent
            .child("rdaGr2:dateOfDeath")
            .and_then(Element::text_content)
            .map(str::to_string),
        authorities,
    })
}

/// Type a subject reference through the entity map. Iconclass notations are
/// recognised by a `skos:altLabel` beginning with a digit.
fn parse_subject(
    subject: &Element,
    entities: &HashMap<&str, &Element>,
) -> Option<ChangeSubject> {
    let uri = subject.attr("rdf:resource")?;
    let entity = entities.get(uri)?;
    match entity.name.as_str() {
        "skos:Concept" => {
            let notation = entity
                .children_named("skos:altLabel")
                .filter_map(Element::text_content)
                .find(|l| l.chars().next().is_some_and(|c| c.is_ascii_digit()))?;
            Some(ChangeSubject::Iconclass {
                notation: notation.to_string(),
                label: pref_label(entity),
            })
        }
        "edm:Agent" => Some(ChangeSubject::Person {
            name: pref_label(entity)?,
            uri: Some(uri.to_string()),
        }),
        "edm:Place" => Some(ChangeSubject::Place {
            name: pref_label(entity)?,
            uri: Some(uri.to_string()),
        }),
        _ => None,
    }
}
