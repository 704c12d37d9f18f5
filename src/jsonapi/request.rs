use axum::http::Method;
use std::collections::{BTreeMap, HashMap};

use crate::meta::is_id;

/// Wire-level operation requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Intent {
    #[default]
    ListResources,
    FindResource,
    CreateResource,
    UpdateResource,
    DeleteResource,
    GetRelatedResources,
    GetRelationship,
    SetRelationship,
    AppendToRelationship,
    RemoveFromRelationship,
    CollectionAction,
    ResourceAction,
}

impl Intent {
    /// Intents that carry a JSON:API document in the request body
    pub fn document_expected(&self) -> bool {
        matches!(
            self,
            Intent::CreateResource
                | Intent::UpdateResource
                | Intent::SetRelationship
                | Intent::AppendToRelationship
                | Intent::RemoveFromRelationship
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ListResources => "list-resources",
            Intent::FindResource => "find-resource",
            Intent::CreateResource => "create-resource",
            Intent::UpdateResource => "update-resource",
            Intent::DeleteResource => "delete-resource",
            Intent::GetRelatedResources => "get-related-resources",
            Intent::GetRelationship => "get-relationship",
            Intent::SetRelationship => "set-relationship",
            Intent::AppendToRelationship => "append-to-relationship",
            Intent::RemoveFromRelationship => "remove-from-relationship",
            Intent::CollectionAction => "collection-action",
            Intent::ResourceAction => "resource-action",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    MethodNotAllowed(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

/// Action names registered for a resource type. The parser needs them to
/// tell actions apart from ids and related resources.
#[derive(Debug, Clone, Default)]
pub struct ActionNames {
    pub collection: Vec<String>,
    pub resource: Vec<String>,
}

/// Parsed JSON:API request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub intent: Intent,
    pub prefix: String,
    pub resource_type: String,
    pub resource_id: String,
    pub related_resource: String,
    pub relationship: String,
    pub collection_action: String,
    pub resource_action: String,
    /// Filter values by field name, from `filter[name]=a,b`
    pub filters: BTreeMap<String, Vec<String>>,
    /// Signed field names, from `sort=a,-b`
    pub sorting: Vec<String>,
    pub page_number: u64,
    pub page_size: u64,
    /// Sparse fieldsets by resource type, from `fields[type]=a,b`
    pub fields: HashMap<String, Vec<String>>,
}

impl Request {
    pub fn new(intent: Intent, prefix: &str, resource_type: &str) -> Self {
        Self {
            intent,
            prefix: normalize_prefix(prefix),
            resource_type: resource_type.to_string(),
            ..Default::default()
        }
    }

    /// Extract the resource type from a path without parsing the rest.
    pub fn resource_type(path: &str, prefix: &str) -> Result<String, RequestError> {
        segments(path, prefix)?
            .first()
            .map(|s| s.to_string())
            .ok_or_else(|| RequestError::NotFound("resource type not found".to_string()))
    }

    /// Parse method, path and query string.
    pub fn parse(
        method: &Method,
        path: &str,
        query: Option<&str>,
        prefix: &str,
        actions: &ActionNames,
    ) -> Result<Self, RequestError> {
        let segments = segments(path, prefix)?;
        let unsupported = || RequestError::MethodNotAllowed("unsupported method".to_string());

        let mut req = Request::new(Intent::ListResources, prefix, segments[0]);

        match segments.as_slice() {
            [_] => {
                req.intent = match *method {
                    Method::GET => Intent::ListResources,
                    Method::POST => Intent::CreateResource,
                    _ => return Err(unsupported()),
                };
            }
            [_, name] if actions.collection.iter().any(|a| a == name) => {
                req.intent = Intent::CollectionAction;
                req.collection_action = name.to_string();
            }
            [_, id] => {
                req.resource_id = id.to_string();
                req.intent = match *method {
                    Method::GET => Intent::FindResource,
                    Method::PATCH => Intent::UpdateResource,
                    Method::DELETE => Intent::DeleteResource,
                    _ => return Err(unsupported()),
                };
            }
            [_, id, name] if actions.resource.iter().any(|a| a == name) => {
                req.intent = Intent::ResourceAction;
                req.resource_id = id.to_string();
                req.resource_action = name.to_string();
            }
            [_, id, related] => {
                if *method != Method::GET {
                    return Err(unsupported());
                }
                req.intent = Intent::GetRelatedResources;
                req.resource_id = id.to_string();
                req.related_resource = related.to_string();
            }
            [_, id, "relationships", relationship] => {
                req.resource_id = id.to_string();
                req.relationship = relationship.to_string();
                req.intent = match *method {
                    Method::GET => Intent::GetRelationship,
                    Method::PATCH => Intent::SetRelationship,
                    Method::POST => Intent::AppendToRelationship,
                    Method::DELETE => Intent::RemoveFromRelationship,
                    _ => return Err(unsupported()),
                };
            }
            _ => return Err(RequestError::NotFound("invalid path".to_string())),
        }

        if let Some(query) = query {
            req.parse_query(query)?;
        }

        Ok(req)
    }

    fn parse_query(&mut self, query: &str) -> Result<(), RequestError> {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if let Some(name) = bracketed(&key, "filter") {
                self.filters.entry(name.to_string()).or_default().extend(split_list(&value));
            } else if let Some(resource_type) = bracketed(&key, "fields") {
                self.fields.insert(resource_type.to_string(), split_list(&value));
            } else if key == "sort" {
                self.sorting.extend(split_list(&value));
            } else if key == "page[number]" {
                self.page_number = value
                    .parse()
                    .map_err(|_| RequestError::InvalidParameter("invalid page number".to_string()))?;
            } else if key == "page[size]" {
                self.page_size = value
                    .parse()
                    .map_err(|_| RequestError::InvalidParameter("invalid page size".to_string()))?;
            }
        }

        Ok(())
    }

    /// Path of the resource collection, e.g. `/api/posts`
    pub fn collection_path(&self) -> String {
        format!("{}/{}", self.prefix, self.resource_type)
    }

    /// Path of a single resource, e.g. `/api/posts/<id>`
    pub fn resource_path(&self, id: &str) -> String {
        format!("{}/{}/{}", self.prefix, self.resource_type, id)
    }

    /// Path of the requested endpoint, without query parameters
    pub fn self_path(&self) -> String {
        let base = self.collection_path();
        match self.intent {
            Intent::ListResources | Intent::CreateResource => base,
            Intent::FindResource | Intent::UpdateResource | Intent::DeleteResource => {
                format!("{}/{}", base, self.resource_id)
            }
            Intent::GetRelatedResources => format!("{}/{}/{}", base, self.resource_id, self.related_resource),
            Intent::GetRelationship
            | Intent::SetRelationship
            | Intent::AppendToRelationship
            | Intent::RemoveFromRelationship => {
                format!("{}/{}/relationships/{}", base, self.resource_id, self.relationship)
            }
            Intent::CollectionAction => format!("{}/{}", base, self.collection_action),
            Intent::ResourceAction => format!("{}/{}/{}", base, self.resource_id, self.resource_action),
        }
    }

    /// Whether the resource id is present and well formed
    pub fn has_valid_id(&self) -> bool {
        self.resource_id.is_empty() || is_id(&self.resource_id)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn segments<'a>(path: &'a str, prefix: &str) -> Result<Vec<&'a str>, RequestError> {
    let prefix = normalize_prefix(prefix);
    let rest = path
        .strip_prefix(prefix.as_str())
        .ok_or_else(|| RequestError::NotFound("invalid path".to_string()))?;

    if !prefix.is_empty() && !rest.is_empty() && !rest.starts_with('/') {
        return Err(RequestError::NotFound("invalid path".to_string()));
    }

    let segments: Vec<&str> = rest.trim_matches('/').split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(RequestError::NotFound("invalid path".to_string()));
    }

    Ok(segments)
}

fn bracketed<'a>(key: &'a str, name: &str) -> Option<&'a str> {
    key.strip_prefix(name)?.strip_prefix('[')?.strip_suffix(']')
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
