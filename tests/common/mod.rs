#![allow(dead_code)]

use anyhow::{bail, Result};
use axum::http::{Method, StatusCode};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use monk_jsonapi::callback::{CallbackError, Validate};
use monk_jsonapi::database::MemoryStore;
use monk_jsonapi::jsonapi::Body;
use monk_jsonapi::meta::Flag;
use monk_jsonapi::{Controller, Group, Incoming, Kind, Meta, Model};

pub const PREFIX: &str = "/api";

pub static USER: Lazy<Arc<Meta>> = Lazy::new(|| {
    Arc::new(
        Meta::build("User", "users")
            .attribute("name", Kind::String)
            .filterable()
            .sortable()
            .attribute("email", Kind::String)
            .has_many("posts", "posts", "author")
            .has_one("profile", "profiles", "user")
            .finish()
            .unwrap(),
    )
});

pub static PROFILE: Lazy<Arc<Meta>> = Lazy::new(|| {
    Arc::new(
        Meta::build("Profile", "profiles")
            .attribute("bio", Kind::String)
            .to_one("user", "users")
            .finish()
            .unwrap(),
    )
});

pub static POST: Lazy<Arc<Meta>> = Lazy::new(|| {
    Arc::new(
        Meta::build("Post", "posts")
            .attribute("title", Kind::String)
            .filterable()
            .sortable()
            .attribute("published", Kind::Bool)
            .filterable()
            .attribute("text_body", Kind::String)
            .optional()
            .hidden("deleted_at", Kind::Timestamp)
            .optional()
            .flag(Flag::SoftDelete)
            .optional_to_one("author", "users")
            .filterable()
            .to_many("tags", "tags")
            .has_many("comments", "comments", "post")
            .finish()
            .unwrap(),
    )
});

pub static COMMENT: Lazy<Arc<Meta>> = Lazy::new(|| {
    Arc::new(
        Meta::build("Comment", "comments")
            .attribute("message", Kind::String)
            .to_one("post", "posts")
            .filterable()
            .finish()
            .unwrap(),
    )
});

pub static TAG: Lazy<Arc<Meta>> = Lazy::new(|| {
    Arc::new(
        Meta::build("Tag", "tags")
            .attribute("name", Kind::String)
            .finish()
            .unwrap(),
    )
});

pub static NOTE: Lazy<Arc<Meta>> = Lazy::new(|| {
    Arc::new(
        Meta::build("Note", "notes")
            .attribute("text", Kind::String)
            .attribute("create_token", Kind::String)
            .flag(Flag::IdempotentCreate)
            .attribute("update_token", Kind::String)
            .flag(Flag::ConsistentUpdate)
            .finish()
            .unwrap(),
    )
});

/// Typed view of a note
#[derive(Debug, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub text: String,
    pub create_token: String,
    pub update_token: String,
}

impl Model for Note {
    fn meta() -> Arc<Meta> {
        NOTE.clone()
    }
}

impl Validate for Note {
    fn validate(&self) -> Result<(), CallbackError> {
        if self.text.trim().is_empty() {
            return Err(CallbackError::safe("text is required"));
        }
        Ok(())
    }
}

pub fn users() -> Controller {
    Controller::new(USER.clone())
}

pub fn posts() -> Controller {
    Controller::new(POST.clone()).soft_delete(true)
}

pub fn comments() -> Controller {
    Controller::new(COMMENT.clone())
}

pub fn notes() -> Controller {
    Controller::new(NOTE.clone()).idempotent_create(true).consistent_update(true)
}

/// Response rendered to JSON
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub body: Value,
}

impl Response {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn id(&self) -> String {
        self.body["data"]["id"].as_str().unwrap_or_default().to_string()
    }

    pub fn detail(&self) -> &str {
        self.body["errors"][0]["detail"].as_str().unwrap_or_default()
    }

    /// Ids of the resources of a list response
    pub fn ids(&self) -> Vec<String> {
        self.body["data"]
            .as_array()
            .map(|items| items.iter().filter_map(|item| item["id"].as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }
}

pub struct Fixture {
    pub store: MemoryStore,
    pub group: Arc<Group>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_posts(posts())
    }

    /// Fixture with a customized posts controller
    pub fn with_posts(posts: Controller) -> Self {
        Self::build(vec![
            users(),
            posts,
            comments(),
            Controller::new(TAG.clone()),
            Controller::new(PROFILE.clone()),
            notes(),
        ])
    }

    /// Fixture with a customized notes controller
    pub fn with_notes(notes: Controller) -> Self {
        Self::build(vec![
            users(),
            posts(),
            comments(),
            Controller::new(TAG.clone()),
            Controller::new(PROFILE.clone()),
            notes,
        ])
    }

    pub fn build(controllers: Vec<Controller>) -> Self {
        let store = MemoryStore::new();
        let mut group = Group::new(Arc::new(store.clone()));
        for controller in controllers {
            group.add(controller).unwrap();
        }

        Self {
            store,
            group: group.finish().unwrap(),
        }
    }

    pub async fn send(&self, incoming: Incoming) -> Response {
        let reply = self.group.handle(PREFIX, incoming).await;
        let body = match reply.body {
            Body::Document(document) => serde_json::to_value(document).unwrap(),
            Body::Json(value) => value,
            Body::Bytes(_, bytes) => Value::String(String::from_utf8_lossy(&bytes).to_string()),
            Body::Empty => Value::Null,
        };

        Response { status: reply.status, body }
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Response {
        let mut incoming = Incoming::new(method, &format!("{}{}", PREFIX, path));
        if let Some(body) = body {
            incoming = incoming.with_body(serde_json::to_vec(&body).unwrap());
        }
        self.send(incoming).await
    }

    pub async fn get(&self, path: &str) -> Response {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Response {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Response {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.request(Method::DELETE, path, None).await
    }

    /// Create a resource and return its id
    pub async fn create(&self, resource_type: &str, attributes: Value, relationships: Value) -> Result<String> {
        let response = self
            .post(
                &format!("/{}", resource_type),
                json!({
                    "data": {
                        "type": resource_type,
                        "attributes": attributes,
                        "relationships": relationships,
                    }
                }),
            )
            .await;

        if response.status != StatusCode::CREATED {
            bail!("create {} failed with {}: {}", resource_type, response.status, response.body);
        }
        Ok(response.id())
    }
}

/// Relationship document pointing at one resource
pub fn to_one(resource_type: &str, id: &str) -> Value {
    json!({ "data": { "type": resource_type, "id": id } })
}

/// Relationship document pointing at a list of resources
pub fn to_many(resource_type: &str, ids: &[&str]) -> Value {
    let data: Vec<Value> = ids.iter().map(|id| json!({ "type": resource_type, "id": id })).collect();
    json!({ "data": data })
}
