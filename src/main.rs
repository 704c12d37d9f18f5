use axum::{routing::get, Router};
use clap::Parser;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use monk_jsonapi::callback::{
    DependentResourcesValidator, ReferencedResourcesValidator, TimestampValidator, UniqueFieldValidator,
};
use monk_jsonapi::config::config;
use monk_jsonapi::database::{MemoryStore, PgStore, Store};
use monk_jsonapi::meta::Flag;
use monk_jsonapi::{ConfigError, Controller, Group, Kind, Meta};

#[derive(Parser)]
#[command(name = "monk-jsonapi")]
#[command(about = "Demo JSON:API server with users, posts and comments")]
#[command(version)]
struct Args {
    #[arg(long, default_value_t = 3000, help = "Port to listen on")]
    port: u16,

    #[arg(long, default_value = "/api", help = "Path prefix of the resource endpoints")]
    prefix: String,

    #[arg(long, help = "Postgres URL, the in-memory store is used when absent")]
    database_url: Option<String>,
}

static USER: Lazy<Arc<Meta>> = Lazy::new(|| {
    Arc::new(
        Meta::build("User", "users")
            .attribute("name", Kind::String)
            .filterable()
            .sortable()
            .attribute("email", Kind::String)
            .filterable()
            .has_many("posts", "posts", "author")
            .finish()
            .unwrap_or_else(|e| panic!("invalid user model: {}", e)),
    )
});

static POST: Lazy<Arc<Meta>> = Lazy::new(|| {
    Arc::new(
        Meta::build("Post", "posts")
            .attribute("title", Kind::String)
            .filterable()
            .sortable()
            .attribute("published", Kind::Bool)
            .filterable()
            .attribute("text_body", Kind::String)
            .optional()
            .attribute("created_at", Kind::Timestamp)
            .optional()
            .flag(Flag::CreatedTimestamp)
            .sortable()
            .attribute("updated_at", Kind::Timestamp)
            .optional()
            .flag(Flag::UpdatedTimestamp)
            .hidden("deleted_at", Kind::Timestamp)
            .optional()
            .flag(Flag::SoftDelete)
            .to_one("author", "users")
            .filterable()
            .has_many("comments", "comments", "post")
            .finish()
            .unwrap_or_else(|e| panic!("invalid post model: {}", e)),
    )
});

static COMMENT: Lazy<Arc<Meta>> = Lazy::new(|| {
    Arc::new(
        Meta::build("Comment", "comments")
            .attribute("message", Kind::String)
            .to_one("post", "posts")
            .filterable()
            .optional_to_one("parent", "comments")
            .finish()
            .unwrap_or_else(|e| panic!("invalid comment model: {}", e)),
    )
});

fn group(store: Arc<dyn Store>) -> Result<Arc<Group>, ConfigError> {
    let mut group = Group::new(store);

    group
        .add(
            Controller::new(USER.clone())
                .validator(UniqueFieldValidator::without_zero("email"))
                .validator(DependentResourcesValidator::new().dependent(POST.clone(), "author")),
        )?
        .add(
            Controller::new(POST.clone())
                .list_limit(100)
                .soft_delete(true)
                .validator(TimestampValidator)
                .validator(ReferencedResourcesValidator::new().reference("author", USER.clone())),
        )?
        .add(
            Controller::new(COMMENT.clone())
                .validator(ReferencedResourcesValidator::new().reference("post", POST.clone())),
        )?;

    group.finish()
}

async fn store(database_url: Option<String>) -> anyhow::Result<Arc<dyn Store>> {
    let mut database = config().database.clone();
    if database_url.is_some() {
        database.url = database_url;
    }

    if database.url.is_none() {
        tracing::info!("Using in-memory store");
        let store = MemoryStore::new();
        store.unique_index("users", &["email"]).await;
        return Ok(Arc::new(store));
    }

    let store = PgStore::connect(&database).await?;
    for collection in ["users", "posts", "comments"] {
        store.ensure_collection(collection).await?;
    }
    store.unique_index("users", &["email"]).await?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL and JSONAPI_* settings apply
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    tracing::info!("Starting JSON:API demo in {:?} mode", config().environment);

    let group = group(store(args.database_url).await?)?;
    let app = app(group, &args.prefix);

    let bind_addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}{}", bind_addr, args.prefix);

    axum::serve(listener, app).await?;
    Ok(())
}

fn app(group: Arc<Group>, prefix: &str) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(group.endpoint(prefix))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> axum::response::Json<Value> {
    axum::response::Json(json!({
        "name": "monk-jsonapi",
        "version": env!("CARGO_PKG_VERSION"),
        "resources": ["users", "posts", "comments"],
    }))
}
