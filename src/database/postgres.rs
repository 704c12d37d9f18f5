use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::record::ID_KEY;
use super::store::{document_id, project, FindOptions, Session, Store, StoreError, StoredDocument};
use crate::config::DatabaseConfig;
use crate::filter::filter_where::json_column;
use crate::filter::{compare_documents, Filter, FilterError, FilterOrder, FilterWhere, SqlResult};

/// Document store on PostgreSQL.
///
/// Every collection is a table `(id uuid primary key, lk bigint, data jsonb)`.
/// `data` holds the stored document without its id.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the database configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Backend("DATABASE_URL is not configured".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;

        info!("Connected document store pool (max {} connections)", config.max_connections);
        Ok(Self::new(pool))
    }

    /// Create the table backing a collection if it does not exist
    pub async fn ensure_collection(&self, collection: &str) -> Result<(), StoreError> {
        let table = quote_table(collection)?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id uuid PRIMARY KEY, lk bigint NOT NULL DEFAULT 0, data jsonb NOT NULL)",
            table
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Create a unique index over one or more document keys
    pub async fn unique_index(&self, collection: &str, keys: &[&str]) -> Result<(), StoreError> {
        let table = quote_table(collection)?;
        let columns = keys
            .iter()
            .map(|key| json_column(key).map(|column| format!("({})", column)))
            .collect::<Result<Vec<_>, _>>()?;

        let sql = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS \"{}_{}_key\" ON {} ({})",
            collection,
            keys.join("_"),
            table,
            columns.join(", ")
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Session>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { conn: Conn::Transaction(tx) }))
    }

    async fn session(&self) -> Result<Box<dyn Session>, StoreError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgSession { conn: Conn::Pool(conn) }))
    }
}

enum Conn {
    Pool(PoolConnection<Postgres>),
    Transaction(Transaction<'static, Postgres>),
}

pub struct PgSession {
    conn: Conn,
}

impl PgSession {
    fn conn(&mut self) -> &mut PgConnection {
        match &mut self.conn {
            Conn::Pool(conn) => &mut **conn,
            Conn::Transaction(tx) => &mut **tx,
        }
    }

    async fn fetch(&mut self, sql: &str, params: Vec<Value>) -> Result<Vec<StoredDocument>, StoreError> {
        let rows = bind_all(sqlx::query(sql), params).fetch_all(self.conn()).await?;
        rows.iter().map(row_document).collect()
    }

    async fn execute(&mut self, query: Query<'_, Postgres, PgArguments>) -> Result<bool, StoreError> {
        let result = query.execute(self.conn()).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Session for PgSession {
    fn in_transaction(&self) -> bool {
        matches!(self.conn, Conn::Transaction(_))
    }

    async fn find_one(
        &mut self,
        collection: &str,
        filter: &Filter,
        lock: bool,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let options = FindOptions { limit: Some(1), lock, ..Default::default() };
        Ok(self.find_many(collection, filter, &options).await?.into_iter().next())
    }

    async fn find_many(
        &mut self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        if options.lock && !self.in_transaction() {
            return Err(StoreError::TransactionRequired);
        }
        // OFFSET is a bigint
        if i64::try_from(options.skip).is_err() {
            return Ok(Vec::new());
        }

        let table = quote_table(collection)?;
        let SqlResult { query: where_clause, params } = FilterWhere::generate(filter, 0)?;
        let order_clause = FilterOrder::generate(&options.sort)?;
        let tail = [
            format!("FROM {} WHERE {}", table, where_clause),
            order_clause,
            match options.limit {
                Some(limit) => format!("LIMIT {}", limit.min(i64::MAX as u64)),
                None => String::new(),
            },
            if options.skip > 0 { format!("OFFSET {}", options.skip) } else { String::new() },
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        let mut documents = if options.lock {
            let sql = format!(
                "UPDATE {} SET lk = lk + 1 WHERE id IN (SELECT id {} FOR UPDATE) RETURNING id, data",
                table, tail
            );
            let mut documents = self.fetch(&sql, params).await?;
            documents.sort_by(|a, b| compare_documents(a, b, &options.sort));
            documents
        } else {
            self.fetch(&format!("SELECT id, data {}", tail), params).await?
        };

        if let Some(projection) = &options.projection {
            documents = documents
                .into_iter()
                .map(|document| project(document, Some(projection)))
                .collect();
        }

        Ok(documents)
    }

    async fn count(&mut self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let table = quote_table(collection)?;
        let SqlResult { query: where_clause, params } = FilterWhere::generate(filter, 0)?;
        let sql = format!("SELECT COUNT(*) AS count FROM {} WHERE {}", table, where_clause);

        let row = bind_all(sqlx::query(&sql), params).fetch_one(self.conn()).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn insert(&mut self, collection: &str, document: StoredDocument) -> Result<(), StoreError> {
        let table = quote_table(collection)?;
        let (id, data) = split(document)?;
        let sql = format!("INSERT INTO {} (id, data) VALUES ($1, $2)", table);

        self.execute(sqlx::query(&sql).bind(id).bind(Json(data))).await?;
        Ok(())
    }

    async fn insert_if_absent(
        &mut self,
        collection: &str,
        filter: &Filter,
        document: StoredDocument,
    ) -> Result<bool, StoreError> {
        // Serialize conditional inserts per collection until the transaction ends
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(collection)
            .execute(self.conn())
            .await?;

        if self.count(collection, filter).await? > 0 {
            return Ok(false);
        }

        match self.insert(collection, document).await {
            Ok(()) => Ok(true),
            Err(StoreError::Duplicate(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn replace(&mut self, collection: &str, document: StoredDocument) -> Result<bool, StoreError> {
        self.replace_if_matches(collection, &Filter::and(vec![]), document).await
    }

    async fn replace_if_matches(
        &mut self,
        collection: &str,
        filter: &Filter,
        document: StoredDocument,
    ) -> Result<bool, StoreError> {
        let table = quote_table(collection)?;
        let (id, data) = split(document)?;
        let SqlResult { query: where_clause, params } = FilterWhere::generate(filter, 2)?;
        let sql = format!("UPDATE {} SET data = $1 WHERE id = $2 AND {}", table, where_clause);

        let query = bind_all(sqlx::query(&sql).bind(Json(data)).bind(id), params);
        self.execute(query).await
    }

    async fn update_fields(
        &mut self,
        collection: &str,
        id: Uuid,
        mut patch: StoredDocument,
    ) -> Result<bool, StoreError> {
        let table = quote_table(collection)?;
        patch.remove(ID_KEY);
        let sql = format!("UPDATE {} SET data = data || $1 WHERE id = $2", table);

        self.execute(sqlx::query(&sql).bind(Json(Value::Object(patch))).bind(id)).await
    }

    async fn delete(&mut self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let table = quote_table(collection)?;
        let sql = format!("DELETE FROM {} WHERE id = $1", table);

        self.execute(sqlx::query(&sql).bind(id)).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgSession { conn } = *self;
        if let Conn::Transaction(tx) = conn {
            tx.commit().await?;
        }
        Ok(())
    }
}

fn bind_all(
    mut query: Query<'_, Postgres, PgArguments>,
    params: Vec<Value>,
) -> Query<'_, Postgres, PgArguments> {
    for param in params {
        query = query.bind(Json(param));
    }
    query
}

fn row_document(row: &PgRow) -> Result<StoredDocument, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let Json(data): Json<Value> = row.try_get("data")?;

    let Value::Object(mut document) = data else {
        return Err(StoreError::Document(format!("document {} is not an object", id)));
    };
    document.insert(ID_KEY.to_string(), Value::String(id.to_string()));
    Ok(document)
}

fn split(mut document: StoredDocument) -> Result<(Uuid, Value), StoreError> {
    let id = document_id(&document)?;
    document.remove(ID_KEY);
    Ok((id, Value::Object(document)))
}

/// Validate and quote a collection name as a table identifier
fn quote_table(collection: &str) -> Result<String, FilterError> {
    let valid = collection.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false)
        && collection.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(FilterError::InvalidTableName(collection.to_string()));
    }
    Ok(format!("\"{}\"", collection))
}
