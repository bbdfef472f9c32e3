use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::core::similarity::SimilarityMetric;
use crate::models::{
    Candidate, DeliveryAddress, Identity, MatchRecord, PrivateAttrs, Profile, PublicAttrs,
    RateLimitEntry,
};
use crate::services::store::{ProfileRepository, StoreError, VectorIndex};

/// PostgreSQL-backed profile store
///
/// Latest profiles and their embeddings live in `profiles` (pgvector column,
/// HNSW index); every revision is appended to `profile_versions`. Match
/// history and match requests have their own tables.
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Declared dimension of `profiles.embedding`; `None` when the column
    /// is unconstrained
    pub async fn embedding_dimension(&self) -> Result<Option<usize>, StoreError> {
        let typmod: Option<i32> = sqlx::query_scalar(
            "SELECT atttypmod FROM pg_attribute \
             WHERE attrelid = 'profiles'::regclass AND attname = 'embedding' AND NOT attisdropped",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(typmod.filter(|d| *d > 0).map(|d| d as usize))
    }
}

/// Render a vector as a pgvector text literal, e.g. `[0.1,0.2]`
pub fn vector_literal(values: &[f32]) -> String {
    let body = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{}]", body)
}

fn profile_from_row(row: &PgRow, prefix: &str) -> Result<Profile, StoreError> {
    let public: Json<PublicAttrs> = row.try_get(format!("{}public", prefix).as_str())?;
    let private: Json<PrivateAttrs> = row.try_get(format!("{}private", prefix).as_str())?;
    Ok(Profile {
        public: public.0,
        private: private.0,
        timestamp: row.try_get(format!("{}timestamp", prefix).as_str())?,
        embedding: None,
    })
}

#[async_trait]
impl ProfileRepository for PostgresClient {
    async fn latest(&self, who: &Identity) -> Result<Option<Profile>, StoreError> {
        let query = r#"
            SELECT latest_public, latest_private, latest_timestamp
            FROM profiles
            WHERE platform = $1 AND username = $2 AND latest_timestamp IS NOT NULL
        "#;

        let row = sqlx::query(query)
            .bind(&who.platform)
            .bind(&who.username)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(|r| profile_from_row(r, "latest_")).transpose()
    }

    /// Upserting the `profiles` row takes its row lock, so concurrent appends
    /// for one identity serialize on `version_count` and no revision is lost.
    async fn append_version(&self, who: &Identity, profile: Profile) -> Result<u32, StoreError> {
        let embedding = profile.embedding.as_deref().map(vector_literal);
        let mut tx = self.pool.begin().await?;

        let upsert = r#"
            INSERT INTO profiles (
                platform, username, latest_public, latest_private, latest_timestamp,
                embedding, version_count, created, last_updated
            )
            VALUES ($1, $2, $3, $4, $5, $6::vector, 1, NOW(), NOW())
            ON CONFLICT (platform, username)
            DO UPDATE SET
                latest_public = EXCLUDED.latest_public,
                latest_private = EXCLUDED.latest_private,
                latest_timestamp = EXCLUDED.latest_timestamp,
                embedding = EXCLUDED.embedding,
                version_count = profiles.version_count + 1,
                last_updated = NOW()
            RETURNING version_count
        "#;

        let version: i32 = sqlx::query(upsert)
            .bind(&who.platform)
            .bind(&who.username)
            .bind(Json(&profile.public))
            .bind(Json(&profile.private))
            .bind(profile.timestamp)
            .bind(embedding)
            .fetch_one(&mut *tx)
            .await?
            .try_get("version_count")?;

        let insert = r#"
            INSERT INTO profile_versions (
                platform, username, version, public, private, timestamp, embedding
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#;

        sqlx::query(insert)
            .bind(&who.platform)
            .bind(&who.username)
            .bind(version)
            .bind(Json(&profile.public))
            .bind(Json(&profile.private))
            .bind(profile.timestamp)
            .bind(profile.embedding.clone())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!("Appended profile version {} for {}", version, who);

        Ok(version as u32)
    }

    async fn history(&self, who: &Identity) -> Result<Vec<Profile>, StoreError> {
        let query = r#"
            SELECT public, private, timestamp, embedding
            FROM profile_versions
            WHERE platform = $1 AND username = $2
            ORDER BY version ASC
        "#;

        let rows = sqlx::query(query)
            .bind(&who.platform)
            .bind(&who.username)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let mut profile = profile_from_row(row, "")?;
                profile.embedding = row.try_get::<Option<Vec<f32>>, _>("embedding")?;
                Ok(profile)
            })
            .collect()
    }

    async fn match_requests(&self, who: &Identity) -> Result<Vec<RateLimitEntry>, StoreError> {
        let query = r#"
            SELECT requested_at, count
            FROM match_requests
            WHERE platform = $1 AND username = $2
            ORDER BY requested_at ASC
        "#;

        let rows = sqlx::query(query)
            .bind(&who.platform)
            .bind(&who.username)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let count: i32 = row.try_get("count")?;
                Ok(RateLimitEntry {
                    timestamp: row.try_get("requested_at")?,
                    count: count.max(0) as u32,
                })
            })
            .collect()
    }

    async fn push_match_request(
        &self,
        who: &Identity,
        entry: RateLimitEntry,
    ) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO match_requests (platform, username, requested_at, count)
            VALUES ($1, $2, $3, $4)
        "#;

        sqlx::query(query)
            .bind(&who.platform)
            .bind(&who.username)
            .bind(entry.timestamp)
            .bind(entry.count as i32)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn match_history(&self, who: &Identity) -> Result<Vec<MatchRecord>, StoreError> {
        let query = r#"
            SELECT matched_platform, matched_username, matched_at
            FROM match_history
            WHERE observer_platform = $1 AND observer_username = $2
            ORDER BY matched_at ASC
        "#;

        let rows = sqlx::query(query)
            .bind(&who.platform)
            .bind(&who.username)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(MatchRecord {
                    observer: who.clone(),
                    matched: Identity::new(
                        row.try_get::<String, _>("matched_platform")?,
                        row.try_get::<String, _>("matched_username")?,
                    ),
                    timestamp: row.try_get("matched_at")?,
                })
            })
            .collect()
    }

    /// Uses INSERT ... ON CONFLICT DO NOTHING so a repeated pair is a no-op
    async fn add_match(&self, record: MatchRecord) -> Result<bool, StoreError> {
        let query = r#"
            INSERT INTO match_history (
                observer_platform, observer_username, matched_platform, matched_username, matched_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
        "#;

        let result = sqlx::query(query)
            .bind(&record.observer.platform)
            .bind(&record.observer.username)
            .bind(&record.matched.platform)
            .bind(&record.matched.username)
            .bind(record.timestamp)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn resolved_address(&self, who: &Identity) -> Result<Option<DeliveryAddress>, StoreError> {
        let query = r#"
            SELECT chat_id, agent_username
            FROM profiles
            WHERE platform = $1 AND username = $2 AND chat_id IS NOT NULL
        "#;

        let row = sqlx::query(query)
            .bind(&who.platform)
            .bind(&who.username)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(DeliveryAddress {
                chat_id: row.try_get("chat_id")?,
                agent_username: row.try_get("agent_username")?,
            })
        })
        .transpose()
    }

    async fn set_resolved_address(
        &self,
        who: &Identity,
        address: &DeliveryAddress,
    ) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO profiles (platform, username, chat_id, agent_username, created, last_updated)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (platform, username)
            DO UPDATE SET
                chat_id = EXCLUDED.chat_id,
                agent_username = COALESCE(EXCLUDED.agent_username, profiles.agent_username),
                last_updated = NOW()
        "#;

        sqlx::query(query)
            .bind(&who.platform)
            .bind(&who.username)
            .bind(&address.chat_id)
            .bind(&address.agent_username)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn is_searchable(&self, who: &Identity, version: u32) -> Result<bool, StoreError> {
        let query = r#"
            SELECT version_count >= $3 AS searchable
            FROM profiles
            WHERE platform = $1 AND username = $2
        "#;

        let row = sqlx::query(query)
            .bind(&who.platform)
            .bind(&who.username)
            .bind(version as i32)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => row.try_get("searchable")?,
            None => false,
        })
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

#[async_trait]
impl VectorIndex for PostgresClient {
    /// `hnsw.ef_search` is the candidate pool the HNSW scan keeps, so it is
    /// set to `num_candidates` for the duration of the query.
    async fn nearest(
        &self,
        query: &[f32],
        num_candidates: usize,
        limit: usize,
        metric: SimilarityMetric,
    ) -> Result<Vec<Candidate>, StoreError> {
        // <=> is cosine distance, <#> is negated inner product
        let (distance, score) = match metric {
            SimilarityMetric::Cosine => ("embedding <=> $1::vector", "1 - (embedding <=> $1::vector)"),
            SimilarityMetric::DotProduct => ("embedding <#> $1::vector", "-(embedding <#> $1::vector)"),
        };

        let sql = format!(
            r#"
            SELECT platform, username, latest_public, latest_private, latest_timestamp,
                   ({score})::float8 AS score
            FROM profiles
            WHERE embedding IS NOT NULL AND latest_timestamp IS NOT NULL
            ORDER BY {distance}
            LIMIT $2
            "#,
            score = score,
            distance = distance,
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("SET LOCAL hnsw.ef_search = {}", num_candidates.max(1)))
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query(&sql)
            .bind(vector_literal(query))
            .bind(limit.min(num_candidates) as i64)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        rows.iter()
            .map(|row| {
                let score: f64 = row.try_get("score")?;
                Ok(Candidate {
                    identity: Identity::new(
                        row.try_get::<String, _>("platform")?,
                        row.try_get::<String, _>("username")?,
                    ),
                    profile: profile_from_row(row, "latest_")?,
                    score: score as f32,
                })
            })
            .collect()
    }
}
