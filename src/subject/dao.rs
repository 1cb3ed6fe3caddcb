//! Postgres-backed subject persistence.
//!
//! Plain parameterized queries only; every write here is a direct column
//! write, equivalent to `update_columns` upstream, so no application-level
//! update hooks can fire from engine bookkeeping.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::models::{LinkCard, LinkProvider, Recipient, ReviewState, SubjectId, Tag};
use super::repository::{LinkRepository, RecipientDirectory, ReviewFilter, TagRepository};

const TAG_COLUMNS: &str = "id, name, usable, trendable, reviewed_at, review_requested_at, \
                           max_score, max_score_at, last_used_at";

const LINK_COLUMNS: &str = "c.id, c.url, c.title, c.appropriate_for_trends, \
                            p.id AS provider_id, p.domain AS provider_domain, \
                            p.trendable AS provider_trendable, \
                            p.reviewed_at AS provider_reviewed_at, \
                            p.review_requested_at AS provider_review_requested_at";

const PROVIDER_COLUMNS: &str = "id, domain, trendable, reviewed_at, review_requested_at";

fn tag_from_row(row: &PgRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        usable: row.try_get("usable")?,
        trendable: row.try_get::<Option<bool>, _>("trendable")?.unwrap_or(false),
        review: ReviewState {
            reviewed_at: row.try_get("reviewed_at")?,
            review_requested_at: row.try_get("review_requested_at")?,
        },
        max_score: row.try_get("max_score")?,
        max_score_at: row.try_get("max_score_at")?,
        last_used_at: row.try_get("last_used_at")?,
    })
}

fn link_from_row(row: &PgRow) -> Result<LinkCard> {
    let provider = match row.try_get::<Option<SubjectId>, _>("provider_id")? {
        Some(id) => Some(LinkProvider {
            id,
            domain: row.try_get("provider_domain")?,
            trendable: row
                .try_get::<Option<bool>, _>("provider_trendable")?
                .unwrap_or(false),
            review: ReviewState {
                reviewed_at: row.try_get("provider_reviewed_at")?,
                review_requested_at: row.try_get("provider_review_requested_at")?,
            },
        }),
        None => None,
    };
    Ok(LinkCard {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        appropriate_for_trends: row.try_get("appropriate_for_trends")?,
        provider,
    })
}

fn provider_from_row(row: &PgRow) -> Result<LinkProvider> {
    Ok(LinkProvider {
        id: row.try_get("id")?,
        domain: row.try_get("domain")?,
        trendable: row.try_get::<Option<bool>, _>("trendable")?.unwrap_or(false),
        review: ReviewState {
            reviewed_at: row.try_get("reviewed_at")?,
            review_requested_at: row.try_get("review_requested_at")?,
        },
    })
}

#[derive(Debug, Clone)]
pub struct TagDao {
    pool: PgPool,
}

impl TagDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TagRepository for TagDao {
    async fn get(&self, id: SubjectId) -> Result<Option<Tag>> {
        let row = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load tag")?;
        row.as_ref().map(tag_from_row).transpose()
    }

    async fn load(&self, ids: &[SubjectId]) -> Result<Vec<Tag>> {
        let rows = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ANY($1)"))
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await
            .context("failed to bulk load tags")?;
        rows.iter().map(tag_from_row).collect()
    }

    async fn store_peak(&self, id: SubjectId, score: f64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE tags SET max_score = $2, max_score_at = $3 WHERE id = $1")
            .bind(id)
            .bind(score)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("failed to store tag peak score")?;
        Ok(())
    }

    async fn touch_review_requested(&self, id: SubjectId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tags SET review_requested_at = $2 \
             WHERE id = $1 AND review_requested_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .context("failed to touch tag review_requested_at")?;
        Ok(result.rows_affected() == 1)
    }

    async fn touch_last_used(&self, id: SubjectId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE tags SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("failed to touch tag last_used_at")?;
        Ok(())
    }

    async fn filter(&self, filter: ReviewFilter) -> Result<Vec<Tag>> {
        let query = match filter {
            ReviewFilter::Reviewed => format!(
                "SELECT {TAG_COLUMNS} FROM tags WHERE reviewed_at IS NOT NULL \
                 ORDER BY reviewed_at DESC"
            ),
            ReviewFilter::Unreviewed => {
                format!("SELECT {TAG_COLUMNS} FROM tags WHERE reviewed_at IS NULL ORDER BY id DESC")
            }
            ReviewFilter::PendingReview => format!(
                "SELECT {TAG_COLUMNS} FROM tags \
                 WHERE reviewed_at IS NULL AND review_requested_at IS NOT NULL \
                 ORDER BY review_requested_at DESC"
            ),
        };
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("failed to filter tags")?;
        rows.iter().map(tag_from_row).collect()
    }
}

#[derive(Debug, Clone)]
pub struct LinkDao {
    pool: PgPool,
}

impl LinkDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkRepository for LinkDao {
    async fn get(&self, id: SubjectId) -> Result<Option<LinkCard>> {
        let row = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM link_cards c \
             LEFT JOIN link_providers p ON p.id = c.provider_id WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load link")?;
        row.as_ref().map(link_from_row).transpose()
    }

    async fn load(&self, ids: &[SubjectId]) -> Result<Vec<LinkCard>> {
        let rows = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM link_cards c \
             LEFT JOIN link_providers p ON p.id = c.provider_id WHERE c.id = ANY($1)"
        ))
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .context("failed to bulk load links")?;
        rows.iter().map(link_from_row).collect()
    }

    async fn touch_provider_review_requested(
        &self,
        provider_id: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE link_providers SET review_requested_at = $2 \
             WHERE id = $1 AND review_requested_at IS NULL",
        )
        .bind(provider_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .context("failed to touch provider review_requested_at")?;
        Ok(result.rows_affected() == 1)
    }

    async fn filter_providers(&self, filter: ReviewFilter) -> Result<Vec<LinkProvider>> {
        let query = match filter {
            ReviewFilter::Reviewed => format!(
                "SELECT {PROVIDER_COLUMNS} FROM link_providers \
                 WHERE reviewed_at IS NOT NULL ORDER BY reviewed_at DESC"
            ),
            ReviewFilter::Unreviewed => format!(
                "SELECT {PROVIDER_COLUMNS} FROM link_providers \
                 WHERE reviewed_at IS NULL ORDER BY id DESC"
            ),
            ReviewFilter::PendingReview => format!(
                "SELECT {PROVIDER_COLUMNS} FROM link_providers \
                 WHERE reviewed_at IS NULL AND review_requested_at IS NOT NULL \
                 ORDER BY review_requested_at DESC"
            ),
        };
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("failed to filter link providers")?;
        rows.iter().map(provider_from_row).collect()
    }
}

/// Staff accounts that opted into trend-review notifications.
#[derive(Debug, Clone)]
pub struct RecipientDao {
    pool: PgPool,
}

impl RecipientDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientDirectory for RecipientDao {
    async fn review_recipients(&self) -> Result<Vec<Recipient>> {
        let rows = sqlx::query(
            "SELECT a.id AS account_id, a.handle FROM users u \
             JOIN accounts a ON a.id = u.account_id \
             WHERE u.staff AND u.allows_trend_review_notifications",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load review recipients")?;
        rows.iter()
            .map(|row| {
                Ok(Recipient {
                    account_id: row.try_get("account_id")?,
                    handle: row.try_get("handle")?,
                })
            })
            .collect()
    }
}
