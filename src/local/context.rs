use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::error::StoreError;

pub const NO_DOCUMENTS: &str = "No relevant documents found.";
pub const RETRIEVAL_ERROR: &str = "Error retrieving context.";

const PASSAGE_LIMIT: i64 = 3;

/// Passages of zoning code relevant to a query, best match first.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, StoreError>;
}

/// Keyword ranking over an FTS5 table of zoning passages.
///
/// Expects `CREATE VIRTUAL TABLE zoning_documents USING fts5(content)`.
pub struct SqliteContextRetriever {
    pool: SqlitePool,
}

impl SqliteContextRetriever {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Quote each word so punctuation in addresses never reaches the FTS5 query
/// grammar, and accept a passage matching any of them.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{w}\""))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

#[async_trait]
impl ContextRetriever for SqliteContextRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, StoreError> {
        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };
        let passages = sqlx::query_scalar::<_, String>(
            "SELECT content FROM zoning_documents WHERE zoning_documents MATCH ? ORDER BY rank LIMIT ?",
        )
        .bind(expression)
        .bind(PASSAGE_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[test]
    fn expression_quotes_words() {
        assert_eq!(
            match_expression("Zoning for 100 N. Spring St.").as_deref(),
            Some("\"Zoning\" OR \"for\" OR \"100\" OR \"N\" OR \"Spring\" OR \"St\"")
        );
        assert_eq!(match_expression(" -- "), None);
    }

    #[tokio::test]
    async fn returns_at_most_three_ranked_passages() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE VIRTUAL TABLE zoning_documents USING fts5(content)")
            .execute(&pool)
            .await
            .unwrap();
        for passage in [
            "R1 One-Family Zone regulations",
            "C2 Commercial Zone permitted uses",
            "Hillside ordinance applies to R1 lots",
            "Flood zone X minimal hazard",
            "Parking requirements",
        ] {
            sqlx::query("INSERT INTO zoning_documents (content) VALUES (?)")
                .bind(passage)
                .execute(&pool)
                .await
                .unwrap();
        }

        let retriever = SqliteContextRetriever::new(pool);
        let hits = retriever.retrieve("zoning regulations for R1 zone").await.unwrap();
        assert!(!hits.is_empty() && hits.len() <= 3);
        assert!(hits.iter().all(|h| !h.contains("Parking")));
    }
}
