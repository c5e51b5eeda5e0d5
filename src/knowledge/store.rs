use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, StringArray, TimestampMillisecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::DateTime;
use futures::TryStreamExt;
use lancedb::{
    connect,
    query::{ExecutableQuery, QueryBase},
    Connection, DistanceType, Table,
};
use std::sync::Arc;

use crate::errors::StoreError;
use crate::knowledge::types::{KnowledgeChunk, ScoredChunk, SourceType};
use crate::vector_optimizer::VectorOptimizer;

const TABLE_NAME: &str = "knowledge_chunks";

/// Server-side similarity query forms, tried in this order when the
/// previous one fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorQueryForm {
    /// Approximate search through the vector index
    Indexed,
    /// Exhaustive cosine scan, no index needed
    Flat,
    /// Exhaustive Euclidean scan
    FlatEuclidean,
}

impl VectorQueryForm {
    pub const CASCADE: [VectorQueryForm; 3] = [
        VectorQueryForm::Indexed,
        VectorQueryForm::Flat,
        VectorQueryForm::FlatEuclidean,
    ];
}

/// Case-insensitive substring predicate over chunk title or content.
///
/// A chunk matches when title or content contains any `any_of` term and,
/// if `all_of` is non-empty, also contains one of the `all_of` terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextFilter {
    pub any_of: Vec<String>,
    pub all_of: Vec<String>,
}

impl TextFilter {
    pub fn any<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            any_of: terms.into_iter().map(Into::into).collect(),
            all_of: Vec::new(),
        }
    }

    pub fn and_any<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.all_of = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.any_of.iter().all(|t| t.trim().is_empty())
    }

    pub fn matches(&self, title: &str, content: &str) -> bool {
        let title = title.to_lowercase();
        let content = content.to_lowercase();
        let contains_any = |terms: &[String]| {
            terms.iter().any(|term| {
                let term = term.trim().to_lowercase();
                !term.is_empty() && (title.contains(&term) || content.contains(&term))
            })
        };

        contains_any(&self.any_of) && (self.all_of.is_empty() || contains_any(&self.all_of))
    }

    /// SQL predicate for LanceDB/DataFusion. LIKE wildcards in terms are
    /// dropped and quotes doubled.
    pub fn to_sql(&self) -> Option<String> {
        let clause = |terms: &[String]| -> Option<String> {
            let parts: Vec<String> = terms
                .iter()
                .map(|t| sanitize_like_term(t))
                .filter(|t| !t.is_empty())
                .map(|t| {
                    format!(
                        "lower(title) LIKE '%{t}%' OR lower(content) LIKE '%{t}%'",
                        t = t
                    )
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(format!("({})", parts.join(" OR ")))
            }
        };

        let any = clause(&self.any_of)?;
        match clause(&self.all_of) {
            Some(all) => Some(format!("{} AND {}", any, all)),
            None => Some(any),
        }
    }
}

fn sanitize_like_term(term: &str) -> String {
    term.trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '%' && *c != '_' && *c != '\\')
        .collect::<String>()
        .replace('\'', "''")
}

/// The document store consumed by retrieval and ingestion
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, chunk: &KnowledgeChunk) -> Result<()>;

    /// Returns whether a chunk with that id existed
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn count_all(&self) -> Result<usize>;

    /// Nearest chunks to `query`, best first
    async fn vector_search(
        &self,
        query: &[f32],
        form: VectorQueryForm,
        num_candidates: usize,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    async fn text_search(&self, filter: &TextFilter, limit: usize) -> Result<Vec<KnowledgeChunk>>;

    /// Newest first
    async fn list(&self, limit: Option<usize>) -> Result<Vec<KnowledgeChunk>>;

    /// Hook run after a batch of inserts
    async fn optimize(&self) -> Result<()> {
        Ok(())
    }
}

/// LanceDB-backed persistent store
pub struct LanceKnowledgeStore {
    db: Connection,
    vector_dim: usize,
}

impl LanceKnowledgeStore {
    pub async fn new(vector_dim: usize) -> Result<Self> {
        let db_path = crate::storage::get_knowledge_database_path()?;
        let db_path = db_path
            .to_str()
            .context("Knowledge database path is not valid UTF-8")?;
        Self::open(db_path, vector_dim).await
    }

    pub async fn open(db_path: &str, vector_dim: usize) -> Result<Self> {
        let db = connect(db_path).execute().await?;
        let store = Self { db, vector_dim };
        store.initialize_table().await?;
        Ok(store)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("source_type", DataType::Utf8, false),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Millisecond, None),
                false,
            ),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.vector_dim as i32,
                ),
                false,
            ),
        ]))
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self.db.table_names().execute().await?;

        if !table_names.iter().any(|name| name == TABLE_NAME) {
            use arrow::record_batch::RecordBatchIterator;
            use std::iter::once;

            let schema = self.schema();
            let empty_batch = RecordBatch::new_empty(schema.clone());
            let batch_reader = RecordBatchIterator::new(once(Ok(empty_batch)), schema);
            self.db
                .create_table(TABLE_NAME, batch_reader)
                .execute()
                .await?;
        }

        Ok(())
    }

    async fn table(&self) -> Result<Table> {
        Ok(self.db.open_table(TABLE_NAME).execute().await?)
    }

    fn chunk_to_batch(&self, chunk: &KnowledgeChunk) -> Result<RecordBatch> {
        anyhow::ensure!(
            chunk.embedding.len() == self.vector_dim,
            "Chunk embedding has {} dimensions, table expects {}",
            chunk.embedding.len(),
            self.vector_dim
        );

        let embedding_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.vector_dim as i32,
            Arc::new(Float32Array::from(chunk.embedding.clone())),
            None,
        )?;

        let batch = RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(StringArray::from(vec![chunk.id.as_str()])),
                Arc::new(StringArray::from(vec![chunk.title.as_str()])),
                Arc::new(StringArray::from(vec![chunk.content.as_str()])),
                Arc::new(StringArray::from(vec![chunk.source_type.to_string()])),
                Arc::new(TimestampMillisecondArray::from(vec![
                    chunk.created_at.timestamp_millis()
                ])),
                Arc::new(embedding_array),
            ],
        )?;

        Ok(batch)
    }

    async fn run_vector_query(
        &self,
        query: &[f32],
        form: VectorQueryForm,
        num_candidates: usize,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let table = self.table().await?;
        let base = table.vector_search(query)?.column("embedding").limit(limit);

        let (search, distance) = match form {
            VectorQueryForm::Indexed => (
                VectorOptimizer::tune_query(
                    base.distance_type(DistanceType::Cosine),
                    num_candidates,
                    limit,
                ),
                DistanceType::Cosine,
            ),
            VectorQueryForm::Flat => (
                base.distance_type(DistanceType::Cosine)
                    .bypass_vector_index(),
                DistanceType::Cosine,
            ),
            VectorQueryForm::FlatEuclidean => (
                base.distance_type(DistanceType::L2).bypass_vector_index(),
                DistanceType::L2,
            ),
        };

        let mut results = search.execute().await?;
        let mut scored = Vec::new();

        while let Some(batch) = results.try_next().await? {
            if batch.num_rows() == 0 {
                continue;
            }
            let distances = batch
                .column_by_name("_distance")
                .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
                .context("Vector search result has no _distance column")?;
            let distances: Vec<f32> = (0..distances.len()).map(|i| distances.value(i)).collect();

            for (chunk, d) in batch_to_chunks(&batch)?.into_iter().zip(distances) {
                let score = match distance {
                    DistanceType::L2 => 1.0 / (1.0 + d),
                    _ => 1.0 - d,
                };
                scored.push(ScoredChunk { chunk, score });
            }
        }

        Ok(scored)
    }
}

#[async_trait]
impl DocumentStore for LanceKnowledgeStore {
    async fn insert(&self, chunk: &KnowledgeChunk) -> Result<()> {
        use arrow::record_batch::RecordBatchIterator;
        use std::iter::once;

        let batch = self.chunk_to_batch(chunk)?;
        let schema = batch.schema();
        let table = self.table().await?;
        table
            .add(RecordBatchIterator::new(once(Ok(batch)), schema))
            .execute()
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let table = self.table().await?;
        let predicate = format!("id = '{}'", id.replace('\'', "''"));
        let existing = table.count_rows(Some(predicate.clone())).await?;
        if existing == 0 {
            return Ok(false);
        }
        table.delete(&predicate).await?;
        Ok(true)
    }

    async fn count_all(&self) -> Result<usize> {
        let table = self.table().await?;
        Ok(table.count_rows(None).await?)
    }

    async fn vector_search(
        &self,
        query: &[f32],
        form: VectorQueryForm,
        num_candidates: usize,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if query.len() != self.vector_dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.vector_dim,
                actual: query.len(),
            });
        }

        self.run_vector_query(query, form, num_candidates, limit)
            .await
            .map_err(|e| StoreError::from_backend_message(format!("{:#}", e)))
    }

    async fn text_search(&self, filter: &TextFilter, limit: usize) -> Result<Vec<KnowledgeChunk>> {
        let Some(predicate) = filter.to_sql() else {
            return Ok(Vec::new());
        };

        let table = self.table().await?;
        let results = table
            .query()
            .only_if(predicate)
            .limit(limit)
            .execute()
            .await?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut chunks = Vec::new();
        for batch in &batches {
            chunks.extend(batch_to_chunks(batch)?);
        }
        chunks.truncate(limit);
        Ok(chunks)
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<KnowledgeChunk>> {
        let table = self.table().await?;
        let results = table.query().execute().await?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut chunks = Vec::new();
        for batch in &batches {
            chunks.extend(batch_to_chunks(batch)?);
        }
        chunks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            chunks.truncate(limit);
        }
        Ok(chunks)
    }

    async fn optimize(&self) -> Result<()> {
        let table = self.table().await?;
        VectorOptimizer::ensure_index(&table, self.vector_dim).await?;
        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .with_context(|| format!("Column '{}' missing or not a string column", name))
}

fn batch_to_chunks(batch: &RecordBatch) -> Result<Vec<KnowledgeChunk>> {
    let ids = string_column(batch, "id")?;
    let titles = string_column(batch, "title")?;
    let contents = string_column(batch, "content")?;
    let source_types = string_column(batch, "source_type")?;
    let created_ats = batch
        .column_by_name("created_at")
        .and_then(|col| col.as_any().downcast_ref::<TimestampMillisecondArray>())
        .context("Column 'created_at' missing or not a timestamp column")?;
    let embeddings = batch
        .column_by_name("embedding")
        .and_then(|col| col.as_any().downcast_ref::<FixedSizeListArray>());

    let mut chunks = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let embedding = match embeddings {
            Some(list) => {
                let values = list.value(i);
                values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .map(|arr| arr.values().to_vec())
                    .unwrap_or_default()
            }
            None => Vec::new(),
        };

        chunks.push(KnowledgeChunk {
            id: ids.value(i).to_string(),
            title: titles.value(i).to_string(),
            content: contents.value(i).to_string(),
            source_type: SourceType::from(source_types.value(i)),
            embedding,
            created_at: DateTime::from_timestamp_millis(created_ats.value(i))
                .context("Invalid created_at timestamp")?,
        });
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_any_of() {
        let filter = TextFilter::any(["jimma", "jima university"]);
        assert!(filter.matches("Jimma University", ""));
        assert!(filter.matches("About", "Students of JIMA UNIVERSITY"));
        assert!(!filter.matches("Hawassa", "south"));
    }

    #[test]
    fn test_filter_all_of_restricts() {
        let filter = TextFilter::any(["fees"]).and_any(["astu", "adama science"]);
        assert!(filter.matches("ASTU", "tuition fees"));
        assert!(!filter.matches("Jimma", "tuition fees"));
    }

    #[test]
    fn test_empty_filter() {
        assert!(TextFilter::default().is_empty());
        assert!(TextFilter::any(["  "]).is_empty());
        assert!(!TextFilter::default().matches("a", "b"));
        assert!(TextFilter::default().to_sql().is_none());
    }

    #[test]
    fn test_sql_escapes_terms() {
        let sql = TextFilter::any(["o'neil 100%"]).to_sql().unwrap();
        assert_eq!(
            sql,
            "(lower(title) LIKE '%o''neil 100%' OR lower(content) LIKE '%o''neil 100%')"
        );

        let sql = TextFilter::any(["fees"]).and_any(["aau"]).to_sql().unwrap();
        assert!(sql.contains(") AND ("));
    }

    #[test]
    fn test_cascade_order() {
        assert_eq!(VectorQueryForm::CASCADE[0], VectorQueryForm::Indexed);
        assert_eq!(VectorQueryForm::CASCADE[2], VectorQueryForm::FlatEuclidean);
    }
}
