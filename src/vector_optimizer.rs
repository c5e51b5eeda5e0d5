// Copyright 2026 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use lancedb::{index::Index, query::VectorQuery, DistanceType, Table};

/// Below this many rows a flat scan beats any index
pub const INDEX_ROW_THRESHOLD: usize = 1000;

/// Parameters for vector index creation
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub should_create_index: bool,
    pub num_partitions: u32,
    pub num_sub_vectors: u32,
    pub num_bits: u32,
    pub distance_type: DistanceType,
}

/// Vector index management for the knowledge table
pub struct VectorOptimizer;

impl VectorOptimizer {
    /// Calculate index parameters based on dataset size
    pub fn calculate_index_params(row_count: usize, vector_dim: usize) -> IndexParams {
        if row_count <= INDEX_ROW_THRESHOLD {
            return IndexParams {
                should_create_index: false,
                num_partitions: 0,
                num_sub_vectors: 0,
                num_bits: 0,
                distance_type: DistanceType::Cosine,
            };
        }

        // sqrt of row count, min 2, max 256
        let num_partitions = ((row_count as f64).sqrt() as u32).clamp(2, 256);

        // PQ needs the dimension to divide evenly into sub-vectors
        let mut num_sub_vectors = ((vector_dim / 8) as u32).clamp(1, 96);
        while num_sub_vectors > 1 && vector_dim as u32 % num_sub_vectors != 0 {
            num_sub_vectors -= 1;
        }

        IndexParams {
            should_create_index: true,
            num_partitions,
            num_sub_vectors,
            num_bits: 8,
            distance_type: DistanceType::Cosine,
        }
    }

    /// Create the IVF-PQ index on `embedding` once the table is large enough.
    /// Returns whether an index exists afterwards.
    pub async fn ensure_index(table: &Table, vector_dim: usize) -> Result<bool> {
        let has_index = table
            .list_indices()
            .await?
            .iter()
            .any(|idx| idx.columns == vec!["embedding"]);
        if has_index {
            return Ok(true);
        }

        let row_count = table.count_rows(None).await?;
        let params = Self::calculate_index_params(row_count, vector_dim);
        if !params.should_create_index {
            tracing::debug!(
                rows = row_count,
                "Skipping vector index creation, flat scan is enough"
            );
            return Ok(false);
        }

        tracing::info!(
            rows = row_count,
            partitions = params.num_partitions,
            sub_vectors = params.num_sub_vectors,
            "Creating vector index for knowledge table"
        );

        table
            .create_index(
                &["embedding"],
                Index::IvfPq(
                    lancedb::index::vector::IvfPqIndexBuilder::default()
                        .distance_type(params.distance_type)
                        .num_partitions(params.num_partitions)
                        .num_sub_vectors(params.num_sub_vectors)
                        .num_bits(params.num_bits),
                ),
            )
            .execute()
            .await?;

        Ok(true)
    }

    /// Translate a candidate-pool size into index probe and refine settings
    pub fn tune_query(query: VectorQuery, num_candidates: usize, limit: usize) -> VectorQuery {
        let nprobes = (num_candidates / 10).clamp(10, 64);
        let refine = num_candidates.div_ceil(limit.max(1)).clamp(1, 20) as u32;
        query.nprobes(nprobes).refine_factor(refine)
    }
}
