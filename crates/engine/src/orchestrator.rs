//! End-to-end query orchestration
//!
//! One query runs a strictly sequential pipeline: embed, memory lookup,
//! admission, vector retrieval, graph enhancement, fusion, synthesis,
//! persistence, optional auto-judgment. Concurrency exists across
//! queries; colliding queries meet in the admission registry.

use crate::admission::{AdmissionOutcome, AdmissionRegistry};
use crate::eval::EvaluationRecorder;
use crate::memory::{query_fingerprint, QueryMemory};
use crate::synthesis::Synthesizer;
use crate::types::{citations_from_json, ChunkView, QueryRequest, QueryResponse};
use docmind_common::config::AppConfig;
use docmind_common::db::models::MemoryEntry;
use docmind_common::embeddings::Embedder;
use docmind_common::errors::{AppError, Result};
use docmind_common::metrics;
use docmind_retrieval::{ContextAssembler, GraphRetriever, VectorRetriever};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pipeline tuning knobs lifted out of the full configuration
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Hard cap applied over the request's `max_results`
    pub max_results_cap: usize,

    /// Extra context positions reserved for graph-related chunks
    pub graph_chunk_limit: usize,

    /// Record heuristic relevance judgments for fresh retrievals
    pub auto_judge: bool,

    /// Per-query deadline over the whole pipeline
    pub deadline: Duration,
}

impl EngineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_results_cap: config.retrieval.max_results_cap,
            graph_chunk_limit: config.retrieval.graph_chunk_limit,
            auto_judge: config.eval.auto_judge,
            deadline: Duration::from_secs(config.server.request_timeout_secs),
        }
    }
}

/// The services a query engine is assembled from
pub struct EngineParts {
    pub embedder: Arc<dyn Embedder>,
    pub memory: Arc<QueryMemory>,
    pub admission: Arc<AdmissionRegistry>,
    pub vector: VectorRetriever,
    pub graph: GraphRetriever,
    pub synthesizer: Synthesizer,
    pub recorder: Arc<EvaluationRecorder>,
}

/// Orchestrates the full query pipeline
pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    memory: Arc<QueryMemory>,
    admission: Arc<AdmissionRegistry>,
    vector: VectorRetriever,
    graph: GraphRetriever,
    synthesizer: Synthesizer,
    recorder: Arc<EvaluationRecorder>,
    options: EngineOptions,
}

impl QueryEngine {
    pub fn new(parts: EngineParts, options: EngineOptions) -> Self {
        Self {
            embedder: parts.embedder,
            memory: parts.memory,
            admission: parts.admission,
            vector: parts.vector,
            graph: parts.graph,
            synthesizer: parts.synthesizer,
            recorder: parts.recorder,
            options,
        }
    }

    pub fn admission(&self) -> &AdmissionRegistry {
        &self.admission
    }

    /// Answer a query, bounded by the per-query deadline.
    pub async fn process_query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let started = Instant::now();
        let deadline = self.options.deadline;

        match tokio::time::timeout(deadline, self.run_pipeline(request)).await {
            Ok(Ok(response)) => {
                let outcome = if response.from_memory {
                    "memory_hit"
                } else {
                    "synthesized"
                };
                metrics::record_query(outcome, started.elapsed().as_secs_f64());
                Ok(response)
            }
            Ok(Err(err)) => {
                metrics::record_query("error", started.elapsed().as_secs_f64());
                Err(err)
            }
            Err(_) => {
                metrics::record_query("deadline", started.elapsed().as_secs_f64());
                Err(AppError::DeadlineExceeded {
                    secs: deadline.as_secs(),
                })
            }
        }
    }

    async fn run_pipeline(&self, request: QueryRequest) -> Result<QueryResponse> {
        let embed_started = Instant::now();
        let embedding = match self.embedder.embed(&request.query).await {
            Ok(embedding) => {
                metrics::record_embedding(
                    embed_started.elapsed().as_secs_f64(),
                    self.embedder.model_name(),
                    true,
                );
                embedding
            }
            Err(err) => {
                metrics::record_embedding(
                    embed_started.elapsed().as_secs_f64(),
                    self.embedder.model_name(),
                    false,
                );
                return Err(err);
            }
        };

        if request.use_memory {
            if let Some(hit) = self.memory.lookup(&request.query, &embedding).await {
                tracing::debug!(memory_id = hit.entry.id, kind = hit.kind.as_str(), "Memory hit");
                return Ok(self.answer_from_entry(hit.entry).await);
            }
        }

        // Bypassing memory also opts out of single-flight coordination:
        // the caller asked for a fresh pipeline run
        let mut guard = None;
        if request.use_memory {
            match self.admission.admit(&embedding).await {
                AdmissionOutcome::Leader(g) => guard = Some(g),
                AdmissionOutcome::Completed(memory_id) => {
                    match self.memory.get(memory_id).await {
                        Ok(Some(entry)) => {
                            self.memory.record_hit(entry.id).await;
                            return Ok(self.answer_from_entry(entry).await);
                        }
                        Ok(None) => {
                            tracing::warn!(memory_id, "In-flight leader's entry disappeared");
                        }
                        Err(err) => {
                            tracing::warn!(memory_id, error = %err, "Failed to read leader's entry");
                        }
                    }
                }
                AdmissionOutcome::Proceed => {}
            }
        }

        let result = self.retrieve_and_synthesize(&request, &embedding).await;

        if let Some(guard) = guard {
            match result.as_ref().ok().and_then(|r| r.memory_id) {
                Some(id) => guard.complete(id),
                // Failure or uncached result; waiting followers run their
                // own pipelines
                None => drop(guard),
            }
        }

        result
    }

    async fn retrieve_and_synthesize(
        &self,
        request: &QueryRequest,
        embedding: &[f32],
    ) -> Result<QueryResponse> {
        let k = request.max_results.clamp(1, self.options.max_results_cap);

        let vector_started = Instant::now();
        let vector_chunks = self.vector.search(embedding, k).await?;
        metrics::record_retrieval("vector", vector_started.elapsed().as_secs_f64(), vector_chunks.len());

        let graph_started = Instant::now();
        let enhancement = self.graph.enhance(&vector_chunks);
        let graph_chunks = if enhancement.related_chunk_ids.is_empty() {
            Vec::new()
        } else {
            match self
                .vector
                .fetch_by_ids(&enhancement.related_chunk_ids, Some(embedding))
                .await
            {
                Ok(chunks) => chunks,
                Err(err) => {
                    // Graph expansion is best effort; the vector context
                    // stands on its own
                    tracing::warn!(error = %err, "Graph-related chunk fetch failed");
                    Vec::new()
                }
            }
        };
        metrics::record_retrieval("graph", graph_started.elapsed().as_secs_f64(), graph_chunks.len());

        let assembler = ContextAssembler::new(k + self.options.graph_chunk_limit);
        let context = assembler.assemble(
            vector_chunks,
            graph_chunks,
            enhancement.entities,
            enhancement.communities,
        );

        let synthesized = self.synthesizer.synthesize(&request.query, &context).await?;

        let mut response = QueryResponse::fresh(
            request.query.clone(),
            synthesized.answer,
            synthesized.low_confidence,
            &context,
            None,
        );

        let entry = response.to_new_memory_entry(
            query_fingerprint(&request.query),
            embedding.to_vec(),
            &context,
        );
        if let Some((memory_id, created)) = self.memory.store_entry(&entry).await {
            response.memory_id = Some(memory_id);

            if created && self.options.auto_judge && !context.is_empty() {
                let ranked: Vec<(i64, f32)> = context
                    .chunks
                    .iter()
                    .map(|c| (c.chunk_id, c.similarity))
                    .collect();
                if let Err(err) = self.recorder.judge_ranking(memory_id, "fused", &ranked).await {
                    tracing::warn!(memory_id, error = %err, "Auto-judgment failed");
                }
            }
        }

        Ok(response)
    }

    /// Rebuild the response shape from a stored entry.
    ///
    /// Chunk texts are re-fetched by the stored citation ids; chunks that
    /// have since been deleted drop out silently and remembered chunks
    /// always report similarity 1.0.
    async fn answer_from_entry(&self, entry: MemoryEntry) -> QueryResponse {
        let citation_ids: Vec<i64> = citations_from_json(&entry.citations)
            .iter()
            .map(|c| c.chunk_id)
            .collect();

        let chunks: Vec<ChunkView> = if citation_ids.is_empty() {
            Vec::new()
        } else {
            match self.vector.fetch_by_ids(&citation_ids, None).await {
                Ok(chunks) => chunks.iter().map(ChunkView::from).collect(),
                Err(err) => {
                    tracing::warn!(memory_id = entry.id, error = %err, "Chunk re-fetch failed on memory hit");
                    Vec::new()
                }
            }
        };

        QueryResponse::remembered(&entry, chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionRegistry;
    use crate::eval::{EvalStore, EvaluationRecorder, InMemoryEvalStore};
    use crate::memory::{InMemoryMemoryStore, MemoryStore, QueryMemory};
    use async_trait::async_trait;
    use docmind_common::config::AdmissionPolicy;
    use docmind_common::db::{MemoryStats, NewMemoryEntry};
    use docmind_common::embeddings::MockEmbedder;
    use docmind_common::llm::{CompletionClient, MockCompletion};
    use docmind_retrieval::{GraphIndex, InMemoryChunkStore, StoredChunk};

    const DIM: usize = 32;

    struct Fixture {
        engine: Arc<QueryEngine>,
        chunk_store: Arc<InMemoryChunkStore>,
        memory_store: Arc<InMemoryMemoryStore>,
        eval_store: Arc<InMemoryEvalStore>,
    }

    fn test_options() -> EngineOptions {
        EngineOptions {
            max_results_cap: 50,
            graph_chunk_limit: 5,
            auto_judge: true,
            deadline: Duration::from_secs(5),
        }
    }

    fn build_fixture_with_policy(
        graph: GraphIndex,
        options: EngineOptions,
        completion: Arc<dyn CompletionClient>,
        policy: AdmissionPolicy,
    ) -> Fixture {
        let embedder = Arc::new(MockEmbedder::new(DIM));
        let chunk_store = Arc::new(InMemoryChunkStore::new());
        let memory_store = Arc::new(InMemoryMemoryStore::new());
        let eval_store = Arc::new(InMemoryEvalStore::new());

        let parts = EngineParts {
            embedder,
            memory: Arc::new(QueryMemory::new(memory_store.clone(), 0.95)),
            admission: Arc::new(AdmissionRegistry::new(policy, 0.95)),
            vector: VectorRetriever::new(chunk_store.clone()),
            graph: GraphRetriever::new(Arc::new(graph), 10, 5, 5),
            synthesizer: Synthesizer::new(completion),
            recorder: Arc::new(EvaluationRecorder::new(eval_store.clone(), 0.35)),
        };

        Fixture {
            engine: Arc::new(QueryEngine::new(parts, options)),
            chunk_store,
            memory_store,
            eval_store,
        }
    }

    fn build_fixture(
        graph: GraphIndex,
        options: EngineOptions,
        completion: Arc<dyn CompletionClient>,
    ) -> Fixture {
        build_fixture_with_policy(graph, options, completion, AdmissionPolicy::Serialize)
    }

    fn fixture(script: Vec<&str>) -> (Fixture, Arc<MockCompletion>) {
        let completion = Arc::new(MockCompletion::with_script(script));
        let fixture = build_fixture(GraphIndex::empty(), test_options(), completion.clone());
        (fixture, completion)
    }

    async fn seed_chunk(store: &InMemoryChunkStore, id: i64, text: &str) {
        let embedder = MockEmbedder::new(DIM);
        let embedding = embedder.embed(text).await.unwrap();
        store.insert(StoredChunk {
            id,
            document_id: 1,
            chunk_index: id as i32,
            content: text.to_string(),
            source: "corpus.pdf".to_string(),
            reference: None,
            embedding,
        });
    }

    fn request(query: &str) -> QueryRequest {
        QueryRequest {
            query: query.to_string(),
            max_results: 5,
            use_memory: true,
        }
    }

    #[tokio::test]
    async fn test_fresh_query_synthesizes_stores_and_judges() {
        let (f, completion) = fixture(vec!["Answer grounded in evidence [chunk1]."]);
        seed_chunk(&f.chunk_store, 1, "transformers use attention").await;
        seed_chunk(&f.chunk_store, 2, "cnns use convolutions").await;

        let response = f
            .engine
            .process_query(request("transformers use attention"))
            .await
            .unwrap();

        assert!(!response.from_memory);
        assert_eq!(response.answer, "Answer grounded in evidence [chunk1].");
        assert_eq!(completion.call_count(), 1);
        let memory_id = response.memory_id.unwrap();

        // Query text matches chunk 1 exactly, so it ranks first at 1.0
        assert_eq!(response.chunks[0].id, 1);
        assert!((response.chunks[0].similarity - 1.0).abs() < 1e-5);
        assert_eq!(response.references.len(), response.chunks.len());

        // One cache entry, judged at every fused rank position
        assert_eq!(f.memory_store.len(), 1);
        let judgments = f.eval_store.judgments_for_query(memory_id).await.unwrap();
        assert_eq!(judgments.len(), response.chunks.len());
        assert_eq!(judgments[0].relevance_score, 1);
        assert_eq!(judgments[0].retrieval_method, "fused");
    }

    #[tokio::test]
    async fn test_repeat_query_answers_from_memory() {
        let (f, completion) = fixture(vec!["First answer [chunk1]."]);
        seed_chunk(&f.chunk_store, 1, "rust borrow checker").await;

        let first = f.engine.process_query(request("rust borrow checker")).await.unwrap();
        let second = f.engine.process_query(request("rust borrow checker")).await.unwrap();

        assert!(!first.from_memory);
        assert!(second.from_memory);
        assert_eq!(second.memory_id, first.memory_id);
        assert_eq!(second.answer, first.answer);
        // Remembered chunks re-fetch with similarity pinned to 1.0
        assert!(second.chunks.iter().all(|c| c.similarity == 1.0));
        assert_eq!(completion.call_count(), 1);
        assert_eq!(f.memory_store.len(), 1);
    }

    #[tokio::test]
    async fn test_normalized_variant_hits_exact_entry() {
        let (f, completion) = fixture(vec!["Answer [chunk1]."]);
        seed_chunk(&f.chunk_store, 1, "what is pgvector").await;

        f.engine.process_query(request("what is pgvector")).await.unwrap();
        let hit = f
            .engine
            .process_query(request("  What Is PGVECTOR  "))
            .await
            .unwrap();

        assert!(hit.from_memory);
        assert_eq!(completion.call_count(), 1);
    }

    #[tokio::test]
    async fn test_dissimilar_query_misses_and_stores_separately() {
        let (f, completion) = fixture(vec![
            "About ownership [chunk1].",
            "About garbage collection [chunk2].",
        ]);
        seed_chunk(&f.chunk_store, 1, "rust ownership model").await;
        seed_chunk(&f.chunk_store, 2, "java garbage collection").await;

        let first = f.engine.process_query(request("rust ownership model")).await.unwrap();
        let second = f
            .engine
            .process_query(request("java garbage collection"))
            .await
            .unwrap();

        // Unrelated embeddings stay far below the similarity threshold
        assert!(!first.from_memory);
        assert!(!second.from_memory);
        assert_ne!(first.memory_id, second.memory_id);
        assert_eq!(completion.call_count(), 2);
        assert_eq!(f.memory_store.len(), 2);
    }

    #[tokio::test]
    async fn test_use_memory_false_bypasses_lookup_but_still_stores() {
        let (f, completion) = fixture(vec!["Answer one [chunk1].", "Answer two [chunk1]."]);
        seed_chunk(&f.chunk_store, 1, "graph communities").await;

        let mut req = request("graph communities");
        req.use_memory = false;

        let first = f.engine.process_query(req.clone()).await.unwrap();
        let second = f.engine.process_query(req).await.unwrap();

        assert!(!first.from_memory);
        assert!(!second.from_memory);
        assert_eq!(completion.call_count(), 2);

        // The second store loses the hash conflict and adopts the survivor
        assert_eq!(f.memory_store.len(), 1);
        assert_eq!(second.memory_id, first.memory_id);
        assert_eq!(second.answer, "Answer two [chunk1].");
    }

    #[tokio::test]
    async fn test_empty_corpus_reports_no_material() {
        let (f, completion) = fixture(vec![]);

        let response = f.engine.process_query(request("anything at all")).await.unwrap();

        assert!(response.answer.contains("No relevant material"));
        assert!(response.chunks.is_empty());
        assert!(response.references.is_empty());
        assert!(!response.low_confidence);
        assert_eq!(completion.call_count(), 0);
        // Still cached; nothing to judge though
        let memory_id = response.memory_id.unwrap();
        assert!(f.eval_store.judgments_for_query(memory_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_graph_related_chunks_extend_context() {
        use docmind_common::db::models::{CommunitySummary, GraphEntity};

        // Chunk 3 is only reachable through the community
        let graph = GraphIndex::from_parts(
            vec![GraphEntity {
                id: 1,
                name: "attention".to_string(),
                entity_type: "concept".to_string(),
                source: None,
            }],
            vec![],
            vec![CommunitySummary {
                id: 1,
                community_id: 7,
                summary: "Attention mechanisms".to_string(),
                entities: serde_json::json!(["attention"]),
                related_chunk_ids: serde_json::json!([1, 3]),
            }],
        );

        let completion = Arc::new(MockCompletion::with_script(vec![
            "Extended answer [chunk1] [chunk2].".to_string(),
        ]));
        let f = build_fixture(graph, test_options(), completion.clone());
        seed_chunk(&f.chunk_store, 1, "attention is all you need").await;
        seed_chunk(&f.chunk_store, 3, "positional encodings supplement attention").await;

        let mut req = request("attention is all you need");
        req.max_results = 1;
        let response = f.engine.process_query(req).await.unwrap();

        // Vector returns chunk 1; the community pulls in chunk 3 after it
        assert_eq!(
            response.chunks.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert!((response.chunks[0].similarity - 1.0).abs() < 1e-5);
        // Graph chunk carries a genuine score, not a placeholder
        assert!(response.chunks[1].similarity < 1.0);
        assert_eq!(response.entities.len(), 1);
        assert_eq!(response.communities.len(), 1);
        assert_eq!(response.communities[0].community_id, 7);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_uncached_response() {
        struct InsertFails {
            inner: InMemoryMemoryStore,
        }

        #[async_trait]
        impl MemoryStore for InsertFails {
            async fn find_exact(&self, hash: &str) -> Result<Option<MemoryEntry>> {
                self.inner.find_exact(hash).await
            }
            async fn find_similar(
                &self,
                embedding: &[f32],
                threshold: f32,
            ) -> Result<Option<(MemoryEntry, f32)>> {
                self.inner.find_similar(embedding, threshold).await
            }
            async fn insert(&self, _entry: &NewMemoryEntry) -> Result<(i64, bool)> {
                Err(AppError::DatabaseConnection {
                    message: "write path down".into(),
                })
            }
            async fn record_hit(&self, id: i64) -> Result<()> {
                self.inner.record_hit(id).await
            }
            async fn get(&self, id: i64) -> Result<Option<MemoryEntry>> {
                self.inner.get(id).await
            }
            async fn stats(&self) -> Result<MemoryStats> {
                self.inner.stats().await
            }
            async fn most_accessed(&self, limit: u64) -> Result<Vec<MemoryEntry>> {
                self.inner.most_accessed(limit).await
            }
            async fn recent(&self, limit: u64) -> Result<Vec<MemoryEntry>> {
                self.inner.recent(limit).await
            }
            async fn clear(&self) -> Result<u64> {
                self.inner.clear().await
            }
        }

        let completion = Arc::new(MockCompletion::with_script(vec![
            "Still answers [chunk1].".to_string(),
        ]));
        let chunk_store = Arc::new(InMemoryChunkStore::new());
        let engine = QueryEngine::new(
            EngineParts {
                embedder: Arc::new(MockEmbedder::new(DIM)),
                memory: Arc::new(QueryMemory::new(
                    Arc::new(InsertFails {
                        inner: InMemoryMemoryStore::new(),
                    }),
                    0.95,
                )),
                admission: Arc::new(AdmissionRegistry::new(AdmissionPolicy::Serialize, 0.95)),
                vector: VectorRetriever::new(chunk_store.clone()),
                graph: GraphRetriever::new(Arc::new(GraphIndex::empty()), 10, 5, 5),
                synthesizer: Synthesizer::new(completion),
                recorder: Arc::new(EvaluationRecorder::new(
                    Arc::new(InMemoryEvalStore::new()),
                    0.35,
                )),
            },
            test_options(),
        );
        seed_chunk(&chunk_store, 1, "durable answers").await;

        let response = engine.process_query(request("durable answers")).await.unwrap();

        assert_eq!(response.answer, "Still answers [chunk1].");
        assert_eq!(response.memory_id, None);
        assert!(!response.from_memory);
    }

    struct SlowCompletion {
        inner: MockCompletion,
        delay: Duration,
    }

    #[async_trait]
    impl CompletionClient for SlowCompletion {
        async fn complete(&self, system: &str, user: &str) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            self.inner.complete(system, user).await
        }

        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let completion = Arc::new(SlowCompletion {
            inner: MockCompletion::default(),
            delay: Duration::from_millis(200),
        });
        let mut options = test_options();
        options.deadline = Duration::from_millis(10);

        let f = build_fixture(GraphIndex::empty(), options, completion);
        seed_chunk(&f.chunk_store, 1, "slow upstream").await;

        match f.engine.process_query(request("slow upstream")).await {
            Err(AppError::DeadlineExceeded { .. }) => {}
            other => panic!("expected deadline error, got {:?}", other.map(|r| r.answer)),
        }
        // Nothing was stored for the cancelled pipeline
        assert_eq!(f.memory_store.len(), 0);
    }

    #[tokio::test]
    async fn test_colliding_queries_create_exactly_one_entry() {
        let completion = Arc::new(SlowCompletion {
            inner: MockCompletion::with_script(vec![
                "Leader's answer [chunk1].".to_string(),
                "Unexpected second call [chunk1].".to_string(),
            ]),
            delay: Duration::from_millis(50),
        });

        let f = build_fixture(GraphIndex::empty(), test_options(), completion);
        seed_chunk(&f.chunk_store, 1, "single flight").await;

        let e1 = f.engine.clone();
        let e2 = f.engine.clone();
        let a = tokio::spawn(async move { e1.process_query(request("single flight")).await });
        let b = tokio::spawn(async move { e2.process_query(request("single flight")).await });

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

        // One led, one answered from the leader's entry
        assert_eq!(
            [a.from_memory, b.from_memory].iter().filter(|&&m| m).count(),
            1
        );
        assert_eq!(a.memory_id, b.memory_id);
        assert_eq!(a.answer, "Leader's answer [chunk1].");
        assert_eq!(b.answer, "Leader's answer [chunk1].");
        assert_eq!(f.memory_store.len(), 1);
        assert_eq!(f.engine.admission().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_colliding_queries_race_policy_still_one_entry() {
        let completion = Arc::new(SlowCompletion {
            inner: MockCompletion::with_script(vec![
                "First racer [chunk1].".to_string(),
                "Second racer [chunk1].".to_string(),
            ]),
            delay: Duration::from_millis(50),
        });

        let f = build_fixture_with_policy(
            GraphIndex::empty(),
            test_options(),
            completion.clone(),
            AdmissionPolicy::Race,
        );
        seed_chunk(&f.chunk_store, 1, "racing queries").await;

        let e1 = f.engine.clone();
        let e2 = f.engine.clone();
        let a = tokio::spawn(async move { e1.process_query(request("racing queries")).await });
        let b = tokio::spawn(async move { e2.process_query(request("racing queries")).await });

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

        // Both ran the full pipeline, but the store kept one entry and
        // the loser adopted the survivor's id
        assert!(!a.from_memory);
        assert!(!b.from_memory);
        assert_eq!(completion.inner.call_count(), 2);
        assert_eq!(f.memory_store.len(), 1);
        assert_eq!(a.memory_id, b.memory_id);
        assert!(a.memory_id.is_some());
    }
}
