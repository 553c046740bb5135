mod common;

use std::sync::Arc;

use common::*;
use hybrid_rag::chunk::ORIGIN_KEY;
use hybrid_rag::{
    BackendAdapter, BackendKind, EmbeddingEngine, EmbeddingEngines, MetadataFilter, MetadataValue,
    RagConfig, RagError, RawHit, Retriever, UNRANKED_SCORE,
};

const S3: &str = "S3 stores objects in buckets.";
const EBS: &str = "EBS volumes attach to a single instance.";
const GLACIER: &str = "Glacier is for archival storage.";

fn kb_retriever(config: RagConfig, ranker: Arc<dyn hybrid_rag::Reranker>) -> Retriever {
    Retriever::builder()
        .config(config)
        .adapter(Arc::new(BackendAdapter::knowledge_base(
            Arc::new(FixedBackend::new(vec![
                RawHit::new(S3).with_metadata("team", "storage"),
                RawHit::new(EBS).with_metadata("team", "compute"),
                RawHit::new(GLACIER).with_metadata("team", "storage"),
            ])),
            TIMEOUT,
        )))
        .reranker(ranker)
        .build()
        .unwrap()
}

#[tokio::test]
async fn keeps_chunks_above_threshold_in_score_order() {
    let ranker = scripted_ranker([(S3, 0.9), (EBS, 0.4), (GLACIER, 0.7)]);
    let retriever = kb_retriever(RagConfig::default(), Arc::new(ranker));

    let chunks = retriever.retrieve("object storage", 5, None).await.unwrap();

    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, [S3, GLACIER]);
    assert!(chunks.iter().all(|c| c.source() == "knowledge_base"));
}

#[tokio::test]
async fn truncates_to_top_k() {
    let ranker = scripted_ranker([(S3, 0.9), (EBS, 0.8), (GLACIER, 0.7)]);
    let retriever = kb_retriever(RagConfig::default(), Arc::new(ranker));

    let chunks = retriever.retrieve("storage", 2, None).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, S3);
}

#[tokio::test]
async fn applies_metadata_filter_before_ranking() {
    let ranker = scripted_ranker([(S3, 0.9), (EBS, 0.95), (GLACIER, 0.7)]);
    let retriever = kb_retriever(RagConfig::default(), Arc::new(ranker));
    let filter = MetadataFilter::new().with("team", "storage");

    let chunks = retriever.retrieve("storage", 5, Some(&filter)).await.unwrap();

    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.metadata.get("team") == Some(&MetadataValue::from("storage"))));
}

#[tokio::test]
async fn no_configured_backend_yields_empty() {
    let config = RagConfig::builder().backend(None).build().unwrap();
    let retriever = kb_retriever(config, Arc::new(scripted_ranker([])));

    assert!(retriever.retrieve("storage", 5, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn configured_backend_without_adapter_yields_empty() {
    let config = RagConfig::builder().backend(Some(BackendKind::SearchIndex)).build().unwrap();
    let retriever = kb_retriever(config, Arc::new(scripted_ranker([])));

    assert!(retriever.retrieve("storage", 5, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn faulty_backend_yields_empty() {
    let retriever = Retriever::builder()
        .config(RagConfig::default())
        .adapter(Arc::new(BackendAdapter::knowledge_base(Arc::new(FaultyBackend), TIMEOUT)))
        .reranker(Arc::new(scripted_ranker([])))
        .build()
        .unwrap();

    assert!(retriever.retrieve("storage", 5, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn ranking_failure_on_both_engines_is_an_error() {
    let retriever = kb_retriever(
        RagConfig::default(),
        Arc::new(ranker(Arc::new(DownEmbedder), Arc::new(DownEmbedder))),
    );

    let err = retriever.retrieve("storage", 5, None).await.unwrap_err();
    assert!(matches!(err, RagError::Ranking { .. }));
}

#[tokio::test]
async fn backend_source_is_preserved_as_origin() {
    let retriever = Retriever::builder()
        .config(RagConfig::default())
        .adapter(Arc::new(BackendAdapter::knowledge_base(
            Arc::new(FixedBackend::new(vec![
                RawHit::new(S3).with_metadata("source", "s3://docs/storage.pdf"),
            ])),
            TIMEOUT,
        )))
        .reranker(Arc::new(RecordingReranker::default()))
        .build()
        .unwrap();

    let chunks = retriever.retrieve("storage", 5, None).await.unwrap();

    assert_eq!(chunks[0].source(), "knowledge_base");
    assert_eq!(chunks[0].score, UNRANKED_SCORE);
    assert_eq!(
        chunks[0].metadata.get(ORIGIN_KEY),
        Some(&MetadataValue::from("s3://docs/storage.pdf"))
    );
}

#[tokio::test]
async fn engines_and_raw_backend_follow_the_config() {
    let engine_a = Arc::new(ScriptedEmbedder::new([(S3, 0.9)]));
    let engine_b = Arc::new(ScriptedEmbedder::new([(S3, 0.9)]));
    let config = RagConfig::builder().embedding_engine(EmbeddingEngine::B).build().unwrap();
    let retriever = Retriever::builder()
        .config(config)
        .backend(BackendKind::KnowledgeBase, Arc::new(FixedBackend::texts(&[S3])))
        .engines(EmbeddingEngines::new(engine_a.clone(), engine_b.clone()))
        .build()
        .unwrap();

    let chunks = retriever.retrieve("object storage", 5, None).await.unwrap();

    assert_eq!(chunks.len(), 1);
    assert_eq!(engine_a.calls(), 0);
    assert_eq!(engine_b.calls(), 2);
}

#[test]
fn reranker_engine_must_match_config() {
    let config = RagConfig::builder().embedding_engine(EmbeddingEngine::B).build().unwrap();
    let built = Retriever::builder().config(config).reranker(Arc::new(scripted_ranker([]))).build();
    assert!(matches!(built, Err(RagError::Config(_))));

    let built = Retriever::builder().config(RagConfig::default()).build();
    assert!(matches!(built, Err(RagError::Config(_))));
}

#[tokio::test]
async fn zero_top_k_returns_the_best_chunk() {
    let ranker = scripted_ranker([(S3, 0.9), (EBS, 0.8), (GLACIER, 0.7)]);
    let retriever = kb_retriever(RagConfig::default(), Arc::new(ranker));

    let chunks = retriever.retrieve("storage", 0, None).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, S3);
}
