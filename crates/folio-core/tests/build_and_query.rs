use folio_core::{
    build_store, list_documents, query, resolve_document_filter, search_text, AcquisitionError,
    BuildOptions, BuildOutcome, ChunkParams, Corpus, Document, EmbedError, Embedder, QueryEngine,
    QueryError, TextSource, Tokenizer, TokenizerError, VectorStore,
};

struct Plays;

impl TextSource for Plays {
    async fn load(&self) -> Result<Corpus, AcquisitionError> {
        let docs = [
            ("The Tragedy Of Macbeth", "is this a dagger which i see before me the handle toward my hand come let me clutch thee"),
            ("The Tempest", "full fathom five thy father lies of his bones are coral made"),
            ("Sonnet XVIII", "shall i compare thee to a summers day thou art more lovely and more temperate"),
        ];
        Ok(Corpus {
            documents: docs
                .iter()
                .map(|(t, b)| Document {
                    title: t.to_string(),
                    body: b.to_string(),
                })
                .collect(),
            provenance: "test://plays".to_string(),
        })
    }
}

/// Bytes as token ids; decoding is exact for ASCII input.
struct Bytes;

impl Tokenizer for Bytes {
    fn name(&self) -> &str {
        "bytes"
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        Ok(ids.iter().map(|&b| b as u8 as char).collect())
    }
}

/// Letter-frequency vectors: texts sharing words score high.
struct Letters;

impl Embedder for Letters {
    fn model_name(&self) -> &str {
        "letters-26"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for b in t.bytes().filter(u8::is_ascii_lowercase) {
                    v[(b - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

async fn built_store(dir: &std::path::Path) -> VectorStore {
    let options = BuildOptions {
        params: ChunkParams::new(32, 8).unwrap(),
        batch_size: 3,
        ..BuildOptions::new(dir.join("plays.folio"))
    };
    let outcome = build_store(&Plays, &Bytes, &Letters, &options).await.unwrap();
    assert!(matches!(outcome, BuildOutcome::Built { documents: 3, .. }));
    VectorStore::open(&options.output).unwrap()
}

#[tokio::test]
async fn ranges_cover_every_row_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = built_store(dir.path()).await;

    let entries = list_documents(&store);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].start_row, 0);
    for pair in entries.windows(2) {
        assert_eq!(pair[0].end_row, pair[1].start_row);
    }
    assert_eq!(entries[2].end_row, store.row_count());

    let ids = store.slice_document_ids(0..store.row_count()).unwrap();
    for e in entries {
        assert!(ids[e.rows()].iter().all(|&id| id == e.document_id));
    }
    let spans = store.slice_token_spans(0..store.row_count()).unwrap();
    assert!(spans.iter().all(|&(s, e)| s < e && e - s <= 32));
}

#[tokio::test]
async fn stored_vector_finds_its_own_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = built_store(dir.path()).await;
    let row = store.row_count() - 1;
    let q = store.slice_embeddings(row..row + 1).unwrap().to_vec();

    let hits = query(&store, &q, 1, None).unwrap();
    assert_eq!(hits[0].row, row);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert_eq!(hits[0].document_title, "Sonnet XVIII");
}

#[tokio::test]
async fn title_filter_limits_hits_to_one_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = built_store(dir.path()).await;
    let engine = QueryEngine::new(&store).with_block_rows(2);

    let hits = search_text(&engine, &Letters, "coral bones", 10, Some("tempest"))
        .await
        .unwrap();
    let rows = resolve_document_filter(store.range_index(), "TEMPEST").unwrap();
    assert_eq!(hits.len(), rows.len());
    assert!(hits.iter().all(|h| rows.contains(&h.row) && h.document_title == "The Tempest"));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let err = search_text(&engine, &Letters, "anything", 3, Some("Hamlet"))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::NoMatchingDocument(_)));
}

#[tokio::test]
async fn queries_run_concurrently_on_one_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = built_store(dir.path()).await;
    let n = store.row_count();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..n)
            .map(|row| {
                let store = &store;
                s.spawn(move || {
                    let q = store.slice_embeddings_normed(row..row + 1).unwrap().to_vec();
                    query(store, &q, n, None).unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().len(), n);
        }
    });
}
