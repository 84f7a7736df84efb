//! The RAG pipeline: ingestion, question answering and housekeeping
//!
//! Ingestion: page text → chunker → embedder (document mode) → vector index.
//! Answering: question → retriever → prompt → generator → citation check,
//! surfaced as a lazy stream of [`GenerationEvent`]s.

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{BackendProvider, RagConfig};
use crate::embeddings::{is_zero_vector, Embedder};
use crate::error::{Error, Result};
use crate::generation::{citation, Generator, PromptBuilder, FALLBACK_TITLE};
use crate::ingestion::{chunk_pages, virtual_pages, TextChunker};
use crate::providers::{
    EmbedMode, EmbeddingProvider, GeminiClient, GeminiEmbedder, GeminiLlm, HashingEmbedder,
    TokenStream, VectorStoreProvider,
};
use crate::retrieval::{Retriever, SqliteVectorStore};
use crate::retry::tokio_sleeper;
use crate::types::{Citation, EvidenceItem, GenerationEvent, IndexStats, IngestReport, PageText};

/// Informational answer when nothing relevant was retrieved
pub const NO_DOCUMENTS_MESSAGE: &str =
    "No relevant documents found. Please upload some PDFs first.";

/// Maximum title length in characters
pub const MAX_TITLE_CHARS: usize = 50;

/// Events of one answer, in order
pub type EventStream = BoxStream<'static, GenerationEvent>;

/// Shared handle to the pipeline; cheap to clone
#[derive(Clone)]
pub struct RagPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    chunker: TextChunker,
    embedder: Arc<Embedder>,
    store: Arc<dyn VectorStoreProvider>,
    retriever: Retriever,
    generator: Generator,
    top_k: usize,
    virtual_page_size: usize,
}

enum AnswerState {
    Retrieve {
        question: String,
        allowed_document_ids: Option<Vec<String>>,
    },
    Streaming {
        tokens: TokenStream,
        full_text: String,
        evidence: Vec<EvidenceItem>,
    },
    Citations {
        pending: VecDeque<Citation>,
        full_text: String,
        citations: Vec<Citation>,
    },
    Finished,
}

impl RagPipeline {
    /// Assemble a pipeline from ready components
    pub fn new(
        config: &RagConfig,
        embedder: Embedder,
        store: Arc<dyn VectorStoreProvider>,
        generator: Generator,
    ) -> Result<Self> {
        if store.dimensions() != embedder.dimensions() {
            return Err(Error::config(format!(
                "vector index {} has {} dimensions, embedder {} produces {}",
                store.name(),
                store.dimensions(),
                embedder.provider_name(),
                embedder.dimensions()
            )));
        }

        let chunker = TextChunker::from_config(&config.chunking)?;
        let embedder = Arc::new(embedder);
        let retriever = Retriever::new(Arc::clone(&embedder), Arc::clone(&store));

        Ok(Self {
            inner: Arc::new(PipelineInner {
                chunker,
                embedder,
                store,
                retriever,
                generator,
                top_k: config.retrieval.top_k,
                virtual_page_size: config.chunking.virtual_page_size,
            }),
        })
    }

    /// Build the Gemini-backed pipeline described by `config`
    pub async fn from_config(config: &RagConfig) -> Result<Self> {
        config.validate()?;

        let dimensions = config.embeddings.dimensions;
        let client = Arc::new(GeminiClient::new(&config.llm)?);

        let provider: Arc<dyn EmbeddingProvider> = match config.backend {
            BackendProvider::Gemini => {
                info!("Using Gemini embeddings ({})", config.embeddings.model);
                Arc::new(GeminiEmbedder::new(
                    Arc::clone(&client),
                    config.embeddings.model.clone(),
                    dimensions,
                ))
            }
            BackendProvider::Offline => {
                info!("Using offline hashing embeddings");
                Arc::new(HashingEmbedder::new(dimensions))
            }
        };

        let llm = Arc::new(GeminiLlm::new(client, config.llm.generate_model.clone()));
        let store = SqliteVectorStore::open(&config.vector_db, dimensions, tokio_sleeper()).await?;

        Self::new(
            config,
            Embedder::new(provider, &config.embeddings)?,
            Arc::new(store),
            Generator::new(llm, &config.llm),
        )
    }

    /// Chunk, embed and index the pages of a document.
    ///
    /// Re-ingesting the same id replaces the previous chunks. Texts that
    /// cannot be embedded are stored as zero vectors and counted in
    /// [`IngestReport::unembedded_count`].
    pub async fn ingest(
        &self,
        document_id: &str,
        filename: &str,
        pages: &[PageText],
    ) -> Result<IngestReport> {
        if document_id.trim().is_empty() {
            return Err(Error::InvalidInput("document id must not be empty".to_string()));
        }

        let chunks = chunk_pages(&self.inner.chunker, document_id, filename, pages);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let metadatas: Vec<_> = chunks.iter().map(|c| c.metadata()).collect();

        let vectors = self
            .inner
            .embedder
            .embed_many(&texts, EmbedMode::Document)
            .await?;
        let unembedded_count = vectors.iter().filter(|v| is_zero_vector(v)).count();
        if unembedded_count > 0 {
            warn!(
                "{} of {} chunks of {} could not be embedded",
                unembedded_count,
                texts.len(),
                filename
            );
        }

        let chunk_count = self
            .inner
            .store
            .upsert(document_id, &texts, &vectors, &metadatas)
            .await?;

        info!(
            "Ingested {} ({} pages, {} chunks)",
            filename,
            pages.len(),
            chunk_count
        );
        Ok(IngestReport {
            chunk_count,
            unembedded_count,
        })
    }

    /// Ingest text without page boundaries, grouped into virtual pages
    pub async fn ingest_unpaged(
        &self,
        document_id: &str,
        filename: &str,
        text: &str,
    ) -> Result<IngestReport> {
        let pages = virtual_pages(text, self.inner.virtual_page_size);
        self.ingest(document_id, filename, &pages).await
    }

    /// Answer a question as a lazy event stream.
    ///
    /// Nothing runs until the stream is polled, and dropping it cancels any
    /// in-flight work. The stream ends with exactly one `Done` or `Error`.
    pub fn answer(
        &self,
        question: impl Into<String>,
        allowed_document_ids: Option<Vec<String>>,
    ) -> EventStream {
        let state = AnswerState::Retrieve {
            question: question.into(),
            allowed_document_ids,
        };

        stream::unfold(
            (Arc::clone(&self.inner), state),
            |(inner, state)| async move {
                let (event, next) = inner.step(state).await?;
                Some((event, (inner, next)))
            },
        )
        .boxed()
    }

    /// Remove every chunk of a document. Unknown ids are not an error.
    pub async fn remove(&self, document_id: &str) -> Result<()> {
        let removed = self.inner.store.delete_by_document(document_id).await?;
        info!("Removed document {} ({} chunks)", document_id, removed);
        Ok(())
    }

    /// Short title for a conversation opened with `first_message`. Never fails.
    pub async fn title_for(&self, first_message: &str) -> String {
        let prompt = PromptBuilder::build_title(first_message);
        clean_title(&self.inner.generator.generate_short(&prompt).await)
    }

    /// Index statistics
    pub async fn stats(&self) -> Result<IndexStats> {
        self.inner.store.stats().await
    }
}

impl PipelineInner {
    /// Advance the answer state machine by one event
    async fn step(&self, mut state: AnswerState) -> Option<(GenerationEvent, AnswerState)> {
        loop {
            state = match state {
                AnswerState::Retrieve {
                    question,
                    allowed_document_ids,
                } => {
                    let evidence = match self
                        .retriever
                        .retrieve(&question, self.top_k, allowed_document_ids.as_deref())
                        .await
                    {
                        Ok(evidence) => evidence,
                        Err(e) => return Some(fail(e)),
                    };

                    if evidence.is_empty() {
                        debug!("No evidence for question, skipping generation");
                        let token = GenerationEvent::Token {
                            text: NO_DOCUMENTS_MESSAGE.to_string(),
                        };
                        let next = AnswerState::Citations {
                            pending: VecDeque::new(),
                            full_text: NO_DOCUMENTS_MESSAGE.to_string(),
                            citations: Vec::new(),
                        };
                        return Some((token, next));
                    }

                    let prompt = PromptBuilder::build(&question, &evidence);
                    match self.generator.stream(&prompt).await {
                        Ok(tokens) => AnswerState::Streaming {
                            tokens,
                            full_text: String::new(),
                            evidence,
                        },
                        Err(e) => return Some(fail(e)),
                    }
                }

                AnswerState::Streaming {
                    mut tokens,
                    mut full_text,
                    evidence,
                } => match tokens.next().await {
                    Some(Ok(text)) => {
                        full_text.push_str(&text);
                        let next = AnswerState::Streaming {
                            tokens,
                            full_text,
                            evidence,
                        };
                        return Some((GenerationEvent::Token { text }, next));
                    }
                    Some(Err(e)) => return Some(fail(e)),
                    None => {
                        let citations = citation::extract(&full_text, &evidence);
                        debug!(
                            "Answer complete ({} chars, {} citations)",
                            full_text.chars().count(),
                            citations.len()
                        );
                        AnswerState::Citations {
                            pending: citations.iter().cloned().collect(),
                            full_text,
                            citations,
                        }
                    }
                },

                AnswerState::Citations {
                    mut pending,
                    full_text,
                    citations,
                } => {
                    if let Some(next_citation) = pending.pop_front() {
                        let next = AnswerState::Citations {
                            pending,
                            full_text,
                            citations,
                        };
                        return Some((GenerationEvent::Citation(next_citation), next));
                    }
                    let done = GenerationEvent::Done {
                        full_text,
                        citations,
                    };
                    return Some((done, AnswerState::Finished));
                }

                AnswerState::Finished => return None,
            };
        }
    }
}

fn fail(error: Error) -> (GenerationEvent, AnswerState) {
    warn!("Answer failed: {}", error);
    let event = GenerationEvent::Error {
        message: error.to_string(),
    };
    (event, AnswerState::Finished)
}

/// Strip quotes and whitespace and cap the length
fn clean_title(raw: &str) -> String {
    let title: String = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();
    let title = title.trim();

    if title.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        title.to_string()
    }
}
