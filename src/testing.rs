//! In-memory stand-ins for the remote services, shared by the unit tests

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::index::{
    IndexDescription, IndexError, IndexHandle, IndexSpec, SourceChunk, VectorRecord, VectorStore,
};
use crate::model::{ChatModel, Embedder, ModelError};

/// Build a PDF with one page per entry; an empty entry gives a blank page
pub fn pdf_fixture(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture saves");
    bytes
}

struct MemoryIndex {
    dimension: usize,
    describes: usize,
    records: BTreeMap<String, VectorRecord>,
}

impl MemoryIndex {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            describes: 0,
            records: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct StoreState {
    indexes: BTreeMap<String, MemoryIndex>,
    ready_after: usize,
    conflict_on_create: bool,
    fail_upserts_after: Option<usize>,
    calls: usize,
    created: usize,
    describes: usize,
    queries: usize,
    upsert_sizes: Vec<usize>,
}

/// Vector database kept in memory, with call counters and failure injection
///
/// Clones share state, so a test can keep one clone to inspect what the code under test did.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing, ready index
    pub fn with_index(self, name: &str, dimension: usize) -> Self {
        self.lock()
            .indexes
            .insert(name.to_string(), MemoryIndex::new(dimension));
        self
    }

    /// Report indexes as not ready for the first `polls` describes
    pub fn with_ready_after(self, polls: usize) -> Self {
        self.lock().ready_after = polls;
        self
    }

    /// Answer create requests with a conflict, as if another client created the index first
    pub fn with_conflict_on_create(self) -> Self {
        self.lock().conflict_on_create = true;
        self
    }

    /// Let `successes` upserts through, then fail every later one
    pub fn fail_upserts_after(self, successes: usize) -> Self {
        self.lock().fail_upserts_after = Some(successes);
        self
    }

    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    pub fn created(&self) -> usize {
        self.lock().created
    }

    pub fn describes(&self) -> usize {
        self.lock().describes
    }

    pub fn queries(&self) -> usize {
        self.lock().queries
    }

    pub fn upsert_sizes(&self) -> Vec<usize> {
        self.lock().upsert_sizes.clone()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.lock().indexes.keys().cloned().collect()
    }

    pub fn record_count(&self, name: &str) -> usize {
        self.lock()
            .indexes
            .get(name)
            .map(|index| index.records.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store lock poisoned")
    }
}

fn host_for(name: &str) -> String {
    format!("memory://{name}")
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

impl VectorStore for MemoryStore {
    async fn list_indexes(&self) -> Result<Vec<IndexDescription>, IndexError> {
        let mut state = self.lock();
        state.calls += 1;
        let ready_after = state.ready_after;
        Ok(state
            .indexes
            .iter()
            .map(|(name, index)| IndexDescription {
                name: name.clone(),
                dimension: index.dimension,
                metric: "cosine".to_string(),
                host: host_for(name),
                ready: index.describes > ready_after,
            })
            .collect())
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<(), IndexError> {
        let mut state = self.lock();
        state.calls += 1;
        if state.conflict_on_create {
            state
                .indexes
                .entry(spec.name.clone())
                .or_insert_with(|| MemoryIndex::new(spec.dimension));
            return Err(IndexError::Conflict);
        }
        if state.indexes.contains_key(&spec.name) {
            return Err(IndexError::Conflict);
        }
        state
            .indexes
            .insert(spec.name.clone(), MemoryIndex::new(spec.dimension));
        state.created += 1;
        Ok(())
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescription, IndexError> {
        let mut state = self.lock();
        state.calls += 1;
        state.describes += 1;
        let ready_after = state.ready_after;
        let index = state
            .indexes
            .get_mut(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        index.describes = index.describes.saturating_add(1);
        Ok(IndexDescription {
            name: name.to_string(),
            dimension: index.dimension,
            metric: "cosine".to_string(),
            host: host_for(name),
            ready: index.describes > ready_after,
        })
    }

    async fn upsert(
        &self,
        index: &IndexHandle,
        records: Vec<VectorRecord>,
    ) -> Result<usize, IndexError> {
        let mut state = self.lock();
        state.calls += 1;
        if let Some(limit) = state.fail_upserts_after {
            if state.upsert_sizes.len() >= limit {
                return Err(IndexError::Api {
                    status_code: 503,
                    message: "service unavailable".to_string(),
                });
            }
        }
        let target = state
            .indexes
            .get_mut(&index.name)
            .ok_or_else(|| IndexError::NotFound(index.name.clone()))?;
        let count = records.len();
        for record in records {
            target.records.insert(record.id.clone(), record);
        }
        state.upsert_sizes.push(count);
        Ok(count)
    }

    async fn query(
        &self,
        index: &IndexHandle,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<SourceChunk>, IndexError> {
        let mut state = self.lock();
        state.calls += 1;
        state.queries += 1;
        let target = state
            .indexes
            .get(&index.name)
            .ok_or_else(|| IndexError::NotFound(index.name.clone()))?;

        let mut scored: Vec<SourceChunk> = target
            .records
            .values()
            .map(|record| SourceChunk {
                id: record.id.clone(),
                text: record.metadata.text.clone(),
                score: cosine(&vector, &record.values),
                position: record.metadata.position,
                source: record.metadata.source.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_all(&self, index: &IndexHandle) -> Result<(), IndexError> {
        let mut state = self.lock();
        state.calls += 1;
        let target = state
            .indexes
            .get_mut(&index.name)
            .ok_or_else(|| IndexError::NotFound(index.name.clone()))?;
        target.records.clear();
        Ok(())
    }
}

/// Deterministic bag-of-words embedder: each word is hashed into one dimension
#[derive(Clone)]
pub struct KeywordEmbedder {
    ndims: usize,
    max_batch: usize,
    calls: Arc<AtomicUsize>,
    rejects_key: bool,
}

impl KeywordEmbedder {
    pub fn new(ndims: usize) -> Self {
        Self {
            ndims,
            max_batch: 64,
            calls: Arc::new(AtomicUsize::new(0)),
            rejects_key: false,
        }
    }

    /// An embedder whose service turns every request away as unauthorized
    pub fn rejecting_key(ndims: usize) -> Self {
        Self {
            rejects_key: true,
            ..Self::new(ndims)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.ndims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.ndims as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Embedder for KeywordEmbedder {
    fn ndims(&self) -> usize {
        self.ndims
    }

    fn max_batch(&self) -> usize {
        self.max_batch
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.rejects_key {
            return Err(ModelError::Auth("invalid subscription key".to_string()));
        }
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

type Script = dyn Fn(&str) -> Result<String, ModelError> + Send + Sync;

/// Chat model driven by a closure, recording every prompt it receives
#[derive(Clone)]
pub struct ScriptedChat {
    script: Arc<Script>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChat {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str) -> Result<String, ModelError> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer with `reply`
    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Always fail with the error `make` builds
    pub fn failing<F>(make: F) -> Self
    where
        F: Fn() -> ModelError + Send + Sync + 'static,
    {
        Self::new(move |_| Err(make()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt lock poisoned").clone()
    }
}

impl ChatModel for ScriptedChat {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts
            .lock()
            .expect("prompt lock poisoned")
            .push(prompt.to_string());
        (self.script)(prompt)
    }
}
