//! Loading and process-wide caching of the ONNX model and its tokenizer

use mailsort_core::{Error, LabelSet, Result};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};
use std::time::Instant;
use tokenizers::{Tokenizer, TruncationParams};

use crate::model_config::{ArtifactPaths, ModelMetadata};

/// One-shot, thread-safe cache for a value that is expensive to build.
///
/// The first caller runs the initializer while holding an init lock; callers
/// racing with it block on that lock and then observe the stored value.
/// A failed initialization stores nothing, so the next call tries again.
pub struct ArtifactCache<T> {
    cell: OnceLock<Arc<T>>,
    init_lock: Mutex<()>,
    attempts: AtomicUsize,
}

impl<T> ArtifactCache<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init_lock: parking_lot::const_mutex(()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Return the cached value, running `init` if nothing is cached yet
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.cell.get() {
            return Ok(Arc::clone(value));
        }

        let _guard = self.init_lock.lock();

        // Another caller may have finished while we waited for the lock.
        if let Some(value) = self.cell.get() {
            return Ok(Arc::clone(value));
        }

        self.attempts.fetch_add(1, Ordering::SeqCst);
        let value = Arc::new(init()?);

        // Only this thread can set the cell while it holds `init_lock`.
        let _ = self.cell.set(Arc::clone(&value));
        Ok(value)
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Number of load sequences that actually ran, successful or not
    pub fn load_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl<T> Default for ArtifactCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Loaded model session, tokenizer and the label order they agree on.
///
/// Immutable after construction. The session sits behind a mutex because
/// ONNX Runtime needs exclusive access for `run`, which serializes
/// concurrent inferences; the tokenizer is shared read-only.
pub struct LoadedArtifacts {
    pub(crate) session: Mutex<Session>,
    pub(crate) tokenizer: Tokenizer,
    labels: LabelSet,
    paths: ArtifactPaths,
    output_dim: Option<usize>,
}

impl std::fmt::Debug for LoadedArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedArtifacts")
            .field("model_path", &self.paths.model_path)
            .field("tokenizer_dir", &self.paths.tokenizer_dir)
            .field("labels", &self.labels)
            .field("output_dim", &self.output_dim)
            .finish()
    }
}

impl LoadedArtifacts {
    /// Load the tokenizer and model from `paths`.
    ///
    /// Fails fast when the model's declared output dimension or the
    /// recorded vocabulary size disagree with the label set or tokenizer.
    pub fn load(paths: &ArtifactPaths) -> Result<Self> {
        let start = Instant::now();
        tracing::info!(
            model = %paths.model_path.display(),
            tokenizer = %paths.tokenizer_dir.display(),
            "Loading classifier artifacts"
        );

        paths.check_exists()?;

        let metadata = ModelMetadata::load(&paths.model_config_file())?;
        let tokenizer = load_tokenizer(paths)?;
        check_vocabulary(&tokenizer, &metadata)?;

        let session = create_session(paths)?;

        let output_dim = session.outputs().first().and_then(|o| infer_dim(o.dtype()));
        if let Some(dim) = output_dim {
            if dim != metadata.labels.len() {
                return Err(Error::artifact_load(format!(
                    "model outputs {} scores but the label set has {} labels ({})",
                    dim,
                    metadata.labels.len(),
                    metadata.labels.as_slice().join(", ")
                )));
            }
        } else {
            tracing::debug!("model output dimension is dynamic, checking per inference");
        }

        tracing::info!(
            labels = metadata.labels.len(),
            labels_from_config = metadata.labels_from_config,
            max_length = paths.max_length,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Classifier artifacts loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            labels: metadata.labels,
            paths: paths.clone(),
            output_dim,
        })
    }

    /// Index-aligned labels for the model output
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }
}

/// Build a CPU-only ONNX Runtime session
fn create_session(paths: &ArtifactPaths) -> Result<Session> {
    let session = Session::builder()
        .map_err(|e| Error::artifact_load(format!("failed to create session builder: {e}")))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(|e| Error::artifact_load(format!("failed to register CPU provider: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| Error::artifact_load(format!("failed to set optimization level: {e}")))?
        .with_intra_threads(num_cpus::get_physical())
        .map_err(|e| Error::artifact_load(format!("failed to set intra-op threads: {e}")))?
        .commit_from_file(&paths.model_path)
        .map_err(|e| {
            Error::artifact_load(format!(
                "failed to load model {}: {e}",
                paths.model_path.display()
            ))
        })?;

    Ok(session)
}

/// Load `tokenizer.json` with truncation and no padding
fn load_tokenizer(paths: &ArtifactPaths) -> Result<Tokenizer> {
    let tokenizer_path = paths.tokenizer_file();

    let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
        Error::artifact_load(format!(
            "failed to load tokenizer {}: {e}",
            tokenizer_path.display()
        ))
    })?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: paths.max_length,
            ..Default::default()
        }))
        .map_err(|e| Error::artifact_load(format!("failed to set truncation: {e}")))?;

    // Single-example inference never needs padding.
    tokenizer.with_padding(None);

    Ok(tokenizer)
}

/// Token ids beyond the model's embedding table would be garbage input
fn check_vocabulary(tokenizer: &Tokenizer, metadata: &ModelMetadata) -> Result<()> {
    let Some(model_vocab) = metadata.vocab_size else {
        return Ok(());
    };

    let tokenizer_vocab = tokenizer.get_vocab_size(true);
    if tokenizer_vocab > model_vocab {
        return Err(Error::artifact_load(format!(
            "tokenizer vocabulary ({tokenizer_vocab}) exceeds model vocabulary ({model_vocab}); \
             tokenizer and model come from different checkpoints"
        )));
    }
    if tokenizer_vocab < model_vocab {
        tracing::warn!(
            tokenizer_vocab,
            model_vocab,
            "tokenizer vocabulary is smaller than the model's"
        );
    }
    Ok(())
}

/// Last dimension of the first output, when it is static
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}

/// Resolves artifacts for one set of paths and caches them for its lifetime
pub struct ArtifactLoader {
    paths: ArtifactPaths,
    cache: ArtifactCache<LoadedArtifacts>,
}

impl ArtifactLoader {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self {
            paths,
            cache: ArtifactCache::new(),
        }
    }

    /// Cached artifacts, loading them on first use.
    ///
    /// Load errors are returned to the caller and not remembered.
    pub fn get(&self) -> Result<Arc<LoadedArtifacts>> {
        self.cache
            .get_or_try_init(|| LoadedArtifacts::load(&self.paths))
            .inspect_err(|e| tracing::error!(error = %e, "Failed to load classifier artifacts"))
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn is_loaded(&self) -> bool {
        self.cache.is_loaded()
    }

    pub fn load_attempts(&self) -> usize {
        self.cache.load_attempts()
    }
}

static GLOBAL_LOADER: LazyLock<Arc<ArtifactLoader>> =
    LazyLock::new(|| Arc::new(ArtifactLoader::new(ArtifactPaths::from_env())));

/// Process-wide loader, configured from the environment on first access
pub fn global_loader() -> &'static ArtifactLoader {
    &GLOBAL_LOADER
}

pub(crate) fn shared_global_loader() -> Arc<ArtifactLoader> {
    Arc::clone(&GLOBAL_LOADER)
}

/// Process-wide cached model and tokenizer
pub fn get_artifacts() -> Result<Arc<LoadedArtifacts>> {
    global_loader().get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_cache_initializes_once_under_contention() {
        let cache: ArtifactCache<String> = ArtifactCache::new();
        let barrier = Barrier::new(16);
        let runs = AtomicUsize::new(0);
        let (cache, barrier, runs) = (&cache, &barrier, &runs);

        let values: Vec<Arc<String>> = thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        cache
                            .get_or_try_init(|| {
                                runs.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(20));
                                Ok("artifacts".to_string())
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.load_attempts(), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    }

    #[test]
    fn test_cache_does_not_remember_failures() {
        let cache: ArtifactCache<u32> = ArtifactCache::new();

        let err = cache
            .get_or_try_init(|| Err(Error::artifact_load("model file not found")))
            .unwrap_err();
        assert!(matches!(err, Error::ArtifactLoad(_)));
        assert!(!cache.is_loaded());

        let value = cache.get_or_try_init(|| Ok(7)).unwrap();
        assert_eq!(*value, 7);
        assert_eq!(cache.load_attempts(), 2);

        // Cached now; the initializer is not consulted again.
        let again = cache
            .get_or_try_init(|| Err(Error::internal("must not run")))
            .unwrap();
        assert!(Arc::ptr_eq(&value, &again));
        assert_eq!(cache.load_attempts(), 2);
    }

    #[test]
    fn test_loader_missing_artifacts_retries() {
        let loader = ArtifactLoader::new(ArtifactPaths::new(
            "/nonexistent/minilm-int8.onnx",
            "/nonexistent/minilm-epoch3",
        ));

        assert!(matches!(loader.get(), Err(Error::ArtifactLoad(_))));
        assert!(matches!(loader.get(), Err(Error::ArtifactLoad(_))));
        assert!(!loader.is_loaded());
        assert_eq!(loader.load_attempts(), 2);
    }
}
