//! Progressive-enhancement coordinator over the three extraction tiers.
//!
//! Construction spawns two supervised background loads on the current Tokio
//! runtime: the concept database first, then the full model once the concept
//! load has settled (ready or failed). Callers are never blocked by either;
//! [`HybridCoordinator::extract`] always answers with the best tier that is
//! ready at the time of the call.
//!
//! Results are cached by content hash. A cached result is returned as-is even
//! when a better tier has become ready since it was computed.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{
    runtime::Handle,
    sync::watch,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, info, instrument};

use crate::{
    config::{CoordinatorConfig, Settings},
    error::{ExtractionError, FaultKind, LoadError},
    nlp::{
        cache::{content_hash, CacheStatus, ExtractionCache},
        concepts::ConceptStore,
        diagnostics::{Diagnostics, DiagnosticsSnapshot},
        model::{ModelAdapter, ModelLoader, PackLoader},
        terms::{builtin_dictionary, TermDictionary, TermIndex},
        ExtractMode, ExtractionResult, Tier,
    },
};

/// Load lifecycle of a background tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TierState {
    Pending,
    Loading { attempt: u32 },
    Ready,
    Failed { kind: FaultKind, message: String },
}

impl TierState {
    /// Ready or failed; no further transitions will happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed { .. })
    }
}

/// Readiness flag plus a watch channel announcing state changes.
#[derive(Debug)]
struct TierSlot {
    ready: AtomicBool,
    state: watch::Sender<TierState>,
}

impl TierSlot {
    fn new() -> Self {
        let (state, _) = watch::channel(TierState::Pending);
        Self {
            ready: AtomicBool::new(false),
            state,
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Publish a new state. A ready tier never leaves `Ready`.
    ///
    /// The check and the transition happen under the watch channel's lock.
    fn set(&self, state: TierState) {
        self.state.send_if_modified(|current| {
            if *current == TierState::Ready {
                return false;
            }
            if state == TierState::Ready {
                self.ready.store(true, Ordering::Release);
            }
            *current = state;
            true
        });
    }

    fn state(&self) -> TierState {
        self.state.borrow().clone()
    }
}

/// Everything the coordinator needs to build and load its tiers.
pub struct Tiers {
    pub term_index: TermIndex,
    pub concept_store: Arc<ConceptStore>,
    /// Directory holding the concept database; `None` leaves the partial tier unconfigured.
    pub concept_dir: Option<PathBuf>,
    /// Full-tier loader; `None` leaves the full tier unconfigured.
    pub model_loader: Option<Arc<dyn ModelLoader>>,
}

impl Tiers {
    /// Default tiers: built-in or configured dictionary, concept database and model pack.
    pub fn from_settings(settings: &Settings) -> Result<Self, LoadError> {
        let confidence = settings.coordinator.confidence;
        let dictionary = match &settings.term_dictionary {
            Some(path) => TermDictionary::from_path(path)?,
            None => builtin_dictionary().clone(),
        };
        Ok(Self {
            term_index: TermIndex::new(dictionary, confidence),
            concept_store: Arc::new(ConceptStore::new(confidence)),
            concept_dir: Some(settings.concept_db_dir.clone()),
            model_loader: Some(Arc::new(PackLoader::new(
                settings.model_path.clone(),
                confidence.full,
            ))),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LightweightStatus {
    pub ready: bool,
    pub term_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartialStatus {
    pub ready: bool,
    pub state: TierState,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullStatus {
    pub ready: bool,
    pub loaded: bool,
    pub model: Option<String>,
    pub state: TierState,
}

/// Snapshot returned by [`HybridCoordinator::status`].
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub lightweight: LightweightStatus,
    pub partial: PartialStatus,
    pub full: FullStatus,
    pub cache: CacheStatus,
    pub diagnostics: DiagnosticsSnapshot,
}

struct Inner {
    config: CoordinatorConfig,
    term_index: TermIndex,
    concept_store: Arc<ConceptStore>,
    model: OnceCell<ModelAdapter>,
    partial: TierSlot,
    full: TierSlot,
    cache: ExtractionCache,
    diagnostics: Diagnostics,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Single entry point for tiered extraction. Cheap to clone.
#[derive(Clone)]
pub struct HybridCoordinator {
    inner: Arc<Inner>,
}

impl HybridCoordinator {
    /// Build the coordinator and start both background loads.
    ///
    /// Must run inside a Tokio runtime for the heavier tiers to load; without
    /// one they are marked failed and only the lightweight tier serves.
    pub fn start(config: CoordinatorConfig, tiers: Tiers) -> Self {
        let Tiers {
            term_index,
            concept_store,
            concept_dir,
            model_loader,
        } = tiers;
        let inner = Arc::new(Inner {
            cache: ExtractionCache::new(config.cache_capacity),
            config,
            term_index,
            concept_store,
            model: OnceCell::new(),
            partial: TierSlot::new(),
            full: TierSlot::new(),
            diagnostics: Diagnostics::default(),
            tasks: Mutex::new(Vec::new()),
        });

        match Handle::try_current() {
            Ok(handle) => {
                let partial = {
                    let inner = inner.clone();
                    handle.spawn(async move { inner.load_partial(concept_dir).await })
                };
                let full = {
                    let inner = inner.clone();
                    handle.spawn(async move { inner.load_full(model_loader).await })
                };
                inner.tasks.lock().extend([partial, full]);
            }
            Err(_) => {
                inner.fail(Tier::Partial, &LoadError::NoRuntime);
                inner.fail(Tier::Full, &LoadError::NoRuntime);
            }
        }

        info!(
            terms = inner.term_index.term_count(),
            cache_capacity = inner.config.cache_capacity,
            "hybrid coordinator started"
        );
        Self { inner }
    }

    /// Coordinator with the default tiers resolved from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, LoadError> {
        Ok(Self::start(
            settings.coordinator.clone(),
            Tiers::from_settings(settings)?,
        ))
    }

    /// Extract entities. Never fails; internal faults degrade to a lower tier
    /// and are recorded in [`Status::diagnostics`].
    pub fn extract(&self, text: &str, mode: ExtractMode) -> ExtractionResult {
        let started = Instant::now();
        let key = content_hash(text);
        if let Some(cached) = self.inner.cache.get(&key) {
            debug!(method = %cached.method, "extraction cache hit");
            return cached;
        }
        let mut result = self.inner.dispatch(text, mode);
        result.extraction_time = started.elapsed();
        self.inner.cache.get_or_insert(key, result)
    }

    pub fn is_ready(&self, tier: Tier) -> bool {
        match tier {
            Tier::Lightweight => true,
            Tier::Partial => self.inner.partial.is_ready(),
            Tier::Full => self.inner.full.is_ready(),
        }
    }

    pub fn tier_state(&self, tier: Tier) -> TierState {
        match tier {
            Tier::Lightweight => TierState::Ready,
            Tier::Partial => self.inner.partial.state(),
            Tier::Full => self.inner.full.state(),
        }
    }

    /// Wait up to `within` for `tier` to settle; returns whether it is ready.
    pub async fn wait_ready(&self, tier: Tier, within: Duration) -> bool {
        let slot = match tier {
            Tier::Lightweight => return true,
            Tier::Partial => &self.inner.partial,
            Tier::Full => &self.inner.full,
        };
        let mut rx = slot.state.subscribe();
        let _ = timeout(within, async {
            rx.wait_for(TierState::is_terminal).await.is_ok()
        })
        .await;
        slot.is_ready()
    }

    pub fn is_cached(&self, text: &str) -> bool {
        self.inner.cache.contains(text)
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.inner.diagnostics.snapshot()
    }

    pub fn status(&self) -> Status {
        let inner = &self.inner;
        Status {
            lightweight: LightweightStatus {
                ready: true,
                term_count: inner.term_index.term_count(),
            },
            partial: PartialStatus {
                ready: inner.partial.is_ready(),
                state: inner.partial.state(),
            },
            full: FullStatus {
                ready: inner.full.is_ready(),
                loaded: inner.model.get().is_some(),
                model: inner.model.get().map(|m| m.model_name().to_string()),
                state: inner.full.state(),
            },
            cache: inner.cache.status(),
            diagnostics: inner.diagnostics.snapshot(),
        }
    }

    /// Abort background loads still in flight. Unsettled tiers are marked failed.
    pub fn shutdown(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        for tier in [Tier::Partial, Tier::Full] {
            if !self.inner.slot(tier).state().is_terminal() {
                self.inner
                    .fail(tier, &LoadError::Aborted("coordinator shut down".into()));
            }
        }
    }
}

impl Inner {
    fn slot(&self, tier: Tier) -> &TierSlot {
        match tier {
            Tier::Full => &self.full,
            _ => &self.partial,
        }
    }

    fn fail(&self, tier: Tier, err: &LoadError) {
        let kind = err.kind();
        self.diagnostics.record(tier, kind, err.to_string());
        self.slot(tier).set(TierState::Failed {
            kind,
            message: err.to_string(),
        });
    }

    #[instrument(skip(self))]
    async fn load_partial(&self, dir: Option<PathBuf>) {
        let Some(dir) = dir else {
            self.fail(Tier::Partial, &LoadError::NotConfigured("concept database"));
            return;
        };
        sleep(self.config.partial_warmup).await;
        let store = self.concept_store.clone();
        let loaded = self
            .load_with_retry(Tier::Partial, move || store.try_load(&dir))
            .await;
        if loaded.is_some() {
            self.partial.set(TierState::Ready);
            info!(
                concepts = self.concept_store.concept_count(),
                "partial tier ready"
            );
        }
    }

    #[instrument(skip_all)]
    async fn load_full(&self, loader: Option<Arc<dyn ModelLoader>>) {
        let Some(loader) = loader else {
            self.fail(Tier::Full, &LoadError::NotConfigured("model path"));
            return;
        };
        let mut partial = self.partial.state.subscribe();
        let settled = partial.wait_for(TierState::is_terminal).await.is_ok();
        if !settled {
            return;
        }
        sleep(self.config.full_delay).await;
        info!(source = %loader.describe(), "loading full tier");
        let adapter = self
            .load_with_retry(Tier::Full, move || loader.load())
            .await;
        if let Some(adapter) = adapter {
            let model = adapter.model_name().to_string();
            let _ = self.model.set(adapter);
            self.full.set(TierState::Ready);
            info!(%model, "full tier ready");
        }
    }

    /// Run `load` on the blocking pool with a per-attempt timeout and linear backoff.
    /// Configuration errors are not retried.
    async fn load_with_retry<T, F>(&self, tier: Tier, load: F) -> Option<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, LoadError> + Clone + Send + 'static,
    {
        let attempts = self.config.load_attempts.max(1);
        for attempt in 1..=attempts {
            self.slot(tier).set(TierState::Loading { attempt });
            let job = load.clone();
            let outcome = match timeout(self.config.load_timeout, tokio::task::spawn_blocking(job))
                .await
            {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(LoadError::Aborted(join.to_string())),
                Err(_) => Err(LoadError::Timeout(self.config.load_timeout)),
            };
            let err = match outcome {
                Ok(value) => return Some(value),
                Err(err) => err,
            };
            let kind = err.kind();
            if kind == FaultKind::ConfigurationError || attempt == attempts {
                self.fail(tier, &err);
                return None;
            }
            self.diagnostics
                .record(tier, kind, format!("attempt {attempt}/{attempts}: {err}"));
            sleep(self.config.retry_backoff * attempt).await;
        }
        None
    }

    fn dispatch(&self, text: &str, mode: ExtractMode) -> ExtractionResult {
        match mode {
            ExtractMode::Lightweight => self.term_index.extract(text),
            ExtractMode::Partial => self.cascade(text, Tier::Partial, true),
            ExtractMode::Full => self.cascade(text, Tier::Full, true),
            ExtractMode::Auto => self.cascade(text, Tier::Full, false),
        }
    }

    /// Try tiers from `requested` downwards, skipping those not ready and
    /// recording any that fail.
    fn cascade(&self, text: &str, requested: Tier, explicit: bool) -> ExtractionResult {
        if requested >= Tier::Full && self.full.is_ready() {
            match self.run_full(text) {
                Ok(result) => return result,
                Err(err) => {
                    self.diagnostics
                        .record(Tier::Full, FaultKind::ExtractionFailure, err.to_string())
                }
            }
        }
        if requested >= Tier::Partial && self.partial.is_ready() {
            match self.run_partial(text) {
                Ok(result) => {
                    self.note_fallback(requested, Tier::Partial, explicit);
                    return result;
                }
                Err(err) => self.diagnostics.record(
                    Tier::Partial,
                    FaultKind::ExtractionFailure,
                    err.to_string(),
                ),
            }
        }
        self.note_fallback(requested, Tier::Lightweight, explicit);
        self.term_index.extract(text)
    }

    fn note_fallback(&self, requested: Tier, served: Tier, explicit: bool) {
        if explicit && served < requested {
            self.diagnostics.record_fallback();
            debug!(%requested, %served, "tier not available, falling back");
        }
    }

    fn run_full(&self, text: &str) -> Result<ExtractionResult, ExtractionError> {
        self.model
            .get()
            .ok_or(ExtractionError::NotLoaded)?
            .extract(text)
    }

    fn run_partial(&self, text: &str) -> Result<ExtractionResult, ExtractionError> {
        self.concept_store
            .extract(text)
            .ok_or(ExtractionError::NotLoaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_slot_never_leaves_ready() {
        let slot = TierSlot::new();
        slot.set(TierState::Loading { attempt: 1 });
        assert!(!slot.is_ready());
        slot.set(TierState::Ready);
        slot.set(TierState::Failed {
            kind: FaultKind::LoadFailure,
            message: "late".into(),
        });
        assert!(slot.is_ready());
        assert_eq!(slot.state(), TierState::Ready);
    }

    #[test]
    fn racing_ready_and_failed_never_disagree() {
        for _ in 0..200 {
            let slot = Arc::new(TierSlot::new());
            let writers: Vec<_> = [TierState::Ready, failed("shut down")]
                .into_iter()
                .map(|state| {
                    let slot = slot.clone();
                    std::thread::spawn(move || slot.set(state))
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }
            assert_eq!(slot.is_ready(), slot.state() == TierState::Ready);
        }
    }

    fn failed(message: &str) -> TierState {
        TierState::Failed {
            kind: FaultKind::LoadFailure,
            message: message.into(),
        }
    }

    #[test]
    fn without_runtime_heavier_tiers_fail_as_configuration_errors() {
        let tiers = Tiers {
            term_index: TermIndex::default(),
            concept_store: Arc::new(ConceptStore::default()),
            concept_dir: None,
            model_loader: None,
        };
        let coordinator = HybridCoordinator::start(CoordinatorConfig::default(), tiers);
        assert!(matches!(
            coordinator.tier_state(Tier::Partial),
            TierState::Failed {
                kind: FaultKind::ConfigurationError,
                ..
            }
        ));
        let result = coordinator.extract("fever and cough", ExtractMode::Auto);
        assert_eq!(result.method, Tier::Lightweight);
        assert_eq!(coordinator.diagnostics().configuration_errors, 2);
    }
}
