use axum::extract::FromRef;
use fxhash::FxHashMap;
use lithium_domain::config::AppConfig;
use lithium_domain::registry::{FeatureSlice, InitializedSlice};
use lithium_message_bus::MessageBus;
use lithium_runtime::ThreadPool;
use std::any::TypeId;
use std::borrow::Cow;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Instant;

#[lithium_derive::lithium_error]
pub enum AppStateError {
    #[error("State validation error{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    #[error("State missing feature slice{}: {message}", format_context(.context))]
    MissingSlice { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

#[derive(Debug)]
pub struct AppStateInner {
    pub config: AppConfig,
    pub bus: MessageBus,
    pub pool: Arc<ThreadPool>,
    pub started_at: Instant,
    slices: FxHashMap<TypeId, InitializedSlice>,
}

/// Shared Axum state: configuration, bus, worker pool and the registered slices.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

impl AppState {
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    #[must_use]
    pub fn get_slice<T: FeatureSlice>(&self) -> Option<&T> {
        self.inner.slices.get(&TypeId::of::<T>()).and_then(InitializedSlice::downcast_ref::<T>)
    }

    /// Returns the slice if it is registered.
    ///
    /// # Errors
    /// Returns [`AppStateError::MissingSlice`] if the slice is not registered.
    pub fn try_get_slice<T: FeatureSlice>(&self) -> Result<&T, AppStateError> {
        self.get_slice::<T>().ok_or_else(|| AppStateError::MissingSlice {
            message: std::any::type_name::<T>().into(),
            context: None,
        })
    }

    /// Names of the registered slices, sorted.
    #[must_use]
    pub fn slice_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> =
            self.inner.slices.values().map(InitializedSlice::name).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}

impl Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.inner.config.clone()
    }
}

impl FromRef<AppState> for MessageBus {
    fn from_ref(state: &AppState) -> Self {
        state.inner.bus.clone()
    }
}

impl FromRef<AppState> for Arc<ThreadPool> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.inner.pool)
    }
}

#[derive(Debug, Default)]
pub struct AppStateBuilder {
    config: Option<AppConfig>,
    bus: Option<MessageBus>,
    pool: Option<Arc<ThreadPool>>,
    slices: FxHashMap<TypeId, InitializedSlice>,
}

impl AppStateBuilder {
    #[must_use]
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn register_slice(mut self, slice: InitializedSlice) -> Self {
        self.slices.insert(slice.id, slice);
        self
    }

    #[must_use]
    pub fn register_slices<I>(mut self, slices: I) -> Self
    where
        I: IntoIterator<Item = InitializedSlice>,
    {
        for slice in slices {
            self.slices.insert(slice.id, slice);
        }
        self
    }

    /// # Errors
    /// Returns [`AppStateError::Validation`] when the config or the pool is missing.
    pub fn build(self) -> Result<AppState, AppStateError> {
        let config = self.config.ok_or_else(|| AppStateError::Validation {
            message: "AppConfig not provided".into(),
            context: None,
        })?;
        let pool = self.pool.ok_or_else(|| AppStateError::Validation {
            message: "ThreadPool not provided".into(),
            context: None,
        })?;
        let bus = self.bus.unwrap_or_default();

        Ok(AppState {
            inner: Arc::new(AppStateInner {
                config,
                bus,
                pool,
                started_at: Instant::now(),
                slices: self.slices,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Probe;

    impl FeatureSlice for Probe {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn name(&self) -> &'static str {
            "probe"
        }
    }

    #[test]
    fn build_requires_config_and_pool() {
        assert!(matches!(AppState::builder().build(), Err(AppStateError::Validation { .. })));
        assert!(matches!(
            AppState::builder().config(AppConfig::default()).build(),
            Err(AppStateError::Validation { .. })
        ));
    }

    #[test]
    fn slices_are_looked_up_by_type() {
        let pool = Arc::new(ThreadPool::new(1).unwrap());
        let state = AppState::builder()
            .config(AppConfig::default())
            .pool(pool)
            .register_slice(InitializedSlice::new(Probe))
            .build()
            .unwrap();

        assert!(state.get_slice::<Probe>().is_some());
        assert_eq!(state.slice_names(), vec!["probe"]);
    }

    #[derive(Debug)]
    struct Missing;

    impl FeatureSlice for Missing {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn name(&self) -> &'static str {
            "missing"
        }
    }

    #[test]
    fn missing_slice_is_an_error() {
        let state = AppState::builder()
            .config(AppConfig::default())
            .pool(Arc::new(ThreadPool::new(1).unwrap()))
            .build()
            .unwrap();
        assert!(matches!(state.try_get_slice::<Missing>(), Err(AppStateError::MissingSlice { .. })));
    }
}
