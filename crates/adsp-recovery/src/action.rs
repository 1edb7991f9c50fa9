//! Registered recovery actions.

use core::fmt;

/// Hook invoked during a recovery phase.
pub type RecoveryHook = Box<dyn Fn() + Send + Sync>;

/// A named `(pre, post)` hook pair. Either half may be absent. Any state
/// the hooks need is captured by the closures.
pub struct RecoveryAction {
    name: String,
    pre: Option<RecoveryHook>,
    post: Option<RecoveryHook>,
}

impl RecoveryAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pre: None,
            post: None,
        }
    }

    /// Hook run after the DSP is marked unreachable and before repair.
    pub fn on_pre(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.pre = Some(Box::new(hook));
        self
    }

    /// Hook run after repair is confirmed and before the DSP is marked
    /// reachable again.
    pub fn on_post(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.post = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run_pre(&self) {
        if let Some(hook) = &self.pre {
            hook();
        }
    }

    pub(crate) fn run_post(&self) {
        if let Some(hook) = &self.post {
            hook();
        }
    }
}

impl fmt::Debug for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryAction")
            .field("name", &self.name)
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

/// Token returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionHandle(pub(crate) u64);

impl ActionHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}
