//! # Execution Context
//!
//! [`ServiceContext`] carries what a call needs from its environment: an
//! optional deadline, a cancellation flag, and named configuration objects.
//! Remote dispatch consults it before every backend exchange.
//!
//! Child contexts inherit configuration and observe the parent's
//! cancellation. Deadlines only ever tighten.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Names of configuration objects a context can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    /// Remote key-management service configuration.
    Kms,
}

impl std::fmt::Display for ConfigType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kms => f.write_str("kms"),
        }
    }
}

type ConfigValue = Arc<dyn Any + Send + Sync>;

/// Deadline, cancellation and configuration for a single logical call.
#[derive(Clone)]
pub struct ServiceContext {
    deadline: Option<Instant>,
    // Own flag last; ancestors' flags before it.
    cancel_flags: Vec<Arc<AtomicBool>>,
    configs: HashMap<ConfigType, ConfigValue>,
}

impl ServiceContext {
    /// A context with no deadline and no configuration.
    pub fn new() -> Self {
        Self {
            deadline: None,
            cancel_flags: vec![Arc::new(AtomicBool::new(false))],
            configs: HashMap::new(),
        }
    }

    /// Attach a configuration object under `ty`, replacing any previous one.
    pub fn with_config<T: Any + Send + Sync>(mut self, ty: ConfigType, value: T) -> Self {
        self.configs.insert(ty, Arc::new(value));
        self
    }

    /// Set an absolute deadline. An existing earlier deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Set a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child context. Cancelling the child leaves the parent alone;
    /// cancelling the parent cancels the child.
    pub fn child(&self) -> Self {
        let mut cancel_flags = self.cancel_flags.clone();
        cancel_flags.push(Arc::new(AtomicBool::new(false)));
        Self {
            deadline: self.deadline,
            cancel_flags,
            configs: self.configs.clone(),
        }
    }

    /// Look up a configuration object by name and type.
    ///
    /// Returns `None` if nothing is stored under `ty` or the stored value
    /// is of a different type.
    pub fn config<T: Any + Send + Sync>(&self, ty: ConfigType) -> Option<&T> {
        self.configs.get(&ty)?.downcast_ref::<T>()
    }

    /// The absolute deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` without a deadline,
    /// `Some(ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        if let Some(own) = self.cancel_flags.last() {
            own.store(true, Ordering::SeqCst);
        }
    }

    /// `true` if this context or any ancestor was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flags.iter().any(|f| f.load(Ordering::SeqCst))
    }

    /// `true` if the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Aborted` if the context is cancelled or expired.
    pub fn check_active(&self) -> Result<(), KeyError> {
        if self.is_cancelled() {
            return Err(KeyError::Aborted("context cancelled".to_string()));
        }
        if self.is_expired() {
            return Err(KeyError::Aborted("context deadline exceeded".to_string()));
        }
        Ok(())
    }
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("deadline", &self.deadline)
            .field("cancelled", &self.is_cancelled())
            .field("configs", &self.configs.keys().collect::<Vec<_>>())
            .finish()
    }
}
