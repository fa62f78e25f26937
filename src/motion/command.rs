//! Motion commands and the context actions run in.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::ActionError;

/// Priority tier of a motion command. Lower tiers run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Safety stops and direct user requests.
    High = 1,
    /// Emotions and gestures.
    Normal = 2,
    /// Background behaviors.
    Low = 3,
}

impl Priority {
    /// Returns the numeric tier (1 = highest priority).
    pub fn tier(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        };
        f.write_str(name)
    }
}

/// A one-shot motion action. It runs on the scheduler thread and may block
/// until the motion completes.
pub type MotionAction = Box<dyn FnOnce(&MotionContext) -> Result<(), ActionError> + Send>;

/// A repeatable action run whenever the scheduler is idle. It should return
/// quickly.
pub type IdleAction = Arc<dyn Fn(&MotionContext) -> Result<(), ActionError> + Send + Sync>;

/// Handle passed to running actions.
///
/// Interruption is advisory: an action that never checks
/// [`is_interrupted()`](Self::is_interrupted) runs to completion.
#[derive(Clone)]
pub struct MotionContext {
    interrupted: Arc<AtomicBool>,
}

impl MotionContext {
    pub(crate) fn new(interrupted: Arc<AtomicBool>) -> Self {
        Self { interrupted }
    }

    /// Returns `true` once interruption of the running command was requested.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Returns [`ActionError::Interrupted`] if interruption was requested.
    ///
    /// Convenient between the steps of a multi-step motion:
    ///
    /// ```
    /// use companion_runtime::{ActionError, MotionContext};
    ///
    /// fn nod(ctx: &MotionContext) -> Result<(), ActionError> {
    ///     for _ in 0..3 {
    ///         ctx.check_interrupted()?;
    ///         // move head down, then up
    ///     }
    ///     Ok(())
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Interrupted`] if interruption was requested.
    pub fn check_interrupted(&self) -> Result<(), ActionError> {
        if self.is_interrupted() {
            Err(ActionError::Interrupted)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for MotionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionContext")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// A queued motion.
pub struct MotionCommand {
    name: String,
    priority: Priority,
    interruptible: bool,
    created_at: Instant,
    action: MotionAction,
}

impl MotionCommand {
    /// Creates an interruptible command.
    pub fn new<F>(name: impl Into<String>, priority: Priority, action: F) -> Self
    where
        F: FnOnce(&MotionContext) -> Result<(), ActionError> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority,
            interruptible: true,
            created_at: Instant::now(),
            action: Box::new(action),
        }
    }

    /// Marks the command as not interruptible.
    #[must_use]
    pub fn uninterruptible(mut self) -> Self {
        self.interruptible = false;
        self
    }

    /// Returns the command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the priority tier.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns `true` if interruption may be requested while it runs.
    pub fn is_interruptible(&self) -> bool {
        self.interruptible
    }

    /// Returns when the command was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn into_parts(self) -> (String, bool, MotionAction) {
        (self.name, self.interruptible, self.action)
    }
}

impl fmt::Debug for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionCommand")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("interruptible", &self.interruptible)
            .finish_non_exhaustive()
    }
}
