//! Motion command scheduling.
//!
//! Motions are long, blocking device operations. They run on their own
//! thread so the audio pipeline never waits on them, and they never wait on
//! the audio pipeline.

mod command;
mod queue;
mod scheduler;

pub use command::{IdleAction, MotionAction, MotionCommand, MotionContext, Priority};
pub use scheduler::MotionScheduler;
