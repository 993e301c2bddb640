//! Core trait for the replay state machine.

use crate::{Fragment, Transition};
use std::time::Duration;

/// A state machine that consumes fragments.
///
/// The replay orchestrator is implemented as a state machine that is:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + fragment = same transition
/// - **Pure-ish**: Mutates self and its collaborators, but publishes nothing
///
/// # Example
///
/// ```ignore
/// loop {
///     let fragment = inbound.blocking_recv()?;
///     machine.set_time(clock.elapsed());
///     let transition = machine.handle(fragment)?;
///     for action in transition.actions {
///         runner.perform(action);
///     }
/// }
/// ```
pub trait StateMachine {
    /// Fatal error. The runner stops on the first one.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Process a fragment, returning the actions to perform.
    ///
    /// # Guarantees
    ///
    /// - **Synchronous**: This method only blocks on the execution worker pool
    /// - **No publication**: All downstream messages are returned as actions
    ///
    /// # Returns
    ///
    /// `Ok` with the actions and soft outcome of the fragment, or `Err` for
    /// a condition the process must halt on.
    fn handle(&mut self, fragment: Fragment) -> Result<Transition, Self::Error>;

    /// Set the current time.
    ///
    /// Called by the runner before each `handle()` call to provide the
    /// current simulation or wall-clock time.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    ///
    /// Returns the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}
