//! Contract for a single video output engine.
//!
//! Engines are external: a media framework, a hardware player, or
//! [`crate::sim::SimulatedEngine`]. The controller is their only writer.

/// Thin control surface over one playback engine.
///
/// Invalid calls are absorbed, not reported: `play()` before the engine is ready and
/// `stop()` while not playing do nothing. The controller turns misuse into errors.
pub trait PlaybackEngine {
    /// Assign the media source. An empty path is ignored.
    fn set_source(&mut self, source: &str);

    /// Start asynchronous preparation of the current source.
    ///
    /// Completion is observed by polling [`PlaybackEngine::is_ready`]. Calling this again
    /// supersedes any preparation in flight.
    fn prepare(&mut self);

    /// `true` once the last `prepare()` has completed.
    fn is_ready(&self) -> bool;

    fn play(&mut self);

    fn stop(&mut self);

    /// `true` between a successful `play()` and the next `stop()` (or end of media).
    fn is_playing(&self) -> bool;

    /// Playback position in seconds; zero before the first `play()`.
    fn current_time(&self) -> f64;

    /// Index of the frame on screen; zero before the first `play()`.
    fn current_frame(&self) -> u64;
}
