//! Processing options.

use tracing::Level;

/// Options for the server processing pipeline.
///
/// # Example
///
/// ```rust
/// use callkit_server::ProcessOptions;
/// use tracing::Level;
///
/// let options = ProcessOptions::new()
///     .include_error_message(false)
///     .log_level(Level::ERROR);
/// assert!(!options.include_error_message);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Whether the status message carries the failure's text.
    ///
    /// When false, the message is the status code name, so internal
    /// failure details do not reach the peer.
    pub include_error_message: bool,
    /// Level at which processing failures are logged.
    pub log_level: Level,
}

impl ProcessOptions {
    /// Create options with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            include_error_message: true,
            log_level: Level::WARN,
        }
    }

    /// Set whether the status message carries the failure's text.
    #[must_use]
    pub const fn include_error_message(mut self, include: bool) -> Self {
        self.include_error_message = include;
        self
    }

    /// Set the level processing failures are logged at.
    #[must_use]
    pub const fn log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self::new()
    }
}
