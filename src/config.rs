use super::Error;

/// [`Config`] tunes the process-wide hazard pointer engine.
///
/// The configuration is installed with [`configure`](crate::configure) before any thread uses the
/// engine; otherwise [`Config::default`] applies.
///
/// # Examples
///
/// ```
/// use hpsmr::Config;
///
/// let config = Config::default()
///     .with_hazards_per_thread(4)
///     .with_scan_threshold(128);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.hazards_per_thread(), 4);
///
/// assert!(Config::default().with_hazards_per_thread(0).validate().is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    hazards_per_thread: usize,
    scan_threshold: usize,
}

impl Config {
    /// Default number of hazard slots a thread is given at registration.
    pub const DEFAULT_HAZARDS_PER_THREAD: usize = 8;

    /// Default lower bound of the retired list length that triggers a scan.
    pub const DEFAULT_SCAN_THRESHOLD: usize = 64;

    /// Sets the number of hazard slots allocated at once for a thread.
    ///
    /// A thread needing more simultaneous guards gets another block of the same size.
    #[inline]
    #[must_use]
    pub fn with_hazards_per_thread(mut self, hazards_per_thread: usize) -> Self {
        self.hazards_per_thread = hazards_per_thread;
        self
    }

    /// Sets the minimum retired list length that triggers a scan.
    ///
    /// The effective threshold is never below twice the number of hazard slots in the process,
    /// which keeps the amortized cost of a scan constant per retired instance.
    #[inline]
    #[must_use]
    pub fn with_scan_threshold(mut self, scan_threshold: usize) -> Self {
        self.scan_threshold = scan_threshold;
        self
    }

    /// Returns the number of hazard slots allocated at once for a thread.
    #[inline]
    #[must_use]
    pub const fn hazards_per_thread(&self) -> usize {
        self.hazards_per_thread
    }

    /// Returns the minimum retired list length that triggers a scan.
    #[inline]
    #[must_use]
    pub const fn scan_threshold(&self) -> usize {
        self.scan_threshold
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a parameter is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.hazards_per_thread == 0 {
            return Err(Error::InvalidConfig("hazards_per_thread must be positive"));
        }
        if self.hazards_per_thread > u16::MAX as usize {
            return Err(Error::InvalidConfig("hazards_per_thread is too large"));
        }
        if self.scan_threshold == 0 {
            return Err(Error::InvalidConfig("scan_threshold must be positive"));
        }
        Ok(())
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            hazards_per_thread: Self::DEFAULT_HAZARDS_PER_THREAD,
            scan_threshold: Self::DEFAULT_SCAN_THRESHOLD,
        }
    }
}
