//! Configuration options for the readers.

/// What a reader does after reporting a recoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Report the error, resynchronise and keep reading.
    #[default]
    Skip,
    /// Report the error and end the stream.
    Halt,
}

/// Options shared by the log, table, descriptor and value readers.
#[derive(Debug, Clone)]
pub struct Options {
    /// Verify CRC32C checksums of log fragments and table blocks.
    /// When disabled, mismatches are not reported and records carry
    /// `checksum_ok = false` instead.
    /// Default: true
    pub verify_checksums: bool,

    /// Behaviour after a recoverable error.
    /// Default: RecoveryMode::Skip
    pub recovery_mode: RecoveryMode,

    /// Maximum nesting depth accepted while decoding a structured value.
    /// Default: 256
    pub max_value_depth: usize,

    /// Largest table block (in bytes) the reader will load.
    /// Default: 64MB
    pub max_block_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            recovery_mode: RecoveryMode::Skip,
            max_value_depth: 256,
            max_block_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether checksums are verified.
    pub fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// Sets the recovery mode.
    pub fn recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.recovery_mode = mode;
        self
    }

    /// Sets the maximum structured-value nesting depth.
    pub fn max_value_depth(mut self, depth: usize) -> Self {
        self.max_value_depth = depth;
        self
    }

    /// Sets the largest table block the reader will load.
    pub fn max_block_size(mut self, size: usize) -> Self {
        self.max_block_size = size;
        self
    }

    /// Returns true if readers should stop after the first error.
    pub fn halts_on_error(&self) -> bool {
        self.recovery_mode == RecoveryMode::Halt
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_value_depth == 0 {
            return Err(crate::Error::invalid_argument("max_value_depth must be > 0"));
        }
        if self.max_block_size == 0 {
            return Err(crate::Error::invalid_argument("max_block_size must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert!(opts.verify_checksums);
        assert_eq!(opts.recovery_mode, RecoveryMode::Skip);
        assert!(!opts.halts_on_error());
        assert_eq!(opts.max_value_depth, 256);
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::new()
            .verify_checksums(false)
            .recovery_mode(RecoveryMode::Halt)
            .max_value_depth(16);

        assert!(!opts.verify_checksums);
        assert!(opts.halts_on_error());
        assert_eq!(opts.max_value_depth, 16);
    }

    #[test]
    fn test_options_validation() {
        let mut opts = Options::default();
        assert!(opts.validate().is_ok());

        opts.max_value_depth = 0;
        assert!(opts.validate().is_err());

        opts.max_value_depth = 8;
        opts.max_block_size = 0;
        assert!(opts.validate().is_err());
    }
}
