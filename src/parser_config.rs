//! Parser options for controlling error handling and recovery behavior.
//!
//! # Example
//!
//! ```
//! use pdf_graph::parser_config::{ParseOptions, ParseSpeed};
//!
//! // Lenient (default): skip malformed objects, record a diagnostic
//! let lenient = ParseOptions::lenient();
//! assert!(!lenient.strict);
//!
//! // Strict: the first malformed object is fatal
//! let strict = ParseOptions::strict();
//! assert!(strict.strict);
//!
//! let custom = ParseOptions::default()
//!     .with_speed(ParseSpeed::Fastest)
//!     .with_ignore_encryption(true);
//! assert_eq!(custom.scan_budget, usize::MAX);
//! ```

/// Batch size of the recovery scan over a damaged file.
///
/// The names describe how much work is done between checkpoints, not how
/// long recovery takes. After each batch the scanner checks whether the
/// catalog and everything it references have been found and stops if so.
/// `Fastest` never checks and always reads every object in the buffer;
/// `Slow` checks every 100 objects and so usually finishes first on large
/// files whose object graph is complete early on. Every preset recovers the
/// same graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseSpeed {
    /// One batch: read every object, no early stop
    Fastest,
    /// Check for completeness every 1500 objects
    Fast,
    /// Check for completeness every 500 objects
    Medium,
    /// Check for completeness every 100 objects
    #[default]
    Slow,
}

impl ParseSpeed {
    /// Objects processed between completeness checks.
    pub fn scan_budget(self) -> usize {
        match self {
            ParseSpeed::Fastest => usize::MAX,
            ParseSpeed::Fast => 1500,
            ParseSpeed::Medium => 500,
            ParseSpeed::Slow => 100,
        }
    }
}

/// Options for [`parse_document`](crate::document_parser::parse_document).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Fail on the first malformed object instead of recording a diagnostic
    pub strict: bool,

    /// Objects examined between completeness checks while recovering (see
    /// [`ParseSpeed`])
    pub scan_budget: usize,

    /// Load encrypted documents instead of rejecting them
    pub ignore_encryption: bool,

    /// Upper bound on recorded diagnostics before the parse gives up
    /// (0 = unlimited)
    pub max_errors: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParseOptions {
    /// Strict mode: any malformed object aborts the parse.
    pub fn strict() -> Self {
        Self {
            strict: true,
            max_errors: 1,
            ..Self::lenient()
        }
    }

    /// Lenient mode: malformed objects become `null` with a diagnostic.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            scan_budget: ParseSpeed::default().scan_budget(),
            ignore_encryption: false,
            max_errors: 1000,
        }
    }

    /// Set the recovery scan budget from a preset.
    pub fn with_speed(mut self, speed: ParseSpeed) -> Self {
        self.scan_budget = speed.scan_budget();
        self
    }

    /// Set the recovery scan budget directly. Zero is treated as one.
    pub fn with_scan_budget(mut self, budget: usize) -> Self {
        self.scan_budget = budget.max(1);
        self
    }

    /// Toggle strict mode.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Allow encrypted documents to load.
    pub fn with_ignore_encryption(mut self, ignore: bool) -> Self {
        self.ignore_encryption = ignore;
        self
    }

    /// Whether parsing may continue after `error_count` recorded errors.
    pub(crate) fn should_continue(&self, error_count: usize) -> bool {
        if self.strict {
            return false;
        }
        self.max_errors == 0 || error_count < self.max_errors
    }
}
