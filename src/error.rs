//! Error classification shared by every component
//!
//! Each component keeps its own error enum. This module classifies them so
//! failure logs carry a `category` and a `recoverable` field.
//!
//! # Usage
//!
//! ```rust,ignore
//! use scrapegate::error::ScrapegateErrorTrait;
//!
//! tracing::warn!(
//!     category = err.category().as_str(),
//!     recoverable = err.is_recoverable(),
//!     error = %err,
//!     "Job rejected"
//! );
//! ```

use crate::client::ClientError;
use crate::dispatch::DispatchError;
use crate::license::LicenseError;
use crate::routing::RouteError;
use crate::worker::{PluginError, ScrapeError};

/// Common trait for all scrapegate error types
pub trait ScrapegateErrorTrait: std::error::Error {
    /// Whether the same call might succeed if made again later
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Outbound HTTP failures (license server, workers, scrape targets)
    Network,
    /// License rejected or malformed
    License,
    /// No worker could take the job
    Routing,
    /// Scraper definitions and execution
    Plugin,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::License => "license",
            Self::Routing => "routing",
            Self::Plugin => "plugin",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

// ============================================================================
// Domain Error Classification
// ============================================================================

impl ScrapegateErrorTrait for LicenseError {
    fn is_recoverable(&self) -> bool {
        // Quota frees up at the next monthly reset; storage may be transient
        matches!(self, Self::QuotaExceeded | Self::Storage(_))
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Storage(_) => ErrorCategory::Storage,
            _ => ErrorCategory::License,
        }
    }
}

impl ScrapegateErrorTrait for RouteError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::AllWorkersSaturated)
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Routing
    }
}

impl ScrapegateErrorTrait for DispatchError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidLicense(_) | Self::ScraperNotAuthorized => false,
            Self::NoWorkerAvailable(e) => e.is_recoverable(),
            Self::UpstreamUnavailable(_) | Self::WorkerExecutionFailed { .. } => true,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidLicense(_) | Self::ScraperNotAuthorized => ErrorCategory::License,
            Self::NoWorkerAvailable(_) => ErrorCategory::Routing,
            Self::UpstreamUnavailable(_) | Self::WorkerExecutionFailed { .. } => {
                ErrorCategory::Network
            }
        }
    }
}

impl ScrapegateErrorTrait for PluginError {
    fn is_recoverable(&self) -> bool {
        // A fixed definition file is picked up on the next reload
        true
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Read { .. } | Self::Scan { .. } => ErrorCategory::Storage,
            Self::InvalidDefinition { .. } => ErrorCategory::Plugin,
        }
    }
}

impl ScrapegateErrorTrait for ScrapeError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status } => *status == 429 || *status >= 500,
            Self::MissingParameter(_) | Self::InvalidUrl(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Request(_) | Self::Status { .. } => ErrorCategory::Network,
            Self::MissingParameter(_) | Self::InvalidUrl(_) => ErrorCategory::Plugin,
        }
    }
}

impl ScrapegateErrorTrait for ClientError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::NetworkError(_) | Self::Timeout => true,
            Self::HttpError { status, .. } => *status >= 500,
            Self::InitError(_) | Self::ParseError(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InitError(_) => ErrorCategory::Config,
            _ => ErrorCategory::Network,
        }
    }
}
