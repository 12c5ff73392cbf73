use std::fmt;

/// Error kinds surfaced by the core. Matches the policy table in the design
/// doc's error handling section: construction failures are loud, everything
/// that can happen mid-decide is swallowed by the caller and turned into a
/// null decision instead.
#[derive(Debug, Clone, PartialEq)]
pub enum XDecideError {
    /// Datafile failed to parse: bad JSON, unsupported version, missing keys.
    InvalidDatafile(String),
    /// A referenced entity (experiment, flag, variation, audience) was not found.
    MissingEntity(String),
    /// The user profile service raised on lookup or save.
    UserProfileFailure(String),
    /// ODP is not configured (missing api key/host).
    OdpNotIntegrated,
    /// ODP network or server-side failure.
    OdpRequestFailed(String),
    /// CMAB prediction failed after exhausting retries.
    CmabRequestFailed(String),
    /// Config fetch failed (network or non-2xx).
    ConfigFetchFailed(String),
    /// Generic invalid input / construction error.
    InvalidInput(String),
}

impl fmt::Display for XDecideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XDecideError::InvalidDatafile(msg) => write!(f, "invalid datafile: {msg}"),
            XDecideError::MissingEntity(msg) => write!(f, "missing entity: {msg}"),
            XDecideError::UserProfileFailure(msg) => write!(f, "user profile failure: {msg}"),
            XDecideError::OdpNotIntegrated => write!(f, "odp is not integrated"),
            XDecideError::OdpRequestFailed(msg) => write!(f, "odp request failed: {msg}"),
            XDecideError::CmabRequestFailed(msg) => write!(f, "cmab request failed: {msg}"),
            XDecideError::ConfigFetchFailed(msg) => write!(f, "config fetch failed: {msg}"),
            XDecideError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for XDecideError {}

pub type XDecideResult<T> = Result<T, XDecideError>;
