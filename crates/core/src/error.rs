use thiserror::Error;

pub type CampaignResult<T> = Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Authentication required: no delegated credential for the advertising platform")]
    AuthenticationRequired,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported bidding strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The provider's own message, surfaced verbatim.
    #[error("{0}")]
    UpstreamRejected(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CampaignError {
    /// Stable machine-readable code for API error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            CampaignError::AuthenticationRequired => "authentication_required",
            CampaignError::InvalidRequest(_) => "invalid_request",
            CampaignError::UnsupportedStrategy(_) => "unsupported_strategy",
            CampaignError::UpstreamUnavailable(_) => "upstream_unavailable",
            CampaignError::UpstreamRejected(_) => "upstream_rejected",
            CampaignError::Persistence(_) => "persistence_error",
            CampaignError::NotFound(_) => "not_found",
            CampaignError::Config(_) => "config_error",
            CampaignError::Serialization(_) => "serialization_error",
            CampaignError::Internal(_) => "internal_error",
        }
    }
}
