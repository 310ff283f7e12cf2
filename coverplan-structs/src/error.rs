use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoverageError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Missing travel-time data for {} area(s): {}", .area_ids.len(), .area_ids.join(", "))]
    MissingData { area_ids: Vec<String> },

    #[error("Scenario mismatch: {message}")]
    ScenarioMismatch { message: String },

    #[error("Infeasible input: {message}")]
    Infeasible { message: String },
}

impl CoverageError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn scenario_mismatch(message: impl Into<String>) -> Self {
        Self::ScenarioMismatch {
            message: message.into(),
        }
    }

    pub fn infeasible(message: impl Into<String>) -> Self {
        Self::Infeasible {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoverageError>;
