//! Question classification

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Which branch answers the question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierVerdict {
    /// Needs live values from the structured store
    StructuredQuery,
    /// Answerable from the documentation alone
    DocumentAnswer,
}

impl ClassifierVerdict {
    pub const STRUCTURED_TOKEN: &'static str = "sql";
    pub const DOCUMENT_TOKEN: &'static str = "rag";

    /// Exact, case-insensitive match on the trimmed model output.
    /// Anything else is `ClassifierAmbiguous`.
    pub fn parse(output: &str) -> Result<Self> {
        let token = output.trim().to_lowercase();
        match token.as_str() {
            Self::STRUCTURED_TOKEN => Ok(ClassifierVerdict::StructuredQuery),
            Self::DOCUMENT_TOKEN => Ok(ClassifierVerdict::DocumentAnswer),
            _ => Err(AppError::ClassifierAmbiguous {
                output: output.trim().to_string(),
            }),
        }
    }

    /// Parse, falling back to `DocumentAnswer` on unrecognized output.
    /// The document branch never touches the structured store.
    pub fn parse_or_fallback(output: &str) -> Self {
        Self::parse(output).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unrecognized classifier output, answering from documents");
            crate::metrics::record_classifier_fallback();
            ClassifierVerdict::DocumentAnswer
        })
    }

    /// Route label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierVerdict::StructuredQuery => "structured_query",
            ClassifierVerdict::DocumentAnswer => "document_answer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_tokens_any_case() {
        assert_eq!(ClassifierVerdict::parse("sql").unwrap(), ClassifierVerdict::StructuredQuery);
        assert_eq!(ClassifierVerdict::parse(" SQL\n").unwrap(), ClassifierVerdict::StructuredQuery);
        assert_eq!(ClassifierVerdict::parse("Rag").unwrap(), ClassifierVerdict::DocumentAnswer);
    }

    #[test]
    fn test_other_output_is_ambiguous() {
        for output in ["sql.", "I think sql", "", "sql or rag"] {
            assert!(matches!(
                ClassifierVerdict::parse(output),
                Err(AppError::ClassifierAmbiguous { .. })
            ));
        }
    }

    #[test]
    fn test_fallback_is_document_answer() {
        assert_eq!(
            ClassifierVerdict::parse_or_fallback("probably sql"),
            ClassifierVerdict::DocumentAnswer
        );
        assert_eq!(
            ClassifierVerdict::parse_or_fallback("sql"),
            ClassifierVerdict::StructuredQuery
        );
    }
}
