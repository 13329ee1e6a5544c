#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssessmentError {
    #[error("Invalid test: {0}")]
    InvalidTest(String),

    #[error("Option {index} is out of range for a question with {option_count} options")]
    InvalidOption { index: usize, option_count: usize },
}
