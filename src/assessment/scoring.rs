use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::error::AssessmentError;
use crate::models::test::Test;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentageRounding {
    #[default]
    HalfUp,
    Truncate,
}

impl FromStr for PercentageRounding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "half_up" => Ok(Self::HalfUp),
            "truncate" => Ok(Self::Truncate),
            other => Err(format!("unknown rounding mode '{}'", other)),
        }
    }
}

/// Pass/fail labelling applied on top of the raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub pass_percentage: u32,
    pub rounding: PercentageRounding,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            pass_percentage: 50,
            rounding: PercentageRounding::HalfUp,
        }
    }
}

impl ScoringPolicy {
    /// Percentage of `score` over `total`, rounded after the division.
    pub fn percentage(&self, score: usize, total: usize) -> u32 {
        if total == 0 {
            return 0;
        }
        let score = score as u64;
        let total = total as u64;
        let pct = match self.rounding {
            PercentageRounding::HalfUp => (200 * score + total) / (2 * total),
            PercentageRounding::Truncate => (100 * score) / total,
        };
        pct as u32
    }

    pub fn passed(&self, percentage: u32) -> bool {
        percentage >= self.pass_percentage
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Selection {
    Answered { option_index: usize, text: String },
    Unanswered,
}

impl Selection {
    pub fn option_index(&self) -> Option<usize> {
        match self {
            Selection::Answered { option_index, .. } => Some(*option_index),
            Selection::Unanswered => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Selection::Answered { text, .. } => Some(text),
            Selection::Unanswered => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionReview {
    pub question_index: usize,
    pub question_text: String,
    pub selection: Selection,
    pub correct_option_index: usize,
    pub correct_option_text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: Uuid,
    pub score: usize,
    pub total_questions: usize,
    pub percentage: u32,
    pub passed: bool,
    pub per_question: Vec<QuestionReview>,
}

/// Scores a finished answer set against the test's key.
///
/// `answers` maps question index to option index. An entry that points
/// outside the test can only come from a broken session and panics.
pub fn score(
    test: &Test,
    answers: &BTreeMap<usize, usize>,
    policy: &ScoringPolicy,
) -> Result<TestResult, AssessmentError> {
    let total_questions = test.questions.len();
    if total_questions == 0 {
        return Err(AssessmentError::InvalidTest(
            "cannot score a test without questions".to_string(),
        ));
    }

    if let Some((&question_index, _)) = answers.range(total_questions..).next() {
        panic!(
            "answer recorded for question {} but the test has {} questions",
            question_index, total_questions
        );
    }

    let mut score = 0usize;
    let mut per_question = Vec::with_capacity(total_questions);

    for (idx, question) in test.questions.iter().enumerate() {
        let correct_option_text = question
            .option_text(question.correct_option_index)
            .ok_or_else(|| {
                AssessmentError::InvalidTest(format!(
                    "question {} has no option {}",
                    idx + 1,
                    question.correct_option_index
                ))
            })?
            .to_string();

        let selection = match answers.get(&idx) {
            Some(&selected) => {
                assert!(
                    selected < question.options.len(),
                    "option {} recorded for question {} which has {} options",
                    selected,
                    idx,
                    question.options.len()
                );
                Selection::Answered {
                    option_index: selected,
                    text: question.options[selected].text.clone(),
                }
            }
            None => Selection::Unanswered,
        };

        let is_correct = selection.option_index() == Some(question.correct_option_index);
        if is_correct {
            score += 1;
        }

        per_question.push(QuestionReview {
            question_index: idx,
            question_text: question.text.clone(),
            selection,
            correct_option_index: question.correct_option_index,
            correct_option_text,
            is_correct,
        });
    }

    let percentage = policy.percentage(score, total_questions);
    Ok(TestResult {
        test_id: test.id,
        score,
        total_questions,
        percentage,
        passed: policy.passed(percentage),
        per_question,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test::fixtures::{physics_101, question, test_with};

    fn answers(pairs: &[(usize, usize)]) -> BTreeMap<usize, usize> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_scenario_two_of_three() {
        let test = physics_101();
        let result = score(
            &test,
            &answers(&[(0, 1), (1, 0), (2, 0)]),
            &ScoringPolicy::default(),
        )
        .unwrap();

        assert_eq!(result.score, 2);
        assert_eq!(result.total_questions, 3);
        assert_eq!(result.percentage, 67);
        assert!(result.passed);

        let third = &result.per_question[2];
        assert!(third.is_correct);
        assert_eq!(third.selection.text(), Some("9.8 m/s^2"));
        assert_eq!(third.correct_option_text, "9.8 m/s^2");

        let second = &result.per_question[1];
        assert!(!second.is_correct);
        assert_eq!(second.selection.text(), Some("Watt"));
        assert_eq!(second.correct_option_text, "Joule");
    }

    #[test]
    fn test_unanswered_is_not_option_zero() {
        let test = test_with(5, vec![question("Pick the first", &["first", "second"], 0)]);
        let result = score(&test, &BTreeMap::new(), &ScoringPolicy::default()).unwrap();

        assert_eq!(result.score, 0);
        assert_eq!(result.per_question[0].selection, Selection::Unanswered);
        assert!(!result.per_question[0].is_correct);
        assert!(!result.passed);
    }

    #[test]
    fn test_score_stays_within_bounds() {
        let test = physics_101();
        let policy = ScoringPolicy::default();
        for a in 0..3 {
            for b in 0..3 {
                for skip_last in [false, true] {
                    let mut map = answers(&[(0, a), (1, b)]);
                    if !skip_last {
                        map.insert(2, (a + b) % 3);
                    }
                    let result = score(&test, &map, &policy).unwrap();
                    assert!(result.score <= result.total_questions);
                    assert_eq!(result.per_question.len(), 3);
                    assert!(result.percentage <= 100);
                }
            }
        }
    }

    #[test]
    fn test_percentage_rounds_after_division() {
        let half_up = ScoringPolicy::default();
        assert_eq!(half_up.percentage(1, 3), 33);
        assert_eq!(half_up.percentage(2, 3), 67);
        assert_eq!(half_up.percentage(1, 8), 13);
        assert_eq!(half_up.percentage(0, 4), 0);
        assert_eq!(half_up.percentage(4, 4), 100);

        let truncate = ScoringPolicy {
            rounding: PercentageRounding::Truncate,
            ..ScoringPolicy::default()
        };
        assert_eq!(truncate.percentage(2, 3), 66);
        assert_eq!(truncate.percentage(1, 8), 12);
    }

    #[test]
    fn test_pass_threshold_is_inclusive() {
        let policy = ScoringPolicy::default();
        assert!(policy.passed(50));
        assert!(!policy.passed(49));

        let strict = ScoringPolicy {
            pass_percentage: 60,
            ..ScoringPolicy::default()
        };
        assert_eq!(strict.percentage(3, 5), 60);
        assert!(strict.passed(strict.percentage(3, 5)));
        assert!(!strict.passed(strict.percentage(2, 5)));
    }

    #[test]
    fn test_rounding_parses_from_config_strings() {
        assert_eq!("half_up".parse(), Ok(PercentageRounding::HalfUp));
        assert_eq!("TRUNCATE".parse(), Ok(PercentageRounding::Truncate));
        assert!("banker".parse::<PercentageRounding>().is_err());
        assert!("round".parse::<PercentageRounding>().is_err());
        assert!("floor".parse::<PercentageRounding>().is_err());
    }

    #[test]
    fn test_empty_test_is_rejected() {
        let test = test_with(5, vec![]);
        let err = score(&test, &BTreeMap::new(), &ScoringPolicy::default()).unwrap_err();
        assert!(matches!(err, AssessmentError::InvalidTest(_)));
    }

    #[test]
    fn test_bad_answer_key_is_rejected() {
        let test = test_with(5, vec![question("Q", &["a", "b"], 7)]);
        let err = score(&test, &BTreeMap::new(), &ScoringPolicy::default()).unwrap_err();
        assert!(matches!(err, AssessmentError::InvalidTest(_)));
    }

    #[test]
    #[should_panic(expected = "option 9 recorded")]
    fn test_out_of_range_answer_is_an_invariant_violation() {
        let test = physics_101();
        let _ = score(&test, &answers(&[(0, 9)]), &ScoringPolicy::default());
    }

    #[test]
    #[should_panic(expected = "answer recorded for question 5")]
    fn test_answer_for_missing_question_is_an_invariant_violation() {
        let test = physics_101();
        let _ = score(&test, &answers(&[(5, 0)]), &ScoringPolicy::default());
    }
}
