//! Quiz answer scoring.
//!
//! Answers are matched to stored questions by position. Stored questions are
//! read leniently: any object counts as a question, `correct_answer` may be
//! a number or a numeric string, and a question without a readable answer
//! can never be answered correctly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored question as far as scoring is concerned.
#[derive(Debug, Deserialize)]
struct StoredQuestion {
    #[serde(default, alias = "question")]
    question_text: Option<String>,
    #[serde(default)]
    correct_answer: Value,
    #[serde(default)]
    explanation: Option<String>,
}

/// Result for one submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QuestionResult {
    /// The answer's position has a stored question.
    Answered(AnsweredQuestion),
    /// The answer's position is past the end of the quiz.
    Missing(MissingQuestion),
}

/// Scoring detail for an answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsweredQuestion {
    /// Question text.
    pub question: String,
    /// Submitted option index, if the answer was a number.
    pub user_answer: Option<i64>,
    /// Stored correct index.
    pub correct_answer: Option<i64>,
    /// Whether the answer matched.
    pub is_correct: bool,
    /// Stored explanation.
    pub explanation: Option<String>,
}

/// Placeholder for an answer with no matching question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingQuestion {
    /// Always "Question not found".
    pub error: String,
}

impl QuestionResult {
    /// Returns `true` if the answer matched.
    #[must_use]
    pub const fn is_correct(&self) -> bool {
        matches!(self, Self::Answered(AnsweredQuestion { is_correct: true, .. }))
    }
}

/// Score of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    /// Number of questions in the quiz.
    pub total_questions: u32,
    /// Number of matching answers.
    pub correct_count: u32,
    /// Rounded percentage of correct answers.
    pub percentage: u32,
    /// One entry per submitted answer.
    pub results: Vec<QuestionResult>,
}

/// Reads an answer as an option index.
fn answer_index(answer: &Value) -> Option<i64> {
    match answer {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Rounds `correct / total * 100` half up, in integers.
fn percentage(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let (correct, total) = (u64::from(correct), u64::from(total));
    u32::try_from((correct * 200 + total) / (2 * total)).unwrap_or(100)
}

/// Scores `answers` against the JSON text of a quiz's questions.
///
/// # Errors
///
/// Returns an error if `questions_json` is not a JSON array.
pub fn score_answers(
    questions_json: &str,
    answers: &[Value],
) -> std::result::Result<QuizScore, serde_json::Error> {
    let questions: Vec<StoredQuestion> = serde_json::from_str(questions_json)?;

    let results: Vec<QuestionResult> = answers
        .iter()
        .enumerate()
        .map(|(idx, answer)| {
            questions.get(idx).map_or_else(
                || {
                    QuestionResult::Missing(MissingQuestion {
                        error: "Question not found".to_string(),
                    })
                },
                |question| {
                    let user_answer = answer_index(answer);
                    let correct_answer = answer_index(&question.correct_answer);
                    let is_correct = user_answer.is_some() && user_answer == correct_answer;
                    QuestionResult::Answered(AnsweredQuestion {
                        question: question.question_text.clone().unwrap_or_default(),
                        user_answer,
                        correct_answer,
                        is_correct,
                        explanation: question.explanation.clone(),
                    })
                },
            )
        })
        .collect();

    let total_questions = u32::try_from(questions.len()).unwrap_or(u32::MAX);
    let correct_count =
        u32::try_from(results.iter().filter(|r| r.is_correct()).count()).unwrap_or(u32::MAX);

    Ok(QuizScore {
        total_questions,
        correct_count,
        percentage: percentage(correct_count, total_questions),
        results,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    const QUESTIONS: &str = r#"[
        {"question_text": "What is the capital city of Guyana?",
         "options": ["Georgetown", "Linden", "New Amsterdam", "Bartica"],
         "correct_answer": 0, "explanation": "Georgetown is the capital."},
        {"question_text": "Which of these countries does NOT border Guyana?",
         "options": ["Brazil", "Venezuela", "Suriname", "Colombia"],
         "correct_answer": 3},
        {"question_text": "Which river is the largest?",
         "options": ["Essequibo", "Demerara", "Berbice", "Corentyne"],
         "correct_answer": 0}
    ]"#;

    #[test]
    fn test_all_correct() {
        let score = score_answers(QUESTIONS, &[json!(0), json!(3), json!(0)]).unwrap();
        assert_eq!(score.total_questions, 3);
        assert_eq!(score.correct_count, 3);
        assert_eq!(score.percentage, 100);
        assert!(score.results.iter().all(QuestionResult::is_correct));
    }

    #[test]
    fn test_percentage_rounds() {
        let score = score_answers(QUESTIONS, &[json!(0), json!(1), json!(1)]).unwrap();
        assert_eq!(score.correct_count, 1);
        assert_eq!(score.percentage, 33);

        let score = score_answers(QUESTIONS, &[json!(0), json!(3), json!(1)]).unwrap();
        assert_eq!(score.percentage, 67);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let answers = [json!(0), json!(2), json!(0)];
        let first = score_answers(QUESTIONS, &answers).unwrap();
        let second = score_answers(QUESTIONS, &answers).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.percentage, 67);
    }

    #[test]
    fn test_extra_answers_report_missing_question() {
        let answers = [json!(0), json!(3), json!(0), json!(1), json!(2)];
        let score = score_answers(QUESTIONS, &answers).unwrap();
        assert_eq!(score.results.len(), 5);
        assert_eq!(score.total_questions, 3);
        assert_eq!(score.percentage, 100);

        let json = serde_json::to_value(&score.results[4]).unwrap();
        assert_eq!(json, json!({"error": "Question not found"}));
    }

    #[test]
    fn test_fewer_answers_count_against_total() {
        let score = score_answers(QUESTIONS, &[json!(0)]).unwrap();
        assert_eq!(score.results.len(), 1);
        assert_eq!(score.correct_count, 1);
        assert_eq!(score.percentage, 33);
    }

    #[test]
    fn test_string_and_invalid_answers() {
        let score = score_answers(QUESTIONS, &[json!("0"), json!(null), json!("three")]).unwrap();
        assert!(score.results[0].is_correct());
        assert!(!score.results[1].is_correct());
        assert!(!score.results[2].is_correct());
        assert_eq!(score.correct_count, 1);
    }

    #[test]
    fn test_result_serialization_shape() {
        let score = score_answers(QUESTIONS, &[json!(1)]).unwrap();
        let json = serde_json::to_value(&score).unwrap();
        assert_eq!(json["totalQuestions"], 3);
        assert_eq!(json["correctCount"], 0);
        assert_eq!(json["results"][0]["userAnswer"], 1);
        assert_eq!(json["results"][0]["correctAnswer"], 0);
        assert_eq!(json["results"][0]["isCorrect"], false);
        assert_eq!(json["results"][0]["explanation"], "Georgetown is the capital.");
    }

    #[test]
    fn test_empty_quiz_scores_zero() {
        let score = score_answers("[]", &[json!(0)]).unwrap();
        assert_eq!(score.total_questions, 0);
        assert_eq!(score.percentage, 0);
    }

    #[test]
    fn test_question_without_answer_never_matches() {
        let score = score_answers(r#"[{"question_text": "Q"}]"#, &[json!(0)]).unwrap();
        assert!(!score.results[0].is_correct());
    }

    #[test]
    fn test_stored_answer_as_string() {
        let score =
            score_answers(r#"[{"question_text": "Q", "correct_answer": "2"}]"#, &[json!(2)])
                .unwrap();
        assert!(score.results[0].is_correct());
    }

    #[test]
    fn test_corrupt_questions_error() {
        assert!(score_answers("not json", &[json!(0)]).is_err());
        assert!(score_answers(r#"{"questions": []}"#, &[]).is_err());
    }
}
