use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;
use validator::Validate;

use crate::dto::admin_dto::{CreateTestPayload, Paginated, QuestionPayload, UpdateTestPayload};
use crate::error::{Error, Result};
use crate::models::test::{AnswerOption, Question, Test};

#[derive(Debug, Default)]
pub struct TestFilter {
    pub search: Option<String>,
    pub subject: Option<String>,
}

/// The test catalogue. Tests are handed out as `Arc` snapshots; an update
/// swaps the stored `Arc` and leaves running sessions on the old one.
#[derive(Clone, Default)]
pub struct TestService {
    tests: Arc<RwLock<HashMap<Uuid, Arc<Test>>>>,
}

impl TestService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_test(
        &self,
        payload: CreateTestPayload,
        created_by: Option<String>,
    ) -> Result<Arc<Test>> {
        payload.validate()?;
        let questions = build_questions(&payload.questions)?;

        let now = Utc::now();
        let test = Test {
            id: Uuid::new_v4(),
            title: payload.title.trim().to_string(),
            subject: Some(payload.subject.trim().to_string()),
            description: payload
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            duration_minutes: payload.duration_minutes,
            questions,
            created_by,
            created_at: now,
            updated_at: now,
        };
        test.validate_structure()?;

        let test = Arc::new(test);
        self.tests.write().await.insert(test.id, test.clone());
        tracing::info!(test_id = %test.id, title = %test.title, "test created");
        Ok(test)
    }

    pub async fn get_test_by_id(&self, test_id: Uuid) -> Result<Arc<Test>> {
        self.tests
            .read()
            .await
            .get(&test_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))
    }

    pub async fn update_test(&self, test_id: Uuid, mut payload: UpdateTestPayload) -> Result<Arc<Test>> {
        payload.title = tidy(payload.title);
        payload.subject = tidy(payload.subject);
        payload.description = tidy(payload.description);
        payload.validate()?;
        let questions = match &payload.questions {
            Some(questions) => Some(build_questions(questions)?),
            None => None,
        };

        let mut tests = self.tests.write().await;
        let current = tests
            .get(&test_id)
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))?;

        let mut updated = Test::clone(current);
        if let Some(title) = payload.title {
            updated.title = title;
        }
        if let Some(subject) = payload.subject {
            updated.subject = Some(subject);
        }
        if let Some(description) = payload.description {
            updated.description = Some(description);
        }
        if let Some(duration) = payload.duration_minutes {
            updated.duration_minutes = duration;
        }
        if let Some(questions) = questions {
            updated.questions = questions;
        }
        updated.updated_at = Utc::now();
        updated.validate_structure()?;

        let updated = Arc::new(updated);
        tests.insert(test_id, updated.clone());
        tracing::info!(test_id = %test_id, "test updated");
        Ok(updated)
    }

    pub async fn delete_test(&self, test_id: Uuid) -> Result<()> {
        match self.tests.write().await.remove(&test_id) {
            Some(_) => {
                tracing::info!(test_id = %test_id, "test deleted");
                Ok(())
            }
            None => Err(Error::NotFound(format!("Test {} not found", test_id))),
        }
    }

    pub async fn list_tests(
        &self,
        page: Option<usize>,
        per_page: Option<usize>,
        filter: TestFilter,
    ) -> Paginated<Test> {
        let search = filter.search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let subject = filter.subject.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());

        let mut matching: Vec<Test> = self
            .tests
            .read()
            .await
            .values()
            .filter(|test| {
                subject.as_deref().map_or(true, |wanted| {
                    test.subject.as_deref().map(str::to_lowercase).as_deref() == Some(wanted)
                })
            })
            .filter(|test| {
                search.as_deref().map_or(true, |needle| {
                    test.title.to_lowercase().contains(needle)
                        || test
                            .description
                            .as_deref()
                            .map_or(false, |d| d.to_lowercase().contains(needle))
                })
            })
            .map(|test| Test::clone(test))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.title.cmp(&b.title)));

        Paginated::from_vec(matching, page, per_page)
    }

    pub async fn count(&self) -> usize {
        self.tests.read().await.len()
    }

    /// Loads a JSON array of test definitions, as accepted by the create
    /// endpoint, into the catalogue.
    pub async fn seed_from_file(&self, path: impl AsRef<Path>) -> anyhow::Result<usize> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let payloads: Vec<CreateTestPayload> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing seed file {}", path.display()))?;

        let mut seeded = 0;
        for payload in payloads {
            let title = payload.title.clone();
            self.create_test(payload, Some("seed".to_string()))
                .await
                .with_context(|| format!("seeding test '{}'", title))?;
            seeded += 1;
        }
        Ok(seeded)
    }
}

fn tidy(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn build_questions(payloads: &[QuestionPayload]) -> Result<Vec<Question>> {
    payloads
        .iter()
        .enumerate()
        .map(|(idx, payload)| {
            payload.validate()?;
            if payload.options.iter().any(|o| o.trim().is_empty()) {
                return Err(Error::BadRequest(format!(
                    "Question {} has an empty option",
                    idx + 1
                )));
            }
            if payload.correct_option_index >= payload.options.len() {
                return Err(Error::BadRequest(format!(
                    "Question {} marks option {} as correct but has {} options",
                    idx + 1,
                    payload.correct_option_index,
                    payload.options.len()
                )));
            }
            Ok(Question {
                text: payload.text.trim().to_string(),
                options: payload
                    .options
                    .iter()
                    .map(|o| AnswerOption {
                        text: o.trim().to_string(),
                    })
                    .collect(),
                correct_option_index: payload.correct_option_index,
            })
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::physics_payload;
    use super::*;

    #[tokio::test]
    async fn create_and_fetch() {
        let svc = TestService::new();
        let test = svc.create_test(physics_payload(), Some("admin@example.com".into())).await.unwrap();
        assert_eq!(test.questions.len(), 3);
        assert_eq!(test.duration_seconds(), 3600);

        let fetched = svc.get_test_by_id(test.id).await.unwrap();
        assert!(Arc::ptr_eq(&test, &fetched));
    }

    #[tokio::test]
    async fn rejects_blank_options_and_bad_key() {
        let svc = TestService::new();

        let mut blank = physics_payload();
        blank.questions[0].options[2] = "   ".into();
        assert!(matches!(svc.create_test(blank, None).await, Err(Error::BadRequest(_))));

        let mut bad_key = physics_payload();
        bad_key.questions[1].correct_option_index = 3;
        assert!(matches!(svc.create_test(bad_key, None).await, Err(Error::BadRequest(_))));

        let mut no_questions = physics_payload();
        no_questions.questions.clear();
        assert!(matches!(svc.create_test(no_questions, None).await, Err(Error::Validation(_))));
        assert_eq!(svc.count().await, 0);
    }

    #[tokio::test]
    async fn update_swaps_snapshot_without_touching_old_one() {
        let svc = TestService::new();
        let original = svc.create_test(physics_payload(), None).await.unwrap();

        let updated = svc
            .update_test(
                original.id,
                UpdateTestPayload {
                    duration_minutes: Some(30),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.duration_minutes, 30);
        assert_eq!(original.duration_minutes, 60);
        assert_eq!(updated.questions, original.questions);
    }

    #[tokio::test]
    async fn update_trims_text_fields_like_create() {
        let svc = TestService::new();
        let original = svc.create_test(physics_payload(), None).await.unwrap();

        let updated = svc
            .update_test(
                original.id,
                UpdateTestPayload {
                    title: Some("  Physics 102  ".into()),
                    subject: Some(" Mechanics ".into()),
                    description: Some("   ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Physics 102");
        assert_eq!(updated.subject.as_deref(), Some("Mechanics"));
        assert_eq!(updated.description.as_deref(), Some("Introductory mechanics"));

        let short = svc
            .update_test(
                original.id,
                UpdateTestPayload {
                    title: Some("  ab  ".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(short, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let svc = TestService::new();
        svc.create_test(physics_payload(), None).await.unwrap();
        let mut chemistry = physics_payload();
        chemistry.title = "Chemistry Basics".into();
        chemistry.subject = "Chemistry".into();
        chemistry.description = None;
        svc.create_test(chemistry, None).await.unwrap();

        let all = svc.list_tests(None, None, TestFilter::default()).await;
        assert_eq!(all.total, 2);

        let physics = svc
            .list_tests(
                None,
                None,
                TestFilter {
                    subject: Some("physics".into()),
                    search: None,
                },
            )
            .await;
        assert_eq!(physics.total, 1);
        assert_eq!(physics.items[0].title, "Physics 101");

        let search = svc
            .list_tests(
                None,
                None,
                TestFilter {
                    search: Some("mechanics".into()),
                    subject: None,
                },
            )
            .await;
        assert_eq!(search.total, 1);

        let paged = svc.list_tests(Some(2), Some(1), TestFilter::default()).await;
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.total_pages, 2);
    }

    #[tokio::test]
    async fn delete_missing_test_is_not_found() {
        let svc = TestService::new();
        assert!(matches!(svc.delete_test(Uuid::new_v4()).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn seeds_from_fixture_file() {
        let svc = TestService::new();
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/sample_tests.json");
        let seeded = svc.seed_from_file(path).await.unwrap();
        assert!(seeded >= 1);
        assert_eq!(svc.count().await, seeded);
    }
}
