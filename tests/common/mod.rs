#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use lms_flashcards::auth::{sign_token, AuthUser, Role};
use lms_flashcards::config::Config;
use lms_flashcards::db::operations::{
    CategoryRecord, StudentRecord, TeacherRecord, Visibility, WorkType,
};
use lms_flashcards::db::DatabaseProxy;
use lms_flashcards::seed::{seed_directory, DirectorySeed};
use lms_flashcards::services::flashcard::{
    create_flashcard, CreateFlashcardInput, FlashcardWithItems, NewItemInput,
};
use lms_flashcards::state::AppState;

pub const JWT_SECRET: &str = "integration-test-secret";
pub const CATEGORY_ID: &str = "cat-biology";

/// A fresh database file plus the app wired on top of it.
pub struct TestContext {
    _dir: TempDir,
    pub db: Arc<DatabaseProxy>,
    pub state: AppState,
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let url = format!("sqlite://{}", dir.path().join("flashcards.db").display());
        let db = Arc::new(DatabaseProxy::connect(&url).await.expect("connect test db"));

        let config = Config {
            database_url: url,
            jwt_secret: Some(JWT_SECRET.to_string()),
            ..Config::default()
        };
        let state = AppState::new(Arc::clone(&db), config);

        let ctx = Self {
            _dir: dir,
            db,
            state,
        };
        ctx.seed_directory().await;
        ctx
    }

    async fn seed_directory(&self) {
        let seed = DirectorySeed {
            categories: vec![CategoryRecord {
                id: CATEGORY_ID.to_string(),
                name: "Biology".to_string(),
            }],
            students: ["s1", "s2", "s3"]
                .iter()
                .map(|id| StudentRecord {
                    id: id.to_string(),
                    user_id: format!("user-{id}"),
                    name: format!("Student {id}"),
                })
                .collect(),
            teachers: vec![
                TeacherRecord {
                    id: "t1".to_string(),
                    user_id: "user-t1".to_string(),
                    name: "Assigned Teacher".to_string(),
                    assigned_works: vec![WorkType::Flashcard, WorkType::Course],
                },
                TeacherRecord {
                    id: "t2".to_string(),
                    user_id: "user-t2".to_string(),
                    name: "Course Teacher".to_string(),
                    assigned_works: vec![WorkType::Course],
                },
            ],
        };
        seed_directory(&self.db, &seed).await.expect("seed directory");
    }

    pub fn app(&self) -> Router {
        lms_flashcards::create_app(self.state.clone())
    }

    /// Creates a deck owned by `owner` with one item per term.
    pub async fn create_deck(
        &self,
        owner: &AuthUser,
        title: &str,
        visibility: Visibility,
        terms: &[&str],
    ) -> FlashcardWithItems {
        let input = CreateFlashcardInput {
            title: title.to_string(),
            visibility,
            category_id: CATEGORY_ID.to_string(),
            items: terms
                .iter()
                .map(|term| NewItemInput {
                    term: term.to_string(),
                    answer: format!("{term} answer"),
                })
                .collect(),
        };
        create_flashcard(&self.db, owner, input)
            .await
            .expect("create deck")
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        user: Option<&AuthUser>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

pub fn student(id: &str) -> AuthUser {
    AuthUser {
        id: format!("user-{id}"),
        role: Role::Student,
    }
}

pub fn teacher(id: &str) -> AuthUser {
    AuthUser {
        id: format!("user-{id}"),
        role: Role::Teacher,
    }
}

pub fn admin() -> AuthUser {
    AuthUser {
        id: "user-admin".to_string(),
        role: Role::Admin,
    }
}

pub fn token_for(user: &AuthUser) -> String {
    sign_token(&user.id, user.role, JWT_SECRET, chrono::Duration::hours(1)).unwrap()
}
