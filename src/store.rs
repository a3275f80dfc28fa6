//! JSON-file persistence for the question bank and the roster.
//!
//! One array document per collection, the same shape the import/export
//! endpoints speak, rewritten whole from the in-memory snapshot on every
//! mutation. Turn state is deliberately not persisted; a restart loses the
//! turn in progress, never scores.

use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::domain::{Question, Student};
use crate::error::AppError;

pub const QUESTIONS_FILE: &str = "questions.json";
pub const STUDENTS_FILE: &str = "students.json";

/// File-backed store rooted at the configured data directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load both collections, creating the data directory on first run.
    /// Missing files mean empty collections; unreadable or unparsable files
    /// are an error rather than silent data loss.
    pub async fn load(&self) -> Result<(Vec<Question>, Vec<Student>), AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let questions = self.load_collection::<Question>(QUESTIONS_FILE).await?;
        let students = self.load_collection::<Student>(STUDENTS_FILE).await?;
        info!(
            target: "chemroll_backend",
            dir = %self.dir.display(),
            questions = questions.len(),
            students = students.len(),
            "collections loaded"
        );
        Ok((questions, students))
    }

    pub async fn save_questions(&self, questions: &[Question]) -> Result<(), AppError> {
        self.save_collection(QUESTIONS_FILE, questions).await
    }

    pub async fn save_students(&self, students: &[Student]) -> Result<(), AppError> {
        self.save_collection(STUDENTS_FILE, students).await
    }

    async fn load_collection<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, AppError> {
        let path = self.dir.join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AppError::Persistence(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AppError::Persistence(format!("{}: {}", path.display(), e))),
        }
    }

    async fn save_collection<T: Serialize>(&self, file: &str, items: &[T]) -> Result<(), AppError> {
        let path = self.dir.join(file);
        let json = serde_json::to_vec_pretty(items)
            .map_err(|e| AppError::Persistence(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| AppError::Persistence(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> FileStore {
        let dir = std::env::temp_dir().join(format!("chemroll_store_{}", Uuid::new_v4()));
        FileStore::new(dir)
    }

    #[tokio::test]
    async fn missing_files_load_as_empty_collections() {
        let store = temp_store();
        let (questions, students) = store.load().await.unwrap();
        assert!(questions.is_empty());
        assert!(students.is_empty());
    }

    #[tokio::test]
    async fn collections_round_trip_through_the_files() {
        let store = temp_store();
        store.load().await.unwrap();

        let questions = vec![Question {
            id: "question-tag-001".to_string(),
            question: "Chemical formula for table salt?".to_string(),
            answer: "NaCl".to_string(),
            points: 10,
        }];
        let students = vec![Student {
            id: "student-tag-01".to_string(),
            name: "Ada".to_string(),
            score: 3,
        }];
        store.save_questions(&questions).await.unwrap();
        store.save_students(&students).await.unwrap();

        let (loaded_q, loaded_s) = store.load().await.unwrap();
        assert_eq!(loaded_q, questions);
        assert_eq!(loaded_s, students);
    }

    #[tokio::test]
    async fn corrupt_documents_surface_as_persistence_errors() {
        let store = temp_store();
        store.load().await.unwrap();
        tokio::fs::write(store.dir.join(QUESTIONS_FILE), b"not json")
            .await
            .unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }
}
