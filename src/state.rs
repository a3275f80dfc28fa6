//! Application state: in-memory collections, the derived board, the turn
//! session, and the import pipeline driver.
//!
//! This module owns:
//!   - the question bank and the student roster (mirrored to JSON files)
//!   - the derived game board, rebuilt on every pool or dice-mode change
//!   - the per-turn session (active student + turn engine)
//!   - the at-most-one suspended import session
//!   - the server event broadcast every WebSocket subscribes to
//!
//! Collections are value types: reads hand out clones, the board holds owned
//! copies of its questions, and mutations persist a full snapshot. Nothing
//! here aliases into shared data.

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::board::build_board;
use crate::config::{GameConfig, TurnDelays};
use crate::domain::{DiceCount, GameBoard, GameSettings, Question, Record, RecordKind, Student};
use crate::error::AppError;
use crate::ids;
use crate::protocol::{
    board_out, GameStateOut, ImportOut, ImportStatusOut, ServerWsMessage, SortOrder, StudentSort,
};
use crate::reconcile::{self, ConflictOutcome, ImportSession, ImportSummary, Resolution};
use crate::store::FileStore;
use crate::turn::TurnEngine;

/// Per-turn state: who is up and where the turn machine stands.
#[derive(Default)]
pub struct TurnSession {
    pub active_student: Option<String>,
    pub engine: TurnEngine,
}

#[derive(Clone)]
pub struct AppState {
    pub questions: Arc<RwLock<Vec<Question>>>,
    pub students: Arc<RwLock<Vec<Student>>>,
    pub settings: Arc<RwLock<GameSettings>>,
    pub board: Arc<RwLock<GameBoard>>,
    pub turn: Arc<RwLock<TurnSession>>,
    pub import: Arc<RwLock<Option<ImportSession>>>,
    pub store: FileStore,
    pub delays: TurnDelays,
    pub events: broadcast::Sender<ServerWsMessage>,
}

impl AppState {
    /// Build state from config: load both collections from disk and deal the
    /// first board.
    #[instrument(level = "info", skip_all)]
    pub async fn new(config: GameConfig) -> Result<Self, AppError> {
        let store = FileStore::new(config.data_dir.clone());
        let (questions, students) = store.load().await?;

        let settings = GameSettings { num_dice: config.num_dice };
        let board = {
            let mut rng = rand::thread_rng();
            build_board(&questions, settings.num_dice, &mut rng)
        };
        info!(
            target: "game",
            questions = questions.len(),
            students = students.len(),
            slots = board.len(),
            dice = settings.num_dice.num_dice(),
            "initial board assembled"
        );

        let (events, _) = broadcast::channel(64);
        Ok(Self {
            questions: Arc::new(RwLock::new(questions)),
            students: Arc::new(RwLock::new(students)),
            settings: Arc::new(RwLock::new(settings)),
            board: Arc::new(RwLock::new(board)),
            turn: Arc::new(RwLock::new(TurnSession::default())),
            import: Arc::new(RwLock::new(None)),
            store,
            delays: config.turn,
            events,
        })
    }

    /// Fan a server event out to every connected WebSocket. Quiet when
    /// nobody is listening.
    pub fn publish(&self, msg: ServerWsMessage) {
        let _ = self.events.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerWsMessage> {
        self.events.subscribe()
    }

    /// Re-deal the board from the current pool and announce it. Called after
    /// every question mutation and on dice-mode changes.
    pub async fn rebuild_board(&self) {
        let questions = self.questions.read().await.clone();
        let dice = { self.settings.read().await.num_dice };
        let fresh = {
            let mut rng = rand::thread_rng();
            build_board(&questions, dice, &mut rng)
        };
        debug!(target: "game", slots = fresh.len(), "board rebuilt");
        let snapshot = {
            let mut board = self.board.write().await;
            *board = fresh;
            board_out(&board)
        };
        self.publish(ServerWsMessage::BoardUpdated { board: snapshot });
    }

    /// Snapshot for `GET /game` and the WS `get_state` message.
    pub async fn game_snapshot(&self) -> GameStateOut {
        let board = { board_out(&*self.board.read().await) };
        let num_dice = { self.settings.read().await.num_dice };
        let turn = self.turn.read().await;
        GameStateOut {
            ready: !board.is_empty(),
            board,
            num_dice,
            active_student_id: turn.active_student.clone(),
            turn: turn.engine.phase(),
            outcome: turn.engine.outcome().cloned(),
        }
    }

    //
    // Question bank
    //

    pub async fn list_questions(&self) -> Vec<Question> {
        self.questions.read().await.clone()
    }

    /// Admin create: the allocator mints the id.
    #[instrument(level = "debug", skip(self, question, answer))]
    pub async fn create_question(
        &self,
        question: String,
        answer: String,
        points: u32,
    ) -> Result<Question, AppError> {
        let created = self
            .insert_question(Question { id: String::new(), question, answer, points })
            .await?;
        self.rebuild_board().await;
        Ok(created)
    }

    #[instrument(level = "debug", skip(self, question, answer), fields(%id))]
    pub async fn update_question(
        &self,
        id: &str,
        question: String,
        answer: String,
        points: u32,
    ) -> Result<Question, AppError> {
        let (snapshot, updated) = {
            let mut questions = self.questions.write().await;
            let slot = questions
                .iter_mut()
                .find(|q| q.id == id)
                .ok_or_else(|| AppError::NotFound(format!("question '{}' not found", id)))?;
            slot.question = question;
            slot.answer = answer;
            slot.points = points;
            let updated = slot.clone();
            (questions.clone(), updated)
        };
        self.store.save_questions(&snapshot).await?;
        self.rebuild_board().await;
        Ok(updated)
    }

    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn delete_question(&self, id: &str) -> Result<(), AppError> {
        let snapshot = {
            let mut questions = self.questions.write().await;
            let before = questions.len();
            questions.retain(|q| q.id != id);
            if questions.len() == before {
                return Err(AppError::NotFound(format!("question '{}' not found", id)));
            }
            questions.clone()
        };
        self.store.save_questions(&snapshot).await?;
        self.rebuild_board().await;
        Ok(())
    }

    /// Insert honoring a caller-supplied id (the import path); mints one when
    /// the id is empty. The collection never holds two records with one id.
    async fn insert_question(&self, mut question: Question) -> Result<Question, AppError> {
        let snapshot = {
            let mut questions = self.questions.write().await;
            if question.id.is_empty() {
                question.id =
                    ids::generate_id(RecordKind::Question, questions.iter().map(|q| q.id.as_str()));
            } else if questions.iter().any(|q| q.id == question.id) {
                return Err(AppError::Conflict(format!(
                    "question id '{}' already exists",
                    question.id
                )));
            }
            questions.push(question.clone());
            questions.clone()
        };
        self.store.save_questions(&snapshot).await?;
        Ok(question)
    }

    //
    // Student roster
    //

    pub async fn list_students(
        &self,
        sort: Option<StudentSort>,
        order: Option<SortOrder>,
    ) -> Vec<Student> {
        let mut students = self.students.read().await.clone();
        if let Some(sort) = sort {
            match sort {
                StudentSort::Name => {
                    students.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                }
                StudentSort::Score => students.sort_by(|a, b| a.score.cmp(&b.score)),
            }
            if matches!(order, Some(SortOrder::Desc)) {
                students.reverse();
            }
        }
        students
    }

    #[instrument(level = "debug", skip(self, name))]
    pub async fn create_student(&self, name: String, score: u32) -> Result<Student, AppError> {
        self.insert_student(Student { id: String::new(), name, score }).await
    }

    #[instrument(level = "debug", skip(self, name), fields(%id))]
    pub async fn update_student(
        &self,
        id: &str,
        name: String,
        score: u32,
    ) -> Result<Student, AppError> {
        let (snapshot, updated) = {
            let mut students = self.students.write().await;
            let slot = students
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| AppError::NotFound(format!("student '{}' not found", id)))?;
            slot.name = name;
            slot.score = score;
            let updated = slot.clone();
            (students.clone(), updated)
        };
        self.store.save_students(&snapshot).await?;
        self.publish(ServerWsMessage::ScoreUpdated {
            student_id: updated.id.clone(),
            score: updated.score,
        });
        Ok(updated)
    }

    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn delete_student(&self, id: &str) -> Result<(), AppError> {
        let snapshot = {
            let mut students = self.students.write().await;
            let before = students.len();
            students.retain(|s| s.id != id);
            if students.len() == before {
                return Err(AppError::NotFound(format!("student '{}' not found", id)));
            }
            students.clone()
        };
        self.store.save_students(&snapshot).await?;

        // A deleted active student takes the turn down with them.
        let was_active = {
            let mut turn = self.turn.write().await;
            if turn.active_student.as_deref() == Some(id) {
                turn.active_student = None;
                turn.engine.reset();
                true
            } else {
                false
            }
        };
        if was_active {
            self.publish(ServerWsMessage::TurnReset);
            self.publish(ServerWsMessage::StudentSelected { student_id: None });
        }
        Ok(())
    }

    async fn insert_student(&self, mut student: Student) -> Result<Student, AppError> {
        let snapshot = {
            let mut students = self.students.write().await;
            if student.id.is_empty() {
                student.id =
                    ids::generate_id(RecordKind::Student, students.iter().map(|s| s.id.as_str()));
            } else if students.iter().any(|s| s.id == student.id) {
                return Err(AppError::Conflict(format!(
                    "student id '{}' already exists",
                    student.id
                )));
            }
            students.push(student.clone());
            students.clone()
        };
        self.store.save_students(&snapshot).await?;
        Ok(student)
    }

    /// Exactly one score increment per correct answer goes through here.
    #[instrument(level = "debug", skip(self), fields(%id, points))]
    pub async fn add_points(&self, id: &str, points: u32) -> Result<Student, AppError> {
        let (snapshot, updated) = {
            let mut students = self.students.write().await;
            let slot = students
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| AppError::NotFound(format!("student '{}' not found", id)))?;
            // Admin-supplied deltas are unbounded; pin the score at the top
            // instead of wrapping.
            slot.score = slot.score.saturating_add(points);
            let updated = slot.clone();
            (students.clone(), updated)
        };
        self.store.save_students(&snapshot).await?;
        info!(target: "game", student = %updated.id, score = updated.score, "score updated");
        self.publish(ServerWsMessage::ScoreUpdated {
            student_id: updated.id.clone(),
            score: updated.score,
        });
        Ok(updated)
    }

    /// Bulk reset of every score to zero.
    #[instrument(level = "info", skip(self))]
    pub async fn reset_scores(&self) -> Result<usize, AppError> {
        let snapshot = {
            let mut students = self.students.write().await;
            for s in students.iter_mut() {
                s.score = 0;
            }
            students.clone()
        };
        self.store.save_students(&snapshot).await?;
        for s in &snapshot {
            self.publish(ServerWsMessage::ScoreUpdated { student_id: s.id.clone(), score: 0 });
        }
        Ok(snapshot.len())
    }

    //
    // Settings and turn-adjacent state
    //

    pub async fn settings(&self) -> GameSettings {
        *self.settings.read().await
    }

    /// Change the dice mode. A real change re-deals the board and hard-resets
    /// the turn; setting the current mode again is a no-op.
    #[instrument(level = "info", skip(self))]
    pub async fn set_dice_count(&self, dice: DiceCount) -> GameSettings {
        let changed = {
            let mut settings = self.settings.write().await;
            let changed = settings.num_dice != dice;
            settings.num_dice = dice;
            changed
        };
        if changed {
            {
                let mut turn = self.turn.write().await;
                turn.engine.reset();
            }
            self.publish(ServerWsMessage::TurnReset);
            self.rebuild_board().await;
            info!(target: "game", dice = dice.num_dice(), "dice mode changed");
        }
        GameSettings { num_dice: dice }
    }

    /// Point the turn at a student (or nobody). A switch hard-resets the
    /// turn; re-selecting the current student does not.
    #[instrument(level = "debug", skip(self))]
    pub async fn select_student(&self, student_id: Option<String>) -> Result<(), AppError> {
        if let Some(id) = &student_id {
            let known = { self.students.read().await.iter().any(|s| s.id == *id) };
            if !known {
                return Err(AppError::NotFound(format!("student '{}' not found", id)));
            }
        }
        let switched = {
            let mut turn = self.turn.write().await;
            let switched = turn.active_student != student_id;
            turn.active_student = student_id.clone();
            if switched {
                turn.engine.reset();
            }
            switched
        };
        if switched {
            self.publish(ServerWsMessage::TurnReset);
        }
        self.publish(ServerWsMessage::StudentSelected { student_id });
        Ok(())
    }

    //
    // Import pipeline driving
    //

    /// Start an import run. Suspends on duplicate ids or live collisions,
    /// otherwise runs straight through to the create pass.
    #[instrument(level = "info", skip(self, payload))]
    pub async fn begin_import(&self, kind: RecordKind, payload: &str) -> Result<ImportOut, AppError> {
        let mut import = self.import.write().await;
        if import.is_some() {
            return Err(AppError::Conflict("an import is already in progress".to_string()));
        }
        let records = reconcile::parse_import(kind, payload)?;
        info!(target: "import", kind = kind.label(), records = records.len(), "import started");
        let session = ImportSession::new(kind, records);
        if session.needs_duplicate_resolution() {
            let out = ImportOut::Suspended { import: status_of(&session) };
            *import = Some(session);
            return Ok(out);
        }
        drop(import);
        self.detect_and_advance(session).await
    }

    /// Stage-one answer: the re-identified records for every duplicate group.
    pub async fn resolve_import_duplicates(
        &self,
        resolved: Vec<serde_json::Value>,
    ) -> Result<ImportOut, AppError> {
        let mut session = self.take_session().await?;
        let records = match reconcile::parse_records(session.kind(), resolved) {
            Ok(records) => records,
            Err(err) => {
                self.put_session_back(session).await;
                return Err(err);
            }
        };
        if let Err(err) = session.resolve_duplicates(records) {
            self.put_session_back(session).await;
            return Err(err);
        }
        self.detect_and_advance(session).await
    }

    /// Stage-two answer: the decision for the collision currently up front.
    pub async fn resolve_import_conflict(
        &self,
        resolution: Resolution,
    ) -> Result<ImportOut, AppError> {
        let mut session = self.take_session().await?;
        let outcome = match session.kind() {
            RecordKind::Question => {
                let questions = self.questions.read().await;
                session.resolve_conflict(resolution, questions.iter().map(|q| q.id.as_str()))
            }
            RecordKind::Student => {
                let students = self.students.read().await;
                session.resolve_conflict(resolution, students.iter().map(|s| s.id.as_str()))
            }
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.put_session_back(session).await;
                return Err(err);
            }
        };

        // Replace writes through right away; keep and add_as_new wait for
        // the create pass.
        if let ConflictOutcome::Replaced(record) = outcome {
            if let Err(err) = self.apply_replace(record).await {
                self.put_session_back(session).await;
                return Err(err);
            }
        }

        if session.current_conflict().is_some() {
            let out = ImportOut::Suspended { import: status_of(&session) };
            self.put_session_back(session).await;
            return Ok(out);
        }
        self.commit_import(session).await
    }

    /// Drop all suspended import state. Replaces already applied stay
    /// applied; nothing else is written.
    #[instrument(level = "info", skip(self))]
    pub async fn cancel_import(&self) -> Result<(), AppError> {
        match self.import.write().await.take() {
            Some(session) => {
                info!(target: "import", kind = session.kind().label(), "import cancelled");
                Ok(())
            }
            None => Err(AppError::NotFound("no import in progress".to_string())),
        }
    }

    pub async fn import_status(&self) -> Result<ImportStatusOut, AppError> {
        let import = self.import.read().await;
        import
            .as_ref()
            .map(status_of)
            .ok_or_else(|| AppError::NotFound("no import in progress".to_string()))
    }

    async fn take_session(&self) -> Result<ImportSession, AppError> {
        self.import
            .write()
            .await
            .take()
            .ok_or_else(|| AppError::NotFound("no import in progress".to_string()))
    }

    async fn put_session_back(&self, session: ImportSession) {
        *self.import.write().await = Some(session);
    }

    /// Collision-check the working set; suspend on hits, commit otherwise.
    async fn detect_and_advance(&self, mut session: ImportSession) -> Result<ImportOut, AppError> {
        match session.kind() {
            RecordKind::Question => {
                let questions = self.questions.read().await;
                session.detect_collisions(|id| {
                    questions.iter().find(|q| q.id == id).map(|q| Record::Question(q.clone()))
                });
            }
            RecordKind::Student => {
                let students = self.students.read().await;
                session.detect_collisions(|id| {
                    students.iter().find(|s| s.id == id).map(|s| Record::Student(s.clone()))
                });
            }
        }
        if session.current_conflict().is_some() {
            let out = ImportOut::Suspended { import: status_of(&session) };
            self.put_session_back(session).await;
            return Ok(out);
        }
        self.commit_import(session).await
    }

    /// The final create pass: one independent create per pending record, no
    /// rollback on per-item failure.
    async fn commit_import(&self, mut session: ImportSession) -> Result<ImportOut, AppError> {
        let kind = session.kind();
        let (kept, replaced) = session.tally();
        let mut summary = ImportSummary { kept, replaced, ..Default::default() };

        for record in session.take_pending() {
            let result = match record {
                Record::Question(q) => self.insert_question(q).await.map(|_| ()),
                Record::Student(s) => self.insert_student(s).await.map(|_| ()),
            };
            match result {
                Ok(()) => summary.created += 1,
                Err(err) => {
                    warn!(target: "import", error = %err, "import create failed");
                    summary.failed += 1;
                }
            }
        }

        if kind == RecordKind::Question && (summary.created > 0 || summary.replaced > 0) {
            self.rebuild_board().await;
        }
        info!(
            target: "import",
            kind = kind.label(),
            created = summary.created,
            replaced = summary.replaced,
            kept = summary.kept,
            failed = summary.failed,
            "import complete"
        );
        Ok(ImportOut::Complete { summary })
    }

    /// Overwrite the live record behind a `replace` resolution. A live row
    /// deleted mid-import is admitted as a fresh record instead.
    async fn apply_replace(&self, record: Record) -> Result<(), AppError> {
        match record {
            Record::Question(question) => {
                let snapshot = {
                    let mut questions = self.questions.write().await;
                    match questions.iter_mut().find(|q| q.id == question.id) {
                        Some(slot) => *slot = question,
                        None => questions.push(question),
                    }
                    questions.clone()
                };
                self.store.save_questions(&snapshot).await?;
                self.rebuild_board().await;
            }
            Record::Student(student) => {
                let (snapshot, updated) = {
                    let mut students = self.students.write().await;
                    match students.iter_mut().find(|s| s.id == student.id) {
                        Some(slot) => {
                            *slot = student;
                            let updated = slot.clone();
                            (students.clone(), updated)
                        }
                        None => {
                            students.push(student.clone());
                            (students.clone(), student)
                        }
                    }
                };
                self.store.save_students(&snapshot).await?;
                self.publish(ServerWsMessage::ScoreUpdated {
                    student_id: updated.id.clone(),
                    score: updated.score,
                });
            }
        }
        Ok(())
    }
}

fn status_of(session: &ImportSession) -> ImportStatusOut {
    let stage = if session.needs_duplicate_resolution() { "duplicates" } else { "conflicts" };
    ImportStatusOut {
        kind: session.kind(),
        stage,
        duplicates: session.duplicate_groups().to_vec(),
        conflict: session.current_conflict().cloned(),
        conflicts_remaining: session.conflicts_remaining(),
        pending_creates: session.pending_creates(),
    }
}
