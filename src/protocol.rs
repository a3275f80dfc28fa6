//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{DiceCount, GameBoard, InterConflict, IntraConflict, Question, RecordKind};
use crate::reconcile::{ImportSummary, Resolution};
use crate::turn::{AnswerOutcome, TurnPhase};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetState,
    SelectStudent {
        /// `null` clears the selection.
        #[serde(rename = "studentId")]
        student_id: Option<String>,
    },
    SetDiceCount {
        #[serde(rename = "numDice")]
        num_dice: DiceCount,
    },
    Roll,
    SubmitAnswer {
        answer: String,
    },
}

/// Messages the server pushes over WebSocket. Every connected socket gets
/// the same broadcast stream, so these are cheap to clone.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    GameState {
        state: GameStateOut,
    },
    StudentSelected {
        #[serde(rename = "studentId")]
        student_id: Option<String>,
    },
    RollStarted {
        dice: [u8; 2],
        total: u8,
    },
    BoardShuffling,
    CardRevealed {
        total: u8,
        question: Question,
    },
    AnswerSettled {
        outcome: AnswerOutcome,
    },
    TurnReset,
    BoardUpdated {
        board: Vec<BoardSlotOut>,
    },
    ScoreUpdated {
        #[serde(rename = "studentId")]
        student_id: String,
        score: u32,
    },
    Error {
        message: String,
    },
}

/// Full game snapshot used by both WS (`get_state`) and HTTP (`GET /game`).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateOut {
    pub board: Vec<BoardSlotOut>,
    pub num_dice: DiceCount,
    pub active_student_id: Option<String>,
    pub turn: TurnPhase,
    pub outcome: Option<AnswerOutcome>,
    /// False while the question pool is empty and the board with it.
    pub ready: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoardSlotOut {
    pub roll: u8,
    pub question: Question,
}

/// Convert the internal board map to the slot list the frontend renders.
pub fn board_out(board: &GameBoard) -> Vec<BoardSlotOut> {
    board
        .iter()
        .map(|(roll, question)| BoardSlotOut { roll: *roll, question: question.clone() })
        .collect()
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuestionIn {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub points: u32,
}

#[derive(Debug, Deserialize)]
pub struct StudentIn {
    pub name: String,
    #[serde(default)]
    pub score: u32,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentSort {
    Name,
    Score,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Default, Deserialize)]
pub struct StudentListQuery {
    pub sort: Option<StudentSort>,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Deserialize)]
pub struct AddPointsIn {
    pub points: u32,
}

#[derive(Debug, Deserialize)]
pub struct SelectStudentIn {
    #[serde(rename = "studentId")]
    pub student_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    pub answer: String,
}

#[derive(Serialize)]
pub struct RollOut {
    pub started: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmitOut {
    pub accepted: bool,
    pub outcome: Option<AnswerOutcome>,
}

/// Stage-one resolutions arrive as raw JSON objects; the state layer parses
/// them against the suspended session's record kind.
#[derive(Debug, Deserialize)]
pub struct DuplicateResolutionIn {
    pub resolved: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ConflictResolutionIn {
    pub resolution: Resolution,
}

/// Snapshot of a suspended import session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatusOut {
    pub kind: RecordKind,
    pub stage: &'static str,
    pub duplicates: Vec<IntraConflict>,
    pub conflict: Option<InterConflict>,
    pub conflicts_remaining: usize,
    pub pending_creates: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOut {
    /// One of the two resolution stages needs the admin before anything
    /// else happens.
    Suspended { import: ImportStatusOut },
    Complete { summary: ImportSummary },
}
