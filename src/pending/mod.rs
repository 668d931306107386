//! In-flight analysis jobs and their status machine.
//!
//! ```text
//! uploading -> analyzing -> separating -> calculating -> finalizing -> (retired)
//!                  \______________\______________\____________\-> failed -> (retired)
//! ```

pub mod liveness;
pub mod manager;

use bytes::Bytes;
use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::analysis::NutritionalAnalysisResult;
use crate::gl::AddedSugar;

pub use liveness::Liveness;
pub use manager::{CancelError, PendingActionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Scan,
    Text,
    Refine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Uploading,
    Analyzing,
    Separating,
    Calculating,
    Finalizing,
    Failed,
}

impl ActionStatus {
    /// Synthetic progress shown next to the status.
    pub fn progress(self) -> u8 {
        match self {
            Self::Uploading => 10,
            Self::Analyzing => 25,
            Self::Separating => 50,
            Self::Calculating => 75,
            Self::Finalizing => 100,
            Self::Failed => 0,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Uploading => 0,
            Self::Analyzing => 1,
            Self::Separating => 2,
            Self::Calculating => 3,
            Self::Finalizing => 4,
            Self::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Failed
    }

    /// Forward moves only; `failed` is reachable from anything but itself.
    pub fn can_advance_to(self, next: Self) -> bool {
        !self.is_terminal() && (next == Self::Failed || next.rank() > self.rank())
    }
}

/// An image handed to a scan or refine job. `key` is set once the bytes
/// have been stored and becomes the meal's `imageUri`.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub key: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct TextInput {
    pub name: String,
    pub description: String,
    pub context: String,
    pub added_sugar: Option<AddedSugar>,
    pub date: Option<Date>,
}

#[derive(Debug, Clone)]
pub enum ActionPayload {
    Scan {
        image: ImageRef,
        date: Option<Date>,
    },
    Text(TextInput),
    Refine {
        meal_id: Uuid,
        image: Option<ImageRef>,
        previous: NutritionalAnalysisResult,
        feedback: String,
    },
}

impl ActionPayload {
    pub fn kind(&self) -> ActionType {
        match self {
            Self::Scan { .. } => ActionType::Scan,
            Self::Text(_) => ActionType::Text,
            Self::Refine { .. } => ActionType::Refine,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Scan { .. } => "Meal photo".to_string(),
            Self::Text(t) => t.name.trim().to_string(),
            Self::Refine { previous, .. } => format!("Refining {}", previous.food_name),
        }
    }
}

/// A not-yet-persisted job as shown to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub status: ActionStatus,
    pub progress: u8,
    pub label: String,
    /// Calendar day the resulting meal will be logged on; `None` for refines.
    pub target_date: Option<Date>,
    pub meal_id: Option<Uuid>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip)]
    pub history: Vec<ActionStatus>,
}

impl PendingAction {
    fn new(user_id: Uuid, payload: &ActionPayload, now: OffsetDateTime) -> Self {
        let (target_date, meal_id) = match payload {
            ActionPayload::Scan { date, .. } => (Some(date.unwrap_or(now.date())), None),
            ActionPayload::Text(t) => (Some(t.date.unwrap_or(now.date())), None),
            ActionPayload::Refine { meal_id, .. } => (None, Some(*meal_id)),
        };
        let status = ActionStatus::Uploading;
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind: payload.kind(),
            status,
            progress: status.progress(),
            label: payload.label(),
            target_date,
            meal_id,
            error: None,
            created_at: now,
            history: vec![status],
        }
    }
}

/// Observable pipeline events, in the order they happen per action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    Stage { id: Uuid, status: ActionStatus },
    Completed { id: Uuid, meal_id: Uuid },
    Failed { id: Uuid, error: String },
    Retired { id: Uuid },
}

impl ActionEvent {
    pub fn action_id(&self) -> Uuid {
        match self {
            Self::Stage { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. }
            | Self::Retired { id } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_moves_forward_only() {
        use ActionStatus::*;
        assert!(Uploading.can_advance_to(Analyzing));
        assert!(Analyzing.can_advance_to(Calculating));
        assert!(!Calculating.can_advance_to(Separating));
        assert!(!Finalizing.can_advance_to(Calculating));
        assert!(Finalizing.can_advance_to(Failed));
        assert!(Separating.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Finalizing));
    }

    #[test]
    fn new_action_starts_uploading() {
        let now = time::macros::datetime!(2024-03-05 09:00 UTC);
        let payload = ActionPayload::Text(TextInput {
            name: " Idli ".into(),
            description: String::new(),
            context: "2 pieces".into(),
            added_sugar: None,
            date: None,
        });
        let a = PendingAction::new(Uuid::new_v4(), &payload, now);
        assert_eq!(a.status, ActionStatus::Uploading);
        assert_eq!(a.progress, 10);
        assert_eq!(a.label, "Idli");
        assert_eq!(a.target_date, Some(now.date()));

        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["status"], "uploading");
        assert!(json.get("history").is_none());
    }
}
