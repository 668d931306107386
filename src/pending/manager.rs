use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use time::{Date, OffsetDateTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{ActionEvent, ActionPayload, ActionStatus, ImageRef, Liveness, PendingAction, TextInput};
use crate::analysis::{AnalysisService, NutritionalAnalysisResult};
use crate::config::PipelineConfig;
use crate::error::{AnalysisError, RepoError, ValidationError};
use crate::meals::repo_types::{MealPatch, NewMeal};
use crate::meals::services::MealRepository;
use crate::storage::StorageClient;

const EVENT_CAPACITY: usize = 256;

struct Tracked {
    action: PendingAction,
    liveness: Liveness,
}

struct Inner {
    analysis: Arc<AnalysisService>,
    meals: Arc<MealRepository>,
    storage: Arc<dyn StorageClient>,
    config: PipelineConfig,
    scope: Liveness,
    actions: Mutex<HashMap<Uuid, Tracked>>,
    events: broadcast::Sender<ActionEvent>,
}

/// Owns the set of in-flight analysis jobs.
///
/// Each `start_*` call validates its input, registers a [`PendingAction`]
/// and spawns the job; the caller gets the id back immediately. Jobs run
/// independently of each other. Every state change after an await is gated
/// on the job's [`Liveness`], so a cancelled job or a shut-down manager
/// never writes again.
#[derive(Clone)]
pub struct PendingActionManager {
    inner: Arc<Inner>,
}

#[derive(Debug, thiserror::Error)]
enum Failure {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Why [`PendingActionManager::cancel`] refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    #[error("no such action")]
    NotFound,
    #[error("the meal is already being saved")]
    Saving,
}

impl PendingActionManager {
    pub fn new(
        analysis: Arc<AnalysisService>,
        meals: Arc<MealRepository>,
        storage: Arc<dyn StorageClient>,
        config: PipelineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                analysis,
                meals,
                storage,
                config,
                scope: Liveness::new(),
                actions: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActionEvent> {
        self.inner.events.subscribe()
    }

    #[instrument(skip(self, image), fields(bytes = image.bytes.len()))]
    pub fn start_scan(&self, user_id: Uuid, image: ImageRef, date: Option<Date>) -> Result<Uuid, ValidationError> {
        if image.bytes.is_empty() {
            return Err(ValidationError::InvalidImage);
        }
        Ok(self.launch(user_id, ActionPayload::Scan { image, date }))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub fn start_text_analysis(&self, user_id: Uuid, mut input: TextInput) -> Result<Uuid, ValidationError> {
        input.name = input.name.trim().to_string();
        if input.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if let Some(sugar) = &input.added_sugar {
            sugar.validate()?;
        }
        Ok(self.launch(user_id, ActionPayload::Text(input)))
    }

    #[instrument(skip(self, image, previous, feedback))]
    pub fn start_refinement(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        image: Option<ImageRef>,
        previous: NutritionalAnalysisResult,
        feedback: &str,
    ) -> Result<Uuid, ValidationError> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(ValidationError::EmptyFeedback);
        }
        let payload = ActionPayload::Refine {
            meal_id,
            image,
            previous,
            feedback: feedback.to_string(),
        };
        Ok(self.launch(user_id, payload))
    }

    /// Active actions of a user, most recently started first.
    pub fn list(&self, user_id: Uuid) -> Vec<PendingAction> {
        let mut list: Vec<PendingAction> = self
            .inner
            .lock()
            .values()
            .filter(|t| t.action.user_id == user_id)
            .map(|t| t.action.clone())
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub fn get(&self, id: Uuid) -> Option<PendingAction> {
        self.inner.lock().get(&id).map(|t| t.action.clone())
    }

    /// Active scan/text actions that will log a meal on `date`.
    pub fn pending_for_date(&self, user_id: Uuid, date: Date) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|t| t.action.user_id == user_id && t.action.target_date == Some(date))
            .filter(|t| !t.action.status.is_terminal())
            .count()
    }

    /// Stop a job and forget it. Its in-flight provider call is left to
    /// finish and its result is dropped.
    ///
    /// A job in `Finalizing` is already writing its meal and cannot be
    /// cancelled. The check shares the lock with [`Inner::transition`], so
    /// a job is either cancelled before it starts saving or not at all.
    pub fn cancel(&self, id: Uuid) -> Result<(), CancelError> {
        let tracked = {
            let mut actions = self.inner.lock();
            match actions.get(&id).map(|t| t.action.status) {
                None => return Err(CancelError::NotFound),
                Some(ActionStatus::Finalizing) => return Err(CancelError::Saving),
                Some(_) => actions.remove(&id),
            }
        };
        if let Some(tracked) = tracked {
            tracked.liveness.revoke();
            info!(action_id = %id, "pending action cancelled");
            let _ = self.inner.events.send(ActionEvent::Retired { id });
        }
        Ok(())
    }

    /// Revoke every job. Used on process shutdown.
    pub fn shutdown(&self) {
        self.inner.scope.revoke();
        let drained = {
            let mut actions = self.inner.lock();
            let n = actions.len();
            actions.clear();
            n
        };
        info!(drained, "pending action manager shut down");
    }

    fn launch(&self, user_id: Uuid, payload: ActionPayload) -> Uuid {
        let action = PendingAction::new(user_id, &payload, OffsetDateTime::now_utc());
        let id = action.id;
        let liveness = self.inner.scope.child();
        info!(action_id = %id, kind = ?action.kind, "pending action started");
        self.inner.lock().insert(
            id,
            Tracked {
                action,
                liveness: liveness.clone(),
            },
        );
        tokio::spawn(self.inner.clone().run(id, user_id, payload, liveness));
        id
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Tracked>> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a status change if the job is alive and the move is legal.
    fn transition(&self, id: Uuid, to: ActionStatus, error: Option<String>) -> bool {
        {
            let mut actions = self.lock();
            let Some(tracked) = actions.get_mut(&id) else {
                return false;
            };
            if !tracked.liveness.is_alive() || !tracked.action.status.can_advance_to(to) {
                return false;
            }
            let a = &mut tracked.action;
            a.status = to;
            a.progress = to.progress();
            a.error = error;
            a.history.push(to);
        }
        debug!(action_id = %id, status = ?to, "pending action stage");
        let _ = self.events.send(ActionEvent::Stage { id, status: to });
        true
    }

    fn spawn_stage_timers(self: &Arc<Self>, id: Uuid) -> JoinHandle<()> {
        let inner = self.clone();
        tokio::spawn(async move {
            let first = inner.config.separating_delay;
            let second = inner.config.calculating_delay.saturating_sub(first);
            tokio::time::sleep(first).await;
            inner.transition(id, ActionStatus::Separating, None);
            tokio::time::sleep(second).await;
            inner.transition(id, ActionStatus::Calculating, None);
        })
    }

    async fn run(self: Arc<Self>, id: Uuid, user_id: Uuid, payload: ActionPayload, liveness: Liveness) {
        if !self.transition(id, ActionStatus::Analyzing, None) {
            return;
        }
        let timers = self.spawn_stage_timers(id);
        let outcome = self.analyze(&payload).await;
        timers.abort();

        let photo = match &payload {
            ActionPayload::Scan { image, .. } => image.key.clone(),
            _ => None,
        };

        if !liveness.is_alive() {
            debug!(action_id = %id, "result discarded for cancelled action");
            self.discard_photo(photo.as_deref()).await;
            return;
        }

        let outcome = match outcome {
            Ok(result) => {
                if !self.transition(id, ActionStatus::Finalizing, None) {
                    self.discard_photo(photo.as_deref()).await;
                    return;
                }
                self.persist(user_id, payload, result).await.map_err(Failure::Repo)
            }
            Err(e) => Err(Failure::Analysis(e)),
        };

        match outcome {
            Ok(meal_id) if !liveness.is_alive() => {
                debug!(action_id = %id, %meal_id, "meal saved after shutdown");
            }
            Ok(meal_id) => {
                info!(action_id = %id, %meal_id, "pending action completed");
                let _ = self.events.send(ActionEvent::Completed { id, meal_id });
                self.retire(id, self.config.success_retire).await;
            }
            Err(failure) => {
                let message = failure.to_string();
                warn!(action_id = %id, error = %message, "pending action failed");
                if self.transition(id, ActionStatus::Failed, Some(message.clone())) {
                    let _ = self.events.send(ActionEvent::Failed { id, error: message });
                }
                self.discard_photo(photo.as_deref()).await;
                self.retire(id, self.config.failure_grace).await;
            }
        }
    }

    async fn analyze(&self, payload: &ActionPayload) -> Result<NutritionalAnalysisResult, AnalysisError> {
        match payload {
            ActionPayload::Scan { image, .. } => self.analysis.analyze_food(image.bytes.clone()).await,
            ActionPayload::Text(t) => {
                self.analysis
                    .analyze_text(&t.name, &t.description, &t.context)
                    .await
            }
            ActionPayload::Refine {
                image,
                previous,
                feedback,
                ..
            } => {
                let bytes = image.as_ref().map(|i| i.bytes.clone());
                self.analysis.refine(bytes, previous, feedback).await
            }
        }
    }

    /// Save the outcome and return the id of the created or updated meal.
    async fn persist(
        &self,
        user_id: Uuid,
        payload: ActionPayload,
        result: NutritionalAnalysisResult,
    ) -> Result<Uuid, RepoError> {
        match payload {
            ActionPayload::Scan { image, date } => {
                let meal = NewMeal::from_analysis(result, meal_time(date), image.key, None);
                Ok(self.meals.create_verified(user_id, meal).await?.id)
            }
            ActionPayload::Text(t) => {
                let result = match &t.added_sugar {
                    Some(sugar) => result.with_added_sugar(sugar),
                    None => result,
                };
                let meal = NewMeal::from_analysis(result, meal_time(t.date), None, t.added_sugar);
                Ok(self.meals.create_verified(user_id, meal).await?.id)
            }
            ActionPayload::Refine { meal_id, image, .. } => {
                let mut patch = MealPatch::from_analysis(result);
                patch.image_uri = image.and_then(|i| i.key);
                self.meals.update(user_id, meal_id, patch).await?;
                Ok(meal_id)
            }
        }
    }

    /// Delete the photo of a scan that will never become a meal.
    async fn discard_photo(&self, key: Option<&str>) {
        let Some(key) = key else {
            return;
        };
        match self.storage.delete_object(key).await {
            Ok(()) => debug!(key, "unused scan photo deleted"),
            Err(e) => warn!(key, error = %e, "could not delete unused scan photo"),
        }
    }

    async fn retire(&self, id: Uuid, after: std::time::Duration) {
        if !after.is_zero() {
            tokio::time::sleep(after).await;
        }
        if self.lock().remove(&id).is_some() {
            debug!(action_id = %id, "pending action retired");
            let _ = self.events.send(ActionEvent::Retired { id });
        }
    }
}

/// Meal timestamp: now, moved onto `date` when the user backdates.
fn meal_time(date: Option<Date>) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    match date {
        Some(d) => now.replace_date(d),
        None => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::service::tests::StubProvider;
    use crate::gl::{AddedSugar, SugarSpeed, SugarUnit};
    use crate::meals::repo::MemoryMealStore;
    use crate::meals::services::tests::{new_meal, FlakyStore, SlowStore};
    use crate::meals::MealStore;
    use crate::storage::MemoryStorage;
    use bytes::Bytes;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    fn idli() -> Value {
        json!({
            "foodName": "Idli",
            "glycemicLoad": 6,
            "sugarSpeed": "Slow",
            "energyStability": "Stable",
            "nutritionalInfo": { "carbs": 8, "calories": 120 }
        })
    }

    fn text(name: &str, context: &str) -> TextInput {
        TextInput {
            name: name.into(),
            description: String::new(),
            context: context.into(),
            added_sugar: None,
            date: None,
        }
    }

    struct Harness {
        manager: PendingActionManager,
        meals: Arc<MealRepository>,
        provider: Arc<StubProvider>,
        storage: Arc<MemoryStorage>,
        events: broadcast::Receiver<ActionEvent>,
        user: Uuid,
    }

    fn harness_with(provider: StubProvider, store: Arc<dyn MealStore>) -> Harness {
        let provider = Arc::new(provider);
        let analysis = Arc::new(AnalysisService::new(provider.clone(), Duration::from_secs(30)));
        let meals = Arc::new(MealRepository::new(store));
        let storage = Arc::new(MemoryStorage::default());
        let manager = PendingActionManager::new(analysis, meals.clone(), storage.clone(), PipelineConfig::default());
        let events = manager.subscribe();
        Harness {
            manager,
            meals,
            provider,
            storage,
            events,
            user: Uuid::new_v4(),
        }
    }

    fn harness(provider: StubProvider) -> Harness {
        harness_with(provider, Arc::new(MemoryMealStore::new()))
    }

    /// A scan whose photo is already in the bucket.
    async fn stored_photo(h: &Harness, key: &str) -> ImageRef {
        let bytes = Bytes::from_static(b"\xff\xd8jpeg");
        h.storage.put_object(key, bytes.clone(), "image/jpeg").await.unwrap();
        ImageRef { key: Some(key.into()), bytes }
    }

    /// Collect events of `id` up to and including its retirement.
    async fn run_to_retirement(rx: &mut broadcast::Receiver<ActionEvent>, id: Uuid) -> Vec<ActionEvent> {
        let mut seen = Vec::new();
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.action_id() != id {
                continue;
            }
            let done = matches!(ev, ActionEvent::Retired { .. });
            seen.push(ev);
            if done {
                return seen;
            }
        }
    }

    fn stages(events: &[ActionEvent]) -> Vec<ActionStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                ActionEvent::Stage { status, .. } => Some(*status),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn text_analysis_creates_meal_and_retires() {
        let mut h = harness(StubProvider::ok(idli()));
        let id = h.manager.start_text_analysis(h.user, text("Idli", "2 pieces")).unwrap();
        assert_eq!(h.manager.list(h.user)[0].id, id);

        let events = run_to_retirement(&mut h.events, id).await;
        assert!(events.iter().any(|e| matches!(e, ActionEvent::Completed { .. })));
        assert!(!events.iter().any(|e| matches!(e, ActionEvent::Failed { .. })));

        let meals = h.meals.list(h.user).await.unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].name, "Idli");
        assert_eq!(meals[0].gl, 6);
        assert_eq!(meals[0].sugar_speed, SugarSpeed::Slow);
        assert!(h.manager.list(h.user).is_empty());

        let request = &h.provider.requests.lock().unwrap()[0];
        assert_eq!(request.context.as_deref(), Some("2 pieces"));
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failure_is_visible_then_retired() {
        let mut h = harness(StubProvider::failing("quota exceeded"));
        let id = h.manager.start_text_analysis(h.user, text("Idli", "")).unwrap();

        loop {
            if let ActionEvent::Failed { id: failed, error } = h.events.recv().await.unwrap() {
                assert_eq!(failed, id);
                assert!(error.contains("quota exceeded"));
                break;
            }
        }
        let shown = h.manager.get(id).unwrap();
        assert_eq!(shown.status, ActionStatus::Failed);
        assert_eq!(shown.progress, 0);
        assert!(shown.error.is_some());
        assert_eq!(
            shown.history,
            vec![ActionStatus::Uploading, ActionStatus::Analyzing, ActionStatus::Failed]
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(h.manager.get(id).is_none());
        assert!(h.meals.list(h.user).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fast_result_suppresses_cosmetic_stages() {
        let mut h = harness(StubProvider::with(Ok(idli()), Duration::from_millis(500)));
        let id = h.manager.start_text_analysis(h.user, text("Idli", "")).unwrap();

        let events = run_to_retirement(&mut h.events, id).await;
        assert_eq!(stages(&events), vec![ActionStatus::Analyzing, ActionStatus::Finalizing]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(matches!(h.events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_result_shows_every_stage_in_order() {
        let mut h = harness(StubProvider::with(Ok(idli()), Duration::from_secs(6)));
        let id = h.manager.start_text_analysis(h.user, text("Idli", "")).unwrap();

        let events = run_to_retirement(&mut h.events, id).await;
        assert_eq!(
            stages(&events),
            vec![
                ActionStatus::Analyzing,
                ActionStatus::Separating,
                ActionStatus::Calculating,
                ActionStatus::Finalizing,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_after_cosmetic_stage_records_no_later_stage() {
        let mut h = harness(StubProvider::with(Err("timeout upstream".into()), Duration::from_secs(3)));
        let id = h.manager.start_text_analysis(h.user, text("Idli", "")).unwrap();

        let events = run_to_retirement(&mut h.events, id).await;
        assert_eq!(
            stages(&events),
            vec![ActionStatus::Analyzing, ActionStatus::Separating, ActionStatus::Failed]
        );
        assert!(h.meals.list(h.user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_creates_no_action() {
        let h = harness(StubProvider::ok(idli()));
        assert_eq!(
            h.manager.start_text_analysis(h.user, text("   ", "")),
            Err(ValidationError::EmptyName)
        );

        let mut with_sugar = text("Chai", "");
        with_sugar.added_sugar = Some(AddedSugar {
            amount: 1.0,
            unit: SugarUnit::Spoon,
            type_id: "maple".into(),
        });
        assert!(h.manager.start_text_analysis(h.user, with_sugar).is_err());

        let empty = ImageRef { key: None, bytes: Bytes::new() };
        assert_eq!(
            h.manager.start_scan(h.user, empty, None),
            Err(ValidationError::InvalidImage)
        );

        let prev = crate::analysis::normalize(&idli());
        assert_eq!(
            h.manager.start_refinement(h.user, Uuid::new_v4(), None, prev, "  "),
            Err(ValidationError::EmptyFeedback)
        );

        assert!(h.manager.list(h.user).is_empty());
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_action_never_writes() {
        let h = harness(StubProvider::with(Ok(idli()), Duration::from_secs(5)));
        let id = h.manager.start_text_analysis(h.user, text("Idli", "")).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.manager.cancel(id), Ok(()));
        assert_eq!(h.manager.cancel(id), Err(CancelError::NotFound));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(h.provider.calls(), 1);
        assert!(h.meals.list(h.user).await.unwrap().is_empty());
        assert!(h.manager.list(h.user).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_every_job() {
        let h = harness(StubProvider::with(Ok(idli()), Duration::from_secs(5)));
        h.manager.start_text_analysis(h.user, text("Idli", "")).unwrap();
        h.manager.start_text_analysis(h.user, text("Dosa", "")).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        h.manager.shutdown();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.meals.list(h.user).await.unwrap().is_empty());
        assert!(h.manager.list(h.user).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_actions_complete_independently() {
        let mut h = harness(StubProvider::with(Ok(idli()), Duration::from_secs(1)));
        let a = h.manager.start_text_analysis(h.user, text("Idli", "")).unwrap();
        let b = h.manager.start_text_analysis(h.user, text("Idli", "3 pieces")).unwrap();
        assert_ne!(a, b);
        assert_eq!(h.manager.list(h.user).len(), 2);

        let mut retired = 0;
        while retired < 2 {
            if let ActionEvent::Retired { .. } = h.events.recv().await.unwrap() {
                retired += 1;
            }
        }
        assert_eq!(h.meals.list(h.user).await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn added_sugar_raises_stored_gl() {
        let mut h = harness(StubProvider::ok(idli()));
        let mut input = text("Idli", "");
        input.added_sugar = Some(AddedSugar {
            amount: 2.0,
            unit: SugarUnit::Spoon,
            type_id: "white_sugar".into(),
        });
        let id = h.manager.start_text_analysis(h.user, input).unwrap();
        run_to_retirement(&mut h.events, id).await;

        let meal = &h.meals.list(h.user).await.unwrap()[0];
        // 6 + 8 g * 65 / 100
        assert_eq!(meal.gl, 11);
        assert_eq!(meal.sugar_speed, SugarSpeed::Moderate);
        assert!(meal.added_sugar.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn backdated_text_lands_on_requested_day() {
        let mut h = harness(StubProvider::ok(idli()));
        let day = time::macros::date!(2024 - 03 - 05);
        let mut input = text("Idli", "");
        input.date = Some(day);
        let id = h.manager.start_text_analysis(h.user, input).unwrap();
        assert_eq!(h.manager.pending_for_date(h.user, day), 1);

        run_to_retirement(&mut h.events, id).await;
        assert_eq!(h.meals.list(h.user).await.unwrap()[0].timestamp.date(), day);
        assert_eq!(h.manager.pending_for_date(h.user, day), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ghost_write_fails_the_action() {
        let mut h = harness_with(StubProvider::ok(idli()), Arc::new(FlakyStore::losing_inserts()));
        let id = h.manager.start_text_analysis(h.user, text("Idli", "")).unwrap();

        let events = run_to_retirement(&mut h.events, id).await;
        assert!(!events.iter().any(|e| matches!(e, ActionEvent::Completed { .. })));
        let failed = events.iter().find_map(|e| match e {
            ActionEvent::Failed { error, .. } => Some(error.clone()),
            _ => None,
        });
        assert!(failed.unwrap().contains("cannot be read back"));
        assert_eq!(stages(&events).last(), Some(&ActionStatus::Failed));
        assert!(h.meals.list(h.user).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refinement_updates_existing_meal() {
        let refined = json!({ "foodName": "Rava Idli", "glycemicLoad": 12 });
        let mut h = harness(StubProvider::ok(refined));
        let meal = h.meals.create(h.user, new_meal("Idli", 6)).await.unwrap();
        let prev = crate::analysis::normalize(&idli());

        let id = h
            .manager
            .start_refinement(h.user, meal.id, None, prev, "it was rava idli")
            .unwrap();
        let action = h.manager.get(id).unwrap();
        assert_eq!(action.meal_id, Some(meal.id));
        assert_eq!(action.target_date, None);

        run_to_retirement(&mut h.events, id).await;
        let meals = h.meals.list(h.user).await.unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].name, "Rava Idli");
        assert_eq!(meals[0].gl, 12);
        assert_eq!(meals[0].sugar_speed, SugarSpeed::Moderate);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_keeps_image_key() {
        let mut h = harness(StubProvider::ok(idli()));
        let image = ImageRef {
            key: Some("meals/abc.jpg".into()),
            bytes: Bytes::from_static(b"\xff\xd8jpeg"),
        };
        let id = h.manager.start_scan(h.user, image, None).unwrap();
        run_to_retirement(&mut h.events, id).await;

        let meal = &h.meals.list(h.user).await.unwrap()[0];
        assert_eq!(meal.image_uri.as_deref(), Some("meals/abc.jpg"));
        assert!(meal.analysis_result.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn saving_action_cannot_be_cancelled() {
        let mut h = harness_with(StubProvider::ok(idli()), Arc::new(SlowStore::new(Duration::from_secs(2))));
        let id = h.manager.start_text_analysis(h.user, text("Idli", "")).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.manager.get(id).unwrap().status, ActionStatus::Finalizing);
        assert_eq!(h.manager.cancel(id), Err(CancelError::Saving));

        let events = run_to_retirement(&mut h.events, id).await;
        let n = events.len();
        assert!(matches!(events[n - 2], ActionEvent::Completed { .. }));
        assert!(matches!(events[n - 1], ActionEvent::Retired { .. }));
        assert_eq!(h.meals.list(h.user).await.unwrap().len(), 1);
        assert!(matches!(h.events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_saving_sends_no_completion() {
        let mut h = harness_with(StubProvider::ok(idli()), Arc::new(SlowStore::new(Duration::from_secs(2))));
        let id = h.manager.start_text_analysis(h.user, text("Idli", "")).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        h.manager.shutdown();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let mut after = Vec::new();
        while let Ok(ev) = h.events.try_recv() {
            if ev.action_id() == id {
                after.push(ev);
            }
        }
        assert!(!after.iter().any(|e| matches!(e, ActionEvent::Completed { .. } | ActionEvent::Retired { .. })));
        assert!(h.manager.get(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_scan_deletes_its_photo() {
        let mut h = harness(StubProvider::failing("no food found"));
        let image = stored_photo(&h, "meals/failed.jpg").await;
        let id = h.manager.start_scan(h.user, image, None).unwrap();

        run_to_retirement(&mut h.events, id).await;
        assert!(h.storage.get_object("meals/failed.jpg").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_scan_deletes_its_photo() {
        let h = harness(StubProvider::with(Ok(idli()), Duration::from_secs(5)));
        let image = stored_photo(&h, "meals/cancelled.jpg").await;
        let id = h.manager.start_scan(h.user, image, None).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        h.manager.cancel(id).unwrap();
        assert!(h.storage.get_object("meals/cancelled.jpg").await.is_ok());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.storage.get_object("meals/cancelled.jpg").await.is_err());
        assert!(h.meals.list(h.user).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn completed_scan_keeps_its_photo() {
        let mut h = harness(StubProvider::ok(idli()));
        let image = stored_photo(&h, "meals/kept.jpg").await;
        let id = h.manager.start_scan(h.user, image, None).unwrap();

        run_to_retirement(&mut h.events, id).await;
        assert!(h.storage.get_object("meals/kept.jpg").await.is_ok());
    }
}
