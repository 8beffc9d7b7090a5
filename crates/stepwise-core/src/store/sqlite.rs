//! SQLite-backed [`PlanStore`].
//!
//! The schema is initialized once by [`SqlitePlanStore::open`]. After that
//! each call opens its own lightweight connection on a blocking thread, so
//! the store is cheap to clone and safe to share between dispatchers.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use tokio::task;

use super::{PlanStore, SessionDeletion};
use crate::{
    db::Database,
    error::{EngineError, Result},
    models::{Message, NewMessage, NewPlan, Plan, Step},
};

#[derive(Debug, Clone)]
pub struct SqlitePlanStore {
    db_path: PathBuf,
}

impl SqlitePlanStore {
    /// Creates the store, its parent directory and the schema.
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| EngineError::FileSystem {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let path = db_path.clone();
        task::spawn_blocking(move || Database::new(&path).map(drop))
            .await
            .map_err(EngineError::join)??;
        Ok(Self { db_path })
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    /// Runs `f` against a fresh connection on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || {
            let mut db = Database::connect(&db_path)?;
            f(&mut db)
        })
        .await
        .map_err(EngineError::join)?
    }
}

#[async_trait]
impl PlanStore for SqlitePlanStore {
    async fn save_plan(&self, plan: &NewPlan) -> Result<Plan> {
        let plan = plan.clone();
        self.with_db(move |db| db.insert_plan(&plan)).await
    }

    async fn update_plan(&self, plan: &Plan) -> Result<Plan> {
        let plan = plan.clone();
        self.with_db(move |db| db.update_plan(&plan)).await
    }

    async fn get_plan(&self, session_id: &str, plan_id: u64) -> Result<Option<Plan>> {
        let session_id = session_id.to_string();
        self.with_db(move |db| db.get_plan(&session_id, plan_id))
            .await
    }

    async fn save_step(&self, step: &Step) -> Result<Step> {
        let step = step.clone();
        self.with_db(move |db| db.save_step(&step)).await
    }

    async fn save_steps(&self, steps: &[Step]) -> Result<Vec<Step>> {
        let steps = steps.to_vec();
        self.with_db(move |db| db.save_steps(&steps)).await
    }

    async fn claim_step(&self, session_id: &str, step_id: u64) -> Result<Option<Step>> {
        let session_id = session_id.to_string();
        self.with_db(move |db| db.claim_step(&session_id, step_id))
            .await
    }

    async fn get_step(&self, session_id: &str, step_id: u64) -> Result<Option<Step>> {
        let session_id = session_id.to_string();
        self.with_db(move |db| db.get_step(&session_id, step_id))
            .await
    }

    async fn get_steps_by_plan(&self, plan_id: u64, session_id: &str) -> Result<Vec<Step>> {
        let session_id = session_id.to_string();
        self.with_db(move |db| db.get_steps_by_plan(plan_id, &session_id))
            .await
    }

    async fn append_message(&self, message: &NewMessage) -> Result<Message> {
        let message = message.clone();
        self.with_db(move |db| db.append_message(&message)).await
    }

    async fn get_messages(&self, session_id: &str, plan_id: Option<u64>) -> Result<Vec<Message>> {
        let session_id = session_id.to_string();
        self.with_db(move |db| db.get_messages(&session_id, plan_id))
            .await
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        plan_id: u64,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let session_id = session_id.to_string();
        self.with_db(move |db| db.recent_messages(&session_id, plan_id, limit))
            .await
    }

    async fn request_cancel(&self, session_id: &str, plan_id: u64) -> Result<()> {
        let session_id = session_id.to_string();
        self.with_db(move |db| db.request_cancel(&session_id, plan_id))
            .await
    }

    async fn delete_session(&self, session_id: &str) -> Result<SessionDeletion> {
        let session_id = session_id.to_string();
        self.with_db(move |db| db.delete_session(&session_id)).await
    }

    async fn acquire_lease(&self, plan_id: u64, owner: &str, ttl: Duration) -> Result<bool> {
        let owner = owner.to_string();
        self.with_db(move |db| db.acquire_lease(plan_id, &owner, ttl))
            .await
    }

    async fn release_lease(&self, plan_id: u64, owner: &str) -> Result<()> {
        let owner = owner.to_string();
        self.with_db(move |db| db.release_lease(plan_id, &owner))
            .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::{DraftStep, PlanStatus, StepStatus};

    async fn open_store() -> (SqlitePlanStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqlitePlanStore::open(temp_dir.path().join("nested/stepwise.db"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    fn new_plan(session: &str) -> NewPlan {
        NewPlan {
            session_id: session.into(),
            user_id: "u1".into(),
            objective: "Analyze AAPL".into(),
            file_refs: vec!["portfolio.csv".into()],
            fail_fast: false,
            steps: vec![
                DraftStep::new("Resolve ticker", "company"),
                DraftStep::new("Pull fundamentals", "fundamentals").after([0]),
                DraftStep::new("Summarize", "summarizer").after([0, 1]),
            ],
        }
    }

    #[tokio::test]
    async fn test_save_plan_maps_dependencies_to_ids() {
        let (store, _dir) = open_store().await;
        let plan = store.save_plan(&new_plan("s1")).await.unwrap();
        assert_eq!(plan.status, PlanStatus::PendingApproval);
        assert_eq!(plan.steps.len(), 3);
        let ids = plan.step_ids();
        assert_eq!(plan.steps[2].dependencies, vec![ids[0], ids[1]]);

        let loaded = store.get_plan("s1", plan.id).await.unwrap().unwrap();
        assert_eq!(loaded.steps, plan.steps);
        assert_eq!(loaded.file_refs, vec!["portfolio.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_cycle_writes_nothing() {
        let (store, _dir) = open_store().await;
        let mut plan = new_plan("s1");
        plan.steps[0].depends_on = vec![2];
        assert!(matches!(
            store.save_plan(&plan).await,
            Err(EngineError::DependencyCycle { step: 0, dependency: 2 })
        ));
        assert!(store.get_messages("s1", None).await.unwrap().is_empty());
        assert!(store.get_plan("s1", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_session_cannot_see_plan() {
        let (store, _dir) = open_store().await;
        let plan = store.save_plan(&new_plan("s1")).await.unwrap();
        assert!(store.get_plan("s2", plan.id).await.unwrap().is_none());
        assert!(store.get_step("s2", plan.steps[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_step_version_conflicts() {
        let (store, _dir) = open_store().await;
        let plan = store.save_plan(&new_plan("s1")).await.unwrap();
        let mut first = plan.steps[0].clone();
        first.status = StepStatus::Approved;
        let saved = store.save_step(&first).await.unwrap();
        assert_eq!(saved.version, 1);

        // Writing from the stale copy must fail and leave the row alone
        first.status = StepStatus::Rejected;
        assert!(matches!(
            store.save_step(&first).await,
            Err(EngineError::PersistenceConflict { entity: "step", expected: 0, .. })
        ));
        let current = store.get_step("s1", first.id).await.unwrap().unwrap();
        assert_eq!(current.status, StepStatus::Approved);
    }

    #[tokio::test]
    async fn test_claim_requires_approval_and_dependencies() {
        let (store, _dir) = open_store().await;
        let plan = store.save_plan(&new_plan("s1")).await.unwrap();
        let ids = plan.step_ids();

        assert!(store.claim_step("s1", ids[0]).await.unwrap().is_none());

        let mut approved: Vec<Step> = plan.steps.clone();
        for step in &mut approved {
            step.status = StepStatus::Approved;
        }
        store.save_steps(&approved).await.unwrap();

        assert!(store.claim_step("s1", ids[1]).await.unwrap().is_none());
        let claimed = store.claim_step("s1", ids[0]).await.unwrap().unwrap();
        assert_eq!(claimed.status, StepStatus::Executing);
        assert!(claimed.started_at.is_some());
        assert!(store.claim_step("s1", ids[0]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lease_excludes_other_owners_until_released() {
        let (store, _dir) = open_store().await;
        let plan = store.save_plan(&new_plan("s1")).await.unwrap();
        let ttl = Duration::from_secs(60);
        assert!(store.acquire_lease(plan.id, "a", ttl).await.unwrap());
        assert!(store.acquire_lease(plan.id, "a", ttl).await.unwrap());
        assert!(!store.acquire_lease(plan.id, "b", ttl).await.unwrap());
        store.release_lease(plan.id, "a").await.unwrap();
        assert!(store.acquire_lease(plan.id, "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let (store, _dir) = open_store().await;
        let plan = store.save_plan(&new_plan("s1")).await.unwrap();
        assert!(store.acquire_lease(plan.id, "a", Duration::ZERO).await.unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.acquire_lease(plan.id, "b", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_recent_messages_window() {
        let (store, _dir) = open_store().await;
        let plan = store.save_plan(&new_plan("s1")).await.unwrap();
        for i in 0..5 {
            store
                .append_message(&NewMessage::system("s1", plan.id, format!("event {i}")))
                .await
                .unwrap();
        }
        let recent = store.recent_messages("s1", plan.id, 2).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["event 3", "event 4"]);
    }
}
