// server/src/cli/app.rs

// Wires the configured store, identity provider and clock into the planner services.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use tracing::info;

use planner::assignment::VisitAssigner;
use planner::config::PlannerConfig;
use planner::context::{Clock, RequestContext, SystemClock};
use planner::identity::InMemoryIdentityProvider;
use planner::notifications::{LoggingNotifier, PushProvider};
use planner::risk::RiskScorer;
use planner::scheduling::{ReminderProcessor, VisitScheduler};
use planner::storage_engine::{create_storage, StorageHandles};

pub struct PlannerApp {
    pub config: PlannerConfig,
    pub local_offset: FixedOffset,
    pub scheduler: VisitScheduler,
    pub assigner: VisitAssigner,
    pub risk: RiskScorer,
    pub reminders: ReminderProcessor,
}

impl PlannerApp {
    pub async fn build(config: PlannerConfig) -> Result<Self> {
        Self::build_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn build_with_clock(config: PlannerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let StorageHandles { store, snapshot, .. } = create_storage(&config.storage)
            .await
            .context("Failed to initialize storage")?;
        let identity = match &snapshot {
            Some(snapshot) => InMemoryIdentityProvider::with_users(snapshot.users.clone()).await,
            None => InMemoryIdentityProvider::new(),
        };
        let identity = Arc::new(identity);
        let notifier = Arc::new(LoggingNotifier::new(PushProvider::Expo));
        let scheduling = config.scheduling.clone();
        let local_offset = scheduling.local_offset()?;

        let scheduler = VisitScheduler::new(store.clone(), clock.clone(), scheduling.clone())?;
        let assigner = VisitAssigner::new(store.clone(), identity, clock.clone(), scheduling.clone())?;
        let risk = RiskScorer::new(store.clone(), clock.clone());
        let reminders = ReminderProcessor::new(store, notifier, clock, &scheduling);
        info!("Planner services ready (storage engine: {})", config.storage.engine_type);

        Ok(PlannerApp {
            config,
            local_offset,
            scheduler,
            assigner,
            risk,
            reminders,
        })
    }

    /// A fresh context bounded by the configured request timeout.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.config.request_timeout())
    }
}
