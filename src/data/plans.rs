//! Plan storage with cached reads
//!
//! Plans are read through the response cache. Every mutation drops the
//! plan's own entry and every cached plan list of the affected owner, so the
//! next read goes back to the document store.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::fetch;
use super::store::{DataError, Direction, DocumentStore, FilterOp, Query};
use super::{
    InspiredPlan, ItemType, ItineraryItem, Page, Plan, PlanDraft, PlanUpdate, DEFAULT_PAGE_SIZE,
};
use crate::cache::{query_key, query_options, record_key, ResourceKind, ResponseCache};

/// Collection plans are stored in
const PLANS_COLLECTION: &str = "plans";

/// Title given to plans assembled by the "inspire me" flow
const INSPIRED_PLAN_TITLE: &str = "Inspired Date Plan";

/// Options for listing a user's plans
///
/// Serialized (camelCase, `None` fields omitted) into the cache key, so the
/// key for the first page of a user's plans is `plans:{"userId":"<id>"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlansQuery {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_after: Option<String>,
}

impl PlansQuery {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }
}

/// Reads and writes plans
#[derive(Clone)]
pub struct PlansService {
    docs: Arc<dyn DocumentStore>,
    cache: Arc<ResponseCache>,
}

impl PlansService {
    pub fn new(docs: Arc<dyn DocumentStore>, cache: Arc<ResponseCache>) -> Self {
        Self { docs, cache }
    }

    /// Fetches a plan by id
    pub async fn get_plan(&self, id: &str) -> Result<Option<Plan>, DataError> {
        fetch::record(
            self.docs.as_ref(),
            &self.cache,
            ResourceKind::Plan,
            PLANS_COLLECTION,
            id,
        )
        .await
    }

    /// Lists a user's plans, newest date first
    pub async fn get_plans(&self, options: &PlansQuery) -> Result<Page<Plan>, DataError> {
        let query = Query::new()
            .filter("userId", FilterOp::Eq, options.user_id.as_str())
            .order_by("date", Direction::Desc)
            .limit(options.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .start_after(options.start_after.clone());

        fetch::page(
            self.docs.as_ref(),
            &self.cache,
            ResourceKind::Plans,
            PLANS_COLLECTION,
            options,
            query,
        )
        .await
    }

    /// Stores a new plan and returns it with its generated id
    pub async fn create_plan(&self, draft: PlanDraft) -> Result<Plan, DataError> {
        let data = serde_json::to_value(&draft)?;
        let id = self.docs.add(PLANS_COLLECTION, data).await?;
        info!(id = %id, user_id = %draft.user_id, "Plan created");

        self.invalidate_user_plans(&draft.user_id).await;
        Ok(draft.into_plan(id))
    }

    /// Applies a partial update to a plan
    pub async fn update_plan(&self, id: &str, update: &PlanUpdate) -> Result<(), DataError> {
        let owner = self
            .docs
            .get(PLANS_COLLECTION, id)
            .await?
            .and_then(|data| data.get("userId").and_then(Value::as_str).map(str::to_string));

        let patch = serde_json::to_value(update)?;
        self.docs.update(PLANS_COLLECTION, id, patch).await?;
        info!(id, "Plan updated");

        self.cache.invalidate(&record_key(ResourceKind::Plan, id)).await;
        if let Some(owner) = owner {
            self.invalidate_user_plans(&owner).await;
        }
        if let Some(new_owner) = &update.user_id {
            self.invalidate_user_plans(new_owner).await;
        }
        Ok(())
    }

    /// Deletes a plan owned by `user_id`
    pub async fn delete_plan(&self, id: &str, user_id: &str) -> Result<(), DataError> {
        self.docs.delete(PLANS_COLLECTION, id).await?;
        info!(id, user_id, "Plan deleted");

        self.cache.invalidate(&record_key(ResourceKind::Plan, id)).await;
        self.invalidate_user_plans(user_id).await;
        Ok(())
    }

    /// Turns inspired picks into a plan dated today
    pub async fn save_inspired_plan(
        &self,
        user_id: &str,
        picks: &InspiredPlan,
    ) -> Result<Plan, DataError> {
        let mut itinerary = Vec::new();
        if let Some(pick) = &picks.restaurant {
            itinerary.push(ItineraryItem {
                item_type: ItemType::Restaurant,
                item_id: pick.id.clone(),
                notes: Some(format!("Dinner at {}", pick.name)),
            });
        }
        if let Some(pick) = &picks.event {
            itinerary.push(ItineraryItem {
                item_type: ItemType::Event,
                item_id: pick.id.clone(),
                notes: Some(format!("Attend {}", pick.name)),
            });
        }
        if let Some(pick) = &picks.lodge {
            itinerary.push(ItineraryItem {
                item_type: ItemType::Lodge,
                item_id: pick.id.clone(),
                notes: Some(format!("Stay at {}", pick.name)),
            });
        }

        self.create_plan(PlanDraft {
            user_id: user_id.to_string(),
            title: INSPIRED_PLAN_TITLE.to_string(),
            date: Local::now().date_naive(),
            time: None,
            notes: None,
            vibe: None,
            budget: None,
            itinerary,
        })
        .await
    }

    /// Drops every cached plan list belonging to `user_id`
    async fn invalidate_user_plans(&self, user_id: &str) {
        // The first-page key may not be loaded into memory yet
        self.cache
            .invalidate(&query_key(ResourceKind::Plans, &PlansQuery::for_user(user_id)))
            .await;

        let removed = self
            .cache
            .invalidate_matching(|key| {
                query_options(key, ResourceKind::Plans)
                    .is_some_and(|options| options.get("userId").and_then(Value::as_str) == Some(user_id))
            })
            .await;
        debug!(user_id, removed, "Plan lists invalidated");
    }
}
