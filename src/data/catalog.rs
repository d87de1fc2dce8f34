//! Restaurants, events and lodges with cached reads
//!
//! The catalog is read-only from the app's point of view, so entries are only
//! ever dropped by TTL expiry.

use chrono::Local;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::fetch;
use super::store::{DataError, Direction, DocumentStore, FilterOp, Query};
use super::{Event, ItemType, ItineraryItem, Lodge, Page, Plan, Restaurant, DEFAULT_PAGE_SIZE};
use crate::cache::{ResourceKind, ResponseCache};

const RESTAURANTS_COLLECTION: &str = "restaurants";
const EVENTS_COLLECTION: &str = "events";
const LODGES_COLLECTION: &str = "lodges";

/// Lower-cased text field the prefix search runs against
const SEARCH_FIELD: &str = "searchableText";

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_range: Option<String>,
    /// Matches restaurants carrying any of these tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Only events dated today or later
    #[serde(default, skip_serializing_if = "is_false")]
    pub future_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LodgeQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_after: Option<String>,
    /// Inclusive lower bound on the nightly price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    /// Inclusive upper bound on the nightly price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amenities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
}

/// An itinerary item together with the record it points at
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedItem {
    Restaurant(Restaurant),
    Event(Event),
    Lodge(Lodge),
    /// The referenced record no longer exists
    Missing(ItineraryItem),
}

/// Reads restaurants, events and lodges
#[derive(Clone)]
pub struct CatalogService {
    docs: Arc<dyn DocumentStore>,
    cache: Arc<ResponseCache>,
}

impl CatalogService {
    pub fn new(docs: Arc<dyn DocumentStore>, cache: Arc<ResponseCache>) -> Self {
        Self { docs, cache }
    }

    pub async fn get_restaurant(&self, id: &str) -> Result<Option<Restaurant>, DataError> {
        fetch::record(
            self.docs.as_ref(),
            &self.cache,
            ResourceKind::Restaurant,
            RESTAURANTS_COLLECTION,
            id,
        )
        .await
    }

    /// Lists restaurants, best rated first
    pub async fn get_restaurants(
        &self,
        options: &RestaurantQuery,
    ) -> Result<Page<Restaurant>, DataError> {
        let mut query = Query::new();
        if let Some(cuisine) = &options.cuisine {
            query = query.filter("cuisine", FilterOp::Eq, cuisine.as_str());
        }
        if let Some(price_range) = &options.price_range {
            query = query.filter("priceRange", FilterOp::Eq, price_range.as_str());
        }
        if !options.tags.is_empty() {
            query = query.filter("tags", FilterOp::ArrayContainsAny, options.tags.clone());
        }
        if let Some(text) = &options.search_text {
            query = query.prefix(SEARCH_FIELD, text);
        }
        let query = query
            .order_by("rating", Direction::Desc)
            .limit(options.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .start_after(options.start_after.clone());

        fetch::page(
            self.docs.as_ref(),
            &self.cache,
            ResourceKind::Restaurants,
            RESTAURANTS_COLLECTION,
            options,
            query,
        )
        .await
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<Event>, DataError> {
        fetch::record(
            self.docs.as_ref(),
            &self.cache,
            ResourceKind::Event,
            EVENTS_COLLECTION,
            id,
        )
        .await
    }

    /// Lists events, soonest first
    pub async fn get_events(&self, options: &EventQuery) -> Result<Page<Event>, DataError> {
        let mut query = Query::new();
        if let Some(category) = &options.category {
            query = query.filter("category", FilterOp::Eq, category.as_str());
        }
        if !options.tags.is_empty() {
            query = query.filter("tags", FilterOp::ArrayContainsAny, options.tags.clone());
        }
        if options.future_only {
            let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
            query = query.filter("date", FilterOp::Gte, today);
        }
        if let Some(text) = &options.search_text {
            query = query.prefix(SEARCH_FIELD, text);
        }
        let query = query
            .order_by("date", Direction::Asc)
            .limit(options.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .start_after(options.start_after.clone());

        fetch::page(
            self.docs.as_ref(),
            &self.cache,
            ResourceKind::Events,
            EVENTS_COLLECTION,
            options,
            query,
        )
        .await
    }

    pub async fn get_lodge(&self, id: &str) -> Result<Option<Lodge>, DataError> {
        fetch::record(
            self.docs.as_ref(),
            &self.cache,
            ResourceKind::Lodge,
            LODGES_COLLECTION,
            id,
        )
        .await
    }

    /// Lists lodges, best rated first
    pub async fn get_lodges(&self, options: &LodgeQuery) -> Result<Page<Lodge>, DataError> {
        let mut query = Query::new();
        if let Some(min) = options.min_price {
            query = query.filter("pricePerNight", FilterOp::Gte, min);
        }
        if let Some(max) = options.max_price {
            query = query.filter("pricePerNight", FilterOp::Lte, max);
        }
        if !options.amenities.is_empty() {
            query = query.filter(
                "amenities",
                FilterOp::ArrayContainsAny,
                options.amenities.clone(),
            );
        }
        if !options.tags.is_empty() {
            query = query.filter("tags", FilterOp::ArrayContainsAny, options.tags.clone());
        }
        if let Some(text) = &options.search_text {
            query = query.prefix(SEARCH_FIELD, text);
        }
        let query = query
            .order_by("rating", Direction::Desc)
            .limit(options.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .start_after(options.start_after.clone());

        fetch::page(
            self.docs.as_ref(),
            &self.cache,
            ResourceKind::Lodges,
            LODGES_COLLECTION,
            options,
            query,
        )
        .await
    }

    /// Fetches every record a plan's itinerary points at, in itinerary order
    ///
    /// Items are fetched concurrently. The first store error fails the whole
    /// call; records that no longer exist come back as [`ResolvedItem::Missing`].
    pub async fn resolve_itinerary(&self, plan: &Plan) -> Result<Vec<ResolvedItem>, DataError> {
        let lookups = plan.itinerary.iter().map(|item| self.resolve_item(item));
        let resolved = join_all(lookups).await;
        debug!(plan_id = %plan.id, items = resolved.len(), "Itinerary resolved");
        resolved.into_iter().collect()
    }

    async fn resolve_item(&self, item: &ItineraryItem) -> Result<ResolvedItem, DataError> {
        let resolved = match item.item_type {
            ItemType::Restaurant => self
                .get_restaurant(&item.item_id)
                .await?
                .map(ResolvedItem::Restaurant),
            ItemType::Event => self.get_event(&item.item_id).await?.map(ResolvedItem::Event),
            ItemType::Lodge => self.get_lodge(&item.item_id).await?.map(ResolvedItem::Lodge),
        };
        Ok(resolved.unwrap_or_else(|| ResolvedItem::Missing(item.clone())))
    }
}
