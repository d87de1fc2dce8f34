//! Data models and data-access services for Datescape
//!
//! This module contains the records users browse (restaurants, events,
//! lodges), the plans they assemble from them, and the services that fetch
//! those records from a [`DocumentStore`] through the shared
//! [`ResponseCache`](crate::cache::ResponseCache).

pub mod catalog;
mod fetch;
pub mod memory;
pub mod plans;
pub mod store;

pub use catalog::{CatalogService, EventQuery, LodgeQuery, ResolvedItem, RestaurantQuery};
pub use memory::MemoryDocumentStore;
pub use plans::{PlansQuery, PlansService};
pub use store::{DataError, Direction, Document, DocumentStore, Filter, FilterOp, Query};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of records returned per page when a query does not set a limit
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Geographic location of a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

/// Kind of record an itinerary item points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Event,
    Restaurant,
    Lodge,
}

/// One stop of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryItem {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A dated itinerary owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(default)]
    pub itinerary: Vec<ItineraryItem>,
}

/// A plan that has not been stored yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDraft {
    pub user_id: String,
    pub title: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(default)]
    pub itinerary: Vec<ItineraryItem>,
}

impl PlanDraft {
    fn into_plan(self, id: String) -> Plan {
        Plan {
            id,
            user_id: self.user_id,
            title: self.title,
            date: self.date,
            time: self.time,
            notes: self.notes,
            vibe: self.vibe,
            budget: self.budget,
            itinerary: self.itinerary,
        }
    }
}

/// Partial update to a stored plan; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub itinerary: Option<Vec<ItineraryItem>>,
}

/// A record picked by the "inspire me" flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspiredPick {
    pub id: String,
    pub name: String,
}

/// Restaurant, event and lodge picks to turn into a plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspiredPlan {
    pub restaurant: Option<InspiredPick>,
    pub event: Option<InspiredPick>,
    pub lodge: Option<InspiredPick>,
}

/// A dish on a restaurant menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub description: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    pub rating: f64,
    pub reviews: u32,
    pub price_range: String,
    pub cuisine: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub location: Location,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub vibes: Vec<String>,
    /// Menu sections, keyed by section name
    #[serde(default)]
    pub menu: BTreeMap<String, Vec<MenuItem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub price: f64,
    pub image: String,
    pub location: Location,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A bookable room configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomType {
    pub name: String,
    pub description: String,
    pub price_per_night: f64,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lodge {
    pub id: String,
    pub name: String,
    pub rating: f64,
    pub reviews: u32,
    pub price_per_night: f64,
    #[serde(default)]
    pub images: Vec<String>,
    pub location: Location,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub room_types: Vec<RoomType>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One page of a query result
///
/// `last_id` is the id of the last record on the page; pass it back as the
/// query's `start_after` to fetch the next page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_id: Option<String>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            last_id: None,
            has_more: false,
        }
    }
}
