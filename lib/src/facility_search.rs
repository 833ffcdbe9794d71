// lib/src/facility_search.rs

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::context::RequestContext;
use crate::geo;
use crate::storage_engine::{ClinicalStore, SpatialHit, SpatialIndex, SpatialPredicate, SpatialQuery, SpatialTable};
use models::errors::{PlannerError, PlannerResult};
use models::{Coordinates, FacilityId, FacilityType, HealthcareFacility};

/// Facility predicates shared by radius, nearest-K and text search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacilityFilter {
    #[serde(default)]
    pub types: Vec<FacilityType>,
    /// Every listed service must be offered.
    #[serde(default)]
    pub services: Vec<String>,
    pub max_distance_km: Option<f64>,
    #[serde(default)]
    pub open_now: bool,
    pub min_capacity: Option<u32>,
    pub district: Option<String>,
}

impl FacilityFilter {
    /// The part of the filter the spatial index can evaluate itself.
    fn index_predicate(&self) -> Option<SpatialPredicate> {
        let mut parts = Vec::new();
        if !self.types.is_empty() {
            parts.push(SpatialPredicate::FacilityTypes(self.types.clone()));
        }
        if let Some(min) = self.min_capacity {
            parts.push(SpatialPredicate::MinCapacity(min));
        }
        if let Some(district) = &self.district {
            parts.push(SpatialPredicate::District(district.clone()));
        }
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(SpatialPredicate::All(parts)),
        }
    }

    fn needs_post_filter(&self) -> bool {
        !self.services.is_empty() || self.open_now || self.max_distance_km.is_some()
    }

    /// Evaluates every predicate except distance. `local_now` feeds `open_now`.
    pub fn matches(&self, facility: &HealthcareFacility, local_now: &DateTime<FixedOffset>) -> bool {
        if !self.types.is_empty() && !self.types.contains(&facility.facility_type) {
            return false;
        }
        if !facility.offers_all(&self.services) {
            return false;
        }
        if self.min_capacity.is_some_and(|min| facility.capacity < min) {
            return false;
        }
        if self
            .district
            .as_ref()
            .is_some_and(|d| !facility.district.eq_ignore_ascii_case(d))
        {
            return false;
        }
        if self.open_now && !facility.is_open(local_now) {
            return false;
        }
        true
    }
}

/// A facility projected for a search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityWithDistance {
    pub facility: HealthcareFacility,
    pub distance_km: f64,
    pub distance_text: String,
    /// Rough driving estimate at 30 km/h.
    pub travel_minutes: u32,
    pub is_open: bool,
}

/// Driving-time proxy: two minutes per kilometre.
pub fn travel_minutes(distance_km: f64) -> u32 {
    (distance_km * 2.0).round().max(0.0) as u32
}

pub struct FacilitySearch {
    store: Arc<dyn ClinicalStore>,
    index: Arc<dyn SpatialIndex>,
    local_offset: FixedOffset,
}

impl FacilitySearch {
    pub fn new(store: Arc<dyn ClinicalStore>, index: Arc<dyn SpatialIndex>, local_offset: FixedOffset) -> Self {
        FacilitySearch {
            store,
            index,
            local_offset,
        }
    }

    #[instrument(skip(self, ctx))]
    pub async fn get_facility(&self, ctx: &RequestContext, id: FacilityId) -> PlannerResult<HealthcareFacility> {
        ctx.run(self.store.get_facility(&id))
            .await?
            .ok_or_else(|| PlannerError::not_found("facility", id))
    }

    /// Facilities within `radius_km` of `center` passing `filter`, nearest first.
    /// `at` is the instant `open_now` and `is_open` are evaluated against.
    #[instrument(skip(self, ctx, filter))]
    pub async fn find_nearby(
        &self,
        ctx: &RequestContext,
        center: Coordinates,
        radius_km: f64,
        filter: &FacilityFilter,
        at: DateTime<Utc>,
    ) -> PlannerResult<Vec<FacilityWithDistance>> {
        let center = geo::validate(center.latitude, center.longitude)?;
        if !(radius_km.is_finite() && radius_km > 0.0) {
            return Err(PlannerError::BadRequest(format!("radius must be positive, got {}", radius_km)));
        }
        let radius_km = filter.max_distance_km.map_or(radius_km, |max| radius_km.min(max));

        let query = SpatialQuery::new(SpatialTable::Facilities, center).with_predicate(filter.index_predicate());
        let hits = ctx.run(self.index.within_radius(&query, radius_km * 1000.0)).await?;
        debug!("Spatial index returned {} facilities within {} km", hits.len(), radius_km);

        let mut results = self.project(ctx, center, &hits, filter, at, Some(radius_km)).await?;
        sort_by_distance(&mut results);
        Ok(results)
    }

    /// The `k` nearest facilities passing `filter`.
    #[instrument(skip(self, ctx, filter))]
    pub async fn nearest_facilities(
        &self,
        ctx: &RequestContext,
        center: Coordinates,
        k: usize,
        filter: &FacilityFilter,
        at: DateTime<Utc>,
    ) -> PlannerResult<Vec<FacilityWithDistance>> {
        let center = geo::validate(center.latitude, center.longitude)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        // Post-filters can drop rows, so over-fetch before trimming to k.
        let fetch = if filter.needs_post_filter() { k.saturating_mul(4) } else { k };
        let query = SpatialQuery::new(SpatialTable::Facilities, center).with_predicate(filter.index_predicate());
        let hits = ctx.run(self.index.nearest_k(&query, fetch)).await?;

        let mut results = self
            .project(ctx, center, &hits, filter, at, filter.max_distance_km)
            .await?;
        sort_by_distance(&mut results);
        results.truncate(k);
        Ok(results)
    }

    /// Free-text search with the same post-filter as `find_nearby`. Distance
    /// limits need a centre and are ignored here. Ordering follows the store.
    #[instrument(skip(self, ctx, filter))]
    pub async fn search(
        &self,
        ctx: &RequestContext,
        text: &str,
        filter: &FacilityFilter,
        at: DateTime<Utc>,
        limit: usize,
    ) -> PlannerResult<Vec<HealthcareFacility>> {
        let local_now = at.with_timezone(&self.local_offset);
        let found = ctx.run(self.store.search_facilities(text, limit)).await?;
        Ok(found
            .into_iter()
            .filter(|f| filter.matches(f, &local_now))
            .collect())
    }

    async fn project(
        &self,
        ctx: &RequestContext,
        center: Coordinates,
        hits: &[SpatialHit],
        filter: &FacilityFilter,
        at: DateTime<Utc>,
        max_km: Option<f64>,
    ) -> PlannerResult<Vec<FacilityWithDistance>> {
        let local_now = at.with_timezone(&self.local_offset);
        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let id = FacilityId(hit.id);
            let Some(facility) = ctx.run(self.store.get_facility(&id)).await? else {
                warn!("Spatial index returned unknown facility {}", id);
                continue;
            };
            if !filter.matches(&facility, &local_now) {
                continue;
            }
            let distance_km = geo::distance_km(center, facility.location);
            if max_km.is_some_and(|max| distance_km > max) {
                continue;
            }
            results.push(FacilityWithDistance {
                is_open: facility.is_open(&local_now),
                distance_text: geo::format_distance(distance_km),
                travel_minutes: travel_minutes(distance_km),
                distance_km,
                facility,
            });
        }
        Ok(results)
    }
}

fn sort_by_distance(results: &mut [FacilityWithDistance]) {
    results.sort_by_key(|r| OrderedFloat(r.distance_km));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_engine::InMemoryStore;
    use chrono::TimeZone;
    use models::{ErrorCategory, OperatingHours};

    fn facility(name: &str, lng: f64, kind: FacilityType, services: &[&str], capacity: u32) -> HealthcareFacility {
        let now = Utc::now();
        HealthcareFacility {
            id: FacilityId::new(),
            name: name.to_string(),
            district: "Kisumu".to_string(),
            address: format!("{} road", name),
            location: Coordinates::new(0.0, lng),
            facility_type: kind,
            capacity,
            opening_hour: Some(8),
            closing_hour: Some(17),
            services: services.iter().map(|s| s.to_string()).collect(),
            operating_hours: OperatingHours::default(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn search_over(facilities: Vec<HealthcareFacility>) -> FacilitySearch {
        let store = Arc::new(InMemoryStore::new());
        for f in facilities {
            store.insert_facility(f).await;
        }
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        FacilitySearch::new(store.clone(), store, offset)
    }

    // Monday 2024-04-01 10:00 at UTC+3
    fn weekday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 7, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn nearby_results_are_sorted_with_travel_estimate() {
        let far = facility("Far", 0.09, FacilityType::Hospital, &["delivery"], 100);
        let near = facility("Near", 0.01, FacilityType::Clinic, &["antenatal"], 10);
        let search = search_over(vec![far.clone(), near.clone()]).await;

        let results = search
            .find_nearby(
                &RequestContext::background(),
                Coordinates::new(0.0, 0.0),
                20.0,
                &FacilityFilter::default(),
                weekday_morning(),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].facility.id, near.id);
        assert_eq!(results[1].facility.id, far.id);
        let expected = travel_minutes(results[1].distance_km);
        assert_eq!(results[1].travel_minutes, expected);
        assert_eq!(expected, 20);
        assert!(results[0].is_open);
    }

    #[tokio::test]
    async fn filter_applies_services_capacity_and_distance() {
        let a = facility("A", 0.01, FacilityType::Clinic, &["Antenatal", "delivery"], 10);
        let b = facility("B", 0.02, FacilityType::Clinic, &["antenatal"], 50);
        let c = facility("C", 0.2, FacilityType::Clinic, &["antenatal", "delivery"], 50);
        let search = search_over(vec![a.clone(), b, c]).await;

        let filter = FacilityFilter {
            services: vec!["antenatal".to_string(), "DELIVERY".to_string()],
            max_distance_km: Some(5.0),
            ..Default::default()
        };
        let results = search
            .find_nearby(&RequestContext::background(), Coordinates::new(0.0, 0.0), 50.0, &filter, weekday_morning())
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.facility.id).collect();
        assert_eq!(ids, vec![a.id]);

        let filter = FacilityFilter { min_capacity: Some(20), ..Default::default() };
        let results = search
            .find_nearby(&RequestContext::background(), Coordinates::new(0.0, 0.0), 50.0, &filter, weekday_morning())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn open_now_uses_supplied_instant() {
        let f = facility("Clinic", 0.01, FacilityType::Clinic, &[], 10);
        let search = search_over(vec![f]).await;
        let filter = FacilityFilter { open_now: true, ..Default::default() };
        // 20:00 local
        let evening = Utc.with_ymd_and_hms(2024, 4, 1, 17, 0, 0).unwrap();

        let open = search
            .find_nearby(&RequestContext::background(), Coordinates::new(0.0, 0.0), 5.0, &filter, weekday_morning())
            .await
            .unwrap();
        let closed = search
            .find_nearby(&RequestContext::background(), Coordinates::new(0.0, 0.0), 5.0, &filter, evening)
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert!(closed.is_empty());
    }

    #[tokio::test]
    async fn nearest_k_trims_after_filtering() {
        let hospital = facility("H", 0.05, FacilityType::Hospital, &[], 10);
        let clinics: Vec<_> = (1..=3)
            .map(|i| facility(&format!("C{}", i), 0.01 * i as f64, FacilityType::Clinic, &[], 10))
            .collect();
        let mut all = clinics.clone();
        all.push(hospital.clone());
        let search = search_over(all).await;

        let filter = FacilityFilter { types: vec![FacilityType::Hospital], ..Default::default() };
        let results = search
            .nearest_facilities(&RequestContext::background(), Coordinates::new(0.0, 0.0), 1, &filter, weekday_morning())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].facility.id, hospital.id);

        let results = search
            .nearest_facilities(
                &RequestContext::background(),
                Coordinates::new(0.0, 0.0),
                2,
                &FacilityFilter::default(),
                weekday_morning(),
            )
            .await
            .unwrap();
        assert_eq!(results[0].facility.id, clinics[0].id);
        assert_eq!(results[1].facility.id, clinics[1].id);
    }

    #[tokio::test]
    async fn text_search_and_lookup() {
        let f = facility("Kisumu County Referral", 0.01, FacilityType::Hospital, &["delivery"], 10);
        let search = search_over(vec![f.clone()]).await;
        let ctx = RequestContext::background();

        let found = search
            .search(&ctx, "referral", &FacilityFilter::default(), weekday_morning(), 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        assert_eq!(search.get_facility(&ctx, f.id).await.unwrap().name, f.name);
        let err = search.get_facility(&ctx, FacilityId::new()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn rejects_bad_centre_and_radius() {
        let search = search_over(vec![]).await;
        let ctx = RequestContext::background();
        let filter = FacilityFilter::default();
        let err = search
            .find_nearby(&ctx, Coordinates::new(95.0, 0.0), 5.0, &filter, weekday_morning())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);
        let err = search
            .find_nearby(&ctx, Coordinates::new(0.0, 0.0), 0.0, &filter, weekday_morning())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);
    }
}
