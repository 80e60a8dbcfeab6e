use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        allocation_rule::{self, AllocationStrategy},
        inventory_location, inventory_record,
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub ship_to: Option<GeoPoint>,
}

/// Stock available at one candidate location, in the order it should be
/// consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateStock {
    pub location_id: Uuid,
    pub available: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub location_id: Uuid,
    pub quantity: i32,
}

/// A suggested stock move that would let `to_location_id` ship the whole
/// request on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSuggestion {
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub product_id: Uuid,
    pub requested: i32,
    pub lines: Vec<AllocationLine>,
    /// Units no candidate location could cover.
    pub shortfall: i32,
    /// Matching rule, if any.
    pub rule_id: Option<Uuid>,
    pub strategy: AllocationStrategy,
    pub used_fallback: bool,
    /// Every location considered, in consumption order.
    pub candidate_location_ids: Vec<Uuid>,
}

impl AllocationPlan {
    pub fn is_satisfied(&self) -> bool {
        self.shortfall == 0
    }

    pub fn is_split(&self) -> bool {
        self.lines.len() > 1
    }

    pub fn allocated(&self) -> i32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Transfers that would consolidate the plan at `target`.
    pub fn consolidation_transfers(&self, target: Uuid) -> Vec<TransferSuggestion> {
        self.lines
            .iter()
            .filter(|line| line.location_id != target && line.quantity > 0)
            .map(|line| TransferSuggestion {
                product_id: self.product_id,
                from_location_id: line.location_id,
                to_location_id: target,
                quantity: line.quantity,
            })
            .collect()
    }
}

/// Greedy consumption: take as much as possible from each candidate in
/// order until the request is covered. Returns the lines and the shortfall.
pub fn plan_allocation(candidates: &[CandidateStock], requested: i32) -> (Vec<AllocationLine>, i32) {
    let mut remaining = requested.max(0);
    let mut lines = Vec::new();
    for candidate in candidates {
        if remaining == 0 {
            break;
        }
        if candidate.available <= 0 {
            continue;
        }
        let take = candidate.available.min(remaining);
        lines.push(AllocationLine {
            location_id: candidate.location_id,
            quantity: take,
        });
        remaining -= take;
    }
    (lines, remaining)
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let radius_km = 6371.0_f64;
    let (lat1_rad, lon1_rad) = (lat1.to_radians(), lon1.to_radians());
    let (lat2_rad, lon2_rad) = (lat2.to_radians(), lon2.to_radians());
    let dlat = lat2_rad - lat1_rad;
    let dlon = lon2_rad - lon1_rad;
    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    radius_km * c
}

fn distance_km(ship_to: &GeoPoint, location: &inventory_location::Model) -> Option<f64> {
    let (lat, lon) = location.coordinates()?;
    Some(haversine_km(ship_to.latitude, ship_to.longitude, lat, lon))
}

/// Orders `location_ids` for consumption under `strategy`.
fn order_candidates(
    strategy: AllocationStrategy,
    location_ids: &[Uuid],
    locations: &HashMap<Uuid, inventory_location::Model>,
    stock: &HashMap<Uuid, i32>,
    ship_to: Option<&GeoPoint>,
) -> Vec<CandidateStock> {
    let mut ids: Vec<Uuid> = location_ids
        .iter()
        .copied()
        .filter(|id| locations.contains_key(id))
        .collect();

    match strategy {
        AllocationStrategy::Priority => {}
        AllocationStrategy::Nearest => {
            if let Some(ship_to) = ship_to {
                // Unlocated sites keep their relative order after located ones
                ids.sort_by(|a, b| {
                    let da = locations.get(a).and_then(|l| distance_km(ship_to, l));
                    let db = locations.get(b).and_then(|l| distance_km(ship_to, l));
                    match (da, db) {
                        (Some(x), Some(y)) => x.total_cmp(&y),
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    }
                });
            }
        }
        AllocationStrategy::AnyAvailable => {
            ids.sort_by(|a, b| {
                let sa = stock.get(a).copied().unwrap_or(0);
                let sb = stock.get(b).copied().unwrap_or(0);
                sb.cmp(&sa).then_with(|| {
                    let ca = locations.get(a).map(|l| l.code.as_str()).unwrap_or("");
                    let cb = locations.get(b).map(|l| l.code.as_str()).unwrap_or("");
                    ca.cmp(cb)
                })
            });
        }
    }

    ids.into_iter()
        .map(|location_id| CandidateStock {
            location_id,
            available: stock.get(&location_id).copied().unwrap_or(0),
        })
        .collect()
}

/// Decides which location(s) satisfy a (product, quantity) request using
/// the active allocation rules.
#[derive(Clone)]
pub struct AllocationResolver {
    db: Arc<DatabaseConnection>,
}

impl AllocationResolver {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn resolve(&self, request: &AllocationRequest) -> Result<AllocationPlan, ServiceError> {
        self.resolve_in(&*self.db, request).await
    }

    /// Reports a shortfall instead of failing when the request cannot be
    /// fully covered; the caller decides whether to reject, backorder or
    /// oversell.
    pub async fn resolve_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        request: &AllocationRequest,
    ) -> Result<AllocationPlan, ServiceError> {
        if request.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "allocation quantity must be positive".to_string(),
            ));
        }

        let locations: Vec<inventory_location::Model> = inventory_location::Entity::find()
            .filter(inventory_location::Column::IsActive.eq(true))
            .order_by_asc(inventory_location::Column::Code)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let all_active: Vec<Uuid> = locations.iter().map(|l| l.id).collect();
        let locations: HashMap<Uuid, inventory_location::Model> =
            locations.into_iter().map(|l| (l.id, l)).collect();

        let stock: HashMap<Uuid, i32> = inventory_record::Entity::find()
            .filter(inventory_record::Column::ProductId.eq(request.product_id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|r| (r.location_id, r.available_quantity))
            .collect();

        let rule = self.matching_rule_in(conn, request).await?;
        let ship_to = request.ship_to.as_ref();

        let plan = match rule {
            Some(rule) => {
                let listed = rule.parsed_location_ids();
                let candidates =
                    order_candidates(rule.strategy, &listed, &locations, &stock, ship_to);
                let (lines, shortfall) = plan_allocation(&candidates, request.quantity);
                let primary = AllocationPlan {
                    product_id: request.product_id,
                    requested: request.quantity,
                    lines,
                    shortfall,
                    rule_id: Some(rule.id),
                    strategy: rule.strategy,
                    used_fallback: false,
                    candidate_location_ids: candidates.iter().map(|c| c.location_id).collect(),
                };

                match rule.fallback_strategy {
                    Some(fallback) if shortfall > 0 => {
                        // Fallback considers every active location, listed ones first
                        let mut widened = listed.clone();
                        widened.extend(all_active.iter().filter(|id| !listed.contains(id)));
                        let candidates =
                            order_candidates(fallback, &widened, &locations, &stock, ship_to);
                        let (lines, fallback_shortfall) =
                            plan_allocation(&candidates, request.quantity);
                        if fallback_shortfall < shortfall {
                            AllocationPlan {
                                lines,
                                shortfall: fallback_shortfall,
                                strategy: fallback,
                                used_fallback: true,
                                candidate_location_ids: candidates
                                    .iter()
                                    .map(|c| c.location_id)
                                    .collect(),
                                ..primary
                            }
                        } else {
                            primary
                        }
                    }
                    _ => primary,
                }
            }
            None => {
                let candidates = order_candidates(
                    AllocationStrategy::AnyAvailable,
                    &all_active,
                    &locations,
                    &stock,
                    ship_to,
                );
                let (lines, shortfall) = plan_allocation(&candidates, request.quantity);
                AllocationPlan {
                    product_id: request.product_id,
                    requested: request.quantity,
                    lines,
                    shortfall,
                    rule_id: None,
                    strategy: AllocationStrategy::AnyAvailable,
                    used_fallback: false,
                    candidate_location_ids: candidates.iter().map(|c| c.location_id).collect(),
                }
            }
        };

        debug!(
            rule_id = ?plan.rule_id,
            strategy = %plan.strategy,
            lines = plan.lines.len(),
            shortfall = plan.shortfall,
            "Allocation resolved"
        );
        Ok(plan)
    }

    /// First active rule, by ascending priority, whose conditions match.
    async fn matching_rule_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        request: &AllocationRequest,
    ) -> Result<Option<allocation_rule::Model>, ServiceError> {
        let rules = allocation_rule::Entity::find()
            .filter(allocation_rule::Column::IsActive.eq(true))
            .order_by_asc(allocation_rule::Column::Priority)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rules.into_iter().find(|rule| {
            rule.parsed_conditions()
                .matches(request.product_id, request.quantity)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn location(code: &str, coords: Option<(f64, f64)>) -> inventory_location::Model {
        inventory_location::Model {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: code.to_string(),
            is_active: true,
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn greedy_plan_takes_from_each_location_in_order() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let candidates = [
            CandidateStock { location_id: a, available: 3 },
            CandidateStock { location_id: b, available: 0 },
            CandidateStock { location_id: c, available: 10 },
        ];
        let (lines, shortfall) = plan_allocation(&candidates, 5);
        assert_eq!(shortfall, 0);
        assert_eq!(
            lines,
            vec![
                AllocationLine { location_id: a, quantity: 3 },
                AllocationLine { location_id: c, quantity: 2 },
            ]
        );
    }

    #[test]
    fn shortfall_is_reported_not_hidden() {
        let candidates = [CandidateStock { location_id: Uuid::new_v4(), available: 2 }];
        let (lines, shortfall) = plan_allocation(&candidates, 7);
        assert_eq!(lines.len(), 1);
        assert_eq!(shortfall, 5);
    }

    #[test]
    fn nearest_orders_by_distance_and_puts_unlocated_last() {
        let nyc = location("NYC", Some((40.71, -74.00)));
        let la = location("LAX", Some((34.05, -118.24)));
        let unknown = location("UNK", None);
        let ids = vec![unknown.id, la.id, nyc.id];
        let locations: HashMap<_, _> = [nyc.clone(), la.clone(), unknown.clone()]
            .into_iter()
            .map(|l| (l.id, l))
            .collect();
        let stock = HashMap::new();
        let boston = GeoPoint { latitude: 42.36, longitude: -71.06 };

        let ordered = order_candidates(
            AllocationStrategy::Nearest,
            &ids,
            &locations,
            &stock,
            Some(&boston),
        );
        let order: Vec<Uuid> = ordered.iter().map(|c| c.location_id).collect();
        assert_eq!(order, vec![nyc.id, la.id, unknown.id]);
    }

    #[test]
    fn any_available_prefers_deepest_stock() {
        let a = location("A", None);
        let b = location("B", None);
        let locations: HashMap<_, _> = [a.clone(), b.clone()].into_iter().map(|l| (l.id, l)).collect();
        let stock: HashMap<_, _> = [(a.id, 2), (b.id, 9)].into_iter().collect();
        let ordered = order_candidates(
            AllocationStrategy::AnyAvailable,
            &[a.id, b.id],
            &locations,
            &stock,
            None,
        );
        assert_eq!(ordered[0].location_id, b.id);
    }

    #[test]
    fn consolidation_suggests_moves_into_target() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let plan = AllocationPlan {
            product_id: Uuid::new_v4(),
            requested: 5,
            lines: vec![
                AllocationLine { location_id: a, quantity: 3 },
                AllocationLine { location_id: b, quantity: 2 },
            ],
            shortfall: 0,
            rule_id: None,
            strategy: AllocationStrategy::AnyAvailable,
            used_fallback: false,
            candidate_location_ids: vec![a, b],
        };
        assert!(plan.is_split());
        let moves = plan.consolidation_transfers(a);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].from_location_id, b);
        assert_eq!(moves[0].quantity, 2);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // New York to Los Angeles is roughly 3,940 km
        let d = haversine_km(40.71, -74.00, 34.05, -118.24);
        assert!((3900.0..4000.0).contains(&d), "{}", d);
    }

    proptest! {
        #[test]
        fn plan_never_over_allocates(
            stocks in proptest::collection::vec(-5i32..50, 0..8),
            requested in 1i32..200,
        ) {
            let candidates: Vec<CandidateStock> = stocks
                .iter()
                .map(|&available| CandidateStock { location_id: Uuid::new_v4(), available })
                .collect();
            let (lines, shortfall) = plan_allocation(&candidates, requested);
            let allocated: i32 = lines.iter().map(|l| l.quantity).sum();
            let total_positive: i32 = stocks.iter().filter(|s| **s > 0).sum();

            prop_assert_eq!(allocated + shortfall, requested);
            prop_assert_eq!(allocated, requested.min(total_positive));
            for line in &lines {
                let source = candidates.iter().find(|c| c.location_id == line.location_id).unwrap();
                prop_assert!(line.quantity > 0);
                prop_assert!(line.quantity <= source.available);
            }
        }
    }
}
