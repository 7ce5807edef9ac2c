//! Scripted replays of rental lifecycles against the in-memory backend
//!
//! A scenario lists steps at fixed clock times. Each step refers to a rental
//! by a caller-chosen alias so later steps can pick up, extend, return or
//! cancel what an earlier step created. Rejected operations are recorded as
//! outcomes rather than aborting the replay.

use crate::config::RentalPolicy;
use crate::domain::availability::InMemoryStockLedger;
use crate::domain::clock::ManualClock;
use crate::domain::engine::{RentalLifecycle, RentalLifecycleEngine};
use crate::domain::fees::DamageAssessment;
use crate::domain::pricing::NewLineItem;
use crate::domain::rentals::{NewRental, Rental, ReturnLine, ReturnResult};
use crate::domain::types::{PeriodUnit, RentalId, RentalStatus};
use crate::error::{RentalError, Result};
use crate::storage::InMemoryRentalRepository;
use chrono::{DateTime, Utc};
use rentwell_common::{CustomerId, ItemId, LocationId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub stock: Vec<StockEntry>,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockEntry {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub units: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub rental: Option<String>,
    pub action: ScenarioAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAction {
    Create {
        customer_id: CustomerId,
        #[serde(default)]
        location_id: Option<LocationId>,
        period_unit: PeriodUnit,
        duration: u32,
        line_items: Vec<NewLineItem>,
    },
    Pickup,
    Return {
        lines: Vec<ScenarioReturnLine>,
    },
    Extend {
        periods: u32,
    },
    Cancel {
        reason: String,
    },
    SweepOverdue,
}

impl ScenarioAction {
    fn name(&self) -> &'static str {
        match self {
            ScenarioAction::Create { .. } => "create",
            ScenarioAction::Pickup => "pickup",
            ScenarioAction::Return { .. } => "return",
            ScenarioAction::Extend { .. } => "extend",
            ScenarioAction::Cancel { .. } => "cancel",
            ScenarioAction::SweepOverdue => "sweep_overdue",
        }
    }
}

/// Returned units addressed by 1-based line number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReturnLine {
    pub line_number: u32,
    pub quantity: u32,
    #[serde(default)]
    pub damage: Option<DamageAssessment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub at: DateTime<Utc>,
    pub rental: Option<String>,
    pub action: &'static str,
    #[serde(flatten)]
    pub result: StepResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepResult {
    Rental(Box<Rental>),
    Return(Box<ReturnResult>),
    Swept(Vec<RentalId>),
    Rejected { error: String },
}

impl StepResult {
    pub fn is_rejected(&self) -> bool {
        matches!(self, StepResult::Rejected { .. })
    }
}

/// Replay `scenario` step by step with a clock that jumps to each step's time
pub async fn run(scenario: &Scenario, policy: RentalPolicy) -> Result<Vec<StepOutcome>> {
    let clock = Arc::new(ManualClock::new(scenario.start));
    let engine = RentalLifecycleEngine::new(
        policy,
        Arc::new(InMemoryRentalRepository::new()),
        clock.clone(),
    );
    let ledger = InMemoryStockLedger::new();
    for entry in &scenario.stock {
        ledger
            .set_stock(entry.item_id.clone(), entry.location_id.clone(), entry.units)
            .await;
    }

    let mut replay = Replay {
        engine,
        ledger,
        aliases: HashMap::new(),
    };

    let mut outcomes = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        clock.set(step.at);
        let result = match replay.apply(step).await {
            Ok(result) => result,
            Err(e @ (RentalError::DatabaseError { .. } | RentalError::Serialization(_))) => {
                return Err(e)
            }
            Err(e) => StepResult::Rejected {
                error: e.to_string(),
            },
        };
        debug!(
            step = index + 1,
            action = step.action.name(),
            rejected = result.is_rejected(),
            "Replayed scenario step"
        );
        outcomes.push(StepOutcome {
            step: index + 1,
            at: step.at,
            rental: step.rental.clone(),
            action: step.action.name(),
            result,
        });
    }

    info!(steps = outcomes.len(), "Scenario replay finished");
    Ok(outcomes)
}

struct Replay {
    engine: RentalLifecycleEngine,
    ledger: InMemoryStockLedger,
    aliases: HashMap<String, RentalId>,
}

impl Replay {
    fn alias(&self, step: &ScenarioStep) -> Result<RentalId> {
        let alias = step
            .rental
            .as_deref()
            .ok_or_else(|| RentalError::validation("step does not name a rental"))?;
        self.aliases
            .get(alias)
            .copied()
            .ok_or_else(|| RentalError::validation(format!("unknown rental alias: {alias}")))
    }

    async fn apply(&mut self, step: &ScenarioStep) -> Result<StepResult> {
        match &step.action {
            ScenarioAction::Create {
                customer_id,
                location_id,
                period_unit,
                duration,
                line_items,
            } => {
                let alias = step
                    .rental
                    .clone()
                    .ok_or_else(|| RentalError::validation("create step does not name a rental"))?;
                let end_date = period_unit
                    .advance(step.at, *duration)
                    .ok_or_else(|| RentalError::validation("end date is out of range"))?;
                let request = NewRental {
                    customer_id: customer_id.clone(),
                    line_items: line_items.clone(),
                    period_unit: *period_unit,
                    duration: *duration,
                    start_date: step.at,
                    end_date,
                };

                let rental = match location_id {
                    Some(location_id) => {
                        let rental = self
                            .engine
                            .create_rental_checked(&self.ledger, location_id, request)
                            .await?;
                        for line in &rental.line_items {
                            self.ledger
                                .reserve(
                                    rental.id,
                                    &line.item_id,
                                    location_id,
                                    rental.start_date,
                                    rental.end_date,
                                    line.quantity,
                                )
                                .await?;
                        }
                        rental
                    }
                    None => self.engine.create_rental(request).await?,
                };

                self.aliases.insert(alias, rental.id);
                Ok(StepResult::Rental(Box::new(rental)))
            }
            ScenarioAction::Pickup => {
                let id = self.alias(step)?;
                let rental = self.engine.process_pickup(&id).await?;
                Ok(StepResult::Rental(Box::new(rental)))
            }
            ScenarioAction::Return { lines } => {
                let id = self.alias(step)?;
                let rental = self.engine.get_rental(&id).await?;
                let mut returned = Vec::with_capacity(lines.len());
                let mut returned_items = Vec::with_capacity(lines.len());
                for line in lines {
                    let target = rental
                        .line_items
                        .iter()
                        .find(|item| item.line_number == line.line_number)
                        .ok_or_else(|| {
                            RentalError::validation(format!(
                                "rental has no line {}",
                                line.line_number
                            ))
                        })?;
                    let mut entry = ReturnLine::new(target.id, line.quantity);
                    if let Some(damage) = &line.damage {
                        entry = entry.with_damage(damage.clone());
                    }
                    returned.push(entry);
                    returned_items.push((target.item_id.clone(), line.quantity));
                }
                let result = self.engine.process_return(&id, &returned).await?;
                if result.status == RentalStatus::Completed {
                    self.ledger.release(id).await;
                } else {
                    for (item_id, units) in &returned_items {
                        self.ledger.return_units(id, item_id, *units).await;
                    }
                }
                Ok(StepResult::Return(Box::new(result)))
            }
            ScenarioAction::Extend { periods } => {
                let id = self.alias(step)?;
                let current = self.engine.get_rental(&id).await?;
                let new_end = current
                    .period_unit
                    .advance(current.end_date, *periods)
                    .ok_or_else(|| RentalError::validation("extended end date is out of range"))?;

                self.ledger.resize(id, new_end).await?;
                match self.engine.extend_rental(&id, *periods).await {
                    Ok(rental) => Ok(StepResult::Rental(Box::new(rental))),
                    Err(e) => {
                        self.ledger.resize(id, current.end_date).await?;
                        Err(e)
                    }
                }
            }
            ScenarioAction::Cancel { reason } => {
                let id = self.alias(step)?;
                let rental = self.engine.cancel_rental(&id, reason).await?;
                self.ledger.release(id).await;
                Ok(StepResult::Rental(Box::new(rental)))
            }
            ScenarioAction::SweepOverdue => {
                let marked = self.engine.sweep_overdue().await?;
                Ok(StepResult::Swept(marked))
            }
        }
    }
}
