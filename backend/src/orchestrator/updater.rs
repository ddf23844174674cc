//! Update pipeline
//!
//! Advances an [`Environment`] by one step through a fixed sequence of
//! stages:
//!
//! ```text
//! For each step t:
//! 1. Accrue interest on every interest-bearing entry
//! 2. Endow households with their labour for the step
//! 3. Clear the labour market (price search + rationing + triads)
//! 4. Clear the goods market (fixed price + abstract rationing + triads)
//! 5. Net deposits and loans per (bank, firm) and (bank, household)
//! 6. Net labour, goods and capital per (firm, household) into capital
//! 7. Purge zero-value entries
//! ```
//!
//! A step either completes or returns the first error; nothing is retried.
//!
//! # Determinism
//!
//! The settling bank of each trade is drawn from the pipeline's own seeded
//! [`RngManager`]. Agents are visited in registration order and ledger
//! entries in account order, so the same seed and population replay exactly.

use crate::market::{Market, MarketClearing, Participant, Position, SearchParams};
use crate::models::agent::{AgentRole, DemandsLabour, Intermediates, ProducesGoods, SuppliesLabour};
use crate::models::environment::{Environment, PRICE_OF_GOODS, PRICE_OF_LABOUR};
use crate::models::event::{Event, EventLog, MarketKind, Stage};
use crate::models::transaction::TransactionKind;
use crate::orchestrator::SimulationError;
use crate::rng::RngManager;
use crate::settlement::{net_bilateral, settle_through_bank, NetOutcome, NettingRule, NettingTerm, Replacement, Side};
use serde::{Deserialize, Serialize};

fn default_goods_price() -> f64 {
    10.0
}

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Tatonnement settings for the labour market
    #[serde(default)]
    pub labour_search: SearchParams,

    /// Fixed price of goods
    #[serde(default = "default_goods_price")]
    pub goods_price: f64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            labour_search: SearchParams::default(),
            goods_price: default_goods_price(),
        }
    }
}

/// Result of a single step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    /// Step index
    pub time: usize,

    /// Cleared wage
    pub price_of_labour: f64,

    /// Goods price used this step
    pub price_of_goods: f64,

    /// Number of settled labour matches
    pub labour_trades: usize,

    /// Number of settled goods matches
    pub goods_trades: usize,

    /// Entries removed by netting (stages 5 and 6)
    pub entries_netted: usize,

    /// Replacement entries created by netting
    pub entries_created_by_netting: usize,

    /// Zero-value entries purged
    pub entries_purged: usize,
}

/// Counts of one netting stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NettingSummary {
    pub pairs: usize,
    pub removed: usize,
    pub created: usize,
}

/// The step pipeline
///
/// # Example
///
/// ```rust
/// use economy_simulator_core_rs::{Agent, Environment, RngManager, Updater};
/// use economy_simulator_core_rs::models::{BankProfile, FirmProfile, HouseholdProfile};
/// use economy_simulator_core_rs::orchestrator::UpdaterConfig;
///
/// let mut env = Environment::with_agents(vec![
///     Agent::household("HH_1", HouseholdProfile::new(10.0, 0.5)),
///     Agent::firm("FIRM_1", FirmProfile::default()),
///     Agent::bank("BANK_1", BankProfile::new(0.0, 0.0)),
/// ])
/// .unwrap();
///
/// let mut updater = Updater::new(UpdaterConfig::default(), RngManager::new(42));
/// let report = updater.do_update(&mut env, 0).unwrap();
/// assert_eq!(report.labour_trades, 1);
/// env.check_consistency().unwrap();
/// ```
pub struct Updater {
    config: UpdaterConfig,

    /// Price search and rationing service
    market: Box<dyn MarketClearing>,

    /// Bank selection
    rng: RngManager,

    event_log: EventLog,
}

impl Updater {
    /// Pipeline with the default [`Market`]
    pub fn new(config: UpdaterConfig, rng: RngManager) -> Self {
        Self::with_market(config, rng, Box::new(Market::new()))
    }

    /// Pipeline with a caller-provided clearing service
    pub fn with_market(config: UpdaterConfig, rng: RngManager, market: Box<dyn MarketClearing>) -> Self {
        Self {
            config,
            market,
            rng,
            event_log: EventLog::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn rng(&self) -> &RngManager {
        &self.rng
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn event_log_mut(&mut self) -> &mut EventLog {
        &mut self.event_log
    }

    // ========================================================================
    // Step
    // ========================================================================

    /// Run every stage once, in order
    pub fn do_update(&mut self, env: &mut Environment, time: usize) -> Result<StepReport, SimulationError> {
        self.accrue_interests(env, time);
        self.endow_labour(env, time);
        let labour_trades = self.sell_labour(env, time)?;
        let goods_trades = self.consume_rationed(env, time)?;
        let deposits = self.net_loans_deposits(env, time)?;
        let capital = self.net_labour_goods(env, time)?;
        let entries_purged = self.purge_accounts(env, time)?;

        Ok(StepReport {
            time,
            price_of_labour: env.require_parameter(PRICE_OF_LABOUR)?,
            price_of_goods: env.require_parameter(PRICE_OF_GOODS)?,
            labour_trades,
            goods_trades,
            entries_netted: deposits.removed + capital.removed,
            entries_created_by_netting: deposits.created + capital.created,
            entries_purged,
        })
    }

    fn complete(&mut self, time: usize, stage: Stage) {
        tracing::info!(step = time, "{}", stage.description());
        self.event_log.log(Event::StageCompleted { step: time, stage });
    }

    /// Stage 1: apply one step of interest to every entry
    pub fn accrue_interests(&mut self, env: &mut Environment, time: usize) -> usize {
        let entries = env.accrue_interests();
        self.event_log.log(Event::InterestAccrued { step: time, entries });
        self.complete(time, Stage::AccrueInterests);
        entries
    }

    /// Stage 2: reset every household's sellable labour to its endowment
    pub fn endow_labour(&mut self, env: &mut Environment, time: usize) -> usize {
        let households = env.households().to_vec();
        let mut endowed = 0;
        for id in &households {
            if let Some(profile) = env.agent_mut(id).and_then(|a| a.as_household_mut()) {
                profile.sweep_labour = profile.labour;
                endowed += 1;
            }
        }
        self.event_log.log(Event::LabourEndowed {
            step: time,
            households: endowed,
        });
        self.complete(time, Stage::EndowLabour);
        endowed
    }

    /// Stage 3: clear the labour market and settle every match
    ///
    /// Returns the number of settled matches.
    pub fn sell_labour(&mut self, env: &mut Environment, time: usize) -> Result<usize, SimulationError> {
        let mut params = self.config.labour_search.clone();
        if params.start_price <= 0.0 {
            if let Some(previous) = env.parameter(PRICE_OF_LABOUR).filter(|p| p.is_finite() && *p > 0.0) {
                params.start_price = previous;
            }
        }
        let price_of_goods = self.config.goods_price;

        let (price, positions) = {
            let sellers: Vec<Participant<'_>> = env
                .agents_with_role(AgentRole::Household)
                .filter_map(|agent| {
                    agent
                        .as_household()
                        .map(|h| Participant::new(agent.id(), move |p: f64| h.supply_of_labour(p)))
                })
                .collect();
            let buyers: Vec<Participant<'_>> = env
                .agents_with_role(AgentRole::Firm)
                .filter_map(|agent| {
                    agent.as_firm().map(|f| {
                        Participant::new(agent.id(), move |p: f64| f.demand_for_labour(p, price_of_goods))
                    })
                })
                .collect();

            let price = self.market.find_equilibrium_price(&sellers, &buyers, &params)?;
            if !(price.is_finite() && price > 0.0) {
                return Err(SimulationError::InvalidPrice {
                    market: MarketKind::Labour,
                    price,
                });
            }

            let positions: Vec<Position> = sellers
                .iter()
                .map(|s| Position::new(s.agent_id, s.quantity_at(price)))
                .chain(buyers.iter().map(|b| Position::new(b.agent_id, -b.quantity_at(price))))
                .collect();
            (price, positions)
        };

        env.set_parameter(PRICE_OF_LABOUR, price);
        self.event_log.log(Event::PriceSet {
            step: time,
            market: MarketKind::Labour,
            price,
        });

        let matches = self.market.ration(&positions);
        for m in &matches {
            let bank_id = self.choose_bank(env, MarketKind::Labour, time)?;
            settle_through_bank(
                env,
                TransactionKind::Labour,
                &m.supplier,
                &m.demander,
                &bank_id,
                m.quantity,
                price,
                time,
            )?;
            if let Some(profile) = env.agent_mut(&m.supplier).and_then(|a| a.as_household_mut()) {
                profile.sweep_labour -= m.quantity;
            }
            self.record_trade(time, MarketKind::Labour, &m.supplier, &m.demander, &bank_id, m.quantity, price);
        }

        self.complete(time, Stage::SellLabour);
        Ok(matches.len())
    }

    /// Stage 4: sell goods at the fixed price and settle every match
    ///
    /// Quantities are rounded to whole units before rationing. Firm supply is
    /// its output in units, not output scaled by the goods price.
    pub fn consume_rationed(&mut self, env: &mut Environment, time: usize) -> Result<usize, SimulationError> {
        let price = self.config.goods_price;
        if !(price.is_finite() && price > 0.0) {
            return Err(SimulationError::InvalidPrice {
                market: MarketKind::Goods,
                price,
            });
        }
        env.set_parameter(PRICE_OF_GOODS, price);
        self.event_log.log(Event::PriceSet {
            step: time,
            market: MarketKind::Goods,
            price,
        });

        let mut positions = Vec::new();
        for firm in env.agents_with_role(AgentRole::Firm) {
            if let Some(profile) = firm.as_firm() {
                let labour = env.get_account(firm.id(), TransactionKind::Labour);
                positions.push(Position::new(firm.id(), profile.output(labour).round()));
            }
        }
        for household in env.agents_with_role(AgentRole::Household) {
            if let Some(profile) = household.as_household() {
                let deposits = env.get_account(household.id(), TransactionKind::Deposits);
                let spending = deposits * (1.0 - profile.propensity_to_save);
                positions.push(Position::new(household.id(), -(spending / price).round()));
            }
        }

        let matches = self.market.ration_abstract(
            &positions,
            &|_: &str, _: &str| 1.0,
            &|_: &str, _: &str| true,
        );
        for m in &matches {
            let bank_id = self.choose_bank(env, MarketKind::Goods, time)?;
            settle_through_bank(
                env,
                TransactionKind::Goods,
                &m.supplier,
                &m.demander,
                &bank_id,
                m.quantity,
                price,
                time,
            )?;
            self.record_trade(time, MarketKind::Goods, &m.supplier, &m.demander, &bank_id, m.quantity, price);
        }

        self.complete(time, Stage::ConsumeRationed);
        Ok(matches.len())
    }

    /// Stage 5: one deposit or loan per (bank, firm) and (bank, household)
    pub fn net_loans_deposits(&mut self, env: &mut Environment, time: usize) -> Result<NettingSummary, SimulationError> {
        let banks = env.banks().to_vec();
        let customers: Vec<String> = env.firms().iter().chain(env.households()).cloned().collect();

        let mut summary = NettingSummary::default();
        for bank_id in &banks {
            let (deposit_rate, loan_rate) = match env.agent(bank_id).and_then(|a| a.as_bank()) {
                Some(terms) => (terms.interest_rate_deposits(), terms.interest_rate_loans()),
                None => continue,
            };
            let rule = NettingRule {
                terms: vec![
                    NettingTerm::new(TransactionKind::Deposits, Side::To, 1.0),
                    NettingTerm::new(TransactionKind::Loans, Side::From, 1.0),
                ],
                surplus: Replacement {
                    kind: TransactionKind::Deposits,
                    interest_rate: deposit_rate,
                },
                deficit: Replacement {
                    kind: TransactionKind::Loans,
                    interest_rate: loan_rate,
                },
            };

            for customer_id in &customers {
                let outcome = net_bilateral(env, customer_id, bank_id, &rule, time)?;
                self.record_netting(&mut summary, time, customer_id, bank_id, &outcome);
            }
        }

        self.complete(time, Stage::NetLoansDeposits);
        Ok(summary)
    }

    /// Stage 6: one capital entry per (firm, household)
    ///
    /// Both prices must be set and positive.
    pub fn net_labour_goods(&mut self, env: &mut Environment, time: usize) -> Result<NettingSummary, SimulationError> {
        let price_of_labour = Self::required_price(env, PRICE_OF_LABOUR, MarketKind::Labour)?;
        let price_of_goods = Self::required_price(env, PRICE_OF_GOODS, MarketKind::Goods)?;

        let rule = NettingRule {
            terms: vec![
                NettingTerm::new(TransactionKind::Labour, Side::From, price_of_labour),
                NettingTerm::new(TransactionKind::Goods, Side::To, price_of_goods),
                NettingTerm::new(TransactionKind::Capital, Side::To, 1.0),
                NettingTerm::new(TransactionKind::Capital, Side::From, 1.0),
            ],
            surplus: Replacement {
                kind: TransactionKind::Capital,
                interest_rate: 0.0,
            },
            deficit: Replacement {
                kind: TransactionKind::Capital,
                interest_rate: 0.0,
            },
        };

        let firms = env.firms().to_vec();
        let households = env.households().to_vec();

        let mut summary = NettingSummary::default();
        for firm_id in &firms {
            for household_id in &households {
                let outcome = net_bilateral(env, household_id, firm_id, &rule, time)?;
                self.record_netting(&mut summary, time, household_id, firm_id, &outcome);
            }
        }

        self.complete(time, Stage::NetLabourGoods);
        Ok(summary)
    }

    /// Stage 7: drop entries whose amount is exactly zero
    pub fn purge_accounts(&mut self, env: &mut Environment, time: usize) -> Result<usize, SimulationError> {
        let removed = env.purge_accounts()?;
        self.event_log.log(Event::Purged { step: time, removed });
        self.complete(time, Stage::Purge);
        Ok(removed)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn choose_bank(&mut self, env: &Environment, market: MarketKind, time: usize) -> Result<String, SimulationError> {
        self.rng
            .choose(env.banks())
            .cloned()
            .ok_or(SimulationError::NoBanks { market, time })
    }

    fn required_price(env: &Environment, name: &str, market: MarketKind) -> Result<f64, SimulationError> {
        let price = env
            .parameter(name)
            .ok_or_else(|| SimulationError::MissingParameter(name.to_string()))?;
        if !(price.is_finite() && price > 0.0) {
            return Err(SimulationError::InvalidPrice { market, price });
        }
        Ok(price)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_trade(
        &mut self,
        time: usize,
        market: MarketKind,
        seller_id: &str,
        buyer_id: &str,
        bank_id: &str,
        quantity: f64,
        price: f64,
    ) {
        tracing::info!(
            step = time,
            %market,
            seller = seller_id,
            buyer = buyer_id,
            bank = bank_id,
            quantity,
            price,
            "trade settled"
        );
        self.event_log.log(Event::Trade {
            step: time,
            market,
            seller_id: seller_id.to_string(),
            buyer_id: buyer_id.to_string(),
            bank_id: bank_id.to_string(),
            quantity,
            price,
        });
    }

    fn record_netting(
        &mut self,
        summary: &mut NettingSummary,
        time: usize,
        agent_id: &str,
        counterpart_id: &str,
        outcome: &NetOutcome,
    ) {
        if outcome.unchanged || outcome.removed.is_empty() {
            return;
        }
        summary.pairs += 1;
        summary.removed += outcome.entries_removed();
        if outcome.replacement.is_some() {
            summary.created += 1;
        }

        tracing::debug!(
            step = time,
            agent = agent_id,
            counterpart = counterpart_id,
            balance = outcome.balance,
            removed = outcome.entries_removed(),
            "pair netted"
        );
        self.event_log.log(Event::Netted {
            step: time,
            agent_id: agent_id.to_string(),
            counterpart_id: counterpart_id.to_string(),
            balance: outcome.balance,
            removed: outcome.entries_removed(),
            replacement: outcome.replacement,
        });
    }
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("config", &self.config)
            .field("rng", &self.rng)
            .field("events", &self.event_log.len())
            .finish_non_exhaustive()
    }
}
