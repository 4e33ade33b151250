//! The campaign engine: the only place with side effects.
//!
//! Every operation follows the same shape: read records from the store,
//! call the pure subsystem function with an explicit `now`, persist the
//! result, then emit audit events.
//!
//! SCHEDULED SWEEP ORDER (fixed, documented, never reordered):
//!   1. Opposition research completion (all players)
//!   2. Phase synchronisation          (per live player)
//!   3. Endorsement expiry             (per live player)
//!   4. Scandal auto-resolution        (per live player)
//!   5. Scandal spawn roll             (per live player)
//!   6. Polling snapshot               (per live player)
//!
//! RULES:
//!   - Subsystem functions never see the store, the clock or a sink.
//!   - Validation and transitions are checked before anything is written.
//!   - All randomness flows through seeds derived from the cycle seed.
//!   - Every state change is recorded through the audit sinks.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    balance_subsystem::{compute_balance_adjustment, fair_probability, BalanceAdjustment, CandidatePolling},
    clock::Clock,
    command::{CommandOutcome, PlayerCommand, QueuedCommand},
    config::SimConfig,
    endorsement_subsystem::{
        self, portfolio, recommend_categories, sweep_expired, total_active_bonus, EndorsementCategory,
        EndorsementPortfolio, EndorsementRecord, EndorsementTier,
    },
    error::{SimError, SimResult},
    event::{AuditSink, EventLogEntry, SimEvent},
    fairness_subsystem::{analyze_divergence, floor_audit, DivergenceReport, InfluenceSnapshot},
    influence_subsystem::{compute_baseline_influence, InfluenceBreakdown, InfluenceInputs},
    negative_ad_subsystem::{
        self, combined_reduction, view, AdRequest, CounterAd, NegativeAd, NegativeAdView,
    },
    opposition_subsystem::{self, OppositionResearch, ResearchType},
    phase_subsystem::{advance_phase, start_cycle, CampaignPhaseState, CampaignStatus},
    polling_subsystem::{
        generate_snapshot, interval_index, snapshot_due, summarize_trend, PollingInputs,
        PollingSnapshot, TrendSummary,
    },
    rng::{compose_seed, derive_seed, SeedPurpose},
    scandal_subsystem::{
        self, contain, effective_reputation, generate_scandal, should_generate, sweep_resolvable,
        MitigationAction, ScandalCategory, ScandalRecord,
    },
    snapshot::{CampaignSnapshot, SNAPSHOT_FORMAT},
    spend::{check_budget, SpendOutcome},
    store::RecordStore,
    types::{Instant, PlayerId, RunId},
};

const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// What one scheduled sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub players:              usize,
    pub phase_changes:        usize,
    pub cycles_completed:     usize,
    pub research_completed:   usize,
    pub endorsements_expired: usize,
    pub scandals_resolved:    usize,
    pub scandals_spawned:     usize,
    pub polls_taken:          usize,
}

pub struct CampaignEngine {
    pub run_id: RunId,
    store:      Box<dyn RecordStore>,
    clock:      Arc<dyn Clock>,
    config:     SimConfig,
    sinks:      Vec<Box<dyn AuditSink>>,
}

impl CampaignEngine {
    /// Wire an engine and register the run in the audit log.
    pub fn new(
        run_id: RunId,
        store: Box<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        config: SimConfig,
    ) -> SimResult<Self> {
        let engine = Self {
            run_id,
            store,
            clock,
            config,
            sinks: Vec::new(),
        };
        let now = engine.now();
        engine.store.insert_run(&engine.run_id, now, ENGINE_VERSION)?;
        engine.record(
            "engine",
            SimEvent::RunInitialized {
                run_id: engine.run_id.clone(),
            },
        )?;
        Ok(engine)
    }

    /// Add an extra audit sink. The store itself is always a sink.
    pub fn with_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Audit trail for one player in this run, oldest first.
    pub fn events_for_player(&self, player_id: &str) -> SimResult<Vec<EventLogEntry>> {
        self.store.events_for_player(&self.run_id, player_id)
    }

    fn record(&self, subsystem: &str, event: SimEvent) -> SimResult<()> {
        let entry = EventLogEntry::new(&self.run_id, subsystem, &event, self.now())?;
        self.store.emit(&entry);
        for sink in &self.sinks {
            sink.emit(&entry);
        }
        Ok(())
    }

    fn spend_rejected<T>(&self, player_id: &str, action: &str, outcome: &SpendOutcome<T>) -> SimResult<()> {
        if let SpendOutcome::Insufficient { cost, available } = outcome {
            log::info!("spend: {player_id} cannot afford {action} (${cost:.0} > ${available:.0})");
            self.record(
                "spend",
                SimEvent::SpendRejected {
                    player_id: player_id.to_string(),
                    action:    action.to_string(),
                    cost:      *cost,
                    available: *available,
                },
            )?;
        }
        Ok(())
    }

    // ── Campaign cycle ───────────────────────────────────────────────────────

    /// Newest stored cycle, as persisted (no phase re-derivation).
    pub fn stored_state(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        self.store
            .latest_campaign_state(player_id)?
            .ok_or_else(|| SimError::not_found("campaign", player_id))
    }

    /// Newest cycle with its phase re-derived at `now`. Persists a phase
    /// change and completes a running cycle that has reached its end.
    pub fn campaign_state(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        let stored = self.stored_state(player_id)?;
        Ok(self.sync_phase(stored)?.0)
    }

    /// Returns the synced state plus (phase changed, cycle completed).
    fn sync_phase(&self, stored: CampaignPhaseState) -> SimResult<(CampaignPhaseState, bool, bool)> {
        let now = self.now();
        let transition = advance_phase(&stored, now);
        let changed = transition.changed();
        let mut state = if changed {
            let saved = self.store.update_campaign_state(&transition.state)?;
            log::debug!(
                "phase: {} {} -> {}",
                saved.player_id,
                transition.from,
                transition.to
            );
            self.record(
                "phase",
                SimEvent::PhaseAdvanced {
                    player_id: saved.player_id.clone(),
                    cycle:     saved.cycle,
                    from:      transition.from,
                    to:        transition.to,
                    early:     false,
                },
            )?;
            saved
        } else {
            transition.state
        };

        let mut completed = false;
        if transition.cycle_complete && state.is_live() {
            state = self.store.update_campaign_state(&state.complete(now)?)?;
            completed = true;
            log::info!("phase: {} finished cycle {}", state.player_id, state.cycle);
            self.record(
                "phase",
                SimEvent::CampaignCompleted {
                    player_id:  state.player_id.clone(),
                    cycle:      state.cycle,
                    reputation: state.reputation,
                },
            )?;
        }
        Ok((state, changed, completed))
    }

    fn live_state(&self, player_id: &str, action: &str) -> SimResult<CampaignPhaseState> {
        let state = self.campaign_state(player_id)?;
        if !state.is_live() {
            return Err(SimError::transition(state.machine.status, action));
        }
        Ok(state)
    }

    /// Start the player's first cycle, or roll over into the next one once
    /// the previous cycle has finished.
    pub fn start_campaign(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        let previous = match self.store.latest_campaign_state(player_id)? {
            Some(stored) => Some(self.sync_phase(stored)?.0),
            None => None,
        };
        let state = start_cycle(player_id, self.now(), previous.as_ref(), &self.config)?;
        self.store.insert_campaign_state(&state)?;
        // Unresolved scandals follow the candidate into the new cycle.
        let state = self.refresh_scandal_count(player_id)?;
        log::info!(
            "phase: {player_id} started cycle {} (SPI {:.2}, VM {:.2})",
            state.cycle,
            state.difficulty.spend_pressure,
            state.difficulty.volatility_modifier
        );
        self.record(
            "phase",
            SimEvent::CampaignStarted {
                player_id:      player_id.to_string(),
                cycle:          state.cycle,
                seed:           state.seed.clone(),
                spend_pressure: state.difficulty.spend_pressure,
                volatility:     state.difficulty.volatility_modifier,
                saturation:     state.difficulty.engagement_saturation,
            },
        )?;
        Ok(state)
    }

    /// Re-derive the player's phase now. Same as `campaign_state`, named
    /// for callers driving the cycle explicitly.
    pub fn advance_phase(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        self.campaign_state(player_id)
    }

    pub fn pause(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        let state = self.campaign_state(player_id)?;
        let saved = self.store.update_campaign_state(&state.pause(self.now())?)?;
        self.record(
            "phase",
            SimEvent::CampaignPaused {
                player_id: player_id.to_string(),
                cycle:     saved.cycle,
            },
        )?;
        Ok(saved)
    }

    pub fn resume(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        let state = self.stored_state(player_id)?;
        let saved = self.store.update_campaign_state(&state.resume(self.now())?)?;
        self.record(
            "phase",
            SimEvent::CampaignResumed {
                player_id: player_id.to_string(),
                cycle:     saved.cycle,
            },
        )?;
        Ok(self.sync_phase(saved)?.0)
    }

    pub fn withdraw(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        let state = self.campaign_state(player_id)?;
        let saved = self.store.update_campaign_state(&state.withdraw(self.now())?)?;
        log::info!("phase: {player_id} withdrew during {}", saved.active_phase);
        self.record(
            "phase",
            SimEvent::CampaignWithdrawn {
                player_id: player_id.to_string(),
                cycle:     saved.cycle,
                phase:     saved.active_phase,
            },
        )?;
        Ok(saved)
    }

    pub fn complete(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        let state = self.campaign_state(player_id)?;
        let saved = self.store.update_campaign_state(&state.complete(self.now())?)?;
        self.record(
            "phase",
            SimEvent::CampaignCompleted {
                player_id:  player_id.to_string(),
                cycle:      saved.cycle,
                reputation: saved.reputation,
            },
        )?;
        Ok(saved)
    }

    /// Leave the current phase before its timer runs out.
    pub fn advance_early(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        let state = self.campaign_state(player_id)?;
        let from = state.active_phase;
        let saved = self
            .store
            .update_campaign_state(&state.advance_early(self.now(), &self.config.phase)?)?;
        self.record(
            "phase",
            SimEvent::PhaseAdvanced {
                player_id: player_id.to_string(),
                cycle:     saved.cycle,
                from,
                to:        saved.active_phase,
                early:     true,
            },
        )?;
        Ok(saved)
    }

    pub fn submit_debate(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        let state = self.campaign_state(player_id)?;
        let saved = self
            .store
            .update_campaign_state(&state.submit_debate_performance(self.now())?)?;
        self.record(
            "phase",
            SimEvent::DebateSubmitted {
                player_id: player_id.to_string(),
                cycle:     saved.cycle,
            },
        )?;
        Ok(saved)
    }

    /// Credit a donation, boosted by the fundraising bonus of every active
    /// endorsement. Returns the new state and the amount that landed.
    pub fn raise_funds(&self, player_id: &str, amount: f64) -> SimResult<(CampaignPhaseState, f64)> {
        let state = self.campaign_state(player_id)?;
        let endorsements = self.store.endorsements_for(player_id)?;
        let bonus = total_active_bonus(&endorsements, self.now());
        let (next, credited) = state.raise_funds(amount, bonus.fundraising, &self.config.phase)?;
        let saved = self.store.update_campaign_state(&next)?;
        self.record(
            "phase",
            SimEvent::FundsRaised {
                player_id: player_id.to_string(),
                requested: amount,
                credited,
            },
        )?;
        Ok((saved, credited))
    }

    // ── Polling ──────────────────────────────────────────────────────────────

    /// Take a polling snapshot now. Reputation is net of active scandals.
    pub fn take_poll(&self, player_id: &str) -> SimResult<PollingSnapshot> {
        let state = self.campaign_state(player_id)?;
        self.poll_with_state(&state)
    }

    fn poll_with_state(&self, state: &CampaignPhaseState) -> SimResult<PollingSnapshot> {
        let now = self.now();
        let previous = self.store.latest_polling_snapshot(&state.player_id)?;
        let reputation = self.effective_reputation_for(state, now)?;
        let inputs = PollingInputs::from_state(state).with_reputation(reputation);
        let snapshot = generate_snapshot(
            &state.player_id,
            &state.seed,
            &inputs,
            previous.as_ref(),
            now,
            &self.config.polling,
        );
        self.store.insert_polling_snapshot(&snapshot)?;
        self.record(
            "polling",
            SimEvent::PollingSnapshotTaken {
                player_id:       state.player_id.clone(),
                final_support:   snapshot.final_support,
                margin_of_error: snapshot.margin_of_error,
                sample_size:     snapshot.sample_size,
            },
        )?;
        Ok(snapshot)
    }

    pub fn latest_poll(&self, player_id: &str) -> SimResult<Option<PollingSnapshot>> {
        self.store.latest_polling_snapshot(player_id)
    }

    /// Trend over the current cycle's snapshots.
    pub fn polling_trend(&self, player_id: &str, window: usize) -> SimResult<Option<TrendSummary>> {
        let state = self.stored_state(player_id)?;
        let snapshots =
            self.store
                .polling_snapshots_between(player_id, state.machine.started_at, self.now())?;
        Ok(summarize_trend(&snapshots, window, &self.config.polling))
    }

    // ── Endorsements ─────────────────────────────────────────────────────────

    pub fn acquire_endorsement(
        &self,
        player_id: &str,
        category: EndorsementCategory,
        tier: EndorsementTier,
    ) -> SimResult<EndorsementRecord> {
        let state = self.live_state(player_id, "acquire an endorsement")?;
        let prior = self.store.endorsement_tally(player_id, category)?;
        let record = endorsement_subsystem::acquire_endorsement(
            &uuid::Uuid::new_v4().to_string(),
            player_id,
            category,
            tier,
            prior,
            self.now(),
            &self.config.endorsement,
        );
        self.store.insert_endorsement(&record)?;
        self.store
            .update_campaign_state(&state.with_endorsement_count(state.endorsements_acquired + 1))?;
        self.record(
            "endorsement",
            SimEvent::EndorsementAcquired {
                player_id:          player_id.to_string(),
                endorsement_id:     record.endorsement_id.clone(),
                category:           category.as_str().to_string(),
                diminishing_factor: record.diminishing_factor,
                influence_bonus:    record.influence_bonus,
            },
        )?;
        Ok(record)
    }

    pub fn endorsement_portfolio(&self, player_id: &str) -> SimResult<EndorsementPortfolio> {
        let records = self.store.endorsements_for(player_id)?;
        Ok(portfolio(&records, self.now()))
    }

    pub fn recommend_endorsements(&self, player_id: &str) -> SimResult<Vec<EndorsementCategory>> {
        let state = self.campaign_state(player_id)?;
        let held = self.endorsement_portfolio(player_id)?;
        Ok(recommend_categories(&held, state.active_phase))
    }

    /// Drop expired endorsements. Returns how many were removed.
    pub fn sweep_endorsements(&self, player_id: &str) -> SimResult<usize> {
        let records = self.store.endorsements_for(player_id)?;
        let (_, expired) = sweep_expired(records, self.now());
        if expired.is_empty() {
            return Ok(0);
        }
        let ids: Vec<_> = expired.iter().map(|r| r.endorsement_id.clone()).collect();
        let removed = self.store.delete_endorsements(&ids)?;
        log::debug!("endorsement: {player_id} lost {removed} expired endorsements");
        self.record(
            "endorsement",
            SimEvent::EndorsementsExpired {
                player_id: player_id.to_string(),
                count:     removed,
            },
        )?;
        Ok(removed)
    }

    // ── Scandals ─────────────────────────────────────────────────────────────

    fn effective_reputation_for(&self, state: &CampaignPhaseState, now: Instant) -> SimResult<f64> {
        let scandals = self.store.scandals_for(&state.player_id)?;
        Ok(effective_reputation(state.reputation, &scandals, now, &self.config.scandal))
    }

    /// Base reputation less the current impact of every active scandal.
    pub fn effective_reputation(&self, player_id: &str) -> SimResult<f64> {
        let state = self.stored_state(player_id)?;
        self.effective_reputation_for(&state, self.now())
    }

    pub fn scandals(&self, player_id: &str) -> SimResult<Vec<ScandalRecord>> {
        self.store.scandals_for(player_id)
    }

    fn owned_scandal(&self, player_id: &str, scandal_id: &str) -> SimResult<ScandalRecord> {
        match self.store.scandal(scandal_id)? {
            Some(record) if record.player_id == player_id => Ok(record),
            _ => Err(SimError::not_found("scandal", scandal_id)),
        }
    }

    fn refresh_scandal_count(&self, player_id: &str) -> SimResult<CampaignPhaseState> {
        let state = self.stored_state(player_id)?;
        let active = self
            .store
            .scandals_for(player_id)?
            .iter()
            .filter(|s| s.is_active())
            .count() as u32;
        if active == state.active_scandals {
            return Ok(state);
        }
        self.store.update_campaign_state(&state.with_active_scandals(active))
    }

    /// Break a scandal now. `category` forces the category, otherwise it is
    /// rolled from the weighted table.
    pub fn trigger_scandal(
        &self,
        player_id: &str,
        category: Option<ScandalCategory>,
    ) -> SimResult<ScandalRecord> {
        let state = self.live_state(player_id, "trigger a scandal")?;
        let count = self.store.scandals_for(player_id)?.len();
        let seed = derive_seed(&state.seed, SeedPurpose::ScandalCategory, &format!("manual:{count}"));
        self.spawn_scandal(&state, &seed, category)
    }

    fn spawn_scandal(
        &self,
        state: &CampaignPhaseState,
        seed: &str,
        category: Option<ScandalCategory>,
    ) -> SimResult<ScandalRecord> {
        let record = generate_scandal(
            &uuid::Uuid::new_v4().to_string(),
            &state.player_id,
            seed,
            category,
            self.now(),
            &self.config.scandal,
        );
        self.store.insert_scandal(&record)?;
        self.refresh_scandal_count(&state.player_id)?;
        log::info!(
            "scandal: {} hit by {} (severity {:.2})",
            state.player_id,
            record.category,
            record.severity
        );
        self.record(
            "scandal",
            SimEvent::ScandalDiscovered {
                player_id:      state.player_id.clone(),
                scandal_id:     record.scandal_id.clone(),
                category:       record.category.as_str().to_string(),
                severity:       record.severity,
                reputation_hit: record.reputation_hit,
            },
        )?;
        Ok(record)
    }

    /// Seeded per-interval spawn roll. At most one roll per interval.
    fn roll_scandal(&self, state: &CampaignPhaseState) -> SimResult<Option<ScandalRecord>> {
        let now = self.now();
        let interval = interval_index(now, &self.config.polling);
        let already = self
            .store
            .scandals_for(&state.player_id)?
            .iter()
            .any(|s| interval_index(s.discovered_at, &self.config.polling) == interval);
        let discriminator = interval.to_string();
        if already || !should_generate(state, &discriminator, &self.config.scandal) {
            return Ok(None);
        }
        let seed = derive_seed(&state.seed, SeedPurpose::ScandalCategory, &discriminator);
        self.spawn_scandal(state, &seed, None).map(Some)
    }

    pub fn mitigate_scandal(
        &self,
        player_id: &str,
        scandal_id: &str,
        action: MitigationAction,
    ) -> SimResult<SpendOutcome<ScandalRecord>> {
        let state = self.campaign_state(player_id)?;
        let record = self.owned_scandal(player_id, scandal_id)?;
        let mitigated = scandal_subsystem::apply_mitigation(
            &record,
            action,
            state.difficulty.engagement_saturation,
            &self.config.scandal,
        )?;
        let cost = action.cost() * self.cost_multiplier(player_id)?;
        if let Some(short) = check_budget(cost, state.available_funds()) {
            self.spend_rejected(player_id, action.as_str(), &short)?;
            return Ok(short);
        }
        self.store.update_campaign_state(&state.spend(cost)?)?;
        self.store.update_scandal(&mitigated)?;
        self.record(
            "scandal",
            SimEvent::ScandalMitigated {
                player_id:     player_id.to_string(),
                scandal_id:    scandal_id.to_string(),
                action:        action.as_str().to_string(),
                recovery_rate: mitigated.recovery_rate_per_hour,
                cost,
            },
        )?;
        Ok(SpendOutcome::Completed { value: mitigated, cost })
    }

    pub fn contain_scandal(&self, player_id: &str, scandal_id: &str) -> SimResult<ScandalRecord> {
        let record = self.owned_scandal(player_id, scandal_id)?;
        let contained = contain(&record, self.now())?;
        self.store.update_scandal(&contained)?;
        self.record(
            "scandal",
            SimEvent::ScandalContained {
                player_id:  player_id.to_string(),
                scandal_id: scandal_id.to_string(),
            },
        )?;
        Ok(contained)
    }

    pub fn resolve_scandal(&self, player_id: &str, scandal_id: &str) -> SimResult<ScandalRecord> {
        let record = self.owned_scandal(player_id, scandal_id)?;
        let resolved = scandal_subsystem::resolve(&record, self.now(), &self.config.scandal)?;
        self.store.update_scandal(&resolved)?;
        self.refresh_scandal_count(player_id)?;
        self.record(
            "scandal",
            SimEvent::ScandalResolved {
                player_id:  player_id.to_string(),
                scandal_id: scandal_id.to_string(),
                automatic:  false,
            },
        )?;
        Ok(resolved)
    }

    /// Auto-resolve scandals whose impact has faded. Returns the resolved records.
    pub fn sweep_scandals(&self, player_id: &str) -> SimResult<Vec<ScandalRecord>> {
        let records = self.store.scandals_for(player_id)?;
        let resolved = sweep_resolvable(&records, self.now(), &self.config.scandal);
        if resolved.is_empty() {
            return Ok(resolved);
        }
        for record in &resolved {
            self.store.update_scandal(record)?;
            self.record(
                "scandal",
                SimEvent::ScandalResolved {
                    player_id:  player_id.to_string(),
                    scandal_id: record.scandal_id.clone(),
                    automatic:  true,
                },
            )?;
        }
        self.refresh_scandal_count(player_id)?;
        log::debug!("scandal: {player_id} auto-resolved {}", resolved.len());
        Ok(resolved)
    }

    // ── Opposition research ──────────────────────────────────────────────────

    fn ensure_rival(&self, player_id: &str, target_id: &str) -> SimResult<()> {
        if !target_id.is_empty()
            && target_id != player_id
            && self.store.latest_campaign_state(target_id)?.is_none()
        {
            return Err(SimError::not_found("campaign", target_id));
        }
        Ok(())
    }

    pub fn commission_research(
        &self,
        player_id: &str,
        target_id: &str,
        research_type: ResearchType,
        amount: f64,
    ) -> SimResult<SpendOutcome<OppositionResearch>> {
        let state = self.live_state(player_id, "commission research")?;
        self.ensure_rival(player_id, target_id)?;
        let history = self.store.research_for(player_id)?;
        let outcome = opposition_subsystem::commission_research(
            &uuid::Uuid::new_v4().to_string(),
            player_id,
            target_id,
            research_type,
            amount,
            &history,
            state.available_funds(),
            &state.seed,
            self.now(),
        )?
        .with_cost_multiplier(self.cost_multiplier(player_id)?, state.available_funds());
        let (research, cost) = match outcome {
            SpendOutcome::Completed { value, cost } => (value, cost),
            short @ SpendOutcome::Insufficient { .. } => {
                self.spend_rejected(player_id, "commission_research", &short)?;
                return Ok(short);
            }
        };
        self.store.update_campaign_state(&state.spend(cost)?)?;
        self.store.insert_research(&research)?;
        log::info!("opposition: {player_id} commissioned {research_type} on {target_id} (${cost:.0})");
        self.record(
            "opposition",
            SimEvent::ResearchCommissioned {
                player_id:     player_id.to_string(),
                research_id:   research.research_id.clone(),
                target_id:     target_id.to_string(),
                research_type: research_type.as_str().to_string(),
                cost,
            },
        )?;
        Ok(SpendOutcome::Completed { value: research, cost })
    }

    pub fn research(&self, player_id: &str) -> SimResult<Vec<OppositionResearch>> {
        self.store.research_for(player_id)
    }

    pub fn complete_research(&self, player_id: &str, research_id: &str) -> SimResult<OppositionResearch> {
        let research = match self.store.research(research_id)? {
            Some(r) if r.player_id == player_id => r,
            _ => return Err(SimError::not_found("research", research_id)),
        };
        self.finish_research(&research)
    }

    fn finish_research(&self, research: &OppositionResearch) -> SimResult<OppositionResearch> {
        let done = opposition_subsystem::complete_research(research, self.now(), &self.config.research)?;
        self.store.update_research(&done)?;
        self.record(
            "opposition",
            SimEvent::ResearchCompleted {
                player_id:   done.player_id.clone(),
                research_id: done.research_id.clone(),
                status:      done.status.as_str().to_string(),
                tier:        done.discovery.as_ref().map(|d| d.tier.as_str().to_string()),
            },
        )?;
        Ok(done)
    }

    // ── Negative ads ─────────────────────────────────────────────────────────

    /// Launch an attack ad. Support deltas land on both campaigns' polled
    /// support immediately; the ad record itself never changes.
    pub fn launch_negative_ad(&self, player_id: &str, request: &AdRequest) -> SimResult<SpendOutcome<NegativeAd>> {
        let state = self.campaign_state(player_id)?;
        self.ensure_rival(player_id, &request.target_id)?;
        let research = match &request.research_id {
            Some(id) => self.store.research(id)?,
            None => None,
        };
        let history = self.store.negative_ads_by(player_id)?;
        let outcome = negative_ad_subsystem::launch_negative_ad(
            &uuid::Uuid::new_v4().to_string(),
            &state,
            request,
            research.as_ref(),
            &history,
            self.now(),
            &self.config.negative_ad,
        )?
        .with_cost_multiplier(self.cost_multiplier(player_id)?, state.available_funds());
        let (ad, cost) = match outcome {
            SpendOutcome::Completed { value, cost } => (value, cost),
            short @ SpendOutcome::Insufficient { .. } => {
                self.spend_rejected(player_id, "launch_negative_ad", &short)?;
                return Ok(short);
            }
        };

        let attacker = state.spend(cost)?.apply_support_delta(ad.attacker_support_delta);
        self.store.update_campaign_state(&attacker)?;
        let target = self.campaign_state(&ad.target_id)?;
        let ad = if target.is_live() {
            self.store
                .update_campaign_state(&target.apply_support_delta(ad.target_support_delta))?;
            NegativeAd { applied_target_delta: ad.target_support_delta, ..ad }
        } else {
            ad
        };
        self.store.insert_negative_ad(&ad)?;
        log::info!(
            "negative_ad: {player_id} -> {} eff {:.1}{}",
            ad.target_id,
            ad.effectiveness,
            if ad.backfired { " (backfired)" } else { "" }
        );
        self.record(
            "negative_ad",
            SimEvent::NegativeAdLaunched {
                player_id:     player_id.to_string(),
                ad_id:         ad.ad_id.clone(),
                target_id:     ad.target_id.clone(),
                effectiveness: ad.effectiveness,
                backfired:     ad.backfired,
                ethics:        ad.ethics_penalty,
            },
        )?;
        Ok(SpendOutcome::Completed { value: ad, cost })
    }

    /// Buy a counter ad against an ad aimed at `player_id`. The share of
    /// the hit that actually landed and that the counter removes is
    /// restored to the player's support.
    pub fn counter_negative_ad(
        &self,
        player_id: &str,
        ad_id: &str,
        amount: f64,
    ) -> SimResult<SpendOutcome<CounterAd>> {
        let ad = self
            .store
            .negative_ad(ad_id)?
            .ok_or_else(|| SimError::not_found("negative ad", ad_id))?;
        let state = self.live_state(player_id, "counter a negative ad")?;
        let existing = self.store.counters_for(ad_id)?;
        let outcome = negative_ad_subsystem::counter_negative_ad(
            &uuid::Uuid::new_v4().to_string(),
            player_id,
            &ad,
            amount,
            state.available_funds(),
            self.now(),
            &self.config.negative_ad,
        )?;
        let (counter, cost) = match outcome {
            SpendOutcome::Completed { value, cost } => (value, cost),
            short @ SpendOutcome::Insufficient { .. } => {
                self.spend_rejected(player_id, "counter_negative_ad", &short)?;
                return Ok(short);
            }
        };

        let before = combined_reduction(&existing, &self.config.negative_ad);
        let mut all = existing;
        all.push(counter.clone());
        let after = combined_reduction(&all, &self.config.negative_ad);
        let restored = if ad.backfired {
            0.0
        } else {
            -ad.applied_target_delta * (after - before)
        };
        self.store
            .update_campaign_state(&state.spend(cost)?.apply_support_delta(restored))?;
        self.store.insert_counter_ad(&counter)?;
        self.record(
            "negative_ad",
            SimEvent::NegativeAdCountered {
                player_id:  player_id.to_string(),
                counter_id: counter.counter_id.clone(),
                ad_id:      ad_id.to_string(),
                reduction:  counter.reduction,
            },
        )?;
        Ok(SpendOutcome::Completed { value: counter, cost })
    }

    pub fn negative_ad_view(&self, ad_id: &str) -> SimResult<NegativeAdView> {
        let ad = self
            .store
            .negative_ad(ad_id)?
            .ok_or_else(|| SimError::not_found("negative ad", ad_id))?;
        let counters = self.store.counters_for(ad_id)?;
        Ok(view(&ad, &counters, &self.config.negative_ad))
    }

    /// Every ad aimed at `player_id`, with counters applied.
    pub fn ads_against(&self, player_id: &str) -> SimResult<Vec<NegativeAdView>> {
        self.store
            .negative_ads_against(player_id)?
            .iter()
            .map(|ad| {
                let counters = self.store.counters_for(&ad.ad_id)?;
                Ok(view(ad, &counters, &self.config.negative_ad))
            })
            .collect()
    }

    // ── Competitive balance ──────────────────────────────────────────────────

    /// Standing of `player_id` against every player's latest poll.
    pub fn balance_adjustment(&self, player_id: &str) -> SimResult<BalanceAdjustment> {
        let pollings: Vec<CandidatePolling> = self
            .store
            .latest_polling_all()?
            .into_iter()
            .map(|s| CandidatePolling {
                player_id: s.player_id,
                support:   s.final_support,
            })
            .collect();
        compute_balance_adjustment(player_id, &pollings, &self.config.balance)
    }

    /// Frontrunner surcharge on `player_id`'s spending. 1.0 until the
    /// player has been polled.
    fn cost_multiplier(&self, player_id: &str) -> SimResult<f64> {
        if self.store.latest_polling_snapshot(player_id)?.is_none() {
            return Ok(1.0);
        }
        Ok(self.balance_adjustment(player_id)?.cost_multiplier)
    }

    pub fn fair_probability(&self, player_id: &str, base_probability: f64) -> SimResult<f64> {
        let adjustment = self.balance_adjustment(player_id)?;
        Ok(fair_probability(base_probability, &adjustment, &self.config.balance))
    }

    // ── Influence & fairness ─────────────────────────────────────────────────

    /// Compute and store the player's baseline influence. A value the
    /// retention floor had to raise is audited.
    pub fn compute_influence(&self, player_id: &str, inputs: &InfluenceInputs) -> SimResult<InfluenceBreakdown> {
        let now = self.now();
        let cycle = self
            .store
            .latest_campaign_state(player_id)?
            .map(|s| s.cycle)
            .unwrap_or(0);
        let previous = self.store.latest_influence_snapshot(player_id)?;
        let seed = compose_seed(
            player_id,
            cycle,
            SeedPurpose::InfluenceJitter,
            &interval_index(now, &self.config.polling).to_string(),
        );
        let breakdown = compute_baseline_influence(inputs, previous.as_ref(), &seed, &self.config)?;

        self.store.insert_influence_snapshot(&InfluenceSnapshot {
            player_id:   player_id.to_string(),
            total:       breakdown.total as f64,
            computed_at: now,
        })?;
        self.record(
            "influence",
            SimEvent::InfluenceComputed {
                player_id: player_id.to_string(),
                total:     breakdown.total,
                floor:     breakdown.floor,
            },
        )?;
        if let Some(audit) = floor_audit(player_id, breakdown.compressed, breakdown.floored, previous.as_ref(), now) {
            log::info!("fairness: {}", audit.reason);
            self.record("fairness", SimEvent::FairnessAudit { audit })?;
        }
        Ok(breakdown)
    }

    /// Compare an online and an offline computation of the same value.
    pub fn check_divergence(
        &self,
        player_id: &str,
        online: f64,
        offline: f64,
        reference_at: Option<Instant>,
    ) -> SimResult<DivergenceReport> {
        let report = analyze_divergence(
            player_id,
            online,
            offline,
            self.now(),
            reference_at,
            &self.config.fairness,
        );
        if let Some(audit) = &report.audit {
            log::warn!("fairness: {}", audit.reason);
            self.record("fairness", SimEvent::FairnessAudit { audit: audit.clone() })?;
        }
        Ok(report)
    }

    // ── Snapshots ────────────────────────────────────────────────────────────

    /// Everything stored about one player, as a portable snapshot.
    pub fn export_snapshot(&self, player_id: &str) -> SimResult<CampaignSnapshot> {
        let state = self.stored_state(player_id)?;
        let mut ads = self.store.negative_ads_by(player_id)?;
        ads.extend(self.store.negative_ads_against(player_id)?);
        ads.sort_by(|a, b| a.launched_at.cmp(&b.launched_at).then(a.ad_id.cmp(&b.ad_id)));
        ads.dedup_by(|a, b| a.ad_id == b.ad_id);
        let mut counters = Vec::new();
        for ad in &ads {
            counters.extend(self.store.counters_for(&ad.ad_id)?);
        }
        let mut tallies = BTreeMap::new();
        for category in EndorsementCategory::ALL {
            let acquired = self.store.endorsement_tally(player_id, category)?;
            if acquired > 0 {
                tallies.insert(category, acquired);
            }
        }
        Ok(CampaignSnapshot {
            format:       SNAPSHOT_FORMAT,
            player_id:    player_id.to_string(),
            taken_at:     self.now(),
            polls:        self
                .store
                .polling_snapshots_between(player_id, state.machine.started_at, self.now())?,
            endorsements: self.store.endorsements_for(player_id)?,
            tallies,
            scandals:     self.store.scandals_for(player_id)?,
            research:     self.store.research_for(player_id)?,
            ads,
            counters,
            influence:    self.store.latest_influence_snapshot(player_id)?,
            state,
        })
    }

    /// Load a snapshot into this engine's store. The player must not exist yet.
    /// Ads and counters already present (shared with a rival) are skipped.
    pub fn import_snapshot(&self, snapshot: &CampaignSnapshot) -> SimResult<()> {
        let player_id = &snapshot.player_id;
        if self.store.latest_campaign_state(player_id)?.is_some() {
            return Err(SimError::Validation(format!("campaign for {player_id} already exists")));
        }
        self.store.insert_campaign_state(&snapshot.state)?;
        for poll in &snapshot.polls {
            self.store.insert_polling_snapshot(poll)?;
        }
        for record in &snapshot.endorsements {
            self.store.insert_endorsement(record)?;
        }
        for (category, acquired) in &snapshot.tallies {
            self.store.set_endorsement_tally(player_id, *category, *acquired)?;
        }
        for record in &snapshot.scandals {
            self.store.insert_scandal(record)?;
        }
        for research in &snapshot.research {
            self.store.insert_research(research)?;
        }
        for ad in &snapshot.ads {
            if self.store.negative_ad(&ad.ad_id)?.is_none() {
                self.store.insert_negative_ad(ad)?;
            }
        }
        for counter in &snapshot.counters {
            let known = self
                .store
                .counters_for(&counter.ad_id)?
                .iter()
                .any(|c| c.counter_id == counter.counter_id);
            if !known {
                self.store.insert_counter_ad(counter)?;
            }
        }
        if let Some(influence) = &snapshot.influence {
            self.store.insert_influence_snapshot(influence)?;
        }
        log::info!("snapshot: imported {player_id} (cycle {})", snapshot.state.cycle);
        Ok(())
    }

    // ── Commands & scheduling ────────────────────────────────────────────────

    /// Apply one player command.
    pub fn submit_command(&self, queued: &QueuedCommand) -> SimResult<CommandOutcome> {
        let player_id = queued.player_id.as_str();
        self.record(
            "engine",
            SimEvent::PlayerCommandReceived {
                player_id:    player_id.to_string(),
                command_type: queued.command.name().to_string(),
            },
        )?;
        let outcome = match &queued.command {
            PlayerCommand::StartCampaign => CommandOutcome::State {
                state: self.start_campaign(player_id)?,
            },
            PlayerCommand::Pause => CommandOutcome::State { state: self.pause(player_id)? },
            PlayerCommand::Resume => CommandOutcome::State { state: self.resume(player_id)? },
            PlayerCommand::Withdraw => CommandOutcome::State { state: self.withdraw(player_id)? },
            PlayerCommand::Complete => CommandOutcome::State { state: self.complete(player_id)? },
            PlayerCommand::AdvanceEarly => CommandOutcome::State {
                state: self.advance_early(player_id)?,
            },
            PlayerCommand::SubmitDebate => CommandOutcome::State {
                state: self.submit_debate(player_id)?,
            },
            PlayerCommand::RaiseFunds { amount } => {
                let (state, credited) = self.raise_funds(player_id, *amount)?;
                CommandOutcome::FundsRaised { state, credited }
            }
            PlayerCommand::TakePoll => CommandOutcome::Poll {
                snapshot: self.take_poll(player_id)?,
            },
            PlayerCommand::AcquireEndorsement { category, tier } => CommandOutcome::Endorsement {
                record: self.acquire_endorsement(player_id, *category, *tier)?,
            },
            PlayerCommand::TriggerScandal { category } => CommandOutcome::Scandal {
                record: self.trigger_scandal(player_id, *category)?,
            },
            PlayerCommand::MitigateScandal { scandal_id, action } => CommandOutcome::Mitigation {
                outcome: self.mitigate_scandal(player_id, scandal_id, *action)?,
            },
            PlayerCommand::ContainScandal { scandal_id } => CommandOutcome::Scandal {
                record: self.contain_scandal(player_id, scandal_id)?,
            },
            PlayerCommand::ResolveScandal { scandal_id } => CommandOutcome::Scandal {
                record: self.resolve_scandal(player_id, scandal_id)?,
            },
            PlayerCommand::CommissionResearch { target_id, research_type, amount } => {
                CommandOutcome::Research {
                    outcome: self.commission_research(player_id, target_id, *research_type, *amount)?,
                }
            }
            PlayerCommand::CompleteResearch { research_id } => CommandOutcome::ResearchResult {
                research: self.complete_research(player_id, research_id)?,
            },
            PlayerCommand::LaunchNegativeAd(request) => CommandOutcome::NegativeAd {
                outcome: self.launch_negative_ad(player_id, request)?,
            },
            PlayerCommand::CounterNegativeAd { ad_id, amount } => CommandOutcome::Counter {
                outcome: self.counter_negative_ad(player_id, ad_id, *amount)?,
            },
            PlayerCommand::BalanceAdjustment => CommandOutcome::Balance {
                adjustment: self.balance_adjustment(player_id)?,
            },
            PlayerCommand::ComputeInfluence(inputs) => CommandOutcome::Influence {
                breakdown: self.compute_influence(player_id, inputs)?,
            },
        };
        Ok(outcome)
    }

    /// One pass of the periodic scheduler at the clock's current time.
    /// Running it twice at the same instant changes nothing the second time.
    pub fn run_scheduled(&self) -> SimResult<SweepReport> {
        let now = self.now();
        let mut report = SweepReport::default();

        for research in self.store.research_due(now)? {
            self.finish_research(&research)?;
            report.research_completed += 1;
        }

        let players: Vec<PlayerId> = self.store.live_players()?;
        report.players = players.len();
        for player_id in &players {
            let stored = self.stored_state(player_id)?;
            let (state, changed, completed) = self.sync_phase(stored)?;
            report.phase_changes += usize::from(changed);
            report.cycles_completed += usize::from(completed);

            report.endorsements_expired += self.sweep_endorsements(player_id)?;
            report.scandals_resolved += self.sweep_scandals(player_id)?.len();

            // A paused campaign is frozen: no scandals, no polls.
            if state.machine.status != CampaignStatus::Running {
                continue;
            }
            if !state.active_phase.is_terminal() {
                let state = self.stored_state(player_id)?;
                if self.roll_scandal(&state)?.is_some() {
                    report.scandals_spawned += 1;
                }
            }

            let previous = self.store.latest_polling_snapshot(player_id)?;
            if snapshot_due(previous.as_ref(), now, &self.config.polling) {
                let state = self.stored_state(player_id)?;
                self.poll_with_state(&state)?;
                report.polls_taken += 1;
            }
        }

        log::debug!("scheduler: {report:?}");
        Ok(report)
    }
}
