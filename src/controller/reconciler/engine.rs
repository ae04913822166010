//! # Reconciliation Engine
//!
//! Turns one [`Batch`] into broker operations and status writes.
//!
//! ## Flow
//!
//! 1. Resolve the batch against the store (full list on resync, single reads otherwise)
//! 2. Handle resources that are gone from the store
//! 3. Classify the rest and release names held by unselected or unmanaged resources
//! 4. Delete topics of resources being finalized
//! 5. Claim names for paused and active resources, Ready owners first
//! 6. One describe call per kind for every owned name, then batched
//!    create / alter-configs / create-partitions / list-reassignments calls
//! 7. One status write per resource whose status changed
//! 8. Reconcile claimants promoted by names released in this batch
//!
//! Broker calls are issued once per operation kind for the whole batch, and
//! each result is mapped back to the resource that asked for it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::conditions::{derive_status, now, status_changed};
use super::config_diff::{canonical_configs, config_ops};
use super::ownership::OwnershipTable;
use super::replicas;
use super::selection::{classify, Disposition};
use super::types::{BatchSummary, Outcome, ReconcileFailure};
use crate::config::ControllerConfig;
use crate::constants::TOPIC_FINALIZER;
use crate::controller::queue::{Batch, WorkItem};
use crate::crd::{KafkaTopic, ResourceRef};
use crate::kafka::{
    KafkaAdmin, KafkaError, KafkaErrorCode, NewTopic, TopicDescription, TopicPartition,
    TopicResults,
};
use crate::observability::metrics;
use crate::store::{StoreError, TopicStore};

pub struct Reconciler {
    pub(super) store: Arc<dyn TopicStore>,
    pub(super) kafka: Arc<dyn KafkaAdmin>,
    pub(super) selector: BTreeMap<String, String>,
    pub(super) use_finalizer: bool,
    pub(super) ownership: OwnershipTable,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("selector", &self.selector)
            .field("use_finalizer", &self.use_finalizer)
            .field("owned_names", &self.ownership.len())
            .finish_non_exhaustive()
    }
}

/// Bookkeeping for one batch
#[derive(Debug, Default)]
pub(super) struct BatchContext {
    pub summary: BatchSummary,
    /// Names given up by their owner during this batch
    pub released: Vec<String>,
    /// Resources already handled in this batch
    pub processed: BTreeSet<ResourceRef>,
}

/// An owned, validated resource going through the broker phase
struct Unit {
    topic: KafkaTopic,
    name: String,
    partitions: Option<i32>,
    replicas: Option<i32>,
    configs: BTreeMap<String, String>,
    live: Option<TopicDescription>,
    partition_decrease: bool,
    rf_candidates: Vec<TopicPartition>,
    failure: Option<ReconcileFailure>,
}

impl Unit {
    /// Keep the first failure; later ones are lower priority
    fn fail(&mut self, failure: ReconcileFailure) {
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }
}

fn unit_mut<'a>(units: &'a mut [Unit], name: &str) -> Option<&'a mut Unit> {
    units.iter_mut().find(|u| u.name == name)
}

fn take_result<T>(results: &mut TopicResults<T>, name: &str) -> Result<T, KafkaError> {
    results.remove(name).unwrap_or_else(|| {
        Err(KafkaError::new(
            KafkaErrorCode::Client,
            format!("No result returned for topic '{name}'"),
        ))
    })
}

/// Whether the resource already reports `Ready=True` for the name it resolves to
fn holds_ready_claim(topic: &KafkaTopic) -> bool {
    let ready = topic
        .status
        .as_ref()
        .and_then(|s| s.condition())
        .is_some_and(|c| c.r#type == "Ready" && c.is_true());
    ready && topic.status_topic_name().map(str::to_string) == topic.resolved_topic_name()
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn TopicStore>,
        kafka: Arc<dyn KafkaAdmin>,
        config: &ControllerConfig,
    ) -> Self {
        Self::with_selector(
            store,
            kafka,
            config.resource_labels.clone(),
            config.use_finalizer,
        )
    }

    pub fn with_selector(
        store: Arc<dyn TopicStore>,
        kafka: Arc<dyn KafkaAdmin>,
        selector: BTreeMap<String, String>,
        use_finalizer: bool,
    ) -> Self {
        Self {
            store,
            kafka,
            selector,
            use_finalizer,
            ownership: OwnershipTable::new(),
        }
    }

    pub fn ownership(&self) -> &OwnershipTable {
        &self.ownership
    }

    /// Reconcile one batch
    ///
    /// Per-resource failures end up in status; only a failure to list the
    /// store on a full resync is returned.
    pub async fn reconcile_batch(&mut self, batch: Batch) -> Result<BatchSummary, StoreError> {
        let mut ctx = BatchContext::default();
        let (present, gone) = self.resolve(batch, &mut ctx).await?;

        self.handle_gone(gone, &mut ctx).await;
        self.process(present, &mut ctx).await;

        let promoted = self.promoted_claimants(&ctx).await;
        if !promoted.is_empty() {
            debug!(count = promoted.len(), "Reconciling promoted claimants");
            self.process(promoted, &mut ctx).await;
        }

        metrics::set_managed_topics(self.ownership.len());
        Ok(ctx.summary)
    }

    /// Split the batch into resources present in the store and resources gone from it
    async fn resolve(
        &mut self,
        batch: Batch,
        ctx: &mut BatchContext,
    ) -> Result<(Vec<KafkaTopic>, Vec<KafkaTopic>), StoreError> {
        let mut gone = Vec::new();

        if batch.full_resync {
            let present = self.store.list().await?;
            let listed: BTreeSet<ResourceRef> =
                present.iter().map(KafkaTopic::resource_ref).collect();
            for item in batch.items {
                if let WorkItem::Delete(topic) = item {
                    if !listed.contains(&topic.resource_ref()) {
                        gone.push(topic);
                    }
                }
            }
            let gone_ids: BTreeSet<ResourceRef> = gone.iter().map(KafkaTopic::resource_ref).collect();
            // Claims of resources that vanished while no event reached us
            for id in self.ownership.resources() {
                if !listed.contains(&id) && !gone_ids.contains(&id) {
                    debug!(resource = %id, "Releasing claim of vanished KafkaTopic");
                    self.release(&id, ctx);
                }
            }
            return Ok((present, gone));
        }

        let mut present = Vec::new();
        for item in batch.items {
            match item {
                WorkItem::Upsert(id) => match self.store.get(&id).await {
                    Ok(Some(topic)) => present.push(topic),
                    Ok(None) => {
                        debug!(resource = %id, "KafkaTopic no longer exists");
                        self.release(&id, ctx);
                    }
                    Err(e) => warn!(
                        resource = %id,
                        error = %e,
                        "Failed to read KafkaTopic, will retry on next full reconciliation"
                    ),
                },
                WorkItem::Delete(topic) => gone.push(topic),
            }
        }
        Ok((present, gone))
    }

    pub(super) async fn process(&mut self, topics: Vec<KafkaTopic>, ctx: &mut BatchContext) {
        let mut finalizing = Vec::new();
        let mut claiming = Vec::new();

        for topic in topics {
            let id = topic.resource_ref();
            if !ctx.processed.insert(id.clone()) {
                continue;
            }
            match classify(&topic, &self.selector) {
                Disposition::Finalizing => finalizing.push(topic),
                Disposition::Terminating => {
                    self.release(&id, ctx);
                    self.finish(&topic, Outcome::Ignored, ctx).await;
                }
                Disposition::Unselected => {
                    debug!(
                        resource.namespace = %id.namespace,
                        resource.name = %id.name,
                        "KafkaTopic does not match the resource selector, ignoring"
                    );
                    self.release(&id, ctx);
                    self.finish(&topic, Outcome::Ignored, ctx).await;
                }
                Disposition::MissingSpec => {
                    debug!(
                        resource.namespace = %id.namespace,
                        resource.name = %id.name,
                        "KafkaTopic has no spec, ignoring"
                    );
                    self.release(&id, ctx);
                    self.finish(&topic, Outcome::Ignored, ctx).await;
                }
                Disposition::Unmanaged => {
                    self.release(&id, ctx);
                    if topic.has_finalizer() {
                        self.update_finalizer(&topic, false).await;
                    }
                    self.finish(&topic, Outcome::Unmanaged, ctx).await;
                }
                Disposition::Paused | Disposition::Active => claiming.push(topic),
            }
        }

        // Ready holders claim first so a deleted claimant cannot take their name
        for topic in claiming.iter().filter(|t| holds_ready_claim(t)) {
            if let Some(name) = topic.resolved_topic_name() {
                self.claim(&name, &topic.resource_ref(), ctx);
            }
        }
        self.finalize(finalizing, ctx).await;
        self.reconcile_claiming(claiming, ctx).await;
    }

    async fn reconcile_claiming(&mut self, topics: Vec<KafkaTopic>, ctx: &mut BatchContext) {
        let (mut ordered, rest): (Vec<_>, Vec<_>) =
            topics.into_iter().partition(holds_ready_claim);
        ordered.extend(rest);

        let mut units = Vec::new();
        for topic in ordered {
            let id = topic.resource_ref();
            let (Some(spec), Some(resolved)) = (topic.spec.clone(), topic.resolved_topic_name())
            else {
                continue;
            };
            self.ensure_finalizer(&topic).await;

            if topic.is_paused() {
                let name = topic
                    .status_topic_name()
                    .map_or_else(|| resolved.clone(), str::to_string);
                self.claim(&name, &id, ctx);
                self.finish(&topic, Outcome::Paused, ctx).await;
                continue;
            }

            if let Some(previous) = topic
                .status_topic_name()
                .filter(|previous| *previous != resolved)
                .map(str::to_string)
            {
                // Keep holding the topic this resource already created
                self.claim(&previous, &id, ctx);
                self.finish(&topic, Outcome::Failed(ReconcileFailure::name_change()), ctx)
                    .await;
                continue;
            }

            let owner = self.claim(&resolved, &id, ctx);
            if owner != id {
                self.finish(
                    &topic,
                    Outcome::Failed(ReconcileFailure::ResourceConflict(owner)),
                    ctx,
                )
                .await;
                continue;
            }

            match canonical_configs(&spec.config) {
                Ok(configs) => units.push(Unit {
                    topic,
                    name: resolved,
                    partitions: spec.partitions,
                    replicas: spec.replicas,
                    configs,
                    live: None,
                    partition_decrease: false,
                    rf_candidates: Vec::new(),
                    failure: None,
                }),
                Err(failure) => self.finish(&topic, Outcome::Failed(failure), ctx).await,
            }
        }

        self.apply(units, ctx).await;
    }

    /// Broker phase for every owned resource of the batch
    async fn apply(&mut self, mut units: Vec<Unit>, ctx: &mut BatchContext) {
        if units.is_empty() {
            return;
        }
        let names: Vec<String> = units.iter().map(|u| u.name.clone()).collect();
        metrics::increment_broker_operations("describe_topics");
        let mut descriptions = self.kafka.describe_topics(&names).await;
        metrics::increment_broker_operations("describe_configs");
        let mut live_configs = self.kafka.describe_configs(&names).await;

        let mut creates = Vec::new();
        let mut alters = BTreeMap::new();
        let mut increases = BTreeMap::new();

        for unit in &mut units {
            match take_result(&mut descriptions, &unit.name) {
                Err(e) if e.is_unknown_topic() => creates.push(NewTopic {
                    name: unit.name.clone(),
                    partitions: unit.partitions,
                    replication_factor: unit.replicas,
                    configs: unit.configs.clone(),
                }),
                Err(e) => unit.fail(e.into()),
                Ok(live) => {
                    match take_result(&mut live_configs, &unit.name) {
                        Ok(entries) => {
                            let ops = config_ops(&unit.configs, &entries);
                            if !ops.is_empty() {
                                alters.insert(unit.name.clone(), ops);
                            }
                        }
                        Err(e) => unit.fail(e.into()),
                    }
                    if let Some(desired) = unit.partitions {
                        let current = live.num_partitions();
                        if desired > current {
                            increases.insert(unit.name.clone(), desired);
                        } else if desired < current {
                            unit.partition_decrease = true;
                        }
                    }
                    if let Some(replication_factor) = unit.replicas {
                        unit.rf_candidates = replicas::candidates(&live, replication_factor);
                    }
                    unit.live = Some(live);
                }
            }
        }

        self.create_topics(&creates, &mut units).await;

        if !alters.is_empty() {
            metrics::increment_broker_operations("incremental_alter_configs");
            for (name, result) in self.kafka.incremental_alter_configs(&alters).await {
                let Some(unit) = unit_mut(&mut units, &name) else {
                    continue;
                };
                match result {
                    Ok(()) => info!(topic.name = %name, "Updated topic config"),
                    Err(e) => unit.fail(e.into()),
                }
            }
        }

        if !increases.is_empty() {
            metrics::increment_broker_operations("create_partitions");
            for (name, result) in self.kafka.create_partitions(&increases).await {
                let Some(unit) = unit_mut(&mut units, &name) else {
                    continue;
                };
                match result {
                    Ok(()) => info!(
                        topic.name = %name,
                        partitions = increases.get(&name).copied().unwrap_or_default(),
                        "Increased topic partitions"
                    ),
                    Err(e) => unit.fail(e.into()),
                }
            }
        }

        self.check_replication_factors(&mut units).await;

        for unit in units {
            let outcome = match unit.failure {
                Some(failure) => Outcome::Failed(failure),
                None => Outcome::Ready {
                    topic_id: unit.live.and_then(|live| live.topic_id),
                },
            };
            self.finish(&unit.topic, outcome, ctx).await;
        }
    }

    async fn create_topics(&self, creates: &[NewTopic], units: &mut [Unit]) {
        if creates.is_empty() {
            return;
        }
        metrics::increment_broker_operations("create_topics");
        let mut created = Vec::new();
        for (name, result) in self.kafka.create_topics(creates).await {
            match result {
                Ok(()) => {
                    info!(topic.name = %name, "Created topic");
                    created.push(name);
                }
                Err(e) if e.is_topic_exists() => {
                    debug!(topic.name = %name, "Topic created concurrently, treating as existing");
                    created.push(name);
                }
                Err(e) => {
                    if let Some(unit) = unit_mut(units, &name) {
                        unit.fail(e.into());
                    }
                }
            }
        }
        if created.is_empty() {
            return;
        }
        // Read back the broker assigned ids
        metrics::increment_broker_operations("describe_topics");
        for (name, result) in self.kafka.describe_topics(&created).await {
            let Some(unit) = unit_mut(units, &name) else {
                continue;
            };
            match result {
                Ok(live) => unit.live = Some(live),
                Err(e) => unit.fail(e.into()),
            }
        }
    }

    /// Partition decrease and replication factor checks, after every mutation
    async fn check_replication_factors(&self, units: &mut [Unit]) {
        let candidates: Vec<TopicPartition> = units
            .iter()
            .filter(|u| u.failure.is_none() && !u.partition_decrease)
            .flat_map(|u| u.rf_candidates.iter().cloned())
            .collect();
        let reassignments = if candidates.is_empty() {
            Ok(BTreeMap::new())
        } else {
            metrics::increment_broker_operations("list_partition_reassignments");
            self.kafka.list_partition_reassignments(&candidates).await
        };

        for unit in units.iter_mut() {
            if unit.partition_decrease {
                unit.fail(ReconcileFailure::partition_decrease());
            }
            if unit.failure.is_some() || unit.rf_candidates.is_empty() {
                continue;
            }
            let (Some(live), Some(replication_factor)) = (&unit.live, unit.replicas) else {
                continue;
            };
            match &reassignments {
                Err(e) => unit.fail(e.clone().into()),
                Ok(in_flight) => {
                    let mismatched =
                        replicas::mismatched_partitions(live, replication_factor, in_flight);
                    if !mismatched.is_empty() {
                        unit.fail(replicas::replication_factor_change(&mismatched));
                    }
                }
            }
        }
    }

    /// Resources waiting on a name whose owner gave it up in this batch
    async fn promoted_claimants(&self, ctx: &BatchContext) -> Vec<KafkaTopic> {
        let ids: BTreeSet<ResourceRef> = ctx
            .released
            .iter()
            .filter_map(|name| self.ownership.owner_of(name))
            .filter(|owner| !ctx.processed.contains(*owner))
            .cloned()
            .collect();
        let mut topics = Vec::new();
        for id in ids {
            match self.store.get(&id).await {
                Ok(Some(topic)) => topics.push(topic),
                Ok(None) => debug!(resource = %id, "Promoted claimant no longer exists"),
                Err(e) => warn!(resource = %id, error = %e, "Failed to read promoted claimant"),
            }
        }
        topics
    }

    /// Claim `name`, recording any name this resource gives up on the way
    pub(super) fn claim(
        &mut self,
        name: &str,
        id: &ResourceRef,
        ctx: &mut BatchContext,
    ) -> ResourceRef {
        if self
            .ownership
            .claimed_name(id)
            .is_some_and(|claimed| claimed != name)
        {
            self.release(id, ctx);
        }
        self.ownership.claim(name, id)
    }

    pub(super) fn release(&mut self, id: &ResourceRef, ctx: &mut BatchContext) {
        if let Some(name) = self.ownership.release(id) {
            debug!(resource = %id, topic.name = %name, "Released topic name");
            ctx.released.push(name);
        }
    }

    /// Record the outcome and write the derived status if it changed
    pub(super) async fn finish(&self, topic: &KafkaTopic, outcome: Outcome, ctx: &mut BatchContext) {
        let id = topic.resource_ref();
        ctx.summary.record(&outcome);
        metrics::increment_reconciliations(outcome.as_str());
        if let Outcome::Failed(failure) = &outcome {
            info!(
                resource.namespace = %id.namespace,
                resource.name = %id.name,
                reason = failure.reason(),
                "Reconciliation failed: {failure}"
            );
        }

        let Some(status) = derive_status(topic, &outcome, &now()) else {
            return;
        };
        if !status_changed(topic, &status) {
            debug!(resource = %id, "Status unchanged, skipping update");
            return;
        }
        match self.store.update_status(topic, &status).await {
            Ok(()) => ctx.summary.status_writes += 1,
            Err(e) if e.is_not_found() => {
                debug!(resource = %id, "KafkaTopic deleted before its status was written");
            }
            Err(e) => warn!(resource = %id, error = %e, "Failed to update KafkaTopic status"),
        }
    }

    async fn ensure_finalizer(&self, topic: &KafkaTopic) {
        if self.use_finalizer != topic.has_finalizer() {
            self.update_finalizer(topic, self.use_finalizer).await;
        }
    }

    /// Add or remove our finalizer, leaving any others untouched
    pub(super) async fn update_finalizer(&self, topic: &KafkaTopic, present: bool) -> bool {
        let id = topic.resource_ref();
        let mut finalizers: Vec<String> = topic
            .finalizers()
            .iter()
            .filter(|f| *f != TOPIC_FINALIZER)
            .cloned()
            .collect();
        if present {
            finalizers.push(TOPIC_FINALIZER.to_string());
        }
        match self.store.set_finalizers(topic, finalizers).await {
            Ok(()) => {
                debug!(resource = %id, present, "Updated finalizer");
                true
            }
            Err(e) if e.is_not_found() => !present,
            Err(e) => {
                warn!(resource = %id, error = %e, "Failed to update finalizers");
                false
            }
        }
    }
}
