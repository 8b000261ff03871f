//! Planning and execution options.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::hl::cost::{CostModel, PowerLaw, UnionCost};
use crate::internal_prelude::*;

/// Forces the planner to use a given family of strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Combined,
    PerChunk,
    Grouped,
}

/// Cooperative cancellation flag shared between a caller and running plans.
///
/// Executors check it between steps; steps already in flight complete.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CancelToken").field(&self.is_cancelled()).finish()
    }
}

/// Options for planning and executing one read or write.
#[derive(Clone, Debug)]
pub struct PlanConfig {
    strategy: Option<StrategyKind>,
    granularity: Option<Ix>,
    cost: CostModel,
    parallel: bool,
    threads: Option<usize>,
    cancel: Option<CancelToken>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            strategy: None,
            granularity: None,
            cost: CostModel::default(),
            parallel: true,
            threads: None,
            cancel: None,
        }
    }
}

impl PlanConfig {
    pub fn build() -> PlanConfigBuilder {
        PlanConfigBuilder::new()
    }

    /// Strategy forced by the caller, if any.
    pub fn strategy(&self) -> Option<StrategyKind> {
        self.strategy
    }

    /// Fixed window width for grouped plans, if any.
    pub fn granularity(&self) -> Option<Ix> {
        self.granularity
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    /// Whether steps may run concurrently.
    pub fn parallel(&self) -> bool {
        self.parallel
    }

    pub fn threads(&self) -> Option<usize> {
        self.threads
    }

    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelToken::is_cancelled)
    }
}

/// Builder used to create a plan configuration.
#[derive(Clone, Debug, Default)]
pub struct PlanConfigBuilder {
    strategy: Option<StrategyKind>,
    granularity: Option<Ix>,
    call_overhead: Option<f64>,
    chunk_read_cost: Option<f64>,
    union_cost: Option<Arc<dyn UnionCost>>,
    parallel: Option<bool>,
    threads: Option<usize>,
    cancel: Option<CancelToken>,
}

impl PlanConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new builder from an existing configuration.
    pub fn from_config(config: &PlanConfig) -> Self {
        let mut builder = Self::default();
        if let Some(kind) = config.strategy {
            builder.strategy(kind);
        }
        if let Some(g) = config.granularity {
            builder.granularity(g);
        }
        builder
            .call_overhead(config.cost.call_overhead)
            .chunk_read_cost(config.cost.chunk_read_cost)
            .parallel(config.parallel);
        builder.union_cost = Some(config.cost.union_cost.clone());
        builder.threads = config.threads;
        builder.cancel = config.cancel.clone();
        builder
    }

    pub fn strategy(&mut self, kind: StrategyKind) -> &mut Self {
        self.strategy = Some(kind);
        self
    }

    pub fn granularity(&mut self, granularity: Ix) -> &mut Self {
        self.granularity = Some(granularity);
        self
    }

    pub fn call_overhead(&mut self, cost: f64) -> &mut Self {
        self.call_overhead = Some(cost);
        self
    }

    pub fn chunk_read_cost(&mut self, cost: f64) -> &mut Self {
        self.chunk_read_cost = Some(cost);
        self
    }

    pub fn union_cost<U: UnionCost + 'static>(&mut self, cost: U) -> &mut Self {
        self.union_cost = Some(Arc::new(cost));
        self
    }

    /// Shorthand for a `PowerLaw` union cost `k * unions ^ p`.
    pub fn power_law(&mut self, k: f64, p: f64) -> &mut Self {
        self.union_cost(PowerLaw::new(k, p))
    }

    pub fn parallel(&mut self, parallel: bool) -> &mut Self {
        self.parallel = Some(parallel);
        self
    }

    /// Runs steps on a dedicated pool of `threads` workers.
    pub fn threads(&mut self, threads: usize) -> &mut Self {
        self.threads = Some(threads);
        self
    }

    pub fn cancel_token(&mut self, token: &CancelToken) -> &mut Self {
        self.cancel = Some(token.clone());
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some(g) = self.granularity {
            ensure!(g > 0, Error::InvalidParams("granularity must be positive".into()));
        }
        if let Some(n) = self.threads {
            ensure!(n > 0, Error::InvalidParams("thread count must be positive".into()));
        }
        for (name, v) in &[("call overhead", self.call_overhead), ("chunk read cost", self.chunk_read_cost)] {
            if let Some(v) = *v {
                ensure!(
                    v.is_finite() && v >= 0.0,
                    Error::InvalidParams(format!("{} must be finite and non-negative: {}", name, v))
                );
            }
        }
        Ok(())
    }

    pub fn apply(&self, config: &mut PlanConfig) -> Result<()> {
        self.validate()?;
        if let Some(kind) = self.strategy {
            config.strategy = Some(kind);
        }
        if let Some(g) = self.granularity {
            config.granularity = Some(g);
        }
        if let Some(v) = self.call_overhead {
            config.cost.call_overhead = v;
        }
        if let Some(v) = self.chunk_read_cost {
            config.cost.chunk_read_cost = v;
        }
        if let Some(ref u) = self.union_cost {
            config.cost.union_cost = u.clone();
        }
        if let Some(v) = self.parallel {
            config.parallel = v;
        }
        if let Some(n) = self.threads {
            config.threads = Some(n);
        }
        if let Some(ref token) = self.cancel {
            config.cancel = Some(token.clone());
        }
        Ok(())
    }

    pub fn finish(&self) -> Result<PlanConfig> {
        let mut config = PlanConfig::default();
        self.apply(&mut config).map(|_| config)
    }
}
