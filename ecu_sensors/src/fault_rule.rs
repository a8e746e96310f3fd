//! `FaultRule` — cross-sensor fault conditions with gating, hysteresis,
//! and debounce.

use ecu_common::config::Curve6;
use ecu_common::error::FaultAction;
use serde::{Deserialize, Serialize};

use crate::slot::SensorSlot;

/// What a rule compares: either a sensor slot's calibrated value or a
/// well-known engine channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultSource {
    /// Index into the owning `SensorLayer`'s slot list.
    Slot {
        /// Slot index.
        index: usize,
    },
    /// Engine speed, RPM.
    Rpm,
    /// Manifold absolute pressure, kPa.
    MapKpa,
    /// Throttle position, %.
    TpsPct,
    /// Coolant temperature, °F.
    CltF,
    /// Intake air temperature, °F.
    IatF,
    /// Battery voltage, V.
    VbatV,
}

impl FaultSource {
    fn value(&self, ctx: &FaultContext) -> f32 {
        match *self {
            FaultSource::Slot { index } => ctx.slots.get(index).map(|s| s.value).unwrap_or(0.0),
            FaultSource::Rpm => ctx.rpm as f32,
            FaultSource::MapKpa => ctx.map_kpa,
            FaultSource::TpsPct => ctx.tps_pct,
            FaultSource::CltF => ctx.clt_f,
            FaultSource::IatF => ctx.iat_f,
            FaultSource::VbatV => ctx.vbat_v,
        }
    }
}

/// The comparison a [`FaultRule`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    /// `primary < threshold_a`.
    Lt,
    /// `primary > threshold_a`.
    Gt,
    /// `primary < threshold_a || primary > threshold_b`.
    OutsideRange,
    /// `|primary - secondary| > threshold_a`.
    Delta,
}

/// Values the engine-state-level [`FaultSource`] variants and `Slot`
/// indices resolve against, built fresh by `SensorLayer` each tick.
pub struct FaultContext<'a> {
    /// The owning layer's sensor slots, addressable by index.
    pub slots: &'a [SensorSlot],
    /// Current engine speed.
    pub rpm: u32,
    /// `true` if the engine is running (post-crank).
    pub running: bool,
    /// Current MAP, kPa.
    pub map_kpa: f32,
    /// Current TPS, %.
    pub tps_pct: f32,
    /// Current CLT, °F.
    pub clt_f: f32,
    /// Current IAT, °F.
    pub iat_f: f32,
    /// Current VBAT, V.
    pub vbat_v: f32,
}

/// A cross-sensor fault condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaultRule {
    /// Human-readable name, used in fault messages.
    pub name: String,
    /// The value being evaluated.
    pub primary: FaultSource,
    /// The second operand for [`RuleOperator::Delta`].
    #[serde(default)]
    pub secondary: Option<FaultSource>,
    /// The comparison performed.
    pub operator: RuleOperator,
    /// Lower/only threshold (or the delta limit).
    pub threshold_a: f32,
    /// Upper threshold, used only by [`RuleOperator::OutsideRange`].
    #[serde(default)]
    pub threshold_b: f32,
    /// Symmetric hysteresis applied to the threshold while the rule is
    /// already active, to prevent chatter at the boundary.
    #[serde(default)]
    pub hysteresis: f32,
    /// The condition must hold continuously this long before `active`
    /// transitions to `true`.
    #[serde(default)]
    pub debounce_ms: u64,
    /// If set, the rule only evaluates while the engine is running.
    #[serde(default)]
    pub require_running: bool,
    /// Optional RPM gate (inclusive); outside it the rule never fires.
    #[serde(default)]
    pub gate_rpm_min: Option<u32>,
    /// See [`Self::gate_rpm_min`].
    #[serde(default)]
    pub gate_rpm_max: Option<u32>,
    /// Optional MAP gate (inclusive, kPa).
    #[serde(default)]
    pub gate_map_min: Option<f32>,
    /// See [`Self::gate_map_min`].
    #[serde(default)]
    pub gate_map_max: Option<f32>,
    /// If set, `threshold_a` is replaced each tick by `curve.interpolate`
    /// of `curve_source`'s value instead of the static `threshold_a`.
    #[serde(default)]
    pub curve: Option<Curve6>,
    /// Source the curve is indexed by; defaults to `primary` if unset.
    #[serde(default)]
    pub curve_source: Option<FaultSource>,
    /// Bit index into the fault bitmask.
    pub fault_bit: u8,
    /// What an active rule does to the operating envelope.
    #[serde(default)]
    pub fault_action: FaultAction,

    /// Monotonic ms timestamp the condition first became true, or `None`.
    #[serde(skip)]
    debounce_start_ms: Option<u64>,
    /// Whether the rule is currently considered active (post-debounce).
    #[serde(skip)]
    pub active: bool,
}

impl FaultRule {
    fn gates_pass(&self, ctx: &FaultContext) -> bool {
        if self.require_running && !ctx.running {
            return false;
        }
        if let Some(min) = self.gate_rpm_min {
            if ctx.rpm < min {
                return false;
            }
        }
        if let Some(max) = self.gate_rpm_max {
            if ctx.rpm > max {
                return false;
            }
        }
        if let Some(min) = self.gate_map_min {
            if ctx.map_kpa < min {
                return false;
            }
        }
        if let Some(max) = self.gate_map_max {
            if ctx.map_kpa > max {
                return false;
            }
        }
        true
    }

    fn effective_threshold_a(&self, ctx: &FaultContext) -> f32 {
        match &self.curve {
            Some(curve) => {
                let source = self.curve_source.unwrap_or(self.primary);
                curve.interpolate(source.value(ctx))
            }
            None => self.threshold_a,
        }
    }

    fn condition_met(&self, ctx: &FaultContext) -> bool {
        let x = self.primary.value(ctx);
        let hyst = if self.active { self.hysteresis } else { 0.0 };
        let a = self.effective_threshold_a(ctx);
        match self.operator {
            RuleOperator::Lt => x < a - hyst,
            RuleOperator::Gt => x > a + hyst,
            RuleOperator::OutsideRange => x < a - hyst || x > self.threshold_b + hyst,
            RuleOperator::Delta => {
                let y = self.secondary.map(|s| s.value(ctx)).unwrap_or(0.0);
                (x - y).abs() > a - hyst
            }
        }
    }

    /// Evaluate the rule for this tick, updating its debounce/active
    /// runtime state, and return its `(limp_bits, cel_bits)` contribution.
    pub fn evaluate(&mut self, now_ms: u64, ctx: &FaultContext) -> (u32, u32) {
        let met = self.gates_pass(ctx) && self.condition_met(ctx);

        if met {
            let start = *self.debounce_start_ms.get_or_insert(now_ms);
            if now_ms.saturating_sub(start) >= self.debounce_ms {
                if !self.active {
                    tracing::warn!(rule = %self.name, "fault rule active");
                }
                self.active = true;
            }
        } else {
            if self.active {
                tracing::info!(rule = %self.name, "fault rule cleared");
            }
            self.debounce_start_ms = None;
            self.active = false;
        }

        if !self.active {
            return (0, 0);
        }
        let bit = 1u32 << self.fault_bit;
        match self.fault_action {
            FaultAction::None => (0, 0),
            FaultAction::Limp | FaultAction::Shutdown => (bit, 0),
            FaultAction::Cel => (0, bit),
        }
    }
}
