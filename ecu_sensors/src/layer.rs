//! `SensorLayer` — owns every [`SensorSlot`] plus the [`FaultRule`] set,
//! drives them from the configured HAL backends once per slow-loop tick
//!.

use ecu_hal::traits::{AdcReader, GpioPort};

use crate::descriptor::{current_phase, SensorRole, SourceKind, VirtualChannel};
use crate::fault_rule::{FaultContext, FaultRule};
use crate::slot::SensorSlot;

/// The HAL capabilities `SensorLayer` reads from. Held as trait objects so
/// the layer doesn't care whether on-chip, native GPIO, or an expander
/// backs any one of them.
pub struct SensorHal {
    /// On-chip ADC.
    pub onchip_adc: Box<dyn AdcReader>,
    /// External 16-bit differential ADCs, indexed by `device`.
    pub external_adc16: Vec<Box<dyn AdcReader>>,
    /// External 12-bit SPI ADCs, indexed by `device`.
    pub external_adc12: Vec<Box<dyn AdcReader>>,
    /// Digital GPIO for [`SourceKind::Digital`] slots.
    pub gpio: Box<dyn GpioPort>,
}

impl SensorHal {
    fn read_raw_mv(&mut self, source: &SourceKind, rpm: u32) -> Option<f32> {
        match *source {
            SourceKind::Disabled => Some(0.0),
            SourceKind::OnChipAdc { channel } => self.onchip_adc.read_millivolts(channel).ok(),
            SourceKind::ExternalAdc16 { device, channel } => self
                .external_adc16
                .get_mut(device as usize)
                .and_then(|adc| adc.read_millivolts(channel).ok()),
            SourceKind::ExternalAdc12 { device, channel } => self
                .external_adc12
                .get_mut(device as usize)
                .and_then(|adc| adc.read_millivolts(channel).ok()),
            SourceKind::Digital { pin } => self.gpio.read(pin).ok().map(|lvl| if lvl.is_high() { 5000.0 } else { 0.0 }),
            SourceKind::Virtual { channel } => match channel {
                VirtualChannel::Rpm => Some(rpm as f32),
            },
        }
    }
}

/// What one `SensorLayer::update()` tick hands back to the caller.
pub struct SensorLayerOutput {
    /// Accumulated limp-bitmask contribution from every slot and rule.
    pub limp_bits: u32,
    /// Accumulated CEL-bitmask contribution from every slot and rule.
    pub cel_bits: u32,
    /// `true` if every [`SensorRole`]-tagged slot read without a HAL error.
    pub all_sources_ok: bool,
}

/// Owns the full configured set of [`SensorSlot`]s and [`FaultRule`]s and
/// runs them against a [`SensorHal`] each tick.
pub struct SensorLayer {
    slots: Vec<SensorSlot>,
    rules: Vec<FaultRule>,
}

impl SensorLayer {
    /// Build a layer from its configured descriptors and rules.
    pub fn new(descriptors: Vec<crate::descriptor::SensorDescriptor>, rules: Vec<FaultRule>) -> Self {
        Self { slots: descriptors.into_iter().map(SensorSlot::new).collect(), rules }
    }

    /// All configured slots, in descriptor order.
    pub fn slots(&self) -> &[SensorSlot] {
        &self.slots
    }

    /// The calibrated value of the first slot tagged with `role`, if any.
    pub fn value_by_role(&self, role: SensorRole) -> Option<f32> {
        self.slots.iter().find(|s| s.descriptor.role == role).map(|s| s.value)
    }

    /// Read every slot through `hal`, run validation and fault rules, and
    /// return the combined fault contribution. `now_ms` is a monotonic
    /// millisecond clock shared with the rest of the slow loop; `rpm`
    /// feeds [`crate::descriptor::SourceKind::Virtual`] slots.
    pub fn update(&mut self, hal: &mut SensorHal, now_ms: u64, rpm: u32, cranking: bool, running: bool) -> SensorLayerOutput {
        let phase = current_phase(cranking, running);
        let mut all_sources_ok = true;
        for slot in &mut self.slots {
            match hal.read_raw_mv(&slot.descriptor.source, rpm) {
                Some(mv) => slot.update(mv, phase),
                None => {
                    all_sources_ok = false;
                    tracing::warn!(sensor = %slot.descriptor.name, "sensor read failed");
                }
            }
        }

        let mut limp_bits = 0u32;
        let mut cel_bits = 0u32;
        for slot in &self.slots {
            let (limp, cel) = slot.fault_contribution();
            limp_bits |= limp;
            cel_bits |= cel;
        }

        let map_kpa = self.value_by_role(SensorRole::MapKpa).unwrap_or(0.0);
        let tps_pct = self.value_by_role(SensorRole::TpsPct).unwrap_or(0.0);
        let clt_f = self.value_by_role(SensorRole::CltF).unwrap_or(0.0);
        let iat_f = self.value_by_role(SensorRole::IatF).unwrap_or(0.0);
        let vbat_v = self.value_by_role(SensorRole::VbatV).unwrap_or(0.0);
        let ctx = FaultContext { slots: &self.slots, rpm, running, map_kpa, tps_pct, clt_f, iat_f, vbat_v };
        for rule in &mut self.rules {
            let (limp, cel) = rule.evaluate(now_ms, &ctx);
            limp_bits |= limp;
            cel_bits |= cel;
        }

        SensorLayerOutput { limp_bits, cel_bits, all_sources_ok }
    }
}
