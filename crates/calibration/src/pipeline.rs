//! Ordered chain of correction modules.

use std::sync::Arc;

use cluster_config::ResolveSource;
use l0_parser::DecodeWarning;
use scia_common::{CalibrationFlags, ClusterRecord};
use serde::Serialize;
use tracing::warn;

use crate::config::CalibrationConfig;
use crate::context::{CorrectionContext, StateParams};
use crate::error::CalibrationError;
use crate::modules::{CorrectionModule, DarkCurrentModule, ReflectanceModule};
use crate::solar_store::SolarSpectrumStore;

/// Recoverable problems reported for a processed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessingWarning {
    /// The packet decoder zero-filled or reshaped a cluster.
    Decode { state_id: u8, message: String },
    /// The cluster configuration came from a fallback.
    ConfigFallback {
        state_id: u8,
        orbit: u16,
        fallback: String,
    },
    /// A state was not processed.
    StateSkipped { state_id: u8, reason: String },
    /// A module failed; its correction is missing from the state's records.
    ModuleFailed {
        state_id: u8,
        module: &'static str,
        reason: String,
    },
}

impl ProcessingWarning {
    pub fn decode(state_id: u8, warning: &DecodeWarning) -> Self {
        Self::Decode {
            state_id,
            message: warning.to_string(),
        }
    }

    pub fn config_fallback(state_id: u8, orbit: u16, source: ResolveSource) -> Self {
        let fallback = match source {
            ResolveSource::Store => "store".to_string(),
            ResolveSource::SessionHistory => "session_history".to_string(),
            ResolveSource::EarlierRow { orbit } => format!("earlier_row:{}", orbit),
        };
        Self::ConfigFallback {
            state_id,
            orbit,
            fallback,
        }
    }

    pub fn state_id(&self) -> u8 {
        match self {
            Self::Decode { state_id, .. }
            | Self::ConfigFallback { state_id, .. }
            | Self::StateSkipped { state_id, .. }
            | Self::ModuleFailed { state_id, .. } => *state_id,
        }
    }
}

/// Record geometry the pipeline checks after every module.
fn record_shapes(records: &[ClusterRecord]) -> Vec<(usize, usize, usize, usize)> {
    records
        .iter()
        .map(|r| (r.num_observations, r.num_pixels, r.pixel_ids.len(), r.pixel_values.len()))
        .collect()
}

fn check_contract(
    module: &'static str,
    before: &[(usize, usize, usize, usize)],
    after: &[(usize, usize, usize, usize)],
) -> Result<(), CalibrationError> {
    if before.len() != after.len() {
        return Err(CalibrationError::ContractViolation {
            module,
            reason: format!("record count {} became {}", before.len(), after.len()),
        });
    }
    match before.iter().zip(after).position(|(b, a)| b != a) {
        Some(i) => Err(CalibrationError::ContractViolation {
            module,
            reason: format!("record {} changed shape", i),
        }),
        None => Ok(()),
    }
}

/// Correction modules run in order on every state.
#[derive(Default)]
pub struct CalibrationPipeline {
    modules: Vec<Box<dyn CorrectionModule>>,
}

impl CalibrationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dark correction followed by reflectance, as enabled by the flags.
    pub fn from_config(config: &CalibrationConfig, solar_store: Option<Arc<dyn SolarSpectrumStore>>) -> Self {
        let mut pipeline = Self::new();
        if config.flags.intersects(CalibrationFlags::DARK) {
            pipeline.push(Box::new(DarkCurrentModule::new(config.limb_dark_seconds)));
        }
        if config.flags.contains(CalibrationFlags::REFLECTANCE) {
            pipeline.push(Box::new(ReflectanceModule::new(solar_store)));
        }
        pipeline
    }

    pub fn push(&mut self, module: Box<dyn CorrectionModule>) {
        self.modules.push(module);
    }

    pub fn with_module(mut self, module: Box<dyn CorrectionModule>) -> Self {
        self.push(module);
        self
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Run every module on one state's records.
    ///
    /// A failing module is reported and the remaining modules still run.
    /// Fatal errors (a truncated or unallocatable data set) end the run.
    pub fn run(
        &mut self,
        ctx: &CorrectionContext<'_>,
        params: &StateParams,
        records: &mut [ClusterRecord],
    ) -> Result<Vec<ProcessingWarning>, CalibrationError> {
        let mut warnings = Vec::new();

        for module in &mut self.modules {
            let before = record_shapes(records);
            let mut result = module.apply(ctx, params, records);
            if result.is_ok() {
                result = check_contract(module.name(), &before, &record_shapes(records));
            }

            if let Err(e) = result {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(
                    state_id = params.state_id,
                    module = module.name(),
                    error = %e,
                    "Correction module failed"
                );
                warnings.push(ProcessingWarning::ModuleFailed {
                    state_id: params.state_id,
                    module: module.name(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(warnings)
    }
}
