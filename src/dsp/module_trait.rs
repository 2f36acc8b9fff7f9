//! The core DspModule trait and supporting types.
//!
//! This module defines the interface every sequencer module implements so a
//! host can drive it once per sample, persist it and render its lights.

use super::context::ProcessContext;
use super::parameter::ParameterDefinition;
use super::port::PortDefinition;
use super::SignalBuffer;
use std::fmt;

/// Category of a module, used for organization in a module browser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleCategory {
    /// Step sequencers (CV/gate pattern generators).
    Sequencer,
    /// Clock generators, dividers and multipliers.
    Clock,
    /// Helpers that do not fit elsewhere.
    Utility,
}

impl ModuleCategory {
    /// Returns a human-readable name for the category.
    pub fn name(&self) -> &'static str {
        match self {
            ModuleCategory::Sequencer => "Sequencer",
            ModuleCategory::Clock => "Clock",
            ModuleCategory::Utility => "Utility",
        }
    }
}

/// Static information about a module.
#[derive(Clone, Debug)]
pub struct ModuleInfo {
    /// Unique identifier for the module type (e.g., "seq.phrase16").
    pub id: &'static str,
    /// Human-readable name (e.g., "Phrase Sequencer 16").
    pub name: &'static str,
    /// The category this module belongs to.
    pub category: ModuleCategory,
    /// A brief description of what the module does.
    pub description: &'static str,
}

impl ModuleInfo {
    /// Creates a new module info.
    pub fn new(
        id: &'static str,
        name: &'static str,
        category: ModuleCategory,
        description: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            category,
            description,
        }
    }
}

/// Errors that can occur outside the real-time path of a module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleError {
    /// Saved state could not be parsed at all.
    DeserializationFailed(String),
    /// Invalid parameter value.
    InvalidParameter { id: String, reason: String },
    /// Module is not in a valid state.
    InvalidState(String),
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleError::DeserializationFailed(msg) => {
                write!(f, "Failed to deserialize module state: {}", msg)
            }
            ModuleError::InvalidParameter { id, reason } => {
                write!(f, "Invalid parameter '{}': {}", id, reason)
            }
            ModuleError::InvalidState(msg) => {
                write!(f, "Invalid module state: {}", msg)
            }
        }
    }
}

impl std::error::Error for ModuleError {}

impl From<serde_json::Error> for ModuleError {
    fn from(err: serde_json::Error) -> Self {
        ModuleError::DeserializationFailed(err.to_string())
    }
}

/// The trait every module implements.
///
/// The host calls [`DspModule::process`] with one block of input voltages and
/// the current panel values; the module advances once per frame and fills the
/// output blocks. Light values are refreshed at a reduced cadence and read by
/// the widget layer through [`DspModule::lights`].
///
/// # Thread Safety
///
/// `DspModule` requires `Send + 'static` because modules are built on a
/// control thread and then moved to the audio thread.
pub trait DspModule: Send + 'static {
    /// Returns static information about this module.
    fn info(&self) -> &ModuleInfo;

    /// Returns the jack definitions; inputs come before outputs.
    fn ports(&self) -> &[PortDefinition];

    /// Returns the panel control definitions, in `params` order.
    fn parameters(&self) -> &[ParameterDefinition];

    /// Prepares the module for processing at `sample_rate`.
    ///
    /// Called before processing starts and whenever the sample rate or
    /// maximum block size changes.
    fn prepare(&mut self, sample_rate: f32, max_block_size: usize);

    /// Processes one block.
    ///
    /// # Arguments
    ///
    /// * `inputs` - Input buffers, indexed by input port order (may be shorter
    ///   than the port list when trailing jacks are unpatched)
    /// * `outputs` - Output buffers to fill, indexed by output port order
    /// * `params` - Current panel values, indexed by parameter order
    /// * `context` - Sample rate and block size
    ///
    /// # Real-time Constraints
    ///
    /// Runs on the audio thread: no allocation, no locks, no I/O.
    fn process(
        &mut self,
        inputs: &[&SignalBuffer],
        outputs: &mut [SignalBuffer],
        params: &[f32],
        context: &ProcessContext,
    );

    /// Returns the module to its power-on playback state.
    ///
    /// Musical data (sequences, songs) is kept; run cursors, triggers and
    /// timers are cleared.
    fn reset(&mut self);

    /// Serializes the module's musical data and settings.
    ///
    /// Returns `None` if the module has no state beyond its parameters.
    fn serialize_state(&self) -> Option<Vec<u8>> {
        None
    }

    /// Restores state produced by [`DspModule::serialize_state`].
    ///
    /// Missing fields keep their current value; only unparseable data fails.
    fn deserialize_state(&mut self, _data: &[u8]) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Returns the current light brightnesses (0.0 to 1.0), refreshed at a
    /// throttled cadence.
    fn lights(&self) -> &[f32] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{PortDefinition, SignalBuffer, SignalType};

    /// A minimal module that inverts a gate.
    struct GateInverter {
        ports: Vec<PortDefinition>,
        parameters: Vec<ParameterDefinition>,
        lights: [f32; 1],
    }

    impl GateInverter {
        fn new() -> Self {
            Self {
                ports: vec![
                    PortDefinition::input("in", "In", SignalType::Gate),
                    PortDefinition::output("out", "Out", SignalType::Gate),
                ],
                parameters: vec![],
                lights: [0.0],
            }
        }
    }

    impl DspModule for GateInverter {
        fn info(&self) -> &ModuleInfo {
            static INFO: ModuleInfo = ModuleInfo {
                id: "test.inverter",
                name: "Inverter",
                category: ModuleCategory::Utility,
                description: "Inverts a gate",
            };
            &INFO
        }

        fn ports(&self) -> &[PortDefinition] {
            &self.ports
        }

        fn parameters(&self) -> &[ParameterDefinition] {
            &self.parameters
        }

        fn prepare(&mut self, _sample_rate: f32, _max_block_size: usize) {}

        fn process(
            &mut self,
            inputs: &[&SignalBuffer],
            outputs: &mut [SignalBuffer],
            _params: &[f32],
            context: &ProcessContext,
        ) {
            for i in 0..context.block_size {
                let high = inputs[0].samples[i] >= 1.0;
                outputs[0].samples[i] = if high { 0.0 } else { 10.0 };
                self.lights[0] = if high { 0.0 } else { 1.0 };
            }
        }

        fn reset(&mut self) {
            self.lights[0] = 0.0;
        }

        fn lights(&self) -> &[f32] {
            &self.lights
        }
    }

    #[test]
    fn test_module_category_names() {
        assert_eq!(ModuleCategory::Sequencer.name(), "Sequencer");
        assert_eq!(ModuleCategory::Clock.name(), "Clock");
        assert_eq!(ModuleCategory::Utility.name(), "Utility");
    }

    #[test]
    fn test_module_info_creation() {
        let info = ModuleInfo::new("seq.test", "Test", ModuleCategory::Sequencer, "A test");
        assert_eq!(info.id, "seq.test");
        assert_eq!(info.category, ModuleCategory::Sequencer);
    }

    #[test]
    fn test_module_error_display() {
        let err = ModuleError::DeserializationFailed("bad json".to_string());
        assert!(err.to_string().contains("bad json"));

        let err = ModuleError::InvalidParameter {
            id: "pps".to_string(),
            reason: "not in table".to_string(),
        };
        assert!(err.to_string().contains("pps"));
        assert!(err.to_string().contains("not in table"));
    }

    #[test]
    fn test_module_error_from_json() {
        let parse: Result<u32, _> = serde_json::from_str("{");
        let err: ModuleError = parse.unwrap_err().into();
        assert!(matches!(err, ModuleError::DeserializationFailed(_)));
    }

    #[test]
    fn test_inverter_process_and_lights() {
        let mut module = GateInverter::new();
        module.prepare(44100.0, 2);

        let mut input = SignalBuffer::gate(2);
        input.samples[0] = 10.0;
        let mut outputs = vec![SignalBuffer::gate(2)];
        let ctx = ProcessContext::new(44100.0, 2);
        module.process(&[&input], &mut outputs, &[], &ctx);

        assert_eq!(outputs[0].samples, vec![0.0, 10.0]);
        assert_eq!(module.lights(), &[1.0]);
    }

    #[test]
    fn test_default_state_hooks() {
        let mut module = GateInverter::new();
        assert!(module.serialize_state().is_none());
        assert!(module.deserialize_state(b"anything").is_ok());
    }

    #[test]
    fn test_module_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<GateInverter>();
    }
}
