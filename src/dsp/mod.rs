//! DSP module
//!
//! Host-facing contract for sequencer modules.
//! Defines the DspModule trait, ports, parameters, signal conventions,
//! edge triggers and the module registry.

pub mod context;
pub mod module_trait;
pub mod parameter;
pub mod port;
pub mod registry;
pub mod signal;
pub mod trigger;

pub use context::{LightDivider, ProcessContext};
pub use module_trait::{DspModule, ModuleCategory, ModuleError, ModuleInfo};
pub use parameter::{ParameterDefinition, ParameterDisplay};
pub use port::{PortDefinition, PortDirection};
pub use registry::{create_module_registry, ModuleRegistry};
pub use signal::{SignalBuffer, SignalType};
pub use trigger::{ButtonTrigger, PulseTimer, SchmittTrigger};
