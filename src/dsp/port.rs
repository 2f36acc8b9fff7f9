//! Port definitions for sequencer modules.
//!
//! Ports are the jacks on a module panel where voltages flow in and out.

use super::SignalType;

/// Direction of a port on a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// A jack that reads a voltage.
    Input,
    /// A jack that writes a voltage.
    Output,
}

impl PortDirection {
    /// Returns a human-readable name for the port direction.
    pub fn name(&self) -> &'static str {
        match self {
            PortDirection::Input => "Input",
            PortDirection::Output => "Output",
        }
    }
}

/// Definition of a jack on a module.
#[derive(Clone, Debug)]
pub struct PortDefinition {
    /// Unique identifier for this port within the module.
    pub id: &'static str,
    /// Label printed on the panel.
    pub name: &'static str,
    /// Whether this is an input or output jack.
    pub direction: PortDirection,
    /// The type of voltage this jack carries.
    pub signal_type: SignalType,
    /// Voltage seen by the module when an input is unpatched.
    /// Ignored for outputs.
    pub default_value: f32,
}

impl PortDefinition {
    /// Creates an input jack that reads 0 V when unpatched.
    pub fn input(id: &'static str, name: &'static str, signal_type: SignalType) -> Self {
        Self::input_with_default(id, name, signal_type, 0.0)
    }

    /// Creates an input jack with a custom unpatched voltage.
    pub fn input_with_default(
        id: &'static str,
        name: &'static str,
        signal_type: SignalType,
        default_value: f32,
    ) -> Self {
        Self {
            id,
            name,
            direction: PortDirection::Input,
            signal_type,
            default_value,
        }
    }

    /// Creates an output jack.
    pub fn output(id: &'static str, name: &'static str, signal_type: SignalType) -> Self {
        Self {
            id,
            name,
            direction: PortDirection::Output,
            signal_type,
            default_value: 0.0,
        }
    }

    /// Returns true if this is an input port.
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    /// Returns true if this is an output port.
    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }
}

/// Returns the number of input ports in `ports`.
pub fn count_inputs(ports: &[PortDefinition]) -> usize {
    ports.iter().filter(|p| p.is_input()).count()
}

/// Returns the number of output ports in `ports`.
pub fn count_outputs(ports: &[PortDefinition]) -> usize {
    ports.iter().filter(|p| p.is_output()).count()
}
