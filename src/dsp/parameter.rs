//! Parameter definitions for sequencer modules.
//!
//! Parameters are the panel controls: knobs, momentary buttons and switches.
//! Momentary buttons report 0.0 or 1.0 and are summed with their CV input
//! before edge detection.

/// How a parameter value should be displayed and interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterDisplay {
    /// Continuous knob with a unit suffix (e.g., "%", "V").
    Linear { unit: &'static str },
    /// Integer-stepped knob (lengths, counts, delays).
    Stepped { unit: &'static str },
    /// Discrete steps with named values.
    Discrete { labels: &'static [&'static str] },
    /// Latching on/off switch.
    Toggle {
        off_label: &'static str,
        on_label: &'static str,
    },
    /// Momentary push button.
    Button,
}

impl ParameterDisplay {
    /// Creates a linear display with the given unit.
    pub fn linear(unit: &'static str) -> Self {
        Self::Linear { unit }
    }

    /// Creates a stepped integer display with the given unit.
    pub fn stepped(unit: &'static str) -> Self {
        Self::Stepped { unit }
    }

    /// Creates a discrete display with named steps.
    pub fn discrete(labels: &'static [&'static str]) -> Self {
        Self::Discrete { labels }
    }

    /// Creates an on/off toggle.
    pub fn on_off() -> Self {
        Self::Toggle {
            off_label: "Off",
            on_label: "On",
        }
    }

    /// Returns the unit string, if applicable.
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Self::Linear { unit } | Self::Stepped { unit } => Some(unit),
            _ => None,
        }
    }

    /// Returns true for integer-valued displays.
    pub fn is_integral(&self) -> bool {
        !matches!(self, Self::Linear { .. })
    }
}

/// Definition of a panel control.
#[derive(Clone, Debug)]
pub struct ParameterDefinition {
    /// Unique identifier for this parameter within the module.
    pub id: &'static str,
    /// Label printed on the panel.
    pub name: &'static str,
    /// Minimum value of the parameter.
    pub min: f32,
    /// Maximum value of the parameter.
    pub max: f32,
    /// Value when the module is created.
    pub default: f32,
    /// How to display and interpret the parameter value.
    pub display: ParameterDisplay,
}

impl ParameterDefinition {
    /// Creates a new parameter definition.
    pub fn new(
        id: &'static str,
        name: &'static str,
        min: f32,
        max: f32,
        default: f32,
        display: ParameterDisplay,
    ) -> Self {
        Self {
            id,
            name,
            min,
            max,
            default,
            display,
        }
    }

    /// Creates an integer-stepped parameter.
    pub fn stepped(
        id: &'static str,
        name: &'static str,
        min: i32,
        max: i32,
        default: i32,
        unit: &'static str,
    ) -> Self {
        Self::new(
            id,
            name,
            min as f32,
            max as f32,
            default as f32,
            ParameterDisplay::stepped(unit),
        )
    }

    /// Creates a latching on/off switch.
    pub fn toggle(id: &'static str, name: &'static str, default: bool) -> Self {
        Self::new(
            id,
            name,
            0.0,
            1.0,
            if default { 1.0 } else { 0.0 },
            ParameterDisplay::on_off(),
        )
    }

    /// Creates a momentary button (released by default).
    pub fn button(id: &'static str, name: &'static str) -> Self {
        Self::new(id, name, 0.0, 1.0, 0.0, ParameterDisplay::Button)
    }

    /// Creates a discrete choice parameter.
    pub fn choice(
        id: &'static str,
        name: &'static str,
        labels: &'static [&'static str],
        default_index: usize,
    ) -> Self {
        Self::new(
            id,
            name,
            0.0,
            (labels.len().saturating_sub(1)) as f32,
            default_index as f32,
            ParameterDisplay::discrete(labels),
        )
    }

    /// Clamps a value to this parameter's valid range.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Reads `value` as a clamped, rounded integer (for stepped/choice controls).
    pub fn as_index(&self, value: f32) -> usize {
        self.clamp(value).round().max(0.0) as usize
    }
}

/// Reads parameter `index` from a host parameter slice, or `default` if absent.
pub fn param_or(params: &[f32], index: usize, default: f32) -> f32 {
    params.get(index).copied().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_display_units() {
        assert_eq!(ParameterDisplay::linear("%").unit(), Some("%"));
        assert_eq!(ParameterDisplay::stepped("steps").unit(), Some("steps"));
        assert_eq!(ParameterDisplay::on_off().unit(), None);
        assert_eq!(ParameterDisplay::Button.unit(), None);
    }

    #[test]
    fn test_integral_displays() {
        assert!(!ParameterDisplay::linear("V").is_integral());
        assert!(ParameterDisplay::stepped("").is_integral());
        assert!(ParameterDisplay::Button.is_integral());
    }

    #[test]
    fn test_parameter_clamp() {
        let param = ParameterDefinition::stepped("length", "Length", 1, 16, 16, "steps");
        assert_eq!(param.clamp(-3.0), 1.0);
        assert_eq!(param.clamp(40.0), 16.0);
        assert_eq!(param.as_index(7.6), 8);
    }

    #[test]
    fn test_button_parameter() {
        let param = ParameterDefinition::button("run", "Run");
        assert_eq!(param.default, 0.0);
        assert_eq!(param.max, 1.0);
        assert_eq!(param.display, ParameterDisplay::Button);
    }

    #[test]
    fn test_toggle_parameter() {
        assert_eq!(ParameterDefinition::toggle("hold", "Hold", false).default, 0.0);
        assert_eq!(ParameterDefinition::toggle("hold", "Hold", true).default, 1.0);
    }

    #[test]
    fn test_choice_parameter() {
        let param = ParameterDefinition::choice("mode", "Mode", &["SEQ", "SONG"], 1);
        assert_eq!(param.min, 0.0);
        assert_eq!(param.max, 1.0);
        assert_eq!(param.default, 1.0);
        assert_eq!(param.as_index(5.0), 1);
    }

    #[test]
    fn test_param_or_defaults() {
        let params = [1.0, 2.0];
        assert_eq!(param_or(&params, 1, 0.0), 2.0);
        assert_eq!(param_or(&params, 4, 9.0), 9.0);
    }
}
