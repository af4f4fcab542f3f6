//! Treatment parameter store.
//!
//! Holds the operator-adjustable values shown on the ready screen. Every numeric
//! parameter is kept as a typed [`Quantity`] so adjustments preserve the unit
//! suffix and the rendered text always parses back to the same value.

pub mod value;

use core::fmt::{self, Write as _};

use heapless::{String, Vec};

use crate::cycle::CycleRequest;

pub use value::{Direction, Quantity, QuantityParseError, Unit};

/// Maximum number of parameters a store can hold.
pub const MAX_PARAMETERS: usize = 8;

/// Capacity of a rendered parameter value.
pub const MAX_VALUE_LEN: usize = 16;

/// Rendered parameter value.
pub type ValueText = String<MAX_VALUE_LEN>;

/// Shot budget of a single tip, used for the progress display.
pub const TIP_SHOT_CAPACITY: u32 = 2_000;

/// Identifier for each treatment parameter, in display order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParameterId {
    TipType,
    Intensity,
    Rf,
    Depth,
    Mode,
    DelayTime,
}

impl ParameterId {
    /// All parameters in display order.
    pub const ALL: [ParameterId; 6] = [
        ParameterId::TipType,
        ParameterId::Intensity,
        ParameterId::Rf,
        ParameterId::Depth,
        ParameterId::Mode,
        ParameterId::DelayTime,
    ];

    /// Numeric identifier used by the ready screen.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            ParameterId::TipType => 0,
            ParameterId::Intensity => 1,
            ParameterId::Rf => 2,
            ParameterId::Depth => 3,
            ParameterId::Mode => 4,
            ParameterId::DelayTime => 5,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ParameterId::TipType => "TIP TYPE",
            ParameterId::Intensity => "INTENSITY",
            ParameterId::Rf => "RF",
            ParameterId::Depth => "DEPTH",
            ParameterId::Mode => "MODE",
            ParameterId::DelayTime => "DELAY TIME",
        }
    }

    /// Looks a parameter up by numeric identifier.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.index() == index)
    }

    /// Looks a parameter up by display name, ignoring ASCII case.
    ///
    /// Underscores and hyphens are accepted in place of spaces so console
    /// input such as `delay-time` resolves.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|id| {
            let expected = id.name().as_bytes();
            name.len() == expected.len()
                && name.bytes().zip(expected).all(|(given, &wanted)| {
                    let given = match given {
                        b'_' | b'-' => b' ',
                        other => other.to_ascii_uppercase(),
                    };
                    given == wanted
                })
        })
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stored value of a parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParameterValue {
    /// Free text such as the tip type label.
    Text(ValueText),
    /// Unit-aware numeric value.
    Quantity(Quantity),
}

impl ParameterValue {
    /// Returns the numeric value, if any.
    #[must_use]
    pub fn quantity(&self) -> Option<Quantity> {
        match self {
            ParameterValue::Quantity(quantity) => Some(*quantity),
            ParameterValue::Text(_) => None,
        }
    }

    /// Renders the value as shown on screen.
    #[must_use]
    pub fn render(&self) -> ValueText {
        let mut out = ValueText::new();
        // Quantities render in at most 14 bytes; text is already bounded.
        let _ = write!(out, "{self}");
        out
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Text(text) => f.write_str(text),
            ParameterValue::Quantity(quantity) => write!(f, "{quantity}"),
        }
    }
}

/// One operator-facing treatment parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreatmentParameter {
    pub id: ParameterId,
    pub value: ParameterValue,
    pub has_buttons: bool,
}

impl TreatmentParameter {
    /// Creates an adjustable numeric parameter.
    #[must_use]
    pub const fn quantity(id: ParameterId, quantity: Quantity) -> Self {
        Self {
            id,
            value: ParameterValue::Quantity(quantity),
            has_buttons: true,
        }
    }

    /// Creates a fixed text parameter without adjustment buttons.
    #[must_use]
    pub fn text(id: ParameterId, text: &str) -> Self {
        Self {
            id,
            value: ParameterValue::Text(bounded_text(text)),
            has_buttons: false,
        }
    }

    /// Returns the display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.id.name()
    }

    /// Returns the unit of a numeric parameter.
    #[must_use]
    pub fn unit(&self) -> Option<Unit> {
        self.value.quantity().map(Quantity::unit)
    }
}

/// Errors raised by parameter lookups and mutations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParameterError {
    /// No parameter matches the requested identifier or name.
    UnknownParameter,
    /// The parameter exists but is not in the store.
    Missing(ParameterId),
    /// The parameter has no adjustment buttons.
    NotAdjustable(ParameterId),
    /// The value does not parse as `<number><unit>`.
    Malformed(ParameterId),
    /// A new value uses a different unit than the stored one.
    UnitMismatch { id: ParameterId, expected: Unit },
    /// A cycle input must be strictly positive.
    NotPositive(ParameterId),
    /// A cycle input does not fit the device command field.
    OutOfRange(ParameterId),
    /// The store has no room for another parameter.
    StoreFull,
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterError::UnknownParameter => f.write_str("unknown parameter"),
            ParameterError::Missing(id) => write!(f, "missing parameter {id}"),
            ParameterError::NotAdjustable(id) => write!(f, "{id} is not adjustable"),
            ParameterError::Malformed(id) => write!(f, "{id} has a malformed value"),
            ParameterError::UnitMismatch { id, expected } => {
                write!(f, "{id} expects a value in {expected}")
            }
            ParameterError::NotPositive(id) => write!(f, "{id} must be greater than zero"),
            ParameterError::OutOfRange(id) => write!(f, "{id} is out of range"),
            ParameterError::StoreFull => f.write_str("parameter store full"),
        }
    }
}

/// Default tip label before the tip memory has been read.
pub const DEFAULT_TIP_TYPE: &str = "NONE";

/// Default treatment parameters in display order.
#[must_use]
pub fn default_parameters() -> [TreatmentParameter; 6] {
    [
        TreatmentParameter::text(ParameterId::TipType, DEFAULT_TIP_TYPE),
        TreatmentParameter::quantity(
            ParameterId::Intensity,
            Quantity::whole(50, Unit::Percent),
        ),
        TreatmentParameter::quantity(
            ParameterId::Rf,
            Quantity::whole(1_000, Unit::Milliseconds),
        ),
        TreatmentParameter::quantity(
            ParameterId::Depth,
            Quantity::from_raw(20, Unit::Millimeters),
        ),
        TreatmentParameter::quantity(ParameterId::Mode, Quantity::from_raw(2, Unit::Seconds)),
        TreatmentParameter::quantity(
            ParameterId::DelayTime,
            Quantity::whole(100, Unit::Milliseconds),
        ),
    ]
}

/// Renders the tip label for a tip memory type code (`16` becomes `16PIN`).
#[must_use]
pub fn tip_type_label(code: u8) -> ValueText {
    let mut label = ValueText::new();
    let _ = write!(label, "{code}PIN");
    label
}

/// In-memory store of the current treatment parameters.
#[derive(Clone, Debug)]
pub struct ParameterStore {
    parameters: Vec<TreatmentParameter, MAX_PARAMETERS>,
}

impl ParameterStore {
    /// Creates a store seeded with [`default_parameters`].
    #[must_use]
    pub fn new() -> Self {
        let mut store = Self::empty();
        for parameter in default_parameters() {
            // Six defaults always fit in MAX_PARAMETERS.
            let _ = store.parameters.push(parameter);
        }
        store
    }

    /// Creates a store without any parameters.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    /// Inserts or replaces a parameter.
    pub fn insert(&mut self, parameter: TreatmentParameter) -> Result<(), ParameterError> {
        if let Some(existing) = self.entry_mut(parameter.id) {
            *existing = parameter;
            Ok(())
        } else {
            self.parameters
                .push(parameter)
                .map_err(|_| ParameterError::StoreFull)
        }
    }

    /// Removes a parameter, returning it when present.
    pub fn remove(&mut self, id: ParameterId) -> Option<TreatmentParameter> {
        let index = self.parameters.iter().position(|entry| entry.id == id)?;
        Some(self.parameters.remove(index))
    }

    /// Returns the formatted value for a display name, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ValueText> {
        ParameterId::from_name(name).and_then(|id| self.get_by_id(id))
    }

    /// Returns the formatted value for an identifier, if present.
    #[must_use]
    pub fn get_by_id(&self, id: ParameterId) -> Option<ValueText> {
        self.parameter(id).map(|parameter| parameter.value.render())
    }

    /// Derives the execution record for one treatment cycle.
    pub fn cycle_request(&self) -> Result<CycleRequest, ParameterError> {
        CycleRequest::from_parameters(self)
    }

    /// Returns the parameter with the given identifier.
    #[must_use]
    pub fn parameter(&self, id: ParameterId) -> Option<&TreatmentParameter> {
        self.parameters.iter().find(|entry| entry.id == id)
    }

    /// Returns the numeric value of a parameter.
    pub fn quantity(&self, id: ParameterId) -> Result<Quantity, ParameterError> {
        self.parameter(id)
            .ok_or(ParameterError::Missing(id))?
            .value
            .quantity()
            .ok_or(ParameterError::Malformed(id))
    }

    /// Iterates over parameters in insertion order.
    pub fn iter(&self) -> core::slice::Iter<'_, TreatmentParameter> {
        self.parameters.iter()
    }

    /// Number of stored parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns `true` when the store holds no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Applies one unit-aware step to a numeric parameter.
    pub fn adjust(
        &mut self,
        id: ParameterId,
        direction: Direction,
    ) -> Result<&TreatmentParameter, ParameterError> {
        let entry = self.entry_mut(id).ok_or(ParameterError::Missing(id))?;
        if !entry.has_buttons {
            return Err(ParameterError::NotAdjustable(id));
        }

        let current = entry.value.quantity().ok_or(ParameterError::Malformed(id))?;
        entry.value = ParameterValue::Quantity(current.stepped(direction));
        Ok(entry)
    }

    /// Replaces a parameter value from operator text.
    ///
    /// Numeric parameters must keep their unit; text parameters accept any
    /// label up to [`MAX_VALUE_LEN`] bytes.
    pub fn set_value(
        &mut self,
        id: ParameterId,
        text: &str,
    ) -> Result<&TreatmentParameter, ParameterError> {
        let entry = self.entry_mut(id).ok_or(ParameterError::Missing(id))?;
        match entry.value.quantity() {
            Some(current) => {
                let parsed = Quantity::parse(text).map_err(|_| ParameterError::Malformed(id))?;
                if parsed.unit() != current.unit() {
                    return Err(ParameterError::UnitMismatch {
                        id,
                        expected: current.unit(),
                    });
                }
                entry.value = ParameterValue::Quantity(parsed);
            }
            None => entry.value = ParameterValue::Text(bounded_text(text.trim())),
        }
        Ok(entry)
    }

    /// Applies the tip type read from tip memory.
    pub fn set_tip_type(&mut self, code: u8) -> Result<(), ParameterError> {
        let label = tip_type_label(code);
        match self.entry_mut(ParameterId::TipType) {
            Some(entry) => {
                entry.value = ParameterValue::Text(label);
                Ok(())
            }
            None => self.insert(TreatmentParameter::text(ParameterId::TipType, &label)),
        }
    }

    /// Returns the current tip label.
    #[must_use]
    pub fn tip_type(&self) -> Option<&str> {
        match &self.parameter(ParameterId::TipType)?.value {
            ParameterValue::Text(text) => Some(text.as_str()),
            ParameterValue::Quantity(_) => None,
        }
    }

    fn entry_mut(&mut self, id: ParameterId) -> Option<&mut TreatmentParameter> {
        self.parameters.iter_mut().find(|entry| entry.id == id)
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

fn bounded_text(text: &str) -> ValueText {
    let mut out = ValueText::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(store: &ParameterStore, id: ParameterId) -> ValueText {
        store
            .parameter(id)
            .expect("parameter present")
            .value
            .render()
    }

    #[test]
    fn defaults_match_ready_screen() {
        let store = ParameterStore::new();
        assert_eq!(store.len(), 6);
        assert_eq!(store.get("TIP TYPE").as_deref(), Some("NONE"));
        assert_eq!(store.get("INTENSITY").as_deref(), Some("50%"));
        assert_eq!(store.get("RF").as_deref(), Some("1000ms"));
        assert_eq!(store.get("DEPTH").as_deref(), Some("2.0mm"));
        assert_eq!(store.get("MODE").as_deref(), Some("0.2s"));
        assert_eq!(store.get("DELAY TIME").as_deref(), Some("100ms"));
        assert!(store.get("VOLTAGE").is_none());
    }

    #[test]
    fn names_resolve_loosely() {
        assert_eq!(ParameterId::from_name("delay-time"), Some(ParameterId::DelayTime));
        assert_eq!(ParameterId::from_name("tip_type"), Some(ParameterId::TipType));
        assert_eq!(ParameterId::from_name(" depth "), Some(ParameterId::Depth));
        assert_eq!(ParameterId::from_name("dept"), None);
        assert_eq!(ParameterId::from_index(5), Some(ParameterId::DelayTime));
        assert_eq!(ParameterId::from_index(9), None);
    }

    #[test]
    fn adjustments_preserve_suffix() {
        let mut store = ParameterStore::new();
        for id in ParameterId::ALL.into_iter().skip(1) {
            let before = store.parameter(id).and_then(TreatmentParameter::unit);
            for direction in [Direction::Increase, Direction::Decrease, Direction::Decrease] {
                store.adjust(id, direction).expect("adjust");
                let text = rendered(&store, id);
                let unit = Unit::detect(&text).expect("suffix present");
                assert_eq!(Some(unit), before, "{id} changed unit: {text}");
                assert!(Quantity::parse(&text).is_ok(), "{text} no longer parses");
            }
        }
    }

    #[test]
    fn adjustment_steps_per_unit() {
        let mut store = ParameterStore::new();
        store.adjust(ParameterId::Rf, Direction::Increase).expect("rf");
        store.adjust(ParameterId::Intensity, Direction::Increase).expect("intensity");
        store.adjust(ParameterId::Depth, Direction::Decrease).expect("depth");
        store.adjust(ParameterId::Mode, Direction::Increase).expect("mode");

        assert_eq!(rendered(&store, ParameterId::Rf).as_str(), "1010ms");
        assert_eq!(rendered(&store, ParameterId::Intensity).as_str(), "55%");
        assert_eq!(rendered(&store, ParameterId::Depth).as_str(), "1.9mm");
        assert_eq!(rendered(&store, ParameterId::Mode).as_str(), "0.3s");
    }

    #[test]
    fn decrement_is_not_clamped() {
        let mut store = ParameterStore::new();
        store.set_value(ParameterId::Intensity, "5%").expect("set");
        store.adjust(ParameterId::Intensity, Direction::Decrease).expect("to zero");
        store.adjust(ParameterId::Intensity, Direction::Decrease).expect("below zero");
        assert_eq!(rendered(&store, ParameterId::Intensity).as_str(), "-5%");
    }

    #[test]
    fn tip_type_is_not_adjustable() {
        let mut store = ParameterStore::new();
        assert_eq!(
            store.adjust(ParameterId::TipType, Direction::Increase).err(),
            Some(ParameterError::NotAdjustable(ParameterId::TipType))
        );
    }

    #[test]
    fn set_value_requires_matching_unit() {
        let mut store = ParameterStore::new();
        assert_eq!(
            store.set_value(ParameterId::Rf, "2s").err(),
            Some(ParameterError::UnitMismatch {
                id: ParameterId::Rf,
                expected: Unit::Milliseconds,
            })
        );
        assert_eq!(
            store.set_value(ParameterId::Rf, "fast").err(),
            Some(ParameterError::Malformed(ParameterId::Rf))
        );
        store.set_value(ParameterId::Rf, "750ms").expect("set rf");
        assert_eq!(store.get("RF").as_deref(), Some("750ms"));
    }

    #[test]
    fn tip_memory_codes_render_pin_labels() {
        let mut store = ParameterStore::new();
        for (code, label) in [(16, "16PIN"), (25, "25PIN"), (81, "81PIN"), (7, "7PIN")] {
            store.set_tip_type(code).expect("tip type");
            assert_eq!(store.tip_type(), Some(label));
        }
    }

    #[test]
    fn missing_parameters_are_reported() {
        let mut store = ParameterStore::new();
        assert!(store.remove(ParameterId::Depth).is_some());
        assert_eq!(
            store.quantity(ParameterId::Depth),
            Err(ParameterError::Missing(ParameterId::Depth))
        );
        assert_eq!(
            store.adjust(ParameterId::Depth, Direction::Increase).err(),
            Some(ParameterError::Missing(ParameterId::Depth))
        );
    }
}
