//! Unit-aware parameter values.
//!
//! Values are displayed as a number followed by a unit suffix (`1000ms`, `50%`,
//! `2.0mm`, `0.2s`). Parsing goes through `winnow` and yields a typed
//! [`Quantity`]; formatting is always derived from the typed value so a stored
//! parameter can never lose its suffix or become unparseable.

use core::fmt;

use winnow::ascii::digit1;
use winnow::combinator::{alt, eof, opt, preceded, terminated};
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;

/// Unit suffix carried by an adjustable parameter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Unit {
    Milliseconds,
    Percent,
    Millimeters,
    Seconds,
}

impl Unit {
    /// Detection order for suffixes. `ms` must win over the bare `s`.
    pub const PRIORITY: [Unit; 4] = [
        Unit::Milliseconds,
        Unit::Percent,
        Unit::Millimeters,
        Unit::Seconds,
    ];

    /// Returns the display suffix.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Unit::Milliseconds => "ms",
            Unit::Percent => "%",
            Unit::Millimeters => "mm",
            Unit::Seconds => "s",
        }
    }

    /// Returns `true` for units displayed with one decimal place.
    #[must_use]
    pub const fn is_fractional(self) -> bool {
        matches!(self, Unit::Millimeters | Unit::Seconds)
    }

    /// Stored raw steps per whole unit.
    #[must_use]
    pub const fn scale(self) -> i32 {
        if self.is_fractional() { 10 } else { 1 }
    }

    /// Increment applied by a single adjustment, in raw steps.
    ///
    /// `ms` moves by 10, `%` by 5, `mm` and `s` by 0.1.
    #[must_use]
    pub const fn step(self) -> i32 {
        match self {
            Unit::Milliseconds => 10,
            Unit::Percent => 5,
            Unit::Millimeters | Unit::Seconds => 1,
        }
    }

    /// Detects the unit of a formatted value by its suffix.
    #[must_use]
    pub fn detect(text: &str) -> Option<Unit> {
        let text = text.trim_end();
        Self::PRIORITY
            .into_iter()
            .find(|unit| text.ends_with(unit.suffix()))
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Adjustment direction requested by the operator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    const fn sign(self) -> i32 {
        match self {
            Direction::Increase => 1,
            Direction::Decrease => -1,
        }
    }
}

/// Numeric parameter value stored in raw unit steps.
///
/// Integer units (`ms`, `%`) store whole values; fractional units (`mm`, `s`)
/// store tenths.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Quantity {
    raw: i32,
    unit: Unit,
}

impl Quantity {
    /// Creates a quantity from raw unit steps.
    #[must_use]
    pub const fn from_raw(raw: i32, unit: Unit) -> Self {
        Self { raw, unit }
    }

    /// Creates a whole-number quantity (`whole` units).
    #[must_use]
    pub const fn whole(whole: i32, unit: Unit) -> Self {
        Self::from_raw(whole.saturating_mul(unit.scale()), unit)
    }

    /// Returns the raw stored steps.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.raw
    }

    /// Returns the unit suffix.
    #[must_use]
    pub const fn unit(self) -> Unit {
        self.unit
    }

    /// Integer magnitude, truncating any fractional part toward zero.
    #[must_use]
    pub const fn truncated(self) -> i32 {
        self.raw / self.unit.scale()
    }

    /// Magnitude expressed in hundredths of the unit.
    #[must_use]
    pub fn hundredths(self) -> i64 {
        i64::from(self.raw) * 100 / i64::from(self.unit.scale())
    }

    /// Returns `true` when the magnitude is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.raw > 0
    }

    /// Applies one unit-aware step. No lower bound is enforced.
    #[must_use]
    pub const fn stepped(self, direction: Direction) -> Self {
        let delta = self.unit.step() * direction.sign();
        Self::from_raw(self.raw.saturating_add(delta), self.unit)
    }

    /// Parses a formatted value such as `"2.0mm"` or `"-10ms"`.
    pub fn parse(text: &str) -> Result<Self, QuantityParseError> {
        terminated(quantity, eof)
            .parse(text.trim())
            .map_err(|_| QuantityParseError)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_fractional() {
            let sign = if self.raw < 0 { "-" } else { "" };
            let magnitude = self.raw.unsigned_abs();
            write!(f, "{sign}{}.{}{}", magnitude / 10, magnitude % 10, self.unit)
        } else {
            write!(f, "{}{}", self.raw, self.unit)
        }
    }
}

/// Error returned when a value string does not match `<number><unit>`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QuantityParseError;

impl fmt::Display for QuantityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected <number><ms|%|mm|s>")
    }
}

fn unit(input: &mut &str) -> ModalResult<Unit> {
    alt((
        "ms".value(Unit::Milliseconds),
        "%".value(Unit::Percent),
        "mm".value(Unit::Millimeters),
        "s".value(Unit::Seconds),
    ))
    .parse_next(input)
}

fn whole_digits(input: &mut &str) -> ModalResult<i32> {
    digit1
        .verify_map(|digits: &str| digits.parse::<i32>().ok())
        .parse_next(input)
}

fn quantity(input: &mut &str) -> ModalResult<Quantity> {
    let negative = opt('-').parse_next(input)?.is_some();
    let whole = whole_digits.parse_next(input)?;
    let fraction = opt(preceded('.', digit1)).parse_next(input)?;
    let unit = unit.parse_next(input)?;

    let magnitude = if unit.is_fractional() {
        whole
            .checked_mul(10)
            .and_then(|tenths| tenths.checked_add(rounded_tenth(fraction)))
    } else {
        Some(whole)
    };

    let raw = magnitude.map(|value| if negative { -value } else { value });
    raw.map(|raw| Quantity::from_raw(raw, unit))
        .ok_or_else(|| ErrMode::from_input(input))
}

/// Rounds a decimal fraction to a single digit, half away from zero.
fn rounded_tenth(fraction: Option<&str>) -> i32 {
    let Some(digits) = fraction else {
        return 0;
    };
    let mut bytes = digits.bytes();
    let first = bytes.next().map_or(0, |digit| i32::from(digit - b'0'));
    let round_up = bytes.next().is_some_and(|digit| digit >= b'5');
    first + i32::from(round_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write as _;
    use heapless::String;

    fn render(quantity: Quantity) -> String<16> {
        let mut out = String::new();
        write!(out, "{quantity}").expect("render quantity");
        out
    }

    #[test]
    fn parses_each_unit() {
        assert_eq!(
            Quantity::parse("1000ms"),
            Ok(Quantity::from_raw(1_000, Unit::Milliseconds))
        );
        assert_eq!(Quantity::parse("50%"), Ok(Quantity::from_raw(50, Unit::Percent)));
        assert_eq!(
            Quantity::parse("2.0mm"),
            Ok(Quantity::from_raw(20, Unit::Millimeters))
        );
        assert_eq!(Quantity::parse("0.2s"), Ok(Quantity::from_raw(2, Unit::Seconds)));
    }

    #[test]
    fn millisecond_suffix_is_not_read_as_seconds() {
        let value = Quantity::parse("100ms").expect("parse ms");
        assert_eq!(value.unit(), Unit::Milliseconds);
        assert_eq!(Unit::detect("100ms"), Some(Unit::Milliseconds));
        assert_eq!(Unit::detect("1.5s"), Some(Unit::Seconds));
        assert_eq!(Unit::detect("NONE"), None);
    }

    #[test]
    fn integer_units_truncate_fractions() {
        let value = Quantity::parse("12.7ms").expect("parse");
        assert_eq!(value.raw(), 12);
        assert_eq!(render(value).as_str(), "12ms");
    }

    #[test]
    fn fractional_units_round_to_one_decimal() {
        assert_eq!(Quantity::parse("2.05mm").map(Quantity::raw), Ok(21));
        assert_eq!(Quantity::parse("2.04mm").map(Quantity::raw), Ok(20));
        assert_eq!(Quantity::parse("3mm").map(Quantity::raw), Ok(30));
    }

    #[test]
    fn rejects_missing_or_unknown_suffix() {
        assert!(Quantity::parse("100").is_err());
        assert!(Quantity::parse("100kg").is_err());
        assert!(Quantity::parse("ms").is_err());
        assert!(Quantity::parse("10ms extra").is_err());
    }

    #[test]
    fn negative_values_render_with_sign() {
        let value = Quantity::from_raw(-5, Unit::Millimeters);
        assert_eq!(render(value).as_str(), "-0.5mm");
        assert_eq!(Quantity::parse("-0.5mm"), Ok(value));
        assert_eq!(render(Quantity::from_raw(-10, Unit::Milliseconds)).as_str(), "-10ms");
    }

    #[test]
    fn steps_follow_unit() {
        let ms = Quantity::from_raw(100, Unit::Milliseconds).stepped(Direction::Increase);
        assert_eq!(render(ms).as_str(), "110ms");

        let pct = Quantity::from_raw(50, Unit::Percent).stepped(Direction::Decrease);
        assert_eq!(render(pct).as_str(), "45%");

        let mm = Quantity::from_raw(20, Unit::Millimeters).stepped(Direction::Increase);
        assert_eq!(render(mm).as_str(), "2.1mm");

        let s = Quantity::from_raw(2, Unit::Seconds).stepped(Direction::Decrease);
        assert_eq!(render(s).as_str(), "0.1s");
    }

    #[test]
    fn hundredths_scale_fractional_units() {
        assert_eq!(Quantity::from_raw(20, Unit::Millimeters).hundredths(), 200);
        assert_eq!(Quantity::from_raw(7, Unit::Milliseconds).hundredths(), 700);
    }
}
