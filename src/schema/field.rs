//! Primitive field descriptors and their byte encodings.

use std::sync::Arc;

use crate::{
    address::Address,
    error::{KitError, Result},
    schema::instrument::{Bank, InstrumentLibrary, InstrumentRef},
    slice::{WOSlice, max_packed},
    store::DataStore,
};

/// Longest encoded run a single field may occupy.
pub const MAX_FIELD_BYTES: usize = 32;

pub(crate) type FieldBytes = heapless::Vec<u8, MAX_FIELD_BYTES>;

/// One encoded run of bytes, relative to the field's context base.
#[derive(Debug, Clone)]
pub(crate) struct Patch {
    pub(crate) offset: u32,
    pub(crate) bytes: FieldBytes,
}

/// Every run a field write touches. Instrument fields touch two.
pub(crate) type Patches = heapless::Vec<Patch, 2>;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    /// Index into the field's symbol table.
    Enum(usize),
    /// Text without its trailing space padding.
    Text(String),
    Numeric(i32),
    Instrument(InstrumentRef),
}

impl FieldValue {
    /// The value as an overlay discriminator, if the kind can act as one.
    pub fn discriminant(&self) -> Option<i32> {
        match self {
            FieldValue::Bool(b) => Some(i32::from(*b)),
            FieldValue::Enum(i) => i32::try_from(*i).ok(),
            FieldValue::Numeric(v) => Some(*v),
            FieldValue::Text(_) | FieldValue::Instrument(_) => None,
        }
    }
}

/// Encoding of a signed or unsigned integer with optional display scale.
///
/// The stored raw value is `value - value_offset`; the displayed text is
/// `value / divisor` followed by the optional suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericSpec {
    width: u8,
    min: i32,
    max: i32,
    value_offset: i32,
    divisor: i32,
    suffix: Option<String>,
}

impl NumericSpec {
    /// `width` is the number of data bytes: 1 (7-bit), 2 or 4 (nibble-packed).
    pub fn new(width: u8, min: i32, max: i32) -> Self {
        Self {
            width,
            min,
            max,
            value_offset: 0,
            divisor: 1,
            suffix: None,
        }
    }

    pub fn with_value_offset(mut self, value_offset: i32) -> Self {
        self.value_offset = value_offset;
        self
    }

    /// Power of ten the value is divided by for display.
    pub fn with_divisor(mut self, divisor: i32) -> Self {
        self.divisor = divisor;
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    fn raw_of(&self, value: i32) -> Option<u32> {
        let raw = u32::try_from(i64::from(value) - i64::from(self.value_offset)).ok()?;
        (raw <= max_packed(self.width())?).then_some(raw)
    }

    fn value_of(&self, raw: u32) -> i32 {
        (i64::from(raw) + i64::from(self.value_offset)) as i32
    }

    fn decimals(&self) -> usize {
        let mut d = self.divisor;
        let mut n = 0;
        while d > 1 && d % 10 == 0 {
            d /= 10;
            n += 1;
        }
        n
    }

    pub fn format(&self, value: i32) -> String {
        let decimals = self.decimals();
        let body = if decimals == 0 {
            value.to_string()
        } else {
            let d = i64::from(self.divisor);
            let v = i64::from(value);
            let sign = if v < 0 { "-" } else { "" };
            let a = v.abs();
            format!("{sign}{}.{:0width$}", a / d, a % d, width = decimals)
        };
        match &self.suffix {
            Some(suffix) => format!("{body}{suffix}"),
            None => body,
        }
    }

    /// Parses display text back into a value, tolerating a missing suffix.
    pub fn parse(&self, text: &str) -> Option<i32> {
        let mut text = text.trim();
        if let Some(suffix) = &self.suffix {
            text = text.strip_suffix(suffix.trim()).unwrap_or(text).trim_end();
        }

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return None;
        }

        let decimals = self.decimals();
        if frac_part.len() > decimals {
            return None;
        }

        let mut scaled: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        for _ in 0..decimals {
            scaled = scaled.checked_mul(10)?;
        }
        if decimals > 0 && !frac_part.is_empty() {
            let padded = format!("{frac_part:0<decimals$}");
            scaled = scaled.checked_add(padded.parse::<i64>().ok()?)?;
        }
        if negative {
            scaled = -scaled;
        }
        i32::try_from(scaled).ok()
    }

    fn validate(&self, name: &str) -> Result<()> {
        if max_packed(self.width()).is_none() {
            return Err(KitError::invariant(format!(
                "{name}: unsupported numeric width {}",
                self.width
            )));
        }
        if self.min > self.max {
            return Err(KitError::invariant(format!("{name}: min exceeds max")));
        }
        if self.divisor < 1 || 10i32.pow(self.decimals() as u32) != self.divisor {
            return Err(KitError::invariant(format!(
                "{name}: divisor {} is not a power of ten",
                self.divisor
            )));
        }
        if self.raw_of(self.min).is_none() || self.raw_of(self.max).is_none() {
            return Err(KitError::invariant(format!(
                "{name}: range does not fit {} bytes",
                self.width
            )));
        }
        Ok(())
    }
}

/// The type-specific part of a field descriptor.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// One byte, 0 or 1.
    Boolean,
    /// One byte indexing `values`.
    Enum { values: Vec<String> },
    /// `length` bytes of printable ASCII, space padded.
    Text { length: u32 },
    Numeric(NumericSpec),
    /// A 4-nibble id at the field offset and a bank byte at `bank_offset`.
    Instrument {
        bank_offset: u32,
        library: Arc<InstrumentLibrary>,
    },
}

/// Enable predicate: the field is only meaningful while another field in
/// the same context holds `value`.
#[derive(Debug, Clone)]
pub struct Condition {
    field: Arc<Field>,
    value: FieldValue,
}

impl Condition {
    pub fn new(field: Field, value: FieldValue) -> Self {
        Self {
            field: Arc::new(field),
            value,
        }
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn is_satisfied(&self, base: Address, store: &DataStore) -> Result<bool> {
        Ok(self.field.read_at(base, store)? == self.value)
    }
}

/// A primitive field within a container.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    offset: u32,
    kind: FieldKind,
    default: FieldValue,
    condition: Option<Condition>,
}

impl Field {
    fn with_kind(name: impl Into<String>, offset: u32, kind: FieldKind, default: FieldValue) -> Self {
        Self {
            name: name.into(),
            offset,
            kind,
            default,
            condition: None,
        }
    }

    pub fn boolean(name: impl Into<String>, offset: u32) -> Self {
        Self::with_kind(name, offset, FieldKind::Boolean, FieldValue::Bool(false))
    }

    pub fn enumeration<I, S>(name: impl Into<String>, offset: u32, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        Self::with_kind(name, offset, FieldKind::Enum { values }, FieldValue::Enum(0))
    }

    pub fn text(name: impl Into<String>, offset: u32, length: u32) -> Self {
        Self::with_kind(
            name,
            offset,
            FieldKind::Text { length },
            FieldValue::Text(String::new()),
        )
    }

    /// Defaults to zero when in range, otherwise to `min`.
    pub fn numeric(name: impl Into<String>, offset: u32, spec: NumericSpec) -> Self {
        let default = if spec.min <= 0 && 0 <= spec.max { 0 } else { spec.min };
        Self::with_kind(
            name,
            offset,
            FieldKind::Numeric(spec),
            FieldValue::Numeric(default),
        )
    }

    pub fn instrument(
        name: impl Into<String>,
        offset: u32,
        bank_offset: u32,
        library: Arc<InstrumentLibrary>,
    ) -> Self {
        Self::with_kind(
            name,
            offset,
            FieldKind::Instrument {
                bank_offset,
                library,
            },
            FieldValue::Instrument(InstrumentRef::preset(0)),
        )
    }

    pub fn with_default(mut self, default: FieldValue) -> Self {
        self.default = default;
        self
    }

    pub fn enabled_when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn default_value(&self) -> &FieldValue {
        &self.default
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Length of the run at the field offset.
    pub fn byte_len(&self) -> usize {
        match &self.kind {
            FieldKind::Boolean | FieldKind::Enum { .. } => 1,
            FieldKind::Text { length } => *length as usize,
            FieldKind::Numeric(spec) => spec.width(),
            FieldKind::Instrument { .. } => 4,
        }
    }

    /// Every `(offset, len)` run the field occupies, relative to its context.
    pub fn spans(&self) -> heapless::Vec<(u32, usize), 2> {
        let mut spans = heapless::Vec::new();
        // Capacity is 2 and at most two runs are pushed.
        let _ = spans.push((self.offset, self.byte_len()));
        if let FieldKind::Instrument { bank_offset, .. } = &self.kind {
            let _ = spans.push((*bank_offset, 1));
        }
        spans
    }

    /// First offset past every run of the field.
    pub fn extent(&self) -> u32 {
        self.spans()
            .iter()
            .map(|(offset, len)| offset + *len as u32)
            .max()
            .unwrap_or(self.offset)
    }

    /// Returns true if the field's enable predicate holds for the context at `base`.
    pub fn is_enabled(&self, base: Address, store: &DataStore) -> Result<bool> {
        match &self.condition {
            Some(condition) => condition.is_satisfied(base, store),
            None => Ok(true),
        }
    }

    /// Decodes the field for the context at `base`.
    ///
    /// Decoding is lenient about content; only unmapped addresses fail.
    pub fn read_at(&self, base: Address, store: &DataStore) -> Result<FieldValue> {
        let addr = base + self.offset;
        let len = self.byte_len();
        match &self.kind {
            FieldKind::Boolean => {
                store.with_ro_slice(addr, len, |s| FieldValue::Bool(s.read_u7_at(0) != 0))
            }
            FieldKind::Enum { .. } => {
                store.with_ro_slice(addr, len, |s| FieldValue::Enum(usize::from(s.read_u7_at(0))))
            }
            FieldKind::Text { .. } => store.with_ro_slice(addr, len, |s| {
                FieldValue::Text(s.read_ascii_at(0, len).trim_end().to_owned())
            }),
            FieldKind::Numeric(spec) => store.with_ro_slice(addr, len, |s| {
                FieldValue::Numeric(spec.value_of(s.read_packed_at(0, len)))
            }),
            FieldKind::Instrument { bank_offset, .. } => {
                let id = store.with_ro_slice(addr, len, |s| s.read_nibbles4_at(0) as u16)?;
                let bank = store.with_ro_slice(base + *bank_offset, 1, |s| {
                    Bank::from_raw(s.read_u7_at(0))
                })?;
                Ok(FieldValue::Instrument(InstrumentRef { bank, id }))
            }
        }
    }

    /// Checks `value` against the field's type and range contract.
    pub fn check(&self, value: &FieldValue) -> Result<()> {
        match (&self.kind, value) {
            (FieldKind::Boolean, FieldValue::Bool(_)) => Ok(()),
            (FieldKind::Enum { values }, FieldValue::Enum(idx)) => {
                if *idx < values.len() {
                    Ok(())
                } else {
                    Err(KitError::validation(
                        &self.name,
                        format!("index {idx} outside {} values", values.len()),
                    ))
                }
            }
            (FieldKind::Text { length }, FieldValue::Text(text)) => {
                if text.len() > *length as usize {
                    Err(KitError::validation(
                        &self.name,
                        format!("text longer than {length} characters"),
                    ))
                } else if !text.bytes().all(|b| (0x20..0x7F).contains(&b)) {
                    Err(KitError::validation(&self.name, "text must be printable ASCII"))
                } else if text.ends_with(' ') {
                    // Trailing spaces are padding and would not read back.
                    Err(KitError::validation(&self.name, "text must not end with a space"))
                } else {
                    Ok(())
                }
            }
            (FieldKind::Numeric(spec), FieldValue::Numeric(v)) => {
                if *v < spec.min || *v > spec.max || spec.raw_of(*v).is_none() {
                    Err(KitError::validation(
                        &self.name,
                        format!("{v} outside {}..={}", spec.min, spec.max),
                    ))
                } else {
                    Ok(())
                }
            }
            (FieldKind::Instrument { library, .. }, FieldValue::Instrument(inst)) => {
                if library.contains(*inst) {
                    Ok(())
                } else {
                    Err(KitError::validation(
                        &self.name,
                        format!("no {} instrument {}", inst.bank, inst.id),
                    ))
                }
            }
            (kind, value) => Err(KitError::validation(
                &self.name,
                format!("{value:?} does not fit a {} field", kind_name(kind)),
            )),
        }
    }

    /// Checks and encodes `value` into the runs it occupies.
    pub(crate) fn encode(&self, value: &FieldValue) -> Result<Patches> {
        self.check(value)?;

        let len = self.byte_len();
        if len > MAX_FIELD_BYTES {
            return Err(KitError::invariant(format!(
                "{}: {len} bytes exceed the field limit",
                self.name
            )));
        }

        let mut buf = [0u8; MAX_FIELD_BYTES];
        {
            let mut slice = WOSlice::new(&mut buf[..len]);
            match value {
                FieldValue::Bool(b) => slice.write_u7_at(0, u8::from(*b)),
                FieldValue::Enum(idx) => slice.write_u7_at(0, *idx as u8),
                FieldValue::Text(text) => slice.write_ascii_at(0, len, text),
                FieldValue::Numeric(v) => {
                    if let FieldKind::Numeric(spec) = &self.kind {
                        let raw = spec.raw_of(*v).unwrap_or_default();
                        slice.write_packed_at(0, len, raw);
                    }
                }
                FieldValue::Instrument(inst) => slice.write_nibbles4_at(0, u32::from(inst.id)),
            }
        }

        let mut patches = Patches::new();
        let main = Patch {
            offset: self.offset,
            bytes: FieldBytes::from_slice(&buf[..len])
                .map_err(|_| KitError::invariant("field encoding overflow"))?,
        };
        let _ = patches.push(main);

        if let (FieldKind::Instrument { bank_offset, .. }, FieldValue::Instrument(inst)) =
            (&self.kind, value)
        {
            let bank = Patch {
                offset: *bank_offset,
                bytes: FieldBytes::from_slice(&[inst.bank.raw()])
                    .map_err(|_| KitError::invariant("field encoding overflow"))?,
            };
            let _ = patches.push(bank);
        }

        Ok(patches)
    }

    /// Formats a value of this field for display.
    pub fn format(&self, value: &FieldValue) -> String {
        match (&self.kind, value) {
            (FieldKind::Boolean, FieldValue::Bool(b)) => (if *b { "On" } else { "Off" }).to_owned(),
            (FieldKind::Enum { values }, FieldValue::Enum(idx)) => values
                .get(*idx)
                .cloned()
                .unwrap_or_else(|| format!("Invalid ({idx})")),
            (FieldKind::Text { .. }, FieldValue::Text(text)) => text.clone(),
            (FieldKind::Numeric(spec), FieldValue::Numeric(v)) => spec.format(*v),
            (FieldKind::Instrument { library, .. }, FieldValue::Instrument(inst)) => {
                library.describe(*inst)
            }
            (_, value) => format!("{value:?}"),
        }
    }

    /// Parses display text into a checked value.
    pub fn parse(&self, text: &str) -> Result<FieldValue> {
        let invalid = || KitError::validation(&self.name, format!("cannot parse {text:?}"));
        let value = match &self.kind {
            FieldKind::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" | "1" => FieldValue::Bool(true),
                "off" | "false" | "no" | "0" => FieldValue::Bool(false),
                _ => return Err(invalid()),
            },
            FieldKind::Enum { values } => values
                .iter()
                .position(|v| v.eq_ignore_ascii_case(text.trim()))
                .map(FieldValue::Enum)
                .ok_or_else(invalid)?,
            FieldKind::Text { .. } => FieldValue::Text(text.trim_end().to_owned()),
            FieldKind::Numeric(spec) => spec.parse(text).map(FieldValue::Numeric).ok_or_else(invalid)?,
            FieldKind::Instrument { library, .. } => library
                .parse(text)
                .map(FieldValue::Instrument)
                .ok_or_else(invalid)?,
        };
        self.check(&value)?;
        Ok(value)
    }

    /// Checks the descriptor itself: encodable layout and a valid default.
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            FieldKind::Enum { values } if values.is_empty() || values.len() > 0x80 => {
                return Err(KitError::invariant(format!(
                    "{}: enum needs 1..=128 values",
                    self.name
                )));
            }
            FieldKind::Text { length } if *length == 0 || *length as usize > MAX_FIELD_BYTES => {
                return Err(KitError::invariant(format!(
                    "{}: text length must be 1..={MAX_FIELD_BYTES}",
                    self.name
                )));
            }
            FieldKind::Numeric(spec) => spec.validate(&self.name)?,
            _ => {}
        }
        self.check(&self.default).map_err(|e| {
            KitError::invariant(format!("{}: invalid default ({e})", self.name))
        })
    }
}

fn kind_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Boolean => "boolean",
        FieldKind::Enum { .. } => "enum",
        FieldKind::Text { .. } => "text",
        FieldKind::Numeric(_) => "numeric",
        FieldKind::Instrument { .. } => "instrument",
    }
}
