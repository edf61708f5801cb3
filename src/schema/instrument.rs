//! Instrument tables referenced by instrument fields.

use core::fmt;

/// Which bank an instrument reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    Preset,
    UserSample,
}

impl Bank {
    pub(crate) fn from_raw(raw: u8) -> Self {
        if raw == 0 { Bank::Preset } else { Bank::UserSample }
    }

    pub(crate) fn raw(self) -> u8 {
        match self {
            Bank::Preset => 0,
            Bank::UserSample => 1,
        }
    }
}

/// Value of an instrument field: a bank plus an id within that bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrumentRef {
    pub bank: Bank,
    pub id: u16,
}

impl InstrumentRef {
    pub const fn preset(id: u16) -> Self {
        Self {
            bank: Bank::Preset,
            id,
        }
    }

    /// User samples are numbered from 1 in text but stored from 0.
    pub const fn user_sample(id: u16) -> Self {
        Self {
            bank: Bank::UserSample,
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    id: u16,
    name: String,
}

impl Instrument {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentGroup {
    name: String,
    instruments: Vec<Instrument>,
}

impl InstrumentGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }
}

/// A resolved instrument reference: bank, owning group and instrument name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedInstrument<'a> {
    pub bank: Bank,
    pub group: Option<&'a InstrumentGroup>,
    pub instrument: Option<&'a Instrument>,
}

/// Preset instruments grouped by category, plus the number of user sample slots.
///
/// Preset ids are assigned sequentially across groups in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentLibrary {
    groups: Vec<InstrumentGroup>,
    user_samples: u16,
}

impl InstrumentLibrary {
    pub fn new(user_samples: u16) -> Self {
        Self {
            groups: Vec::new(),
            user_samples,
        }
    }

    /// Appends a group whose instruments receive the next free preset ids.
    pub fn with_group<I, S>(mut self, name: impl Into<String>, instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // Ids are 16 bits wide; instruments past the last id are dropped.
        let instruments = instruments
            .into_iter()
            .zip(self.preset_count()..)
            .map_while(|(n, id)| {
                u16::try_from(id).ok().map(|id| Instrument {
                    id,
                    name: n.into(),
                })
            })
            .collect();
        self.groups.push(InstrumentGroup {
            name: name.into(),
            instruments,
        });
        self
    }

    pub fn groups(&self) -> &[InstrumentGroup] {
        &self.groups
    }

    pub fn preset_count(&self) -> u32 {
        self.groups
            .iter()
            .map(|g| g.instruments.len())
            .sum::<usize>()
            .try_into()
            .unwrap_or(u32::MAX)
    }

    pub fn user_samples(&self) -> u16 {
        self.user_samples
    }

    pub fn contains(&self, inst: InstrumentRef) -> bool {
        match inst.bank {
            Bank::Preset => u32::from(inst.id) < self.preset_count(),
            Bank::UserSample => inst.id < self.user_samples,
        }
    }

    pub fn resolve(&self, inst: InstrumentRef) -> ResolvedInstrument<'_> {
        let found = match inst.bank {
            Bank::Preset => self.groups.iter().find_map(|g| {
                g.instruments
                    .iter()
                    .find(|i| i.id == inst.id)
                    .map(|i| (g, i))
            }),
            Bank::UserSample => None,
        };
        ResolvedInstrument {
            bank: inst.bank,
            group: found.map(|(g, _)| g),
            instrument: found.map(|(_, i)| i),
        }
    }

    pub fn describe(&self, inst: InstrumentRef) -> String {
        match (inst.bank, self.resolve(inst).instrument) {
            (Bank::Preset, Some(i)) => i.name.clone(),
            (Bank::Preset, None) => format!("Unknown preset {}", inst.id),
            (Bank::UserSample, _) => {
                format!("{USER_SAMPLE_PREFIX} {}", u32::from(inst.id) + 1)
            }
        }
    }

    /// Parses either a preset name (case-insensitive) or `User sample N`.
    pub fn parse(&self, text: &str) -> Option<InstrumentRef> {
        let text = text.trim();
        if let Some(n) = strip_prefix_ignore_case(text, USER_SAMPLE_PREFIX) {
            let n: u16 = n.trim().parse().ok()?;
            let inst = InstrumentRef::user_sample(n.checked_sub(1)?);
            return self.contains(inst).then_some(inst);
        }
        self.groups
            .iter()
            .flat_map(|g| g.instruments.iter())
            .find(|i| i.name.eq_ignore_ascii_case(text))
            .map(|i| InstrumentRef::preset(i.id))
    }
}

const USER_SAMPLE_PREFIX: &str = "User sample";

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bank::Preset => write!(f, "Preset"),
            Bank::UserSample => write!(f, "User sample"),
        }
    }
}
