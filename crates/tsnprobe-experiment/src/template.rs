//! `$name` substitution for perf filters and qdisc profile lines.
//!
//! The placeholder set is closed. A template naming anything else fails to
//! parse, so typos in configuration surface before any command runs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::TemplateError;

/// Every value a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    /// Payload size plus Ethernet and VLAN header bytes.
    PayloadLen,
    /// Physical interface beneath the VLAN interface.
    PhyName,
    /// VLAN tag control information for the socket priority.
    VlanTci,
    /// Interface under test.
    Iface,
    TsnHwQueue,
    TsnVlanPrio,
    OtherHwQueue,
}

impl Placeholder {
    pub const ALL: [Placeholder; 7] = [
        Placeholder::PayloadLen,
        Placeholder::PhyName,
        Placeholder::VlanTci,
        Placeholder::Iface,
        Placeholder::TsnHwQueue,
        Placeholder::TsnVlanPrio,
        Placeholder::OtherHwQueue,
    ];

    /// Name as written after `$`.
    pub const fn name(self) -> &'static str {
        match self {
            Placeholder::PayloadLen => "payload_len",
            Placeholder::PhyName => "phy_name",
            Placeholder::VlanTci => "vlan_tci",
            Placeholder::Iface => "iface",
            Placeholder::TsnHwQueue => "tsn_hw_queue",
            Placeholder::TsnVlanPrio => "tsn_vlan_prio",
            Placeholder::OtherHwQueue => "other_hw_queue",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `source`, rejecting unknown placeholders.
    ///
    /// A `$` not followed by an identifier character is kept literally.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(pos) = rest.find('$') {
            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let ident_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());

            if ident_len == 0 {
                literal.push('$');
                rest = after;
                continue;
            }

            let name = &after[..ident_len];
            let placeholder =
                Placeholder::from_name(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
                    name: name.to_string(),
                    template: source.to_string(),
                })?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Slot(placeholder));
            rest = &after[ident_len..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Placeholders referenced, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Slot(p) => Some(*p),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder. Each one referenced must be bound.
    pub fn render(&self, bindings: &Bindings) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(p) => {
                    let value = bindings.get(*p).ok_or_else(|| TemplateError::Unbound {
                        name: p.name().to_string(),
                        template: self.source.clone(),
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// The unparsed source text.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Values for rendering templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: BTreeMap<Placeholder, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `placeholder`, replacing any earlier value.
    pub fn with(mut self, placeholder: Placeholder, value: impl ToString) -> Self {
        self.set(placeholder, value);
        self
    }

    pub fn set(&mut self, placeholder: Placeholder, value: impl ToString) {
        self.values.insert(placeholder, value.to_string());
    }

    pub fn get(&self, placeholder: Placeholder) -> Option<&str> {
        self.values.get(&placeholder).map(String::as_str)
    }
}
