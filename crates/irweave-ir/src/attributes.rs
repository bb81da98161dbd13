//! Function, parameter, return and global attributes.
//!
//! An [`AttributeSet`] is an ordered, duplicate-free collection: enum and
//! integer attributes first (by kind), then string attributes (by key). An
//! [`AttributeList`] holds one set per slot: function, return value, then one
//! per parameter.

use std::fmt;

/// Known attribute kinds. Discriminants are the values handed across the
/// C boundary; 0 is reserved for "no such attribute".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum AttrKind {
    AlwaysInline = 1,
    ArgMemOnly,
    Builtin,
    Cold,
    Convergent,
    InaccessibleMemOnly,
    InlineHint,
    InReg,
    JumpTable,
    MinSize,
    Naked,
    Nest,
    NoAlias,
    NoBuiltin,
    NoCapture,
    NoDuplicate,
    NoFree,
    NoImplicitFloat,
    NoInline,
    NonNull,
    NoRecurse,
    NoReturn,
    NoUnwind,
    OptimizeForSize,
    OptimizeNone,
    ReadNone,
    ReadOnly,
    Returned,
    ReturnsTwice,
    SExt,
    SafeStack,
    SanitizeAddress,
    SanitizeMemory,
    SanitizeThread,
    Speculatable,
    StackProtect,
    StackProtectReq,
    StrictFP,
    SwiftError,
    SwiftSelf,
    UWTable,
    WillReturn,
    WriteOnly,
    ZExt,
    // Integer attributes.
    Alignment,
    Dereferenceable,
    DereferenceableOrNull,
    StackAlignment,
}

/// Kind table in discriminant order, paired with the textual name.
const KINDS: &[(AttrKind, &str)] = &[
    (AttrKind::AlwaysInline, "alwaysinline"),
    (AttrKind::ArgMemOnly, "argmemonly"),
    (AttrKind::Builtin, "builtin"),
    (AttrKind::Cold, "cold"),
    (AttrKind::Convergent, "convergent"),
    (AttrKind::InaccessibleMemOnly, "inaccessiblememonly"),
    (AttrKind::InlineHint, "inlinehint"),
    (AttrKind::InReg, "inreg"),
    (AttrKind::JumpTable, "jumptable"),
    (AttrKind::MinSize, "minsize"),
    (AttrKind::Naked, "naked"),
    (AttrKind::Nest, "nest"),
    (AttrKind::NoAlias, "noalias"),
    (AttrKind::NoBuiltin, "nobuiltin"),
    (AttrKind::NoCapture, "nocapture"),
    (AttrKind::NoDuplicate, "noduplicate"),
    (AttrKind::NoFree, "nofree"),
    (AttrKind::NoImplicitFloat, "noimplicitfloat"),
    (AttrKind::NoInline, "noinline"),
    (AttrKind::NonNull, "nonnull"),
    (AttrKind::NoRecurse, "norecurse"),
    (AttrKind::NoReturn, "noreturn"),
    (AttrKind::NoUnwind, "nounwind"),
    (AttrKind::OptimizeForSize, "optsize"),
    (AttrKind::OptimizeNone, "optnone"),
    (AttrKind::ReadNone, "readnone"),
    (AttrKind::ReadOnly, "readonly"),
    (AttrKind::Returned, "returned"),
    (AttrKind::ReturnsTwice, "returns_twice"),
    (AttrKind::SExt, "signext"),
    (AttrKind::SafeStack, "safestack"),
    (AttrKind::SanitizeAddress, "sanitize_address"),
    (AttrKind::SanitizeMemory, "sanitize_memory"),
    (AttrKind::SanitizeThread, "sanitize_thread"),
    (AttrKind::Speculatable, "speculatable"),
    (AttrKind::StackProtect, "ssp"),
    (AttrKind::StackProtectReq, "sspreq"),
    (AttrKind::StrictFP, "strictfp"),
    (AttrKind::SwiftError, "swifterror"),
    (AttrKind::SwiftSelf, "swiftself"),
    (AttrKind::UWTable, "uwtable"),
    (AttrKind::WillReturn, "willreturn"),
    (AttrKind::WriteOnly, "writeonly"),
    (AttrKind::ZExt, "zeroext"),
    (AttrKind::Alignment, "align"),
    (AttrKind::Dereferenceable, "dereferenceable"),
    (AttrKind::DereferenceableOrNull, "dereferenceable_or_null"),
    (AttrKind::StackAlignment, "alignstack"),
];

impl AttrKind {
    pub fn from_name(name: &str) -> Option<Self> {
        KINDS
            .iter()
            .find(|(_, known)| *known == name)
            .map(|(kind, _)| *kind)
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        let index = (raw as usize).checked_sub(1)?;
        KINDS.get(index).map(|(kind, _)| *kind)
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        KINDS[self as usize - 1].1
    }

    /// Kinds that carry an integer payload.
    pub fn is_int(self) -> bool {
        matches!(
            self,
            AttrKind::Alignment
                | AttrKind::Dereferenceable
                | AttrKind::DereferenceableOrNull
                | AttrKind::StackAlignment
        )
    }
}

/// Numeric kind for an attribute name, 0 when the name is not known.
pub fn kind_for_name(name: &str) -> u32 {
    AttrKind::from_name(name).map_or(0, AttrKind::as_raw)
}

/// A single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Attribute {
    Enum(AttrKind),
    Int(AttrKind, u64),
    Str { key: String, value: String },
}

impl Attribute {
    /// Builds an enum or integer attribute depending on `kind`.
    pub fn from_kind(kind: AttrKind, value: u64) -> Self {
        if kind.is_int() {
            Attribute::Int(kind, value)
        } else {
            Attribute::Enum(kind)
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute::Str {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> Option<AttrKind> {
        match self {
            Attribute::Enum(kind) | Attribute::Int(kind, _) => Some(*kind),
            Attribute::Str { .. } => None,
        }
    }

    /// True when `self` and `other` occupy the same place in a set.
    fn same_key(&self, other: &Attribute) -> bool {
        match (self, other) {
            (Attribute::Str { key: a, .. }, Attribute::Str { key: b, .. }) => a == b,
            _ => self.kind().is_some() && self.kind() == other.kind(),
        }
    }

    fn sort_key(&self) -> (u32, &str) {
        match self {
            Attribute::Enum(kind) | Attribute::Int(kind, _) => (kind.as_raw(), ""),
            Attribute::Str { key, .. } => (u32::MAX, key),
        }
    }

    /// Textual form, as printed in IR.
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Enum(kind) => f.write_str(kind.name()),
            Attribute::Int(AttrKind::Alignment, value) => write!(f, "align {value}"),
            Attribute::Int(kind, value) => write!(f, "{}({value})", kind.name()),
            Attribute::Str { key, value } if value.is_empty() => write!(f, "\"{key}\""),
            Attribute::Str { key, value } => write!(f, "\"{key}\"=\"{value}\""),
        }
    }
}

/// Ordered, duplicate-free attributes of one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    attrs: Vec<Attribute>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `attr`, replacing an attribute with the same kind or key.
    pub fn add(&mut self, attr: Attribute) {
        if let Some(existing) = self.attrs.iter_mut().find(|a| a.same_key(&attr)) {
            *existing = attr;
            return;
        }
        let at = self
            .attrs
            .partition_point(|a| a.sort_key() < attr.sort_key());
        self.attrs.insert(at, attr);
    }

    pub fn has_kind(&self, kind: AttrKind) -> bool {
        self.attrs.iter().any(|a| a.kind() == Some(kind))
    }

    pub fn get(&self, index: usize) -> Option<&Attribute> {
        self.attrs.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attrs.iter()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Space separated textual form.
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attr) in self.attrs.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{attr}")?;
        }
        Ok(())
    }
}

/// Slot selector inside an [`AttributeList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrIndex {
    Function,
    Return,
    Param(u32),
}

impl AttrIndex {
    pub fn slot(self) -> usize {
        match self {
            AttrIndex::Function => 0,
            AttrIndex::Return => 1,
            AttrIndex::Param(n) => 2 + n as usize,
        }
    }
}

/// Attributes of a function or call site: function, return, then parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeList {
    slots: Vec<AttributeSet>,
}

impl AttributeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, index: AttrIndex, attr: Attribute) {
        let slot = index.slot();
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, AttributeSet::new);
        }
        self.slots[slot].add(attr);
    }

    pub fn get(&self, index: AttrIndex) -> Option<&AttributeSet> {
        self.slots.get(index.slot())
    }

    /// Number of slots materialized so far; trailing slots may be absent.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, slot: usize) -> Option<&AttributeSet> {
        self.slots.get(slot)
    }

    pub fn function_attributes(&self) -> Option<&AttributeSet> {
        self.get(AttrIndex::Function)
    }

    pub fn return_attributes(&self) -> Option<&AttributeSet> {
        self.get(AttrIndex::Return)
    }

    pub fn param_attributes(&self, param: u32) -> Option<&AttributeSet> {
        self.get(AttrIndex::Param(param))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(AttributeSet::is_empty)
    }

    /// First position at or after `slot` that holds an attribute.
    pub fn first_position_from(&self, slot: usize) -> Option<(usize, usize)> {
        (slot..self.slots.len())
            .find(|&s| !self.slots[s].is_empty())
            .map(|s| (s, 0))
    }

    /// Attribute at a flattened `(slot, index)` position.
    pub fn at(&self, (slot, index): (usize, usize)) -> Option<&Attribute> {
        self.slots.get(slot)?.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_lookup() {
        assert_eq!(AttrKind::from_name("nounwind"), Some(AttrKind::NoUnwind));
        assert_eq!(kind_for_name("noinline"), AttrKind::NoInline.as_raw());
        assert_eq!(kind_for_name("not-an-attribute"), 0);
        assert_eq!(kind_for_name(""), 0);
    }

    #[test]
    fn kind_table_matches_discriminants() {
        for (i, (kind, name)) in KINDS.iter().enumerate() {
            assert_eq!(kind.as_raw() as usize, i + 1);
            assert_eq!(kind.name(), *name);
            assert_eq!(AttrKind::from_raw(kind.as_raw()), Some(*kind));
        }
        assert_eq!(AttrKind::from_raw(0), None);
        assert_eq!(AttrKind::from_raw(KINDS.len() as u32 + 1), None);
    }

    #[test]
    fn attribute_text() {
        assert_eq!(Attribute::Enum(AttrKind::ReadOnly).as_string(), "readonly");
        assert_eq!(
            Attribute::from_kind(AttrKind::Alignment, 8).as_string(),
            "align 8"
        );
        assert_eq!(
            Attribute::from_kind(AttrKind::Dereferenceable, 16).as_string(),
            "dereferenceable(16)"
        );
        assert_eq!(
            Attribute::string("frame-pointer", "all").as_string(),
            "\"frame-pointer\"=\"all\""
        );
        assert_eq!(Attribute::string("hot-path", "").as_string(), "\"hot-path\"");
    }

    #[test]
    fn set_is_sorted_and_duplicate_free() {
        let mut set = AttributeSet::new();
        set.add(Attribute::string("b", "1"));
        set.add(Attribute::Enum(AttrKind::NoUnwind));
        set.add(Attribute::Enum(AttrKind::Cold));
        set.add(Attribute::Enum(AttrKind::NoUnwind));
        set.add(Attribute::string("b", "2"));

        assert_eq!(set.len(), 3);
        assert_eq!(set.as_string(), "cold nounwind \"b\"=\"2\"");
    }

    #[test]
    fn list_grows_to_parameter_slot() {
        let mut list = AttributeList::new();
        assert!(list.is_empty());
        list.add(AttrIndex::Param(1), Attribute::Enum(AttrKind::NoCapture));

        assert_eq!(list.slot_count(), 4);
        assert!(list.param_attributes(0).is_some_and(AttributeSet::is_empty));
        assert!(list
            .param_attributes(1)
            .is_some_and(|set| set.has_kind(AttrKind::NoCapture)));
        assert_eq!(list.first_position_from(0), Some((3, 0)));
        assert_eq!(list.first_position_from(4), None);
    }
}
