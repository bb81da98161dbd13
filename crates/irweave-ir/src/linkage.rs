//! Linkage, visibility and DLL storage class of global values.
//!
//! The numeric values are stable: they are what crosses the C boundary.

/// Linkage of a function or global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum Linkage {
    #[default]
    External = 0,
    AvailableExternally = 1,
    LinkOnceAny = 2,
    LinkOnceOdr = 3,
    LinkOnceOdrAutoHide = 4,
    WeakAny = 5,
    WeakOdr = 6,
    Appending = 7,
    Internal = 8,
    Private = 9,
    DllImport = 10,
    DllExport = 11,
    ExternalWeak = 12,
    Ghost = 13,
    Common = 14,
    LinkerPrivate = 15,
    LinkerPrivateWeak = 16,
}

impl Linkage {
    /// All enumerants, indexed by their numeric value.
    pub const ALL: [Linkage; 17] = [
        Linkage::External,
        Linkage::AvailableExternally,
        Linkage::LinkOnceAny,
        Linkage::LinkOnceOdr,
        Linkage::LinkOnceOdrAutoHide,
        Linkage::WeakAny,
        Linkage::WeakOdr,
        Linkage::Appending,
        Linkage::Internal,
        Linkage::Private,
        Linkage::DllImport,
        Linkage::DllExport,
        Linkage::ExternalWeak,
        Linkage::Ghost,
        Linkage::Common,
        Linkage::LinkerPrivate,
        Linkage::LinkerPrivateWeak,
    ];

    pub fn from_raw(raw: i32) -> Option<Self> {
        let index = usize::try_from(raw).ok()?;
        Self::ALL.get(index).copied()
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Keyword printed before a global's type; empty for external linkage.
    pub fn keyword(self) -> &'static str {
        match self {
            Linkage::External => "",
            Linkage::AvailableExternally => "available_externally",
            Linkage::LinkOnceAny => "linkonce",
            Linkage::LinkOnceOdr => "linkonce_odr",
            Linkage::LinkOnceOdrAutoHide => "linkonce_odr_autohide",
            Linkage::WeakAny => "weak",
            Linkage::WeakOdr => "weak_odr",
            Linkage::Appending => "appending",
            Linkage::Internal => "internal",
            Linkage::Private => "private",
            Linkage::DllImport => "dllimport",
            Linkage::DllExport => "dllexport",
            Linkage::ExternalWeak => "extern_weak",
            Linkage::Ghost => "ghost",
            Linkage::Common => "common",
            Linkage::LinkerPrivate => "linker_private",
            Linkage::LinkerPrivateWeak => "linker_private_weak",
        }
    }
}

/// Symbol visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum Visibility {
    #[default]
    Default = 0,
    Hidden = 1,
    Protected = 2,
}

impl Visibility {
    pub const ALL: [Visibility; 3] = [
        Visibility::Default,
        Visibility::Hidden,
        Visibility::Protected,
    ];

    pub fn from_raw(raw: i32) -> Option<Self> {
        let index = usize::try_from(raw).ok()?;
        Self::ALL.get(index).copied()
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Visibility::Default => "",
            Visibility::Hidden => "hidden",
            Visibility::Protected => "protected",
        }
    }
}

/// DLL storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum DllStorageClass {
    #[default]
    Default = 0,
    DllImport = 1,
    DllExport = 2,
}

impl DllStorageClass {
    pub const ALL: [DllStorageClass; 3] = [
        DllStorageClass::Default,
        DllStorageClass::DllImport,
        DllStorageClass::DllExport,
    ];

    pub fn from_raw(raw: i32) -> Option<Self> {
        let index = usize::try_from(raw).ok()?;
        Self::ALL.get(index).copied()
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn keyword(self) -> &'static str {
        match self {
            DllStorageClass::Default => "",
            DllStorageClass::DllImport => "dllimport",
            DllStorageClass::DllExport => "dllexport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_follow_declaration_order() {
        for (i, linkage) in Linkage::ALL.iter().enumerate() {
            assert_eq!(linkage.as_raw(), i as i32);
            assert_eq!(Linkage::from_raw(i as i32), Some(*linkage));
        }
        assert_eq!(Linkage::Internal.as_raw(), 8);
        assert_eq!(Linkage::from_raw(17), None);
        assert_eq!(Linkage::from_raw(-1), None);
    }

    #[test]
    fn visibility_and_storage_values() {
        assert_eq!(Visibility::from_raw(1), Some(Visibility::Hidden));
        assert_eq!(Visibility::from_raw(3), None);
        assert_eq!(DllStorageClass::from_raw(2), Some(DllStorageClass::DllExport));
        assert_eq!(DllStorageClass::DllImport.keyword(), "dllimport");
    }
}
