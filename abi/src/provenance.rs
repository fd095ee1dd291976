//! Call-site provenance captured for heap allocations and diagnostics.

/// File/line pair recorded at an allocation or error call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    pub file: &'static str,
    pub line: u32,
}

impl Provenance {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    pub const UNKNOWN: Provenance = Provenance::new("<unknown>", 0);
}

/// Captures `file!()`/`line!()` at the call site as a [`Provenance`].
#[macro_export]
macro_rules! prov {
    () => {
        $crate::Provenance::new(file!(), line!())
    };
}
