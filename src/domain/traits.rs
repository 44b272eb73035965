// ============================================================
// Layer 3 — Core Traits
// ============================================================

use anyhow::Result;

use crate::domain::scan::ScanRecord;

// ─── ScanSource ───────────────────────────────────────────────────────────────
/// Anything that can enumerate labelled scan images.
///
/// Implementations:
///   - ImageFolderLoader → `<root>/AD/*`, `<root>/NC/*`
pub trait ScanSource {
    /// List every labelled image this source knows about.
    fn load_records(&self) -> Result<Vec<ScanRecord>>;
}
