//! Engine-wide tuning knobs, passed once at VM construction. Mirrors
//! `luars`'s `SafeOption`: a plain options struct with a sensible
//! `Default`, no on-disk config format.

#[derive(Debug, Clone, Copy)]
pub struct VmOptions {
    /// Fixed-size value stack per call chain (`istate::stack`).
    pub stack_size: usize,
    /// Card pool budget for the nursery before a minor collection runs.
    pub nursery_cards: usize,
    /// Card pool budget for the survivor generation.
    pub survivor_cards: usize,
    /// Age at which a surviving object is promoted straight to tenured.
    pub tenure_age: u8,
    /// Run a major collection every `major_period` minor cycles, and a
    /// full collection every `major_period` major cycles.
    pub major_period: u32,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            stack_size: 256,
            nursery_cards: 32,
            survivor_cards: 128,
            tenure_age: 16,
            major_period: 8,
        }
    }
}
