//! Deterministic capture result derivation.
//!
//! [`HashDeriver`] is a placeholder for a real classifier: it maps an image
//! identity to a label and score through a stable string hash. The label
//! order and the hash/score formula are an interoperability contract and
//! must not change.

use crate::types::{CaptureResult, PersonalityType};

/// Label table indexed by `hash % 16`. Order is fixed.
pub const LABELS: [PersonalityType; 16] = [
    PersonalityType::Intj,
    PersonalityType::Intp,
    PersonalityType::Entj,
    PersonalityType::Entp,
    PersonalityType::Infj,
    PersonalityType::Infp,
    PersonalityType::Enfj,
    PersonalityType::Enfp,
    PersonalityType::Istj,
    PersonalityType::Isfj,
    PersonalityType::Estj,
    PersonalityType::Esfj,
    PersonalityType::Istp,
    PersonalityType::Isfp,
    PersonalityType::Estp,
    PersonalityType::Esfp,
];

pub const MIN_SCORE: u8 = 70;
const SCORE_SPAN: u32 = 31;

/// Strategy for turning a captured image identity into a result.
pub trait ResultDeriver: Send + Sync {
    fn derive(&self, identity: &str) -> CaptureResult;
}

/// Hash-based placeholder deriver.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashDeriver;

impl ResultDeriver for HashDeriver {
    fn derive(&self, identity: &str) -> CaptureResult {
        let hash = identity_hash(identity);
        CaptureResult {
            label: LABELS[(hash % LABELS.len() as u32) as usize],
            score: MIN_SCORE + (hash % SCORE_SPAN) as u8,
        }
    }
}

/// Non-negative identity hash.
///
/// The 31-polynomial string hash over UTF-16 code units with wrapping `i32`
/// arithmetic, then its unsigned magnitude. `i32::MIN` maps to 2^31.
pub fn identity_hash(identity: &str) -> u32 {
    identity
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
        .unsigned_abs()
}
