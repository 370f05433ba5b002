// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - ENCRYPTION SCHEME TRANSITIONS
//
// Headers carry two opaque scheme descriptors (primary/secondary). They
// are only parsed here: the transition validator decides whether the
// change from the previous block's descriptor is legal. Replacing an
// active scheme is a two-step dance: pause it first, then replace it
// under a passing stake-weighted vote.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemeViolation {
    #[error("descriptor malformed")]
    Malformed,
    #[error("cannot replace an active unpaused scheme")]
    ReplaceUnpaused,
    #[error("scheme is already paused")]
    AlreadyPaused,
    #[error("replacement lacks a passing stake-weighted vote")]
    VoteRequired,
    #[error("primary and secondary schemes must differ")]
    IdenticalSchemes,
}

/// Parsed view of a descriptor blob: scheme id, pause flag, then the
/// scheme's public material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeDescriptor {
    pub scheme_id: u8,
    pub paused: bool,
    pub public_material: Vec<u8>,
}

impl SchemeDescriptor {
    /// Parse a descriptor blob. Empty bytes mean "no scheme configured",
    /// which is a valid state (genesis carries none).
    pub fn parse(bytes: &[u8]) -> Result<Option<Self>, SchemeViolation> {
        if bytes.is_empty() {
            return Ok(None);
        }
        if bytes.len() < 2 || bytes[0] == 0 || bytes[1] > 1 {
            return Err(SchemeViolation::Malformed);
        }
        Ok(Some(Self {
            scheme_id: bytes[0],
            paused: bytes[1] == 1,
            public_material: bytes[2..].to_vec(),
        }))
    }

    pub fn same_scheme(&self, other: &Self) -> bool {
        self.scheme_id == other.scheme_id && self.public_material == other.public_material
    }
}

/// Validate the transition from `previous_bytes` to `next_bytes` for one
/// of the two descriptor lanes. Callers only invoke this when the bytes
/// differ; `vote_approved` is the stake-weighted vote verdict for the new
/// descriptor.
pub fn validate_transition(
    previous_bytes: &[u8],
    next_bytes: &[u8],
    vote_approved: bool,
) -> Result<(), SchemeViolation> {
    let previous = SchemeDescriptor::parse(previous_bytes)?;
    let next = SchemeDescriptor::parse(next_bytes)?;

    match (previous, next) {
        // First activation: any well-formed descriptor may appear.
        (None, Some(_)) => Ok(()),
        // Removal counts as a replacement by nothing: the active scheme
        // must be paused first.
        (None, None) => Ok(()),
        (Some(prev), None) => {
            if prev.paused {
                Ok(())
            } else {
                Err(SchemeViolation::ReplaceUnpaused)
            }
        }
        (Some(prev), Some(next)) => {
            if prev.same_scheme(&next) {
                // Pause-flag-only change
                if prev.paused && next.paused {
                    return Err(SchemeViolation::AlreadyPaused);
                }
                return Ok(());
            }
            // Scheme replacement
            if !prev.paused {
                return Err(SchemeViolation::ReplaceUnpaused);
            }
            if !vote_approved {
                return Err(SchemeViolation::VoteRequired);
            }
            Ok(())
        }
    }
}

/// The two lanes must never carry the same scheme at the same time.
pub fn check_pair(config1: &[u8], config2: &[u8]) -> Result<(), SchemeViolation> {
    let a = SchemeDescriptor::parse(config1)?;
    let b = SchemeDescriptor::parse(config2)?;
    if let (Some(a), Some(b)) = (a, b) {
        if a.same_scheme(&b) {
            return Err(SchemeViolation::IdenticalSchemes);
        }
    }
    Ok(())
}
