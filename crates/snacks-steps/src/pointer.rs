//! Metadata pointer policies.
//!
//! A pointer is an IPFS path such as `bafy.../604`. Minting picks one of a
//! small set of base pointers; evolution increments the final segment.

use snacks_core::rng::DeterministicRng;

use crate::error::StepError;

/// Chooses the metadata pointer a new asset is minted with.
pub trait BasePointerPolicy: Send + Sync {
    /// Picks a pointer.
    ///
    /// # Errors
    ///
    /// Returns `StepError::NoBasePointers` if nothing can be chosen.
    fn choose(&self, rng: &mut dyn DeterministicRng) -> Result<String, StepError>;
}

/// Uniform random choice over a fixed list of base pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomBasePointer {
    pointers: Vec<String>,
}

impl RandomBasePointer {
    /// Creates a policy over `pointers`. Blank entries are dropped.
    #[must_use]
    pub fn new(pointers: impl IntoIterator<Item = String>) -> Self {
        Self {
            pointers: pointers
                .into_iter()
                .map(|p| p.trim().to_owned())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// The configured pointers.
    #[must_use]
    pub fn pointers(&self) -> &[String] {
        &self.pointers
    }
}

impl BasePointerPolicy for RandomBasePointer {
    fn choose(&self, rng: &mut dyn DeterministicRng) -> Result<String, StepError> {
        let last = u32::try_from(self.pointers.len())
            .map_err(|_| StepError::NoBasePointers)?
            .checked_sub(1)
            .ok_or(StepError::NoBasePointers)?;
        let index = rng.next_u32_range(0, last) as usize;
        self.pointers
            .get(index)
            .cloned()
            .ok_or(StepError::NoBasePointers)
    }
}

/// Computes the pointer an asset evolves to: the final `/` segment parsed as
/// an unsigned integer, plus one. Zero padding is kept (`"cid/007"` becomes
/// `"cid/008"`).
///
/// # Errors
///
/// Returns `StepError::NonNumericPointer` if the final segment is empty or
/// not a decimal number.
pub fn next_pointer(current: &str) -> Result<String, StepError> {
    let (prefix, segment) = match current.rsplit_once('/') {
        Some((prefix, segment)) => (Some(prefix), segment),
        None => (None, current),
    };
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StepError::NonNumericPointer(current.to_owned()));
    }
    let value: u64 = segment
        .parse()
        .map_err(|_| StepError::NonNumericPointer(current.to_owned()))?;
    let next = value
        .checked_add(1)
        .ok_or_else(|| StepError::NonNumericPointer(current.to_owned()))?;
    let width = segment.len();
    let segment = format!("{next:0width$}");
    Ok(match prefix {
        Some(prefix) => format!("{prefix}/{segment}"),
        None => segment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedRng(Vec<u32>);

    impl DeterministicRng for ScriptedRng {
        fn next_u32_range(&mut self, _min: u32, _max: u32) -> u32 {
            self.0.remove(0)
        }
    }

    const BASE: &str = "bafybeifv3aptenmwi5zup2dkir7yk5aq4lqf7y32rdowitziozj4gwb5iy";

    #[test]
    fn test_next_pointer_increments_final_segment() {
        assert_eq!(next_pointer("cid/7").unwrap(), "cid/8");
        assert_eq!(
            next_pointer(&format!("{BASE}/604")).unwrap(),
            format!("{BASE}/605")
        );
    }

    #[test]
    fn test_next_pointer_keeps_zero_padding() {
        assert_eq!(next_pointer("cid/007").unwrap(), "cid/008");
        assert_eq!(next_pointer("cid/099").unwrap(), "cid/100");
        assert_eq!(next_pointer("cid/9").unwrap(), "cid/10");
    }

    #[test]
    fn test_next_pointer_without_slash_increments_whole_pointer() {
        assert_eq!(next_pointer("41").unwrap(), "42");
    }

    #[test]
    fn test_next_pointer_rejects_non_numeric_segment() {
        assert_eq!(
            next_pointer("cid/seven"),
            Err(StepError::NonNumericPointer("cid/seven".into()))
        );
        assert!(next_pointer("cid/").is_err());
        assert!(next_pointer("cid/-1").is_err());
        assert!(next_pointer("cid/7.png").is_err());
    }

    #[test]
    fn test_random_base_pointer_uses_rng_index() {
        let policy = RandomBasePointer::new(["a/1".to_owned(), "b/2".to_owned(), "c/3".to_owned()]);
        let mut rng = ScriptedRng(vec![2, 0]);

        assert_eq!(policy.choose(&mut rng).unwrap(), "c/3");
        assert_eq!(policy.choose(&mut rng).unwrap(), "a/1");
    }

    #[test]
    fn test_random_base_pointer_drops_blank_entries() {
        let policy = RandomBasePointer::new([" ".to_owned(), "a/1".to_owned()]);
        assert_eq!(policy.pointers(), ["a/1".to_owned()]);
        assert_eq!(policy.choose(&mut ScriptedRng(vec![0])).unwrap(), "a/1");
    }

    #[test]
    fn test_empty_policy_is_configuration_error() {
        let policy = RandomBasePointer::new(Vec::new());
        assert_eq!(policy.choose(&mut ScriptedRng(Vec::new())), Err(StepError::NoBasePointers));
    }
}
