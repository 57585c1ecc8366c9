//! Opaque identifier helpers.
//!
//! Workflow ids are not UUIDs: the spec calls for a sortable,
//! collision-resistant but human-legible form (`wf_<epoch_ms>_<8_rand>`) so
//! that log lines and KV keys stay short and roughly time-ordered.

use rand::Rng;

const RAND_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a new workflow id of the form `wf_<epoch_ms>_<8_rand>`.
pub fn new_workflow_id(epoch_ms: u128) -> String {
    format!("wf_{epoch_ms}_{}", random_suffix(8))
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| RAND_ALPHABET[rng.gen_range(0..RAND_ALPHABET.len())] as char)
            .collect()
}

/// Splits a previously-generated workflow id back into its epoch-ms
/// component, if the id matches the expected shape. Used by the janitor
/// when it needs to estimate a workflow's age from the id alone (e.g. a
/// KV entry has already expired).
pub fn epoch_ms_from_workflow_id(id: &str) -> Option<u128> {
    let rest = id.strip_prefix("wf_")?;
    let (epoch_part, _rand_part) = rest.split_once('_')?;
    epoch_part.parse::<u128>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_expected_shape() {
        let id = new_workflow_id(1_700_000_000_000);
        assert!(id.starts_with("wf_1700000000000_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn round_trips_epoch() {
        let id = new_workflow_id(42);
        assert_eq!(epoch_ms_from_workflow_id(&id), Some(42));
        assert_eq!(epoch_ms_from_workflow_id("not-a-workflow-id"), None);
    }
}
