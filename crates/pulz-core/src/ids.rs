use sha2::{Digest, Sha256};

/// SHA-256 of `input`, truncated to its first 16 hex characters. Used for every
/// store-derived id except Execution, which is a random UUIDv4.
pub fn hash_id(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    hex[..16].to_string()
}

pub fn proposal_id(signal_id: &str, now: &str) -> String {
    hash_id(&format!("proposal:{signal_id}:{now}"))
}

pub fn artifact_id(proposal_id: &str, now: &str) -> String {
    hash_id(&format!("artifact:{proposal_id}:{now}"))
}

pub fn mission_id(started_at: &str) -> String {
    hash_id(&format!("mission:{started_at}"))
}

pub fn telemetry_id(kind: &str, now: &str) -> String {
    hash_id(&format!("telemetry:{kind}:{now}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_id_is_sixteen_hex_chars() {
        let id = hash_id("proposal:sig-1:2026-01-01T00:00:00Z");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_id_is_deterministic() {
        assert_eq!(hash_id("same"), hash_id("same"));
        assert_ne!(hash_id("a"), hash_id("b"));
    }
}
