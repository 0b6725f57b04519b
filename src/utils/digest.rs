use bincode::config;
use serde::Serialize;

/// calculate the [blake3] hash of a serializable object,
/// over its legacy bincode encoding
pub fn digest<T: Serialize>(t: &T) -> anyhow::Result<[u8; 32]> {
    let encoded = bincode::serde::encode_to_vec(t, config::legacy())?;
    Ok(*blake3::hash(&encoded).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_and_content_sensitive() -> anyhow::Result<()> {
        let first = digest(&("/a", 1u64))?;
        assert_eq!(first, digest(&("/a", 1u64))?);
        assert_ne!(first, digest(&("/a", 2u64))?);
        Ok(())
    }
}
