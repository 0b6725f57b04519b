use std::io::Write;

use anyhow::anyhow;
use serde::{de::DeserializeOwned, Serialize};

/// Trait for an object which keeps its own digest in a field
pub trait DigestInSelf {
    /// recalculate the digest and store it in the object
    fn digest(&mut self) -> anyhow::Result<()>;
    fn verify_digest(&mut self) -> bool;
}

/// Trait for serializing and deserializing an object which stores digest in the object itself
/// # Note
/// This trait is implemented for types implementing
/// [Serialize] and [DeserializeOwned] and [DigestInSelf]
pub trait SerializeAndDigest: Serialize + DeserializeOwned + DigestInSelf {
    /// serialize into a writer implementing [Write](std::io::Write)
    /// # Returns
    /// The number of bytes written if successful
    fn serialize_into<W>(&mut self, w: &mut W) -> anyhow::Result<usize>
    where
        W: Write,
    {
        self.digest()?;
        let config = bincode::config::legacy();
        Ok(bincode::serde::encode_into_std_write(self, w, config)?)
    }

    /// serialize into a [Vec](std::vec::Vec)
    fn serialize(&mut self) -> anyhow::Result<Vec<u8>> {
        self.digest()?;
        let config = bincode::config::legacy();
        Ok(bincode::serde::encode_to_vec(self, config)?)
    }

    /// deserialize from a slice, rejecting objects whose digest doesn't match
    /// # Returns
    /// A tuple containing the deserialized object and the number of bytes read
    fn deserialize(buf: &[u8]) -> anyhow::Result<(Self, usize)> {
        let config = bincode::config::legacy();
        let (mut object, bytes_read): (Self, usize) =
            bincode::serde::decode_from_slice(buf, config)?;
        if !object.verify_digest() {
            return Err(anyhow!("deserialized object digest verification failed"));
        }
        Ok((object, bytes_read))
    }
}
