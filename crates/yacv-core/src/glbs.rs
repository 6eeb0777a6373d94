//! GLBS: a stream of GLB containers.
//!
//! Layout: the ASCII magic `GLBS`, then for each container a 4-byte
//! little-endian length followed by the container bytes. Viewers use it to
//! load a whole scene in one request.

use bytes::{BufMut, Bytes, BytesMut};

/// Stream magic.
pub const GLBS_MAGIC: [u8; 4] = *b"GLBS";

/// Errors while packing a GLBS stream.
#[derive(Debug, thiserror::Error)]
pub enum GlbsError {
    /// A single container is larger than the 4-byte length prefix allows.
    #[error("container of {len} bytes does not fit a GLBS length prefix")]
    TooLarge {
        /// Size of the offending container.
        len: usize,
    },
}

/// Pack `glbs` into one GLBS stream, in iteration order.
pub fn encode_glbs<I>(glbs: I) -> Result<Bytes, GlbsError>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut out = BytesMut::new();
    out.put_slice(&GLBS_MAGIC);
    for glb in glbs {
        let glb = glb.as_ref();
        let len = u32::try_from(glb.len()).map_err(|_overflow| GlbsError::TooLarge {
            len: glb.len(),
        })?;
        out.put_u32_le(len);
        out.put_slice(glb);
    }
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stream_is_just_the_magic() {
        let stream = encode_glbs(Vec::<Bytes>::new()).unwrap();
        assert_eq!(&stream[..], b"GLBS");
    }

    #[test]
    fn containers_are_length_prefixed_in_order() {
        let stream = encode_glbs([&b"abc"[..], &b"de"[..]]).unwrap();
        let mut expected = b"GLBS".to_vec();
        expected.extend_from_slice(&3_u32.to_le_bytes());
        expected.extend_from_slice(b"abc");
        expected.extend_from_slice(&2_u32.to_le_bytes());
        expected.extend_from_slice(b"de");
        assert_eq!(stream.to_vec(), expected);
    }
}
