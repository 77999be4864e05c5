use anyhow::Result;
use bytes::BytesMut;

use crate::tree::Node;

/// APP records are accepted for script compatibility and serialize to
/// nothing.
pub(crate) fn write(_children: &[Node], _buf: &mut BytesMut) -> Result<usize> {
    Ok(0)
}
