//! Minimal RLP encoder for typed transaction payloads

/// Append `bytes` as an RLP string
pub fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        out.push(bytes[0]);
    } else {
        encode_length(bytes.len(), 0x80, out);
        out.extend_from_slice(bytes);
    }
}

/// Append an unsigned integer as a minimal big-endian RLP string
pub fn encode_uint(n: u128, out: &mut Vec<u8>) {
    let be = n.to_be_bytes();
    encode_bytes(strip_leading_zeros(&be), out);
}

/// Wrap already-encoded items in an RLP list header
pub fn encode_list(payload: &[u8], out: &mut Vec<u8>) {
    encode_length(payload.len(), 0xc0, out);
    out.extend_from_slice(payload);
}

/// Drop leading zero bytes (RLP integers carry no padding)
pub fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn encode_length(len: usize, offset: u8, out: &mut Vec<u8>) {
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let be = (len as u64).to_be_bytes();
        let len_bytes = strip_leading_zeros(&be);
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(len_bytes);
    }
}
