//! Minimal WebAssembly module walker.
//!
//! Only the section framing is parsed. That is enough to drop custom
//! sections, which carry build hashes and debug names that differ between
//! otherwise identical builds.

/// `\0asm` magic of every WebAssembly module.
pub const WASM_MAGIC: [u8; 4] = *b"\0asm";

const HEADER_LEN: usize = 8;
const CUSTOM_SECTION_ID: u8 = 0;

/// The module framing is broken.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WasmError {
    /// The module does not start with the wasm magic and a version.
    #[error("missing wasm header")]
    MissingHeader,
    /// A section size is not a valid LEB128 `u32`.
    #[error("malformed section size at offset {0}")]
    MalformedSize(usize),
    /// A section extends past the end of the module.
    #[error("section at offset {0} is truncated")]
    Truncated(usize),
}

/// Returns true if `code` starts with the wasm magic.
#[must_use]
pub fn is_wasm(code: &[u8]) -> bool {
    code.starts_with(&WASM_MAGIC)
}

/// Returns `module` without its custom sections.
///
/// Every other section is copied verbatim, including its original size
/// encoding.
///
/// # Errors
///
/// * [`WasmError::MissingHeader`] - If `module` has no wasm header.
/// * [`WasmError::MalformedSize`] - If a section size can't be decoded.
/// * [`WasmError::Truncated`] - If a section is cut short.
pub fn strip_custom_sections(module: &[u8]) -> Result<Vec<u8>, WasmError> {
    if module.len() < HEADER_LEN || !is_wasm(module) {
        return Err(WasmError::MissingHeader);
    }

    let mut stripped = Vec::with_capacity(module.len());
    stripped.extend_from_slice(&module[..HEADER_LEN]);

    let mut offset = HEADER_LEN;
    while offset < module.len() {
        let section_start = offset;
        let id = module[offset];
        let (size, size_len) = read_leb128_u32(&module[offset + 1..])
            .ok_or(WasmError::MalformedSize(section_start))?;

        let payload_start = offset + 1 + size_len;
        let section_end = payload_start
            .checked_add(size as usize)
            .filter(|end| *end <= module.len())
            .ok_or(WasmError::Truncated(section_start))?;

        if id != CUSTOM_SECTION_ID {
            stripped.extend_from_slice(&module[section_start..section_end]);
        }
        offset = section_end;
    }

    Ok(stripped)
}

/// Decodes an unsigned LEB128 `u32`, returning the value and the number of
/// bytes read.
fn read_leb128_u32(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().take(5).enumerate() {
        let bits = u32::from(byte & 0x7f);
        let shift = 7 * i as u32;
        // The fifth byte may only hold the 4 remaining bits.
        if i == 4 && bits > 0x0f {
            return None;
        }
        value |= bits << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}
