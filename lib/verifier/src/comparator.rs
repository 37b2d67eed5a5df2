//! Compares deployed code with a rebuilt artifact.
//!
//! Both sides are normalized first, so that regions which legitimately
//! differ between deployments do not cause a mismatch:
//!
//! * Stylus programs are stored on-chain as `0xEFF000`, a dictionary byte,
//!   then the brotli compressed wasm. They are decompressed.
//! * Wasm modules lose their custom sections.
//! * EVM bytecode loses the trailing solc CBOR metadata, and the configured
//!   immutable reference ranges are zeroed.
use std::{fmt, io::Read};

use serde::{Deserialize, Serialize};

use crate::wasm;

/// Prefix of Stylus program code, before the dictionary byte.
pub const STYLUS_PREFIX: [u8; 3] = [0xEF, 0xF0, 0x00];
/// Dictionary byte of a program compressed without a dictionary.
pub const STYLUS_EMPTY_DICTIONARY: u8 = 0x00;
/// Upper bound on the size of a decompressed Stylus program.
pub const MAX_DECOMPRESSED_LEN: usize = 8 * 1024 * 1024;

const BROTLI_BUFFER_LEN: usize = 4096;

/// A range of EVM bytecode holding an immutable value, filled in at
/// deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmutableRange {
    /// Offset of the first byte.
    pub offset: usize,
    /// Number of bytes.
    pub length: usize,
}

/// Kind of code after normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeKind {
    /// WebAssembly, either a raw module or a decompressed Stylus program.
    Wasm,
    /// EVM bytecode.
    Evm,
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeKind::Wasm => f.write_str("wasm"),
            CodeKind::Evm => f.write_str("evm bytecode"),
        }
    }
}

/// Code ready to be compared byte by byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Normalized {
    /// Kind of the code.
    pub kind: CodeKind,
    /// Normalized bytes.
    pub bytes: Vec<u8>,
}

/// Outcome of a comparison.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// Both sides are equal after normalization.
    Equal,
    /// The sides differ, or one of them could not be normalized.
    Differs {
        /// Human readable description of the difference.
        reason: String,
        /// Offset of the first differing byte in the normalized code.
        first_difference: Option<usize>,
    },
}

impl Comparison {
    fn differs(reason: impl Into<String>) -> Self {
        Comparison::Differs { reason: reason.into(), first_difference: None }
    }
}

/// Normalizes and compares code.
#[derive(Clone, Debug, Default)]
pub struct Comparator {
    immutables: Vec<ImmutableRange>,
}

impl Comparator {
    /// Creates a comparator that zeroes `immutables` in EVM bytecode.
    #[must_use]
    pub fn new(immutables: Vec<ImmutableRange>) -> Self {
        Self { immutables }
    }

    /// Compares `deployed` code with `rebuilt` code.
    #[must_use]
    pub fn compare(&self, deployed: &[u8], rebuilt: &[u8]) -> Comparison {
        let deployed = match self.normalize(deployed) {
            Ok(code) => code,
            Err(reason) => {
                return Comparison::differs(format!(
                    "deployed code can't be normalized: {reason}"
                ))
            }
        };
        let rebuilt = match self.normalize(rebuilt) {
            Ok(code) => code,
            Err(reason) => {
                return Comparison::differs(format!(
                    "rebuilt artifact can't be normalized: {reason}"
                ))
            }
        };

        if deployed.kind != rebuilt.kind {
            return Comparison::differs(format!(
                "deployed code is {} but rebuilt artifact is {}",
                deployed.kind, rebuilt.kind
            ));
        }

        if deployed.bytes == rebuilt.bytes {
            return Comparison::Equal;
        }

        let first_difference = deployed
            .bytes
            .iter()
            .zip(&rebuilt.bytes)
            .position(|(a, b)| a != b)
            .or(Some(deployed.bytes.len().min(rebuilt.bytes.len())));

        Comparison::Differs {
            reason: format!(
                "{} differs: deployed {} bytes, rebuilt {} bytes",
                deployed.kind,
                deployed.bytes.len(),
                rebuilt.bytes.len()
            ),
            first_difference,
        }
    }

    /// Normalizes `code` according to its kind.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `code` is a Stylus program
    /// that can't be decompressed, or a wasm module with broken framing.
    pub fn normalize(&self, code: &[u8]) -> Result<Normalized, String> {
        if let Some(rest) = code.strip_prefix(&STYLUS_PREFIX) {
            let module = decompress_stylus(rest)?;
            return normalize_wasm(&module);
        }

        if wasm::is_wasm(code) {
            return normalize_wasm(code);
        }

        let mut bytes = code.to_vec();
        for range in &self.immutables {
            let start = range.offset.min(bytes.len());
            let end =
                range.offset.saturating_add(range.length).min(bytes.len());
            bytes[start..end].fill(0);
        }
        let len = strip_solc_metadata(&bytes).len();
        bytes.truncate(len);

        Ok(Normalized { kind: CodeKind::Evm, bytes })
    }
}

fn normalize_wasm(module: &[u8]) -> Result<Normalized, String> {
    let bytes = wasm::strip_custom_sections(module).map_err(|e| e.to_string())?;
    Ok(Normalized { kind: CodeKind::Wasm, bytes })
}

/// Decompresses the part of a Stylus program after [`STYLUS_PREFIX`].
fn decompress_stylus(code: &[u8]) -> Result<Vec<u8>, String> {
    let Some((&dictionary, compressed)) = code.split_first() else {
        return Err("missing stylus dictionary byte".into());
    };
    if dictionary != STYLUS_EMPTY_DICTIONARY {
        return Err(format!("unsupported stylus dictionary {dictionary:#04x}"));
    }

    let mut module = Vec::new();
    brotli::Decompressor::new(compressed, BROTLI_BUFFER_LEN)
        .take(MAX_DECOMPRESSED_LEN as u64 + 1)
        .read_to_end(&mut module)
        .map_err(|e| format!("brotli: {e}"))?;

    if module.len() > MAX_DECOMPRESSED_LEN {
        return Err(format!(
            "decompressed program exceeds {MAX_DECOMPRESSED_LEN} bytes"
        ));
    }

    Ok(module)
}

/// Returns `code` without its trailing solc CBOR metadata, if it has one.
///
/// solc appends a CBOR map followed by its length as a big-endian `u16`.
#[must_use]
pub fn strip_solc_metadata(code: &[u8]) -> &[u8] {
    let Some((body, len)) = code.split_last_chunk::<2>() else {
        return code;
    };

    let metadata_len = usize::from(u16::from_be_bytes(*len));
    if metadata_len == 0 || metadata_len > body.len() {
        return code;
    }

    let start = body.len() - metadata_len;
    // Major type 5 (map) with 1 to 23 entries.
    if (0xa1..=0xb7).contains(&body[start]) {
        &code[..start]
    } else {
        code
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const WASM_HEADER: [u8; 8] =
        [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    /// `a2 64 'ipfs' 42 <2 bytes> 64 'solc' 43 <3 bytes>` plus its length.
    fn solc_metadata(hash: u8) -> Vec<u8> {
        let mut cbor = vec![0xa2, 0x64];
        cbor.extend(b"ipfs");
        cbor.extend([0x42, hash, hash]);
        cbor.push(0x64);
        cbor.extend(b"solc");
        cbor.extend([0x43, 0x00, 0x08, 0x1c]);
        let len = u16::try_from(cbor.len()).unwrap().to_be_bytes();
        cbor.extend(len);
        cbor
    }

    fn wasm_module(custom_payload: &[u8]) -> Vec<u8> {
        let mut module = WASM_HEADER.to_vec();
        module.extend([0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
        module.push(0x00);
        module.push(u8::try_from(custom_payload.len() + 1).unwrap());
        module.push(0x00);
        module.extend(custom_payload);
        module
    }

    fn stylus_code(module: &[u8]) -> Vec<u8> {
        let mut compressed = Vec::new();
        {
            let mut writer =
                brotli::CompressorWriter::new(&mut compressed, 4096, 11, 22);
            writer.write_all(module).unwrap();
        }
        let mut code = STYLUS_PREFIX.to_vec();
        code.push(STYLUS_EMPTY_DICTIONARY);
        code.extend(compressed);
        code
    }

    #[test]
    fn strips_solc_metadata() {
        let runtime = [0x60, 0x80, 0x60, 0x40, 0x52, 0x00];
        let mut code = runtime.to_vec();
        code.extend(solc_metadata(0x11));
        assert_eq!(strip_solc_metadata(&code), runtime);
    }

    #[test]
    fn leaves_code_without_metadata_alone() {
        let code = [0x60, 0x80, 0x60, 0x40, 0x52, 0x00, 0x33];
        assert_eq!(strip_solc_metadata(&code), code);
        assert_eq!(strip_solc_metadata(&[0x00]), [0x00]);
    }

    #[test]
    fn evm_code_differing_only_in_metadata_is_equal() {
        let runtime = [0x60, 0x80, 0x60, 0x40, 0x52, 0x00];
        let mut deployed = runtime.to_vec();
        deployed.extend(solc_metadata(0x11));
        let mut rebuilt = runtime.to_vec();
        rebuilt.extend(solc_metadata(0x22));

        assert_eq!(
            Comparator::default().compare(&deployed, &rebuilt),
            Comparison::Equal
        );
    }

    #[test]
    fn immutables_are_masked() {
        let deployed = [0x7f, 0xde, 0xad, 0xbe, 0xef, 0x00];
        let rebuilt = [0x7f, 0x00, 0x00, 0x00, 0x00, 0x00];

        assert!(matches!(
            Comparator::default().compare(&deployed, &rebuilt),
            Comparison::Differs { first_difference: Some(1), .. }
        ));

        let comparator =
            Comparator::new(vec![ImmutableRange { offset: 1, length: 4 }]);
        assert_eq!(comparator.compare(&deployed, &rebuilt), Comparison::Equal);
    }

    #[test]
    fn out_of_range_immutables_are_clamped() {
        let comparator =
            Comparator::new(vec![ImmutableRange { offset: 4, length: 100 }]);
        let normalized = comparator.normalize(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(normalized.bytes, [1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn stylus_program_matches_rebuilt_wasm() {
        let deployed = stylus_code(&wasm_module(b"hash-from-ci"));
        let rebuilt = wasm_module(b"hash-from-laptop");

        assert_eq!(
            Comparator::default().compare(&deployed, &rebuilt),
            Comparison::Equal
        );
    }

    #[test]
    fn stylus_program_differs_from_other_wasm() {
        let deployed = stylus_code(&wasm_module(b""));
        let mut rebuilt = WASM_HEADER.to_vec();
        rebuilt.extend([0x01, 0x05, 0x01, 0x60, 0x01, 0x7f, 0x00]);

        assert!(matches!(
            Comparator::default().compare(&deployed, &rebuilt),
            Comparison::Differs { first_difference: Some(9), .. }
        ));
    }

    #[test]
    fn unknown_dictionary_is_reported() {
        let mut deployed = STYLUS_PREFIX.to_vec();
        deployed.extend([0x01, 0xff]);

        let Comparison::Differs { reason, .. } =
            Comparator::default().compare(&deployed, &wasm_module(b""))
        else {
            panic!("should differ");
        };
        assert!(reason.contains("dictionary"), "{reason}");
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let Comparison::Differs { reason, .. } = Comparator::default()
            .compare(&wasm_module(b""), &[0x60, 0x80, 0x60, 0x40])
        else {
            panic!("should differ");
        };
        assert!(reason.contains("evm bytecode"), "{reason}");
    }
}
