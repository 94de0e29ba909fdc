//! PlutusData values and their CBOR encoding.
//!
//! Datums and redeemers attached to marketplace spends are PlutusData. The
//! encoding follows the ledger's canonical choices: constructor tags
//! 121..127 / 1280..1400 / 102, indefinite-length arrays for non-empty
//! lists, 64-byte chunking for long byte strings, and bignum tags for
//! integers outside the 64-bit range. Decoding accepts both definite and
//! indefinite lengths, since inline datums come from arbitrary builders.
//!
//! Reference: Cardano ledger CDDL (alonzo.cddl `plutus_data`), CIP-0005.

use crate::TxError;
use num_bigint::{BigInt, Sign};
use num_traits::{Signed, ToPrimitive};

// =============================================================================
// Constants
// =============================================================================

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;

const INDEFINITE: u8 = 0x1f;
const BREAK: u8 = 0xff;

const TAG_POS_BIGNUM: u64 = 2;
const TAG_NEG_BIGNUM: u64 = 3;
const TAG_CONSTR_GENERAL: u64 = 102;

/// Longest definite byte string before chunking.
const BYTES_CHUNK: usize = 64;

/// Nesting limit when decoding untrusted datums.
const MAX_DEPTH: usize = 64;

// =============================================================================
// Values
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlutusData {
    Constr(u64, Vec<PlutusData>),
    Map(Vec<(PlutusData, PlutusData)>),
    List(Vec<PlutusData>),
    Integer(BigInt),
    Bytes(Vec<u8>),
}

impl PlutusData {
    pub fn constr(alternative: u64, fields: Vec<PlutusData>) -> Self {
        PlutusData::Constr(alternative, fields)
    }

    pub fn int(n: impl Into<BigInt>) -> Self {
        PlutusData::Integer(n.into())
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        PlutusData::Bytes(b.into())
    }

    /// Byte string from hex; invalid hex yields `None`.
    pub fn bytes_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().map(PlutusData::Bytes)
    }

    /// Unit redeemer/datum of the given alternative (`Constr n []`).
    pub fn unit(alternative: u64) -> Self {
        PlutusData::Constr(alternative, Vec::new())
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_data(self);
        w.buf
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_cbor())
    }

    /// Decode one value; trailing bytes are an error.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, TxError> {
        let mut r = Reader { buf: bytes, pos: 0 };
        let data = r.read_data(0)?;
        if r.pos != bytes.len() {
            return Err(r.error("trailing bytes"));
        }
        Ok(data)
    }

    pub fn from_hex(s: &str) -> Result<Self, TxError> {
        let bytes = hex::decode(s).map_err(|e| TxError::Serialize(format!("datum hex: {}", e)))?;
        Self::from_cbor(&bytes)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PlutusData::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Value under a UTF-8 byte-string key of a map.
    pub fn lookup(&self, key: &str) -> Option<&PlutusData> {
        let PlutusData::Map(entries) = self else {
            return None;
        };
        entries
            .iter()
            .find(|(k, _)| k.as_bytes() == Some(key.as_bytes()))
            .map(|(_, v)| v)
    }
}

// =============================================================================
// Serialization
// =============================================================================

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(128),
        }
    }

    fn write_head(&mut self, major: u8, n: u64) {
        let m = major << 5;
        if n < 24 {
            self.buf.push(m | n as u8);
        } else if n <= u8::MAX as u64 {
            self.buf.push(m | 24);
            self.buf.push(n as u8);
        } else if n <= u16::MAX as u64 {
            self.buf.push(m | 25);
            self.buf.extend_from_slice(&(n as u16).to_be_bytes());
        } else if n <= u32::MAX as u64 {
            self.buf.push(m | 26);
            self.buf.extend_from_slice(&(n as u32).to_be_bytes());
        } else {
            self.buf.push(m | 27);
            self.buf.extend_from_slice(&n.to_be_bytes());
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        if b.len() <= BYTES_CHUNK {
            self.write_head(MAJOR_BYTES, b.len() as u64);
            self.buf.extend_from_slice(b);
            return;
        }
        self.buf.push((MAJOR_BYTES << 5) | INDEFINITE);
        for chunk in b.chunks(BYTES_CHUNK) {
            self.write_head(MAJOR_BYTES, chunk.len() as u64);
            self.buf.extend_from_slice(chunk);
        }
        self.buf.push(BREAK);
    }

    fn write_list(&mut self, items: &[PlutusData]) {
        if items.is_empty() {
            self.write_head(MAJOR_ARRAY, 0);
            return;
        }
        self.buf.push((MAJOR_ARRAY << 5) | INDEFINITE);
        for item in items {
            self.write_data(item);
        }
        self.buf.push(BREAK);
    }

    fn write_integer(&mut self, n: &BigInt) {
        if let Some(v) = n.to_u64() {
            self.write_head(MAJOR_UNSIGNED, v);
            return;
        }
        if n.is_negative() {
            // CBOR negative integers encode -1 - n.
            let magnitude = -(n + 1i32);
            if let Some(v) = magnitude.to_u64() {
                self.write_head(MAJOR_NEGATIVE, v);
                return;
            }
            self.write_head(MAJOR_TAG, TAG_NEG_BIGNUM);
            let (_, bytes) = magnitude.to_bytes_be();
            self.write_bytes(&bytes);
            return;
        }
        self.write_head(MAJOR_TAG, TAG_POS_BIGNUM);
        let (sign, bytes) = n.to_bytes_be();
        debug_assert_eq!(sign, Sign::Plus);
        self.write_bytes(&bytes);
    }

    fn write_data(&mut self, data: &PlutusData) {
        match data {
            PlutusData::Constr(alt, fields) => {
                match *alt {
                    0..=6 => self.write_head(MAJOR_TAG, 121 + alt),
                    7..=127 => self.write_head(MAJOR_TAG, 1280 + (alt - 7)),
                    _ => {
                        self.write_head(MAJOR_TAG, TAG_CONSTR_GENERAL);
                        self.write_head(MAJOR_ARRAY, 2);
                        self.write_head(MAJOR_UNSIGNED, *alt);
                    }
                }
                self.write_list(fields);
            }
            PlutusData::Map(entries) => {
                self.write_head(MAJOR_MAP, entries.len() as u64);
                for (k, v) in entries {
                    self.write_data(k);
                    self.write_data(v);
                }
            }
            PlutusData::List(items) => self.write_list(items),
            PlutusData::Integer(n) => self.write_integer(n),
            PlutusData::Bytes(b) => self.write_bytes(b),
        }
    }
}

// =============================================================================
// Deserialization
// =============================================================================

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

/// A decoded item head: major type plus argument, `None` for indefinite.
struct Head {
    major: u8,
    arg: Option<u64>,
}

impl<'a> Reader<'a> {
    fn error(&self, what: &str) -> TxError {
        TxError::Serialize(format!("plutus data at byte {}: {}", self.pos, what))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TxError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        let Some(end) = end else {
            return Err(self.error("unexpected end of input"));
        };
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn peek_break(&self) -> bool {
        self.buf.get(self.pos) == Some(&BREAK)
    }

    fn read_head(&mut self) -> Result<Head, TxError> {
        let b = self.take(1)?[0];
        let major = b >> 5;
        let info = b & 0x1f;
        let arg = match info {
            0..=23 => Some(info as u64),
            24 => Some(self.take(1)?[0] as u64),
            25 => {
                let b = self.take(2)?;
                Some(u16::from_be_bytes([b[0], b[1]]) as u64)
            }
            26 => {
                let b = self.take(4)?;
                Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64)
            }
            27 => {
                let b = self.take(8)?;
                let mut a = [0u8; 8];
                a.copy_from_slice(b);
                Some(u64::from_be_bytes(a))
            }
            INDEFINITE => None,
            _ => return Err(self.error("reserved additional info")),
        };
        Ok(Head { major, arg })
    }

    fn length(&self, arg: u64) -> Result<usize, TxError> {
        let n = usize::try_from(arg).map_err(|_| self.error("length overflow"))?;
        if n > self.buf.len() - self.pos {
            return Err(self.error("length exceeds input"));
        }
        Ok(n)
    }

    fn read_bytes_body(&mut self, major: u8, arg: Option<u64>) -> Result<Vec<u8>, TxError> {
        if let Some(n) = arg {
            let n = self.length(n)?;
            return Ok(self.take(n)?.to_vec());
        }
        let mut out = Vec::new();
        while !self.peek_break() {
            let chunk = self.read_head()?;
            if chunk.major != major {
                return Err(self.error("mixed chunk types in string"));
            }
            let Some(n) = chunk.arg else {
                return Err(self.error("nested indefinite string"));
            };
            let n = self.length(n)?;
            out.extend_from_slice(self.take(n)?);
        }
        self.take(1)?;
        Ok(out)
    }

    fn read_items(&mut self, arg: Option<u64>, depth: usize) -> Result<Vec<PlutusData>, TxError> {
        let mut items = Vec::new();
        match arg {
            Some(n) => {
                for _ in 0..self.length(n)? {
                    items.push(self.read_data(depth + 1)?);
                }
            }
            None => {
                while !self.peek_break() {
                    items.push(self.read_data(depth + 1)?);
                }
                self.take(1)?;
            }
        }
        Ok(items)
    }

    fn read_list(&mut self, depth: usize) -> Result<Vec<PlutusData>, TxError> {
        let head = self.read_head()?;
        if head.major != MAJOR_ARRAY {
            return Err(self.error("constructor fields must be an array"));
        }
        self.read_items(head.arg, depth)
    }

    fn read_data(&mut self, depth: usize) -> Result<PlutusData, TxError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        let head = self.read_head()?;
        match (head.major, head.arg) {
            (MAJOR_UNSIGNED, Some(n)) => Ok(PlutusData::int(n)),
            (MAJOR_NEGATIVE, Some(n)) => Ok(PlutusData::int(-BigInt::from(n) - 1)),
            (MAJOR_BYTES, arg) => Ok(PlutusData::Bytes(self.read_bytes_body(MAJOR_BYTES, arg)?)),
            // text only appears from lenient builders; keep its UTF-8 bytes
            (MAJOR_TEXT, arg) => Ok(PlutusData::Bytes(self.read_bytes_body(MAJOR_TEXT, arg)?)),
            (MAJOR_ARRAY, arg) => Ok(PlutusData::List(self.read_items(arg, depth)?)),
            (MAJOR_MAP, arg) => {
                let mut entries = Vec::new();
                match arg {
                    Some(n) => {
                        for _ in 0..self.length(n)? {
                            let k = self.read_data(depth + 1)?;
                            let v = self.read_data(depth + 1)?;
                            entries.push((k, v));
                        }
                    }
                    None => {
                        while !self.peek_break() {
                            let k = self.read_data(depth + 1)?;
                            let v = self.read_data(depth + 1)?;
                            entries.push((k, v));
                        }
                        self.take(1)?;
                    }
                }
                Ok(PlutusData::Map(entries))
            }
            (MAJOR_TAG, Some(tag)) => match tag {
                121..=127 => Ok(PlutusData::Constr(tag - 121, self.read_list(depth)?)),
                1280..=1400 => Ok(PlutusData::Constr(tag - 1280 + 7, self.read_list(depth)?)),
                TAG_CONSTR_GENERAL => {
                    let pair = self.read_head()?;
                    if pair.major != MAJOR_ARRAY || pair.arg != Some(2) {
                        return Err(self.error("general constructor must be a pair"));
                    }
                    let alt = self.read_head()?;
                    let (MAJOR_UNSIGNED, Some(alt)) = (alt.major, alt.arg) else {
                        return Err(self.error("constructor alternative must be unsigned"));
                    };
                    Ok(PlutusData::Constr(alt, self.read_list(depth)?))
                }
                TAG_POS_BIGNUM | TAG_NEG_BIGNUM => {
                    let inner = self.read_head()?;
                    if inner.major != MAJOR_BYTES {
                        return Err(self.error("bignum must wrap a byte string"));
                    }
                    let magnitude = BigInt::from_bytes_be(Sign::Plus, &self.read_bytes_body(MAJOR_BYTES, inner.arg)?);
                    if tag == TAG_POS_BIGNUM {
                        Ok(PlutusData::Integer(magnitude))
                    } else {
                        Ok(PlutusData::Integer(-magnitude - 1))
                    }
                }
                _ => Err(self.error(&format!("unsupported tag {}", tag))),
            },
            _ => Err(self.error("unsupported item")),
        }
    }
}
