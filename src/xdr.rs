//! XDR codec for the Soroban values exchanged with the ledger
//!
//! Only the part of the Stellar XDR schema the miner touches is modelled:
//! contract values (`ScVal`), ledger keys and the ledger entries returned by
//! `getLedgerEntries`. Everything is big-endian and padded to four bytes.

use crate::address::Address;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Maximum nesting of vectors and maps accepted when decoding
const MAX_DEPTH: usize = 32;

/// Largest variable-length field accepted when decoding
const MAX_VAR_LEN: u32 = 16 * 1024 * 1024;

/// `ScVal` discriminants
pub mod sc_val_type {
    pub const BOOL: i32 = 0;
    pub const VOID: i32 = 1;
    pub const ERROR: i32 = 2;
    pub const U32: i32 = 3;
    pub const I32: i32 = 4;
    pub const U64: i32 = 5;
    pub const I64: i32 = 6;
    pub const TIMEPOINT: i32 = 7;
    pub const DURATION: i32 = 8;
    pub const U128: i32 = 9;
    pub const I128: i32 = 10;
    pub const U256: i32 = 11;
    pub const I256: i32 = 12;
    pub const BYTES: i32 = 13;
    pub const STRING: i32 = 14;
    pub const SYMBOL: i32 = 15;
    pub const VEC: i32 = 16;
    pub const MAP: i32 = 17;
    pub const ADDRESS: i32 = 18;
    pub const CONTRACT_INSTANCE: i32 = 19;
    pub const LEDGER_KEY_CONTRACT_INSTANCE: i32 = 20;
    pub const LEDGER_KEY_NONCE: i32 = 21;
}

const SC_ADDRESS_TYPE_ACCOUNT: i32 = 0;
const SC_ADDRESS_TYPE_CONTRACT: i32 = 1;
const PUBLIC_KEY_TYPE_ED25519: i32 = 0;

const LEDGER_ENTRY_ACCOUNT: i32 = 0;
const LEDGER_ENTRY_CONTRACT_DATA: i32 = 6;

const CONTRACT_EXECUTABLE_WASM: i32 = 0;
const CONTRACT_EXECUTABLE_STELLAR_ASSET: i32 = 1;

/// Append-only XDR encoder
#[derive(Debug, Default)]
pub struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length of the encoded output
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and return the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_i32(i32::from(value));
    }

    /// Fixed-length opaque data (`opaque[N]`)
    pub fn write_fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.pad(bytes.len());
    }

    /// Variable-length opaque data or string (`opaque<>`, `string<>`)
    pub fn write_var_opaque(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.write_fixed(bytes);
    }

    /// Already-encoded XDR, copied verbatim
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn pad(&mut self, len: usize) {
        let padding = (4 - len % 4) % 4;
        self.buf.extend(std::iter::repeat(0u8).take(padding));
    }
}

/// Cursor-based XDR decoder
pub struct XdrReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> XdrReader<'a> {
    /// Create a reader over a byte slice
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> usize {
        let total = self.cursor.get_ref().len();
        total.saturating_sub(self.cursor.position() as usize)
    }

    /// Discard everything left in the input
    pub fn skip_remaining(&mut self) {
        let total = self.cursor.get_ref().len() as u64;
        self.cursor.set_position(total);
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.cursor.read_i32::<BigEndian>().map_err(short_read)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.cursor.read_u32::<BigEndian>().map_err(short_read)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.cursor.read_i64::<BigEndian>().map_err(short_read)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.cursor.read_u64::<BigEndian>().map_err(short_read)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_i32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::xdr(format!("Invalid boolean value: {}", other))),
        }
    }

    /// Fixed-length opaque data of `N` bytes
    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        self.cursor.read_exact(&mut out).map_err(short_read)?;
        self.skip_padding(N)?;
        Ok(out)
    }

    /// Variable-length opaque data
    pub fn read_var_opaque(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()?;
        if len > MAX_VAR_LEN || len as usize > self.remaining() {
            return Err(Error::xdr(format!("Variable-length field too long: {}", len)));
        }
        let mut out = vec![0u8; len as usize];
        self.cursor.read_exact(&mut out).map_err(short_read)?;
        self.skip_padding(len as usize)?;
        Ok(out)
    }

    /// Variable-length string, decoded as UTF-8 with replacement characters
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_var_opaque()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Element count of a variable-length array
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_u32()?;
        // every element takes at least four bytes
        if len as usize > self.remaining() / 4 + 1 {
            return Err(Error::xdr(format!("Array length {} exceeds input", len)));
        }
        Ok(len as usize)
    }

    fn skip_padding(&mut self, len: usize) -> Result<()> {
        let padding = (4 - len % 4) % 4;
        for _ in 0..padding {
            if self.cursor.read_u8().map_err(short_read)? != 0 {
                return Err(Error::xdr("Non-zero padding"));
            }
        }
        Ok(())
    }
}

fn short_read(_: std::io::Error) -> Error {
    Error::xdr("Unexpected end of input")
}

/// Types with an XDR encoding
pub trait WriteXdr {
    /// Append the encoding of `self`
    fn write_xdr(&self, w: &mut XdrWriter);

    /// Encode into a fresh buffer
    fn to_xdr(&self) -> Vec<u8> {
        let mut w = XdrWriter::new();
        self.write_xdr(&mut w);
        w.into_bytes()
    }

    /// Encode as base64 text, the form used by the RPC API
    fn to_xdr_base64(&self) -> String {
        BASE64.encode(self.to_xdr())
    }
}

/// Types decodable from XDR
pub trait ReadXdr: Sized {
    /// Decode one value from the reader
    fn read_xdr(r: &mut XdrReader<'_>) -> Result<Self>;

    /// Decode a complete buffer; trailing bytes are an error
    fn from_xdr(bytes: &[u8]) -> Result<Self> {
        let mut r = XdrReader::new(bytes);
        let value = Self::read_xdr(&mut r)?;
        if r.remaining() != 0 {
            return Err(Error::xdr(format!(
                "{} trailing bytes after value",
                r.remaining()
            )));
        }
        Ok(value)
    }

    /// Decode base64 text
    fn from_xdr_base64(encoded: &str) -> Result<Self> {
        let bytes = decode_base64(encoded)?;
        Self::from_xdr(&bytes)
    }
}

/// Decode base64 text into raw XDR bytes
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(encoded.trim())
        .map_err(|e| Error::xdr(format!("Invalid base64: {}", e)))
}

impl WriteXdr for Address {
    fn write_xdr(&self, w: &mut XdrWriter) {
        match self {
            Address::Account(key) => {
                w.write_i32(SC_ADDRESS_TYPE_ACCOUNT);
                w.write_i32(PUBLIC_KEY_TYPE_ED25519);
                w.write_fixed(key);
            }
            Address::Contract(hash) => {
                w.write_i32(SC_ADDRESS_TYPE_CONTRACT);
                w.write_fixed(hash);
            }
        }
    }
}

impl ReadXdr for Address {
    fn read_xdr(r: &mut XdrReader<'_>) -> Result<Self> {
        match r.read_i32()? {
            SC_ADDRESS_TYPE_ACCOUNT => Ok(Address::Account(read_account_id(r)?)),
            SC_ADDRESS_TYPE_CONTRACT => Ok(Address::Contract(r.read_fixed::<32>()?)),
            other => Err(Error::xdr(format!("Unsupported address type: {}", other))),
        }
    }
}

fn read_account_id(r: &mut XdrReader<'_>) -> Result<[u8; 32]> {
    match r.read_i32()? {
        PUBLIC_KEY_TYPE_ED25519 => r.read_fixed::<32>(),
        other => Err(Error::xdr(format!("Unsupported public key type: {}", other))),
    }
}

fn write_account_id(w: &mut XdrWriter, key: &[u8; 32]) {
    w.write_i32(PUBLIC_KEY_TYPE_ED25519);
    w.write_fixed(key);
}

/// Code of a contract executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractExecutable {
    /// Uploaded WASM, identified by its hash
    Wasm([u8; 32]),
    /// Built-in Stellar asset contract
    StellarAsset,
}

/// A deployed contract instance with its instance storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScContractInstance {
    pub executable: ContractExecutable,
    pub storage: Option<Vec<(ScVal, ScVal)>>,
}

/// Soroban contract value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScVal {
    Bool(bool),
    Void,
    Error { kind: i32, code: u32 },
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    Timepoint(u64),
    Duration(u64),
    U128 { hi: u64, lo: u64 },
    I128 { hi: i64, lo: u64 },
    U256([u8; 32]),
    I256([u8; 32]),
    Bytes(Vec<u8>),
    String(String),
    Symbol(String),
    Vec(Option<Vec<ScVal>>),
    Map(Option<Vec<(ScVal, ScVal)>>),
    Address(Address),
    ContractInstance(ScContractInstance),
    LedgerKeyContractInstance,
    LedgerKeyNonce(i64),
}

impl ScVal {
    /// Symbol value
    pub fn symbol(name: impl Into<String>) -> Self {
        ScVal::Symbol(name.into())
    }

    /// Name of the variant, used in schema errors
    pub fn type_name(&self) -> &'static str {
        match self {
            ScVal::Bool(_) => "bool",
            ScVal::Void => "void",
            ScVal::Error { .. } => "error",
            ScVal::U32(_) => "u32",
            ScVal::I32(_) => "i32",
            ScVal::U64(_) => "u64",
            ScVal::I64(_) => "i64",
            ScVal::Timepoint(_) => "timepoint",
            ScVal::Duration(_) => "duration",
            ScVal::U128 { .. } => "u128",
            ScVal::I128 { .. } => "i128",
            ScVal::U256(_) => "u256",
            ScVal::I256(_) => "i256",
            ScVal::Bytes(_) => "bytes",
            ScVal::String(_) => "string",
            ScVal::Symbol(_) => "symbol",
            ScVal::Vec(_) => "vec",
            ScVal::Map(_) => "map",
            ScVal::Address(_) => "address",
            ScVal::ContractInstance(_) => "contract_instance",
            ScVal::LedgerKeyContractInstance => "ledger_key_contract_instance",
            ScVal::LedgerKeyNonce(_) => "ledger_key_nonce",
        }
    }

    fn read_nested(r: &mut XdrReader<'_>, depth: usize) -> Result<Self> {
        use sc_val_type::*;

        if depth > MAX_DEPTH {
            return Err(Error::xdr("ScVal nesting too deep"));
        }

        let value = match r.read_i32()? {
            BOOL => ScVal::Bool(r.read_bool()?),
            VOID => ScVal::Void,
            ERROR => {
                let kind = r.read_i32()?;
                let code = r.read_u32()?;
                ScVal::Error { kind, code }
            }
            U32 => ScVal::U32(r.read_u32()?),
            I32 => ScVal::I32(r.read_i32()?),
            U64 => ScVal::U64(r.read_u64()?),
            I64 => ScVal::I64(r.read_i64()?),
            TIMEPOINT => ScVal::Timepoint(r.read_u64()?),
            DURATION => ScVal::Duration(r.read_u64()?),
            U128 => {
                let hi = r.read_u64()?;
                let lo = r.read_u64()?;
                ScVal::U128 { hi, lo }
            }
            I128 => {
                let hi = r.read_i64()?;
                let lo = r.read_u64()?;
                ScVal::I128 { hi, lo }
            }
            U256 => ScVal::U256(r.read_fixed::<32>()?),
            I256 => ScVal::I256(r.read_fixed::<32>()?),
            BYTES => ScVal::Bytes(r.read_var_opaque()?),
            STRING => ScVal::String(r.read_string()?),
            SYMBOL => ScVal::Symbol(r.read_string()?),
            VEC => {
                if r.read_bool()? {
                    let len = r.read_len()?;
                    let mut items = Vec::with_capacity(len);
                    for _ in 0..len {
                        items.push(ScVal::read_nested(r, depth + 1)?);
                    }
                    ScVal::Vec(Some(items))
                } else {
                    ScVal::Vec(None)
                }
            }
            MAP => {
                if r.read_bool()? {
                    ScVal::Map(Some(read_map_entries(r, depth + 1)?))
                } else {
                    ScVal::Map(None)
                }
            }
            ADDRESS => ScVal::Address(Address::read_xdr(r)?),
            CONTRACT_INSTANCE => {
                let executable = match r.read_i32()? {
                    CONTRACT_EXECUTABLE_WASM => ContractExecutable::Wasm(r.read_fixed::<32>()?),
                    CONTRACT_EXECUTABLE_STELLAR_ASSET => ContractExecutable::StellarAsset,
                    other => {
                        return Err(Error::xdr(format!("Unknown contract executable: {}", other)))
                    }
                };
                let storage = if r.read_bool()? {
                    Some(read_map_entries(r, depth + 1)?)
                } else {
                    None
                };
                ScVal::ContractInstance(ScContractInstance {
                    executable,
                    storage,
                })
            }
            LEDGER_KEY_CONTRACT_INSTANCE => ScVal::LedgerKeyContractInstance,
            LEDGER_KEY_NONCE => ScVal::LedgerKeyNonce(r.read_i64()?),
            other => return Err(Error::xdr(format!("Unknown ScVal type: {}", other))),
        };

        Ok(value)
    }
}

fn read_map_entries(r: &mut XdrReader<'_>, depth: usize) -> Result<Vec<(ScVal, ScVal)>> {
    let len = r.read_len()?;
    let mut entries = Vec::with_capacity(len);
    for _ in 0..len {
        let key = ScVal::read_nested(r, depth)?;
        let val = ScVal::read_nested(r, depth)?;
        entries.push((key, val));
    }
    Ok(entries)
}

fn write_map_entries(w: &mut XdrWriter, entries: &[(ScVal, ScVal)]) {
    w.write_u32(entries.len() as u32);
    for (key, val) in entries {
        key.write_xdr(w);
        val.write_xdr(w);
    }
}

impl WriteXdr for ScVal {
    fn write_xdr(&self, w: &mut XdrWriter) {
        use sc_val_type::*;

        match self {
            ScVal::Bool(v) => {
                w.write_i32(BOOL);
                w.write_bool(*v);
            }
            ScVal::Void => w.write_i32(VOID),
            ScVal::Error { kind, code } => {
                w.write_i32(ERROR);
                w.write_i32(*kind);
                w.write_u32(*code);
            }
            ScVal::U32(v) => {
                w.write_i32(U32);
                w.write_u32(*v);
            }
            ScVal::I32(v) => {
                w.write_i32(I32);
                w.write_i32(*v);
            }
            ScVal::U64(v) => {
                w.write_i32(U64);
                w.write_u64(*v);
            }
            ScVal::I64(v) => {
                w.write_i32(I64);
                w.write_i64(*v);
            }
            ScVal::Timepoint(v) => {
                w.write_i32(TIMEPOINT);
                w.write_u64(*v);
            }
            ScVal::Duration(v) => {
                w.write_i32(DURATION);
                w.write_u64(*v);
            }
            ScVal::U128 { hi, lo } => {
                w.write_i32(U128);
                w.write_u64(*hi);
                w.write_u64(*lo);
            }
            ScVal::I128 { hi, lo } => {
                w.write_i32(I128);
                w.write_i64(*hi);
                w.write_u64(*lo);
            }
            ScVal::U256(bytes) => {
                w.write_i32(U256);
                w.write_fixed(bytes);
            }
            ScVal::I256(bytes) => {
                w.write_i32(I256);
                w.write_fixed(bytes);
            }
            ScVal::Bytes(bytes) => {
                w.write_i32(BYTES);
                w.write_var_opaque(bytes);
            }
            ScVal::String(s) => {
                w.write_i32(STRING);
                w.write_var_opaque(s.as_bytes());
            }
            ScVal::Symbol(s) => {
                w.write_i32(SYMBOL);
                w.write_var_opaque(s.as_bytes());
            }
            ScVal::Vec(items) => {
                w.write_i32(VEC);
                w.write_bool(items.is_some());
                if let Some(items) = items {
                    w.write_u32(items.len() as u32);
                    for item in items {
                        item.write_xdr(w);
                    }
                }
            }
            ScVal::Map(entries) => {
                w.write_i32(MAP);
                w.write_bool(entries.is_some());
                if let Some(entries) = entries {
                    write_map_entries(w, entries);
                }
            }
            ScVal::Address(address) => {
                w.write_i32(ADDRESS);
                address.write_xdr(w);
            }
            ScVal::ContractInstance(instance) => {
                w.write_i32(CONTRACT_INSTANCE);
                match &instance.executable {
                    ContractExecutable::Wasm(hash) => {
                        w.write_i32(CONTRACT_EXECUTABLE_WASM);
                        w.write_fixed(hash);
                    }
                    ContractExecutable::StellarAsset => {
                        w.write_i32(CONTRACT_EXECUTABLE_STELLAR_ASSET)
                    }
                }
                w.write_bool(instance.storage.is_some());
                if let Some(entries) = &instance.storage {
                    write_map_entries(w, entries);
                }
            }
            ScVal::LedgerKeyContractInstance => w.write_i32(LEDGER_KEY_CONTRACT_INSTANCE),
            ScVal::LedgerKeyNonce(nonce) => {
                w.write_i32(LEDGER_KEY_NONCE);
                w.write_i64(*nonce);
            }
        }
    }
}

impl ReadXdr for ScVal {
    fn read_xdr(r: &mut XdrReader<'_>) -> Result<Self> {
        ScVal::read_nested(r, 0)
    }
}

/// Typed view over a contract struct encoded as a symbol-keyed map.
///
/// Every accessor fails with a schema error naming the struct and field
/// when the field is missing or holds the wrong variant.
pub struct ScFields<'a> {
    type_name: &'static str,
    entries: &'a [(ScVal, ScVal)],
}

impl<'a> ScFields<'a> {
    /// View `value` as the struct `type_name`
    pub fn new(type_name: &'static str, value: &'a ScVal) -> Result<Self> {
        match value {
            ScVal::Map(Some(entries)) => Ok(Self { type_name, entries }),
            other => Err(Error::ledger_schema(format!(
                "{}: expected map, got {}",
                type_name,
                other.type_name()
            ))),
        }
    }

    /// Raw value of a field
    pub fn get(&self, field: &str) -> Result<&'a ScVal> {
        self.entries
            .iter()
            .find_map(|(key, val)| match key {
                ScVal::Symbol(name) if name == field => Some(val),
                _ => None,
            })
            .ok_or_else(|| {
                Error::ledger_schema(format!("{}: missing field `{}`", self.type_name, field))
            })
    }

    pub fn u64(&self, field: &str) -> Result<u64> {
        match self.get(field)? {
            ScVal::U64(v) => Ok(*v),
            other => Err(self.mismatch(field, "u64", other)),
        }
    }

    pub fn u32(&self, field: &str) -> Result<u32> {
        match self.get(field)? {
            ScVal::U32(v) => Ok(*v),
            other => Err(self.mismatch(field, "u32", other)),
        }
    }

    pub fn bool(&self, field: &str) -> Result<bool> {
        match self.get(field)? {
            ScVal::Bool(v) => Ok(*v),
            other => Err(self.mismatch(field, "bool", other)),
        }
    }

    pub fn string(&self, field: &str) -> Result<String> {
        match self.get(field)? {
            ScVal::String(v) => Ok(v.clone()),
            other => Err(self.mismatch(field, "string", other)),
        }
    }

    pub fn bytes(&self, field: &str) -> Result<&'a [u8]> {
        match self.get(field)? {
            ScVal::Bytes(v) => Ok(v),
            other => Err(self.mismatch(field, "bytes", other)),
        }
    }

    pub fn address(&self, field: &str) -> Result<Address> {
        match self.get(field)? {
            ScVal::Address(v) => Ok(*v),
            other => Err(self.mismatch(field, "address", other)),
        }
    }

    fn mismatch(&self, field: &str, expected: &str, got: &ScVal) -> Error {
        Error::ledger_schema(format!(
            "{}: field `{}` should be {}, got {}",
            self.type_name,
            field,
            expected,
            got.type_name()
        ))
    }
}

/// Storage class of a contract data entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractDataDurability {
    Temporary = 0,
    Persistent = 1,
}

impl ContractDataDurability {
    fn from_i32(value: i32) -> Result<Self> {
        match value {
            0 => Ok(ContractDataDurability::Temporary),
            1 => Ok(ContractDataDurability::Persistent),
            other => Err(Error::xdr(format!("Unknown durability: {}", other))),
        }
    }
}

/// Key of a ledger entry, as sent to `getLedgerEntries`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerKey {
    /// Classic account entry
    Account([u8; 32]),
    /// Contract storage entry
    ContractData {
        contract: Address,
        key: ScVal,
        durability: ContractDataDurability,
    },
}

impl WriteXdr for LedgerKey {
    fn write_xdr(&self, w: &mut XdrWriter) {
        match self {
            LedgerKey::Account(key) => {
                w.write_i32(LEDGER_ENTRY_ACCOUNT);
                write_account_id(w, key);
            }
            LedgerKey::ContractData {
                contract,
                key,
                durability,
            } => {
                w.write_i32(LEDGER_ENTRY_CONTRACT_DATA);
                contract.write_xdr(w);
                key.write_xdr(w);
                w.write_i32(*durability as i32);
            }
        }
    }
}

/// Ledger entry payload returned by `getLedgerEntries`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntryData {
    /// Leading fields of an account entry; the remainder is not decoded
    Account {
        account_id: [u8; 32],
        balance: i64,
        seq_num: i64,
    },
    /// Contract storage entry
    ContractData {
        contract: Address,
        key: ScVal,
        durability: ContractDataDurability,
        val: ScVal,
    },
}

impl ReadXdr for LedgerEntryData {
    fn read_xdr(r: &mut XdrReader<'_>) -> Result<Self> {
        match r.read_i32()? {
            LEDGER_ENTRY_ACCOUNT => {
                let account_id = read_account_id(r)?;
                let balance = r.read_i64()?;
                let seq_num = r.read_i64()?;
                // thresholds, signers and extensions are irrelevant here
                r.skip_remaining();
                Ok(LedgerEntryData::Account {
                    account_id,
                    balance,
                    seq_num,
                })
            }
            LEDGER_ENTRY_CONTRACT_DATA => {
                // ExtensionPoint
                let ext = r.read_i32()?;
                if ext != 0 {
                    return Err(Error::xdr(format!("Unknown extension point: {}", ext)));
                }
                let contract = Address::read_xdr(r)?;
                let key = ScVal::read_xdr(r)?;
                let durability = ContractDataDurability::from_i32(r.read_i32()?)?;
                let val = ScVal::read_xdr(r)?;
                Ok(LedgerEntryData::ContractData {
                    contract,
                    key,
                    durability,
                    val,
                })
            }
            other => Err(Error::xdr(format!("Unsupported ledger entry type: {}", other))),
        }
    }
}

impl WriteXdr for LedgerEntryData {
    fn write_xdr(&self, w: &mut XdrWriter) {
        match self {
            LedgerEntryData::Account {
                account_id,
                balance,
                seq_num,
            } => {
                w.write_i32(LEDGER_ENTRY_ACCOUNT);
                write_account_id(w, account_id);
                w.write_i64(*balance);
                w.write_i64(*seq_num);
                // numSubEntries, no inflation destination, flags, empty home
                // domain, default thresholds, no signers, ext v0
                w.write_u32(0);
                w.write_bool(false);
                w.write_u32(0);
                w.write_var_opaque(&[]);
                w.write_fixed(&[1, 0, 0, 0]);
                w.write_u32(0);
                w.write_i32(0);
            }
            LedgerEntryData::ContractData {
                contract,
                key,
                durability,
                val,
            } => {
                w.write_i32(LEDGER_ENTRY_CONTRACT_DATA);
                w.write_i32(0);
                contract.write_xdr(w);
                key.write_xdr(w);
                w.write_i32(*durability as i32);
                val.write_xdr(w);
            }
        }
    }
}
