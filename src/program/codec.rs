//! Byte-exact argument codec.
//!
//! The wire format carries no type tags: `u8` is one byte, `u64` is eight
//! little-endian bytes, strings are a `u32` little-endian length followed by
//! raw UTF-8, and addresses are 32 verbatim bytes. Both sides must agree on
//! the argument schema out of band (see `instruction::InstructionDescriptor`).

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use solana_sdk::pubkey::Pubkey;

use crate::error::{LaunchpadError, LaunchpadResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    U8,
    U64,
    String,
    Address,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgType::U8 => "u8",
            ArgType::U64 => "u64",
            ArgType::String => "string",
            ArgType::Address => "address",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    U8(u8),
    U64(u64),
    String(String),
    Address(Pubkey),
}

impl ArgValue {
    pub fn arg_type(&self) -> ArgType {
        match self {
            ArgValue::U8(_) => ArgType::U8,
            ArgValue::U64(_) => ArgType::U64,
            ArgValue::String(_) => ArgType::String,
            ArgValue::Address(_) => ArgType::Address,
        }
    }
}

impl From<u8> for ArgValue {
    fn from(v: u8) -> Self {
        ArgValue::U8(v)
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        ArgValue::U64(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::String(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::String(v)
    }
}

impl From<Pubkey> for ArgValue {
    fn from(v: Pubkey) -> Self {
        ArgValue::Address(v)
    }
}

/// Append-only writer for instruction arguments
#[derive(Debug, Default)]
pub struct ArgEncoder {
    buf: Vec<u8>,
}

impl ArgEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing prefix, typically a discriminator
    pub fn with_prefix(prefix: &[u8]) -> Self {
        Self { buf: prefix.to_vec() }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_string(&mut self, value: &str) -> LaunchpadResult<()> {
        let len = u32::try_from(value.len())
            .map_err(|_| LaunchpadError::Codec(format!("string of {} bytes is too long", value.len())))?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn write_address(&mut self, value: &Pubkey) {
        self.buf.extend_from_slice(value.as_ref());
    }

    pub fn write_value(&mut self, value: &ArgValue) -> LaunchpadResult<()> {
        match value {
            ArgValue::U8(v) => self.write_u8(*v),
            ArgValue::U64(v) => self.write_u64(*v),
            ArgValue::String(v) => self.write_string(v)?,
            ArgValue::Address(v) => self.write_address(v),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over encoded arguments
#[derive(Debug)]
pub struct ArgDecoder<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ArgDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, len: usize) -> LaunchpadResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(LaunchpadError::Codec(format!(
                "need {} bytes at offset {}, only {} remain",
                len,
                self.offset,
                self.remaining()
            )));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> LaunchpadResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> LaunchpadResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> LaunchpadResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> LaunchpadResult<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_string(&mut self) -> LaunchpadResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LaunchpadError::Codec(format!("invalid utf-8 string: {}", e)))
    }

    pub fn read_address(&mut self) -> LaunchpadResult<Pubkey> {
        Ok(Pubkey::new_from_array(self.take_array()?))
    }

    pub fn read_value(&mut self, ty: ArgType) -> LaunchpadResult<ArgValue> {
        Ok(match ty {
            ArgType::U8 => ArgValue::U8(self.read_u8()?),
            ArgType::U64 => ArgValue::U64(self.read_u64()?),
            ArgType::String => ArgValue::String(self.read_string()?),
            ArgType::Address => ArgValue::Address(self.read_address()?),
        })
    }

    /// Fails if any bytes are left unread
    pub fn finish(self) -> LaunchpadResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(LaunchpadError::Codec(format!("{} trailing bytes", n))),
        }
    }
}

pub fn encode_args(values: &[ArgValue]) -> LaunchpadResult<Vec<u8>> {
    let mut encoder = ArgEncoder::new();
    for value in values {
        encoder.write_value(value)?;
    }
    Ok(encoder.finish())
}

/// Decode exactly `schema.len()` values and nothing more
pub fn decode_args(schema: &[ArgType], data: &[u8]) -> LaunchpadResult<Vec<ArgValue>> {
    let mut decoder = ArgDecoder::new(data);
    let values = schema
        .iter()
        .map(|ty| decoder.read_value(*ty))
        .collect::<LaunchpadResult<Vec<_>>>()?;
    decoder.finish()?;
    Ok(values)
}

/// Convert a human amount into integer base units, truncating any remainder.
///
/// `1.9999999999` with 9 decimals is `1_999_999_999`, never `2_000_000_000`.
pub fn to_base_units(amount: Decimal, decimals: u8) -> LaunchpadResult<u64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LaunchpadError::InvalidAmount(format!("{} is negative", amount)));
    }
    let factor = 10u64
        .checked_pow(decimals as u32)
        .ok_or_else(|| LaunchpadError::InvalidAmount(format!("{} decimals is out of range", decimals)))?;
    amount
        .checked_mul(Decimal::from(factor))
        .map(|scaled| scaled.trunc())
        .and_then(|scaled| scaled.to_u64())
        .ok_or_else(|| LaunchpadError::InvalidAmount(format!("{} does not fit in u64 base units", amount)))
}

/// Display conversion from base units back into a human amount
pub fn from_base_units(amount: u64, decimals: u8) -> LaunchpadResult<Decimal> {
    Decimal::try_from_i128_with_scale(amount as i128, decimals as u32)
        .map(|d| d.normalize())
        .map_err(|e| LaunchpadError::InvalidAmount(e.to_string()))
}
