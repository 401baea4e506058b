// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use dd_trace::{Error, ErrorCode, Result};

/// Streaming MessagePack writer.
///
/// Always emits the smallest form that fits the value, and the unsigned
/// family for non-negative integers, matching what the agent's decoder
/// expects from the other Datadog tracers.
#[derive(Debug, Default)]
pub struct Packer {
    buffer: Vec<u8>,
}

impl Packer {
    pub fn new() -> Self {
        Packer { buffer: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Packer {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    pub fn pack_map_len(&mut self, len: usize) -> Result<()> {
        if len <= 0xf {
            self.buffer.push(0x80 | len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.push(0xde);
            self.buffer.extend_from_slice(&(len as u16).to_be_bytes());
        } else if len <= u32::MAX as usize {
            self.buffer.push(0xdf);
            self.buffer.extend_from_slice(&(len as u32).to_be_bytes());
        } else {
            return Err(overflow("map"));
        }
        Ok(())
    }

    pub fn pack_array_len(&mut self, len: usize) -> Result<()> {
        if len <= 0xf {
            self.buffer.push(0x90 | len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.push(0xdc);
            self.buffer.extend_from_slice(&(len as u16).to_be_bytes());
        } else if len <= u32::MAX as usize {
            self.buffer.push(0xdd);
            self.buffer.extend_from_slice(&(len as u32).to_be_bytes());
        } else {
            return Err(overflow("array"));
        }
        Ok(())
    }

    pub fn pack_uint(&mut self, value: u64) {
        if value <= 0x7f {
            self.buffer.push(value as u8);
        } else if value <= u8::MAX as u64 {
            self.buffer.push(0xcc);
            self.buffer.push(value as u8);
        } else if value <= u16::MAX as u64 {
            self.buffer.push(0xcd);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if value <= u32::MAX as u64 {
            self.buffer.push(0xce);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(0xcf);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    /// Non-negative values go through the unsigned family.
    pub fn pack_int(&mut self, value: i64) {
        if value >= 0 {
            self.pack_uint(value as u64);
        } else if value >= -32 {
            self.buffer.push(value as u8);
        } else if value >= i8::MIN as i64 {
            self.buffer.push(0xd0);
            self.buffer.push(value as u8);
        } else if value >= i16::MIN as i64 {
            self.buffer.push(0xd1);
            self.buffer.extend_from_slice(&(value as i16).to_be_bytes());
        } else if value >= i32::MIN as i64 {
            self.buffer.push(0xd2);
            self.buffer.extend_from_slice(&(value as i32).to_be_bytes());
        } else {
            self.buffer.push(0xd3);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn pack_f32(&mut self, value: f32) {
        self.buffer.push(0xca);
        self.buffer.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    pub fn pack_f64(&mut self, value: f64) {
        self.buffer.push(0xcb);
        self.buffer.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    pub fn pack_str(&mut self, value: &str) -> Result<()> {
        let len = value.len();
        if len <= 0x1f {
            self.buffer.push(0xa0 | len as u8);
        } else if len <= u8::MAX as usize {
            self.buffer.push(0xd9);
            self.buffer.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.push(0xda);
            self.buffer.extend_from_slice(&(len as u16).to_be_bytes());
        } else if len <= u32::MAX as usize {
            self.buffer.push(0xdb);
            self.buffer.extend_from_slice(&(len as u32).to_be_bytes());
        } else {
            return Err(overflow("string"));
        }
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn pack_bin(&mut self, value: &[u8]) -> Result<()> {
        let len = value.len();
        if len <= u8::MAX as usize {
            self.buffer.push(0xc4);
            self.buffer.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.push(0xc5);
            self.buffer.extend_from_slice(&(len as u16).to_be_bytes());
        } else if len <= u32::MAX as usize {
            self.buffer.push(0xc6);
            self.buffer.extend_from_slice(&(len as u32).to_be_bytes());
        } else {
            return Err(overflow("binary"));
        }
        self.buffer.extend_from_slice(value);
        Ok(())
    }
}

fn overflow(what: &str) -> Error {
    Error::new(
        ErrorCode::BufferOverflow,
        format!("msgpack {what} length does not fit in 32 bits"),
    )
}
