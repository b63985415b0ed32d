// SPDX-License-Identifier: MIT

//! Wire framing for the durable `ImageMap` record (spec §6):
//!
//! ```text
//! u8      version (currently 1)
//! u32 LE  instance_id byte length
//! [u8]    instance_id (utf8)
//! u8      state (0=Unassigned 1=Mapping 2=Mapped 3=Unmapping)
//! u64 LE  mapped_time_ns
//! ```

use crate::gateway::StoreError;
use immap_core::{ImageMap, ImageMapState, InstanceId};

const WIRE_VERSION: u8 = 1;

pub fn encode_image_map(map: &ImageMap) -> Vec<u8> {
    let instance_bytes = map.instance_id.as_str().as_bytes();
    let mut out = Vec::with_capacity(1 + 4 + instance_bytes.len() + 1 + 8);
    out.push(WIRE_VERSION);
    out.extend_from_slice(&(instance_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(instance_bytes);
    out.push(map.state.as_wire_byte());
    out.extend_from_slice(&map.mapped_time_ns.to_le_bytes());
    out
}

pub fn decode_image_map(bytes: &[u8]) -> Result<ImageMap, StoreError> {
    let mut cursor = bytes;
    let version = take_u8(&mut cursor)?;
    if version != WIRE_VERSION {
        return Err(StoreError::Corrupt(format!("unsupported version {version}")));
    }
    let instance_len = take_u32(&mut cursor)? as usize;
    let instance_bytes = take_n(&mut cursor, instance_len)?;
    let instance_id = String::from_utf8(instance_bytes.to_vec())
        .map_err(|e| StoreError::Corrupt(format!("instance_id not utf8: {e}")))?;
    let state_byte = take_u8(&mut cursor)?;
    let state = ImageMapState::from_wire_byte(state_byte)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown state byte {state_byte}")))?;
    let mapped_time_ns = take_u64(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(StoreError::Corrupt("trailing bytes after record".into()));
    }
    Ok(ImageMap::new(InstanceId::new(instance_id), state, mapped_time_ns))
}

fn take_u8(cursor: &mut &[u8]) -> Result<u8, StoreError> {
    let (head, tail) = split(cursor, 1)?;
    *cursor = tail;
    Ok(head[0])
}

fn take_u32(cursor: &mut &[u8]) -> Result<u32, StoreError> {
    let (head, tail) = split(cursor, 4)?;
    *cursor = tail;
    Ok(u32::from_le_bytes([head[0], head[1], head[2], head[3]]))
}

fn take_u64(cursor: &mut &[u8]) -> Result<u64, StoreError> {
    let (head, tail) = split(cursor, 8)?;
    *cursor = tail;
    Ok(u64::from_le_bytes([
        head[0], head[1], head[2], head[3], head[4], head[5], head[6], head[7],
    ]))
}

fn take_n<'a>(cursor: &mut &'a [u8], n: usize) -> Result<&'a [u8], StoreError> {
    let (head, tail) = split(cursor, n)?;
    *cursor = tail;
    Ok(head)
}

fn split<'a>(cursor: &&'a [u8], n: usize) -> Result<(&'a [u8], &'a [u8]), StoreError> {
    if cursor.len() < n {
        return Err(StoreError::Corrupt("truncated record".into()));
    }
    Ok(cursor.split_at(n))
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
